use crate::entities::{stock_item, stock_movement};
use crate::services::movement_handlers::MovementHandler;

pub const CUSTOMER_LOAN: &str = "customer_loan";
pub const LOAN_RETURN: &str = "loan_return";

/// Stock lent to a customer and returned later.
///
/// A loan takes stock out and requires a `customer_id` in the movement
/// meta so the outstanding loan can be traced. A return brings stock back
/// and requires `reference_id` pointing at the loan being settled.
pub struct CustomerLoanHandler;

impl MovementHandler for CustomerLoanHandler {
    fn reference_types(&self) -> &'static [&'static str] {
        &[CUSTOMER_LOAN, LOAN_RETURN]
    }

    fn validate(
        &self,
        movement: &stock_movement::Model,
        stock_item: Option<&stock_item::Model>,
    ) -> Vec<String> {
        let mut errors = Vec::new();
        match movement.reference_type.as_deref() {
            Some(CUSTOMER_LOAN) => {
                let has_customer = movement
                    .meta
                    .as_ref()
                    .and_then(|meta| meta.get("customer_id"))
                    .map(|v| !v.is_null())
                    .unwrap_or(false);
                if !has_customer {
                    errors.push("customer loan requires customer_id in meta".to_string());
                }
                match stock_item {
                    Some(item) if item.has_available(movement.quantity) => {}
                    Some(_) => errors.push(format!(
                        "insufficient available stock for loan of {}",
                        movement.quantity
                    )),
                    None => errors.push("no stock on hand to loan".to_string()),
                }
            }
            Some(LOAN_RETURN) => {
                if movement.reference_id.is_none() {
                    errors.push("loan return requires reference_id of the loan".to_string());
                }
            }
            other => {
                errors.push(format!("unsupported reference type {:?}", other));
            }
        }
        errors
    }

    fn apply(
        &self,
        movement: &stock_movement::Model,
        stock_item: stock_item::Model,
    ) -> stock_item::Model {
        match movement.reference_type.as_deref() {
            Some(CUSTOMER_LOAN) => stock_item.adjust_quantity(-movement.quantity),
            Some(LOAN_RETURN) => stock_item.adjust_quantity(movement.quantity),
            _ => stock_item,
        }
    }

    fn adds_stock(&self, reference_type: &str) -> bool {
        reference_type == LOAN_RETURN
    }

    fn describe(&self) -> &str {
        "customer loan and loan return"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{MovementType, StockKey};
    use rust_decimal_macros::dec;
    use serde_json::json;
    use uuid::Uuid;

    fn stocked_item(quantity: rust_decimal::Decimal) -> stock_item::Model {
        let key = StockKey::new(Uuid::new_v4(), Uuid::new_v4());
        stock_item::Model::new_empty(&key).with_quantity(quantity)
    }

    fn loan_movement(item: &stock_item::Model, quantity: rust_decimal::Decimal) -> stock_movement::Model {
        stock_movement::Model::new(
            &MovementType::Custom(CUSTOMER_LOAN.to_string()),
            item.item_id,
            item.location_id,
            quantity,
        )
    }

    #[test]
    fn loan_requires_customer_id() {
        let handler = CustomerLoanHandler;
        let item = stocked_item(dec!(10));
        let movement = loan_movement(&item, dec!(4));

        let errors = handler.validate(&movement, Some(&item));
        assert!(errors.iter().any(|e| e.contains("customer_id")));

        let with_customer = movement.with_meta(json!({ "customer_id": Uuid::new_v4() }));
        assert!(handler.validate(&with_customer, Some(&item)).is_empty());
    }

    #[test]
    fn loan_checks_availability() {
        let handler = CustomerLoanHandler;
        let item = stocked_item(dec!(3));
        let movement =
            loan_movement(&item, dec!(4)).with_meta(json!({ "customer_id": Uuid::new_v4() }));

        let errors = handler.validate(&movement, Some(&item));
        assert!(errors.iter().any(|e| e.contains("insufficient")));
    }

    #[test]
    fn loan_and_return_move_the_balance() {
        let handler = CustomerLoanHandler;
        let item = stocked_item(dec!(10));
        let loan = loan_movement(&item, dec!(4));

        let after_loan = handler.apply(&loan, item);
        assert_eq!(after_loan.quantity, dec!(6));

        let ret = stock_movement::Model::new(
            &MovementType::Custom(LOAN_RETURN.to_string()),
            after_loan.item_id,
            after_loan.location_id,
            dec!(4),
        )
        .with_reference(LOAN_RETURN, loan.id);
        let after_return = handler.apply(&ret, after_loan);
        assert_eq!(after_return.quantity, dec!(10));
    }

    #[test]
    fn return_requires_loan_reference() {
        let handler = CustomerLoanHandler;
        let item = stocked_item(dec!(10));
        let ret = stock_movement::Model::new(
            &MovementType::Custom(LOAN_RETURN.to_string()),
            item.item_id,
            item.location_id,
            dec!(4),
        );

        let errors = handler.validate(&ret, Some(&item));
        assert!(errors.iter().any(|e| e.contains("reference_id")));
    }
}
