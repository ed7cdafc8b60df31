use crate::entities::{stock_item, stock_movement};
use crate::services::movement_handlers::MovementHandler;

pub const CONSIGNMENT: &str = "consignment";
pub const CONSIGNMENT_RETURN: &str = "consignment_return";

/// Consignment stock received from a supplier and later returned unsold.
///
/// Receipt requires a `supplier_id` in meta; the unsold return checks that
/// enough unreserved stock remains to hand back.
pub struct ConsignmentHandler;

impl MovementHandler for ConsignmentHandler {
    fn reference_types(&self) -> &'static [&'static str] {
        &[CONSIGNMENT, CONSIGNMENT_RETURN]
    }

    fn validate(
        &self,
        movement: &stock_movement::Model,
        stock_item: Option<&stock_item::Model>,
    ) -> Vec<String> {
        let mut errors = Vec::new();
        match movement.reference_type.as_deref() {
            Some(CONSIGNMENT) => {
                let has_supplier = movement
                    .meta
                    .as_ref()
                    .and_then(|meta| meta.get("supplier_id"))
                    .map(|v| !v.is_null())
                    .unwrap_or(false);
                if !has_supplier {
                    errors.push("consignment receipt requires supplier_id in meta".to_string());
                }
            }
            Some(CONSIGNMENT_RETURN) => match stock_item {
                Some(item) if item.has_available(movement.quantity) => {}
                Some(_) => errors.push(format!(
                    "insufficient available stock to return {} to consignor",
                    movement.quantity
                )),
                None => errors.push("no consignment stock on hand to return".to_string()),
            },
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
            Some(CONSIGNMENT) => stock_item.adjust_quantity(movement.quantity),
            Some(CONSIGNMENT_RETURN) => stock_item.adjust_quantity(-movement.quantity),
            _ => stock_item,
        }
    }

    fn adds_stock(&self, reference_type: &str) -> bool {
        reference_type == CONSIGNMENT
    }

    fn describe(&self) -> &str {
        "consignment receipt and unsold return"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{MovementType, StockKey};
    use rust_decimal_macros::dec;
    use serde_json::json;
    use uuid::Uuid;

    #[test]
    fn receipt_requires_supplier_and_adds_stock() {
        let handler = ConsignmentHandler;
        let key = StockKey::new(Uuid::new_v4(), Uuid::new_v4());
        let item = stock_item::Model::new_empty(&key);
        let movement = stock_movement::Model::new(
            &MovementType::Custom(CONSIGNMENT.to_string()),
            key.item_id,
            key.location_id,
            dec!(20),
        );

        assert!(!handler.validate(&movement, None).is_empty());

        let movement = movement.with_meta(json!({ "supplier_id": Uuid::new_v4() }));
        assert!(handler.validate(&movement, None).is_empty());
        assert!(handler.adds_stock(CONSIGNMENT));

        let after = handler.apply(&movement, item);
        assert_eq!(after.quantity, dec!(20));
    }

    #[test]
    fn return_is_capped_by_available_stock() {
        let handler = ConsignmentHandler;
        let key = StockKey::new(Uuid::new_v4(), Uuid::new_v4());
        let item = stock_item::Model::new_empty(&key)
            .with_quantity(dec!(10))
            .with_reserved_quantity(dec!(8));
        let movement = stock_movement::Model::new(
            &MovementType::Custom(CONSIGNMENT_RETURN.to_string()),
            key.item_id,
            key.location_id,
            dec!(5),
        );

        let errors = handler.validate(&movement, Some(&item));
        assert!(errors.iter().any(|e| e.contains("insufficient")));

        let smaller = stock_movement::Model::new(
            &MovementType::Custom(CONSIGNMENT_RETURN.to_string()),
            key.item_id,
            key.location_id,
            dec!(2),
        );
        assert!(handler.validate(&smaller, Some(&item)).is_empty());
        let after = handler.apply(&smaller, item);
        assert_eq!(after.quantity, dec!(8));
    }
}
