mod common;

use std::sync::Arc;

use assert_matches::assert_matches;
use rust_decimal_macros::dec;
use serde_json::json;
use uuid::Uuid;

use stockledger::entities::{stock_item, stock_movement, MovementStatus, MovementType, StockKey};
use stockledger::errors::ServiceError;
use stockledger::gateways::InMemoryLocationGateway;
use stockledger::services::handlers::CustomerLoanHandler;
use stockledger::services::MovementHandler;
use stockledger::StockEngineBuilder;

use common::TestContext;

fn loan_kind() -> MovementType {
    MovementType::Custom("customer_loan".to_string())
}

fn loan_return_kind() -> MovementType {
    MovementType::Custom("loan_return".to_string())
}

#[tokio::test]
async fn customer_loan_round_trip() {
    let ctx = TestContext::new();
    let item = ctx.item();
    let location = ctx.location();
    ctx.seed_stock(item, location, dec!(10)).await;

    let loan = stock_movement::Model::new(&loan_kind(), item, location, dec!(4))
        .with_meta(json!({ "customer_id": Uuid::new_v4() }));
    let loan_id = loan.id;
    let result = ctx.engine.movements().process(loan).await.unwrap();
    assert!(result.success, "errors: {:?}", result.errors);
    assert_eq!(result.new_balance, dec!(6));

    let ret = stock_movement::Model::new(&loan_return_kind(), item, location, dec!(4))
        .with_reference("loan_return", loan_id);
    let result = ctx.engine.movements().process(ret).await.unwrap();
    assert!(result.success, "errors: {:?}", result.errors);
    assert_eq!(result.new_balance, dec!(10));
}

#[tokio::test]
async fn loan_without_customer_id_is_rejected() {
    let ctx = TestContext::new();
    let item = ctx.item();
    let location = ctx.location();
    ctx.seed_stock(item, location, dec!(10)).await;

    let loan = stock_movement::Model::new(&loan_kind(), item, location, dec!(4));
    let result = ctx.engine.movements().process(loan).await.unwrap();

    assert!(!result.success);
    assert!(result.errors.iter().any(|e| e.contains("customer_id")));
    assert_eq!(
        result.movement.movement_status(),
        Some(MovementStatus::Failed)
    );

    let stock = ctx
        .engine
        .stock_items()
        .find_by_key(&StockKey::new(item, location))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stock.quantity, dec!(10));
}

#[tokio::test]
async fn loan_return_can_bootstrap_a_balance_row() {
    let ctx = TestContext::new();
    let item = ctx.item();
    let location = ctx.location();

    // Stock returns to a location that never held this item.
    let ret = stock_movement::Model::new(&loan_return_kind(), item, location, dec!(2))
        .with_reference("loan_return", Uuid::new_v4());
    let result = ctx.engine.movements().process(ret).await.unwrap();

    assert!(result.success, "errors: {:?}", result.errors);
    assert_eq!(result.new_balance, dec!(2));
}

#[tokio::test]
async fn consignment_receipt_and_return() {
    let ctx = TestContext::new();
    let item = ctx.item();
    let location = ctx.location();

    let receipt = stock_movement::Model::new(
        &MovementType::Custom("consignment".to_string()),
        item,
        location,
        dec!(30),
    )
    .with_meta(json!({ "supplier_id": Uuid::new_v4() }));
    let result = ctx.engine.movements().process(receipt).await.unwrap();
    assert!(result.success, "errors: {:?}", result.errors);
    assert_eq!(result.new_balance, dec!(30));

    let ret = stock_movement::Model::new(
        &MovementType::Custom("consignment_return".to_string()),
        item,
        location,
        dec!(12),
    );
    let result = ctx.engine.movements().process(ret).await.unwrap();
    assert!(result.success, "errors: {:?}", result.errors);
    assert_eq!(result.new_balance, dec!(18));
}

#[tokio::test]
async fn unregistered_handler_key_fails_the_movement() {
    let ctx = TestContext::new();
    let item = ctx.item();
    let location = ctx.location();
    ctx.seed_stock(item, location, dec!(10)).await;

    let movement = stock_movement::Model::new(
        &MovementType::Custom("warranty_swap".to_string()),
        item,
        location,
        dec!(1),
    );
    let result = ctx.engine.movements().process(movement).await.unwrap();

    assert!(!result.success);
    assert!(result
        .errors
        .iter()
        .any(|e| e.contains("no movement handler registered")));
}

#[tokio::test]
async fn duplicate_handler_registration_is_a_configuration_error() {
    let result = StockEngineBuilder::in_memory()
        .with_builtin_handlers()
        .unwrap()
        .register_handler(Arc::new(CustomerLoanHandler))
        .map(|_| ());

    assert_matches!(result, Err(ServiceError::Configuration(_)));
}

#[tokio::test]
async fn custom_movements_replay_like_builtin_ones() {
    let ctx = TestContext::new();
    let item = ctx.item();
    let location = ctx.location();
    ctx.seed_stock(item, location, dec!(10)).await;

    let loan = stock_movement::Model::new(&loan_kind(), item, location, dec!(4))
        .with_meta(json!({ "customer_id": Uuid::new_v4() }));
    assert!(ctx.engine.movements().process(loan).await.unwrap().success);

    let history = ctx
        .engine
        .movements()
        .movement_history(&StockKey::new(item, location))
        .await
        .unwrap();
    let custom = history
        .iter()
        .find(|m| m.movement_type == "custom")
        .unwrap();
    // The handler key survives in the ledger row.
    assert_eq!(custom.reference_type.as_deref(), Some("customer_loan"));
    assert_eq!(
        custom.movement_kind(),
        Some(MovementType::Custom("customer_loan".to_string()))
    );
    assert_eq!(custom.balance_after, Some(dec!(6)));
}

struct UncheckedWriteOff;

impl MovementHandler for UncheckedWriteOff {
    fn reference_types(&self) -> &'static [&'static str] {
        &["unchecked_write_off"]
    }

    fn validate(
        &self,
        _movement: &stock_movement::Model,
        _stock_item: Option<&stock_item::Model>,
    ) -> Vec<String> {
        Vec::new()
    }

    fn apply(
        &self,
        movement: &stock_movement::Model,
        stock_item: stock_item::Model,
    ) -> stock_item::Model {
        stock_item.adjust_quantity(-movement.quantity)
    }

    fn adds_stock(&self, _reference_type: &str) -> bool {
        false
    }

    fn describe(&self) -> &str {
        "write-off that skips availability checks"
    }
}

#[tokio::test]
async fn negative_guard_reports_the_unchanged_balance() {
    let locations = Arc::new(InMemoryLocationGateway::new());
    let engine = StockEngineBuilder::in_memory()
        .locations(locations.clone())
        .register_handler(Arc::new(UncheckedWriteOff))
        .unwrap()
        .build();

    let item = Uuid::new_v4();
    let location = Uuid::new_v4();
    locations.add_location(location);

    let receipt = stock_movement::Model::new(&MovementType::Receipt, item, location, dec!(5));
    assert!(engine.movements().process(receipt).await.unwrap().success);

    // The handler validates nothing, so the final guard must catch the
    // negative balance and report the row as it still stands.
    let movement = stock_movement::Model::new(
        &MovementType::Custom("unchecked_write_off".to_string()),
        item,
        location,
        dec!(10),
    );
    let result = engine.movements().process(movement).await.unwrap();

    assert!(!result.success);
    assert!(result.errors.iter().any(|e| e.contains("negative")));
    let stock = result.stock_item.expect("existing balance is reported");
    assert_eq!(stock.quantity, dec!(5));
}
