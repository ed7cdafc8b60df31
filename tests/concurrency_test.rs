mod common;

use proptest::prelude::*;
use proptest::test_runner::TestCaseError;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use stockledger::entities::{MovementStatus, MovementType, ReservationStatus, StockKey};
use stockledger::services::ReservationRequest;

use common::TestContext;

#[tokio::test]
async fn concurrent_receipts_lose_no_updates() {
    let ctx = TestContext::new();
    let item = ctx.item();
    let location = ctx.location();

    let movements = ctx.engine.movements().clone();
    let mut handles = Vec::new();
    for _ in 0..50 {
        let movements = movements.clone();
        handles.push(tokio::spawn(async move {
            let movement = stockledger::entities::stock_movement::Model::new(
                &MovementType::Receipt,
                item,
                location,
                dec!(1),
            );
            movements.process(movement).await.unwrap()
        }));
    }

    for handle in handles {
        let result = handle.await.unwrap();
        assert!(result.success, "errors: {:?}", result.errors);
    }

    let stock = ctx
        .engine
        .stock_items()
        .find_by_key(&StockKey::new(item, location))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stock.quantity, dec!(50));
    assert_eq!(stock.version, 50);
}

#[tokio::test]
async fn concurrent_outbound_never_oversells() {
    let ctx = TestContext::new();
    let item = ctx.item();
    let location = ctx.location();
    ctx.seed_stock(item, location, dec!(10)).await;

    let movements = ctx.engine.movements().clone();
    let mut handles = Vec::new();
    for _ in 0..20 {
        let movements = movements.clone();
        handles.push(tokio::spawn(async move {
            let movement = stockledger::entities::stock_movement::Model::new(
                &MovementType::Shipment,
                item,
                location,
                dec!(1),
            );
            movements.process(movement).await.unwrap()
        }));
    }

    let mut successes = 0;
    for handle in handles {
        if handle.await.unwrap().success {
            successes += 1;
        }
    }
    assert_eq!(successes, 10);

    let stock = ctx
        .engine
        .stock_items()
        .find_by_key(&StockKey::new(item, location))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stock.quantity, dec!(0));
}

#[tokio::test]
async fn concurrent_approvals_win_exactly_once() {
    let ctx = TestContext::new();
    let item = ctx.item();
    let location = ctx.location();
    ctx.seed_stock(item, location, dec!(10)).await;

    let reservation = ctx
        .engine
        .reservations()
        .create_reservation(ReservationRequest::new(item, location, dec!(6)))
        .await
        .unwrap()
        .reservation
        .unwrap();

    let reservations = ctx.engine.reservations().clone();
    let mut handles = Vec::new();
    for _ in 0..8 {
        let reservations = reservations.clone();
        let id = reservation.id;
        handles.push(tokio::spawn(
            async move { reservations.approve_reservation(id).await },
        ));
    }

    let mut successes = 0;
    for handle in handles {
        if handle.await.unwrap().is_ok() {
            successes += 1;
        }
    }
    assert_eq!(successes, 1);

    // The stock is held exactly once.
    let stock = ctx
        .engine
        .stock_items()
        .find_by_key(&StockKey::new(item, location))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stock.reserved_quantity, dec!(6));

    let stored = ctx
        .engine
        .reservations()
        .get_reservation(reservation.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.reservation_status(), Some(ReservationStatus::Active));
}

#[derive(Debug, Clone)]
enum Op {
    Receive(u32),
    Ship(u32),
    Reserve(u32),
    Release(u32),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (1u32..50).prop_map(Op::Receive),
        (1u32..50).prop_map(Op::Ship),
        (1u32..30).prop_map(Op::Reserve),
        (1u32..30).prop_map(Op::Release),
    ]
}

impl Op {
    fn kind(&self) -> MovementType {
        match self {
            Op::Receive(_) => MovementType::Receipt,
            Op::Ship(_) => MovementType::Shipment,
            Op::Reserve(_) => MovementType::Reserve,
            Op::Release(_) => MovementType::Release,
        }
    }

    fn quantity(&self) -> Decimal {
        match self {
            Op::Receive(q) | Op::Ship(q) | Op::Reserve(q) | Op::Release(q) => Decimal::from(*q),
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Replaying only the completed ledger rows reproduces the stored
    /// balance, whatever mix of accepted and rejected movements ran.
    #[test]
    fn ledger_replay_reproduces_balances(ops in proptest::collection::vec(op_strategy(), 1..40)) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let outcome: Result<(), TestCaseError> = runtime.block_on(async move {
            let ctx = TestContext::new();
            let item = ctx.item();
            let location = ctx.location();

            for op in &ops {
                ctx.process(op.kind(), item, location, op.quantity()).await;
            }

            let key = StockKey::new(item, location);
            let stock = ctx.engine.stock_items().find_by_key(&key).await.unwrap();
            let (quantity, reserved) = stock
                .map(|s| (s.quantity, s.reserved_quantity))
                .unwrap_or((Decimal::ZERO, Decimal::ZERO));

            let mut replayed_quantity = Decimal::ZERO;
            let mut replayed_reserved = Decimal::ZERO;
            for movement in ctx.engine.movements().movement_history(&key).await.unwrap() {
                if movement.movement_status() != Some(MovementStatus::Completed) {
                    continue;
                }
                let kind = movement.movement_kind().unwrap();
                replayed_quantity +=
                    movement.quantity * Decimal::from(kind.quantity_multiplier());
                replayed_reserved +=
                    movement.quantity * Decimal::from(kind.reservation_multiplier());
            }

            prop_assert_eq!(replayed_quantity, quantity);
            prop_assert_eq!(replayed_reserved, reserved);
            // The engine never drove anything negative.
            prop_assert!(quantity >= Decimal::ZERO);
            prop_assert!(reserved >= Decimal::ZERO);
            prop_assert!(reserved <= quantity);
            Ok(())
        });
        outcome?;
    }
}
