use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Events emitted by the engine after a state change has been persisted.
///
/// Consumers (projections, webhooks, audit sinks) subscribe via the receiver
/// half of the channel; the engine never blocks on them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    MovementProcessed {
        movement_id: Uuid,
        movement_type: String,
        item_id: Uuid,
        location_id: Uuid,
        delta: Decimal,
        new_balance: Decimal,
    },
    StockItemCreated {
        stock_item_id: Uuid,
        item_id: Uuid,
        location_id: Uuid,
    },
    ReservationCreated {
        reservation_id: Uuid,
        status: String,
    },
    ReservationApproved {
        reservation_id: Uuid,
    },
    ReservationRejected {
        reservation_id: Uuid,
    },
    ReservationReleased {
        reservation_id: Option<Uuid>,
        item_id: Uuid,
        location_id: Uuid,
        quantity: Decimal,
    },
    ReservationExpired {
        reservation_id: Uuid,
    },
    TransferCompensated {
        out_movement_id: Uuid,
        compensation_movement_id: Uuid,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Creates a sender/receiver pair with the given buffer size.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }

    /// Sends an event asynchronously.
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn events_round_trip_through_the_channel() {
        let (sender, mut rx) = EventSender::channel(4);
        let movement_id = Uuid::new_v4();

        sender
            .send(Event::MovementProcessed {
                movement_id,
                movement_type: "receipt".to_string(),
                item_id: Uuid::new_v4(),
                location_id: Uuid::new_v4(),
                delta: dec!(5),
                new_balance: dec!(5),
            })
            .await
            .unwrap();

        match rx.recv().await.unwrap() {
            Event::MovementProcessed { movement_id: id, .. } => assert_eq!(id, movement_id),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn send_fails_when_receiver_is_gone() {
        let (sender, rx) = EventSender::channel(1);
        drop(rx);

        let result = sender
            .send(Event::ReservationApproved {
                reservation_id: Uuid::new_v4(),
            })
            .await;

        assert!(result.is_err());
    }
}
