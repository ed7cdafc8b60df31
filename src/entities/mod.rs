pub mod location_stock_settings;
pub mod stock_item;
pub mod stock_movement;
pub mod stock_reservation;

pub use location_stock_settings::Model as LocationStockSettings;
pub use stock_item::{Model as StockItem, StockKey};
pub use stock_movement::{Model as StockMovement, MovementStatus, MovementType};
pub use stock_reservation::{Model as StockReservation, ReservationStatus};
