pub mod handlers;
pub mod movement_handlers;
pub mod reservation;
pub mod stock_capacity;
pub mod stock_movement;

pub use movement_handlers::{MovementHandler, MovementHandlerRegistry};
pub use reservation::{
    CleanupResult, CreateReservationOutcome, ReservationRequest, ReservationService,
    ReservationStats, ReservationValidation,
};
pub use stock_capacity::{CapacityCheck, CapacityError, CapacityStats, StockCapacityService};
pub use stock_movement::{ProcessResult, StockMovementService, TransferRequest, TransferResult};
