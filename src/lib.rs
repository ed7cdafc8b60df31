//! Stock movement and reservation engine.
//!
//! An immutable movement ledger drives per-item, per-location, per-lot stock
//! balances, guarded by location capacity rules and a reservation state
//! machine. The engine is storage-agnostic: repositories come in an
//! in-memory flavor for tests and embedding and a sea-orm flavor for SQL.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod config;
pub mod entities;
pub mod errors;
pub mod events;
pub mod gateways;
pub mod migrator;
pub mod repositories;
pub mod services;

use std::sync::Arc;

use sea_orm::DatabaseConnection;
use tokio::sync::mpsc;

use config::EngineConfig;
use errors::ServiceError;
use events::{Event, EventSender};
use gateways::{CatalogGateway, InMemoryLocationGateway, LocationGateway};
use repositories::{
    InMemoryLocationSettingsRepository, InMemoryMovementRepository, InMemoryReservationRepository,
    InMemoryStockItemRepository, LocationSettingsRepository, MovementRepository,
    ReservationRepository, SqlLocationSettingsRepository, SqlMovementRepository,
    SqlReservationRepository, SqlStockItemRepository, StockItemRepository,
};
use services::handlers::{ConsignmentHandler, CustomerLoanHandler};
use services::{
    MovementHandlerRegistry, ReservationService, StockCapacityService, StockMovementService,
};

const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Wires repositories, gateways and services into one engine.
///
/// The builder owns the handler registry until `build`, after which the
/// registered set is fixed.
pub struct StockEngineBuilder {
    config: EngineConfig,
    stock_items: Arc<dyn StockItemRepository>,
    movements: Arc<dyn MovementRepository>,
    reservations: Arc<dyn ReservationRepository>,
    settings: Arc<dyn LocationSettingsRepository>,
    locations: Arc<dyn LocationGateway>,
    catalog: Option<Arc<dyn CatalogGateway>>,
    registry: MovementHandlerRegistry,
    event_sender: Option<EventSender>,
}

impl StockEngineBuilder {
    /// In-memory storage throughout. The returned builder still needs
    /// `build` to produce an engine.
    pub fn in_memory() -> Self {
        Self {
            config: EngineConfig::default(),
            stock_items: Arc::new(InMemoryStockItemRepository::new()),
            movements: Arc::new(InMemoryMovementRepository::new()),
            reservations: Arc::new(InMemoryReservationRepository::new()),
            settings: Arc::new(InMemoryLocationSettingsRepository::new()),
            locations: Arc::new(InMemoryLocationGateway::new()),
            catalog: None,
            registry: MovementHandlerRegistry::new(),
            event_sender: None,
        }
    }

    /// sea-orm storage over an existing connection. Run
    /// `migrator::Migrator` against the connection before building.
    pub fn with_database(db: Arc<DatabaseConnection>) -> Self {
        Self {
            config: EngineConfig::default(),
            stock_items: Arc::new(SqlStockItemRepository::new(db.clone())),
            movements: Arc::new(SqlMovementRepository::new(db.clone())),
            reservations: Arc::new(SqlReservationRepository::new(db.clone())),
            settings: Arc::new(SqlLocationSettingsRepository::new(db)),
            locations: Arc::new(InMemoryLocationGateway::new()),
            catalog: None,
            registry: MovementHandlerRegistry::new(),
            event_sender: None,
        }
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn locations(mut self, locations: Arc<dyn LocationGateway>) -> Self {
        self.locations = locations;
        self
    }

    pub fn catalog(mut self, catalog: Arc<dyn CatalogGateway>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn events(mut self, sender: EventSender) -> Self {
        self.event_sender = Some(sender);
        self
    }

    pub fn register_handler(
        mut self,
        handler: Arc<dyn services::MovementHandler>,
    ) -> Result<Self, ServiceError> {
        self.registry.register(handler)?;
        Ok(self)
    }

    /// Registers the built-in customer loan and consignment handlers.
    pub fn with_builtin_handlers(self) -> Result<Self, ServiceError> {
        self.register_handler(Arc::new(CustomerLoanHandler))?
            .register_handler(Arc::new(ConsignmentHandler))
    }

    pub fn build(self) -> StockEngine {
        let (events, event_receiver) = match self.event_sender {
            Some(sender) => (sender, None),
            None => {
                let (sender, receiver) = EventSender::channel(EVENT_CHANNEL_CAPACITY);
                (sender, Some(receiver))
            }
        };

        let capacity = Arc::new(StockCapacityService::new(
            self.stock_items.clone(),
            self.settings.clone(),
            self.locations.clone(),
            self.catalog.clone(),
        ));

        let movements = Arc::new(StockMovementService::new(
            self.stock_items.clone(),
            self.movements.clone(),
            self.settings.clone(),
            capacity.clone(),
            self.catalog.clone(),
            self.locations.clone(),
            Arc::new(self.registry),
            events.clone(),
            self.config.allow_negative_stock,
        ));

        let reservations = Arc::new(ReservationService::new(
            self.reservations,
            self.stock_items.clone(),
            self.settings.clone(),
            movements.clone(),
            self.catalog,
            self.locations.clone(),
            events.clone(),
            self.config.strict_approval,
            self.config.sweep_batch_size,
            self.config.default_reservation_ttl_secs,
            self.config.allow_negative_stock,
        ));

        StockEngine {
            movements,
            reservations,
            capacity,
            stock_items: self.stock_items,
            settings: self.settings,
            events,
            event_receiver,
        }
    }
}

/// The assembled engine. Services are shared behind `Arc` so callers can
/// hold onto individual services as cheaply as the whole engine.
pub struct StockEngine {
    movements: Arc<StockMovementService>,
    reservations: Arc<ReservationService>,
    capacity: Arc<StockCapacityService>,
    stock_items: Arc<dyn StockItemRepository>,
    settings: Arc<dyn LocationSettingsRepository>,
    events: EventSender,
    event_receiver: Option<mpsc::Receiver<Event>>,
}

impl StockEngine {
    pub fn movements(&self) -> &Arc<StockMovementService> {
        &self.movements
    }

    pub fn reservations(&self) -> &Arc<ReservationService> {
        &self.reservations
    }

    pub fn capacity(&self) -> &Arc<StockCapacityService> {
        &self.capacity
    }

    pub fn stock_items(&self) -> &Arc<dyn StockItemRepository> {
        &self.stock_items
    }

    pub fn location_settings(&self) -> &Arc<dyn LocationSettingsRepository> {
        &self.settings
    }

    pub fn event_sender(&self) -> &EventSender {
        &self.events
    }

    /// The receiver half of the built-in event channel, available once,
    /// and only when the builder created the channel itself.
    pub fn take_event_receiver(&mut self) -> Option<mpsc::Receiver<Event>> {
        self.event_receiver.take()
    }
}
