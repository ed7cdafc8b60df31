#![allow(dead_code)]

use std::sync::Arc;

use rust_decimal::Decimal;
use uuid::Uuid;

use stockledger::config::EngineConfig;
use stockledger::entities::{stock_movement, MovementType};
use stockledger::gateways::{CatalogItem, InMemoryCatalogGateway, InMemoryLocationGateway};
use stockledger::services::ProcessResult;
use stockledger::{StockEngine, StockEngineBuilder};

/// Engine plus handles to the gateways backing it, so tests can register
/// locations and catalog items after construction.
pub struct TestContext {
    pub engine: StockEngine,
    pub locations: Arc<InMemoryLocationGateway>,
    pub catalog: Arc<InMemoryCatalogGateway>,
}

impl TestContext {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let locations = Arc::new(InMemoryLocationGateway::new());
        let catalog = Arc::new(InMemoryCatalogGateway::new());
        let engine = StockEngineBuilder::in_memory()
            .config(config)
            .locations(locations.clone())
            .catalog(catalog.clone())
            .with_builtin_handlers()
            .expect("builtin handlers register cleanly")
            .build();
        Self {
            engine,
            locations,
            catalog,
        }
    }

    /// A registered location with no settings row.
    pub fn location(&self) -> Uuid {
        let id = Uuid::new_v4();
        self.locations.add_location(id);
        id
    }

    /// A catalog item with no type.
    pub fn item(&self) -> Uuid {
        let id = Uuid::new_v4();
        self.catalog.insert_simple(id, format!("item-{id}"));
        id
    }

    pub fn typed_item(&self, item_type: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.catalog.insert(
            None,
            CatalogItem {
                id,
                name: format!("item-{id}"),
                sku: None,
                item_type: Some(item_type.to_string()),
            },
        );
        id
    }

    pub async fn process(
        &self,
        kind: MovementType,
        item_id: Uuid,
        location_id: Uuid,
        quantity: Decimal,
    ) -> ProcessResult {
        let movement = stock_movement::Model::new(&kind, item_id, location_id, quantity);
        self.engine
            .movements()
            .process(movement)
            .await
            .expect("movement processing does not hit infrastructure errors")
    }

    /// Seeds stock through a receipt and asserts it landed.
    pub async fn seed_stock(&self, item_id: Uuid, location_id: Uuid, quantity: Decimal) {
        let result = self
            .process(MovementType::Receipt, item_id, location_id, quantity)
            .await;
        assert!(
            result.success,
            "seeding stock failed: {:?}",
            result.errors
        );
    }
}
