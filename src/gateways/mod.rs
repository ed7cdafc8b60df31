pub mod in_memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::ServiceError;

pub use in_memory::{InMemoryCatalogGateway, InMemoryLocationGateway};

/// Catalog item summary as seen from the engine. The catalog subsystem
/// itself lives outside the crate; the engine only reads through this
/// gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogItem {
    pub id: Uuid,
    pub name: String,
    pub sku: Option<String>,
    pub item_type: Option<String>,
}

/// Read-only access to the catalog. Optional: an engine built without a
/// catalog gateway skips item-existence checks.
#[async_trait]
pub trait CatalogGateway: Send + Sync {
    async fn item_exists(&self, item_id: Uuid, workspace_id: Option<Uuid>)
        -> Result<bool, ServiceError>;

    async fn get_item(
        &self,
        item_id: Uuid,
        workspace_id: Option<Uuid>,
    ) -> Result<Option<CatalogItem>, ServiceError>;

    /// Name/SKU search for response enrichment. Not used by the balance
    /// arithmetic.
    async fn search_items(
        &self,
        term: &str,
        limit: usize,
        workspace_id: Option<Uuid>,
    ) -> Result<Vec<CatalogItem>, ServiceError>;
}

/// Read-only access to the location hierarchy. The engine never mutates
/// locations; it only checks existence and walks children for capacity
/// aggregation.
#[async_trait]
pub trait LocationGateway: Send + Sync {
    async fn exists(&self, location_id: Uuid) -> Result<bool, ServiceError>;

    async fn parent_id(&self, location_id: Uuid) -> Result<Option<Uuid>, ServiceError>;

    /// Direct children only. Descendant traversal is done by the caller so
    /// cycle protection does not depend on the gateway implementation.
    async fn children_ids(&self, location_id: Uuid) -> Result<Vec<Uuid>, ServiceError>;

    async fn location_type(&self, location_id: Uuid) -> Result<Option<String>, ServiceError>;
}
