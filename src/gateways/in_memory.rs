use async_trait::async_trait;
use dashmap::DashMap;
use uuid::Uuid;

use crate::errors::ServiceError;

use super::{CatalogGateway, CatalogItem, LocationGateway};

/// Catalog gateway backed by a map. Used by the test suite and by callers
/// embedding the engine without a real catalog service.
#[derive(Debug, Default)]
pub struct InMemoryCatalogGateway {
    items: DashMap<(Uuid, Option<Uuid>), CatalogItem>,
}

impl InMemoryCatalogGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, workspace_id: Option<Uuid>, item: CatalogItem) {
        self.items.insert((item.id, workspace_id), item);
    }

    pub fn insert_simple(&self, item_id: Uuid, name: impl Into<String>) {
        self.insert(
            None,
            CatalogItem {
                id: item_id,
                name: name.into(),
                sku: None,
                item_type: None,
            },
        );
    }
}

#[async_trait]
impl CatalogGateway for InMemoryCatalogGateway {
    async fn item_exists(
        &self,
        item_id: Uuid,
        workspace_id: Option<Uuid>,
    ) -> Result<bool, ServiceError> {
        Ok(self.items.contains_key(&(item_id, workspace_id)))
    }

    async fn get_item(
        &self,
        item_id: Uuid,
        workspace_id: Option<Uuid>,
    ) -> Result<Option<CatalogItem>, ServiceError> {
        Ok(self
            .items
            .get(&(item_id, workspace_id))
            .map(|entry| entry.value().clone()))
    }

    async fn search_items(
        &self,
        term: &str,
        limit: usize,
        workspace_id: Option<Uuid>,
    ) -> Result<Vec<CatalogItem>, ServiceError> {
        let needle = term.to_lowercase();
        Ok(self
            .items
            .iter()
            .filter(|entry| entry.key().1 == workspace_id)
            .map(|entry| entry.value().clone())
            .filter(|item| {
                item.name.to_lowercase().contains(&needle)
                    || item
                        .sku
                        .as_ref()
                        .map(|sku| sku.to_lowercase().contains(&needle))
                        .unwrap_or(false)
            })
            .take(limit)
            .collect())
    }
}

/// Location gateway backed by maps. Parent/child edges are registered
/// explicitly; a location is known once added via `add_location` or named
/// as a parent or child.
#[derive(Debug, Default)]
pub struct InMemoryLocationGateway {
    known: DashMap<Uuid, Option<String>>,
    parents: DashMap<Uuid, Uuid>,
    children: DashMap<Uuid, Vec<Uuid>>,
}

impl InMemoryLocationGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_location(&self, location_id: Uuid) {
        self.known.entry(location_id).or_insert(None);
    }

    pub fn add_typed_location(&self, location_id: Uuid, location_type: impl Into<String>) {
        self.known.insert(location_id, Some(location_type.into()));
    }

    pub fn add_child(&self, parent_id: Uuid, child_id: Uuid) {
        self.add_location(parent_id);
        self.add_location(child_id);
        self.parents.insert(child_id, parent_id);
        self.children.entry(parent_id).or_default().push(child_id);
    }
}

#[async_trait]
impl LocationGateway for InMemoryLocationGateway {
    async fn exists(&self, location_id: Uuid) -> Result<bool, ServiceError> {
        Ok(self.known.contains_key(&location_id))
    }

    async fn parent_id(&self, location_id: Uuid) -> Result<Option<Uuid>, ServiceError> {
        Ok(self.parents.get(&location_id).map(|entry| *entry.value()))
    }

    async fn children_ids(&self, location_id: Uuid) -> Result<Vec<Uuid>, ServiceError> {
        Ok(self
            .children
            .get(&location_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default())
    }

    async fn location_type(&self, location_id: Uuid) -> Result<Option<String>, ServiceError> {
        Ok(self
            .known
            .get(&location_id)
            .and_then(|entry| entry.value().clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn locations_become_known_through_edges() {
        let gateway = InMemoryLocationGateway::new();
        let parent = Uuid::new_v4();
        let child = Uuid::new_v4();
        gateway.add_child(parent, child);

        assert!(gateway.exists(parent).await.unwrap());
        assert!(gateway.exists(child).await.unwrap());
        assert!(!gateway.exists(Uuid::new_v4()).await.unwrap());
        assert_eq!(gateway.children_ids(parent).await.unwrap(), vec![child]);
        assert!(gateway.children_ids(child).await.unwrap().is_empty());
        assert_eq!(gateway.parent_id(child).await.unwrap(), Some(parent));
        assert_eq!(gateway.parent_id(parent).await.unwrap(), None);
    }

    #[tokio::test]
    async fn catalog_lookup_is_workspace_scoped() {
        let gateway = InMemoryCatalogGateway::new();
        let item_id = Uuid::new_v4();
        let workspace = Some(Uuid::new_v4());
        gateway.insert(
            workspace,
            CatalogItem {
                id: item_id,
                name: "Widget".to_string(),
                sku: Some("WID-1".to_string()),
                item_type: Some("general".to_string()),
            },
        );

        assert!(gateway.item_exists(item_id, workspace).await.unwrap());
        assert!(!gateway.item_exists(item_id, None).await.unwrap());
    }
}
