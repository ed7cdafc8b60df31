use std::collections::HashMap;
use std::sync::Arc;

use crate::entities::{stock_item, stock_movement};
use crate::errors::ServiceError;

/// Domain logic for a custom movement kind.
///
/// A handler owns one or more handler keys (stored in the movement's
/// `reference_type` column). `validate` collects every problem with the
/// proposed movement; `apply` is only called when validation passed and
/// returns the updated balance. Handlers must be pure over their inputs so
/// replaying a ledger through them is deterministic.
pub trait MovementHandler: Send + Sync {
    /// Handler keys this handler is registered under.
    fn reference_types(&self) -> &'static [&'static str];

    /// Collects validation errors. Empty means the movement may proceed.
    /// `stock_item` is None when no balance exists for the movement's key.
    fn validate(
        &self,
        movement: &stock_movement::Model,
        stock_item: Option<&stock_item::Model>,
    ) -> Vec<String>;

    /// Returns the balance after the movement. Never persists anything.
    fn apply(
        &self,
        movement: &stock_movement::Model,
        stock_item: stock_item::Model,
    ) -> stock_item::Model;

    /// Whether this handler key brings stock in (so a missing balance row
    /// may be created for it, like the built-in inbound kinds).
    fn adds_stock(&self, reference_type: &str) -> bool;

    fn describe(&self) -> &str;
}

/// Registry mapping handler keys to handlers. Built once at engine
/// construction; duplicate keys are a configuration error, not a warning.
#[derive(Default)]
pub struct MovementHandlerRegistry {
    handlers: HashMap<String, Arc<dyn MovementHandler>>,
}

impl MovementHandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, handler: Arc<dyn MovementHandler>) -> Result<(), ServiceError> {
        for key in handler.reference_types() {
            if self.handlers.contains_key(*key) {
                return Err(ServiceError::Configuration(format!(
                    "movement handler key '{}' is already registered",
                    key
                )));
            }
            self.handlers.insert((*key).to_string(), handler.clone());
        }
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&Arc<dyn MovementHandler>> {
        self.handlers.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    struct NoopHandler(&'static [&'static str]);

    impl MovementHandler for NoopHandler {
        fn reference_types(&self) -> &'static [&'static str] {
            self.0
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
            _movement: &stock_movement::Model,
            stock_item: stock_item::Model,
        ) -> stock_item::Model {
            stock_item
        }

        fn adds_stock(&self, _reference_type: &str) -> bool {
            false
        }

        fn describe(&self) -> &str {
            "noop"
        }
    }

    #[test]
    fn duplicate_keys_are_a_configuration_error() {
        let mut registry = MovementHandlerRegistry::new();
        registry.register(Arc::new(NoopHandler(&["loan"]))).unwrap();

        let result = registry.register(Arc::new(NoopHandler(&["loan", "other"])));
        assert_matches!(result, Err(ServiceError::Configuration(_)));
    }

    #[test]
    fn one_handler_can_own_several_keys() {
        let mut registry = MovementHandlerRegistry::new();
        registry
            .register(Arc::new(NoopHandler(&["loan", "loan_return"])))
            .unwrap();

        assert!(registry.get("loan").is_some());
        assert!(registry.get("loan_return").is_some());
        assert!(registry.get("missing").is_none());
    }
}
