//! Handler registry
//!
//! Maps names to handler descriptors so a binary can pick the consumer to run
//! from its command line. The registry is an ordinary value owned by the
//! caller.
//!
//! ```rust,ignore
//! let mut registry = HandlerRegistry::new();
//! registry.register(
//!     "orders",
//!     HandlerConfig::for_queue_name("orders").with_max_workers(4),
//!     handler_fn(|delivery| async move { HandlerOutcome::Continue }),
//! )?;
//! let descriptor = registry.resolve("orders", ConfigOverrides::default())?;
//! ```

use crate::config::{ConfigOverrides, HandlerConfig};
use crate::descriptor::HandlerDescriptor;
use crate::error::{ConfigError, WorkerError};
use crate::handler::MessageHandler;
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, HandlerDescriptor>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under `name`, replacing any previous registration
    pub fn register(
        &mut self,
        name: impl Into<String>,
        config: HandlerConfig,
        handler: impl MessageHandler + 'static,
    ) -> Result<(), ConfigError> {
        let descriptor = HandlerDescriptor::new(name, config, handler)?;
        self.insert(descriptor);
        Ok(())
    }

    /// Insert a prebuilt descriptor, replacing any previous registration
    pub fn insert(&mut self, descriptor: HandlerDescriptor) {
        let name = descriptor.name().to_string();
        if self.handlers.insert(name.clone(), descriptor).is_some() {
            debug!(handler = %name, "Replaced existing handler registration");
        }
    }

    pub fn get(&self, name: &str) -> Option<&HandlerDescriptor> {
        self.handlers.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut HandlerDescriptor> {
        self.handlers.get_mut(name)
    }

    /// Remove and return the named descriptor
    pub fn take(&mut self, name: &str) -> Result<HandlerDescriptor, WorkerError> {
        self.handlers
            .remove(name)
            .ok_or_else(|| WorkerError::HandlerNotFound(name.to_string()))
    }

    /// Copy of the named descriptor with `overrides` applied
    pub fn resolve(
        &self,
        name: &str,
        overrides: ConfigOverrides,
    ) -> Result<HandlerDescriptor, WorkerError> {
        let mut descriptor = self
            .get(name)
            .cloned()
            .ok_or_else(|| WorkerError::HandlerNotFound(name.to_string()))?;
        descriptor.update(overrides)?;
        Ok(descriptor)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::handler_fn;
    use crate::outcome::HandlerOutcome;

    fn noop() -> impl MessageHandler {
        handler_fn(|_| async { HandlerOutcome::Continue })
    }

    #[test]
    fn test_register_and_lookup() {
        let mut registry = HandlerRegistry::new();
        registry
            .register("orders", HandlerConfig::for_queue_name("orders"), noop())
            .unwrap();
        registry
            .register("billing", HandlerConfig::for_queue_url("http://q/billing"), noop())
            .unwrap();

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.names(), vec!["billing", "orders"]);
        assert_eq!(registry.get("orders").unwrap().name(), "orders");
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn test_register_validates_queue_identity() {
        let mut registry = HandlerRegistry::new();
        let err = registry
            .register("broken", HandlerConfig::default(), noop())
            .unwrap_err();
        assert_eq!(err, ConfigError::MissingQueueIdentity);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_duplicate_registration_overwrites() {
        let mut registry = HandlerRegistry::new();
        registry
            .register("orders", HandlerConfig::for_queue_name("orders"), noop())
            .unwrap();
        registry
            .register(
                "orders",
                HandlerConfig::for_queue_name("orders-v2").with_max_workers(5),
                noop(),
            )
            .unwrap();

        assert_eq!(registry.len(), 1);
        let descriptor = registry.get("orders").unwrap();
        assert_eq!(descriptor.config().queue_name.as_deref(), Some("orders-v2"));
        assert_eq!(descriptor.config().max_workers, 5);
    }

    #[test]
    fn test_resolve_applies_overrides() {
        let mut registry = HandlerRegistry::new();
        registry
            .register("orders", HandlerConfig::for_queue_name("orders"), noop())
            .unwrap();

        let descriptor = registry
            .resolve(
                "orders",
                ConfigOverrides {
                    visibility_timeout: Some(60),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(descriptor.config().visibility_timeout, 60);

        // The registered descriptor is untouched
        assert_eq!(registry.get("orders").unwrap().config().visibility_timeout, 10);
    }

    #[test]
    fn test_take_removes_registration() {
        let mut registry = HandlerRegistry::new();
        registry
            .register("orders", HandlerConfig::for_queue_name("orders"), noop())
            .unwrap();

        let descriptor = registry.take("orders").unwrap();
        assert_eq!(descriptor.name(), "orders");
        assert!(registry.is_empty());
        assert!(matches!(
            registry.take("orders"),
            Err(WorkerError::HandlerNotFound(_))
        ));
    }

    #[test]
    fn test_resolve_unknown_handler() {
        let registry = HandlerRegistry::new();
        let err = registry
            .resolve("nope", ConfigOverrides::default())
            .unwrap_err();
        assert!(matches!(err, WorkerError::HandlerNotFound(name) if name == "nope"));
    }
}
