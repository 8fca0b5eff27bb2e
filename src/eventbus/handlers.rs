// src/eventbus/handlers.rs

//! Handler registry the poller dispatches each event to, keyed by
//! `eventType` (spec.md section 4.B step 4).

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;

/// A reaction to a cluster event. Implementors reload whatever in-memory
/// materialized view the event type concerns (router table, service
/// instance set, channel manager, ...).
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, payload: &Value) -> Result<(), String>;
}

/// Maps `eventType` to the handler(s) that react to it. A missing handler
/// for an event type is not an error: the event is ACKed `SKIPPED`.
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: Arc<DashMap<String, Vec<Arc<dyn EventHandler>>>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, event_type: impl Into<String>, handler: Arc<dyn EventHandler>) {
        self.handlers
            .entry(event_type.into())
            .or_default()
            .push(handler);
    }

    pub fn handlers_for(&self, event_type: &str) -> Vec<Arc<dyn EventHandler>> {
        self.handlers
            .get(event_type)
            .map(|v| v.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Recorder(std::sync::Arc<std::sync::atomic::AtomicUsize>);

    #[async_trait]
    impl EventHandler for Recorder {
        async fn handle(&self, _payload: &Value) -> Result<(), String> {
            self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn unregistered_event_type_yields_no_handlers() {
        let registry = HandlerRegistry::new();
        assert!(registry.handlers_for("route_changed").is_empty());
    }

    #[tokio::test]
    async fn registered_handler_is_invoked() {
        let registry = HandlerRegistry::new();
        let count = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        registry.register("route_changed", Arc::new(Recorder(count.clone())));
        for handler in registry.handlers_for("route_changed") {
            handler.handle(&Value::Null).await.unwrap();
        }
        assert_eq!(count.load(std::sync::atomic::Ordering::SeqCst), 1);
    }
}
