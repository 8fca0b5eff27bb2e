// src/registry/mod.rs

//! `{service -> instances}` cache, refreshed reactively on `ServiceChanged`
//! events and eagerly on first lookup (spec.md section 4.C).

use crate::core::GatewayError;
use crate::eventbus::EventBus;
use crate::model::{HealthStatus, InstanceStatus, ServiceInstance};
use crate::store::{PageRequest, Store, StoreExt};
use dashmap::DashMap;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

/// An instance is unhealthy once it misses heartbeats for three intervals
/// (spec.md section 4.C).
const HEARTBEAT_MISS_FACTOR: i64 = 3;

#[derive(Clone)]
pub struct ServiceRegistry {
    store: Arc<dyn Store>,
    bus: EventBus,
    tenant_id: String,
    cache: Arc<DashMap<String, Vec<ServiceInstance>>>,
    heartbeat_interval: Duration,
}

impl ServiceRegistry {
    pub fn new(store: Arc<dyn Store>, bus: EventBus, tenant_id: impl Into<String>, heartbeat_interval: Duration) -> Self {
        Self {
            store,
            bus,
            tenant_id: tenant_id.into(),
            cache: Arc::new(DashMap::new()),
            heartbeat_interval,
        }
    }

    /// Returns only eligible instances: `status=up`, `health=healthy`,
    /// `activeFlag=Y` (spec.md section 3 invariant). Populates the cache on
    /// first lookup if it isn't already warm.
    pub async fn resolve(&self, service_id: &str) -> Result<Vec<ServiceInstance>, GatewayError> {
        if self.cache.get(service_id).is_none() {
            self.refresh(service_id).await?;
        }
        let now = crate::eventbus::now_millis();
        let miss_after =
            i64::try_from(self.heartbeat_interval.as_millis()).unwrap_or(i64::MAX) * HEARTBEAT_MISS_FACTOR;
        Ok(self
            .cache
            .get(service_id)
            .map(|entry| {
                entry
                    .iter()
                    .cloned()
                    .map(|mut inst| {
                        if now - inst.last_heartbeat > miss_after {
                            inst.health = HealthStatus::Unhealthy;
                        }
                        inst
                    })
                    .filter(|inst| inst.is_eligible())
                    .collect()
            })
            .unwrap_or_default())
    }

    /// Reloads a service's instance set from the store. Called eagerly on
    /// cache miss and reactively by the `ServiceChanged` event handler.
    pub async fn refresh(&self, service_id: &str) -> Result<(), GatewayError> {
        let page: crate::store::PageResult<ServiceInstance> = self
            .store
            .query(
                crate::model::service::TABLE_INSTANCE,
                &self.tenant_id,
                service_id,
                PageRequest::new(0, usize::MAX / 2),
            )
            .await?;
        let instances: Vec<ServiceInstance> = page
            .items
            .into_iter()
            .filter(|inst| inst.service_id == service_id && inst.audit.active_flag.is_active())
            .collect();
        self.cache.insert(service_id.to_string(), instances);
        Ok(())
    }

    pub async fn heartbeat(&self, service_id: &str, instance_id: &str) -> Result<(), GatewayError> {
        let key = instance_id;
        let mut instance: ServiceInstance = self
            .store
            .query_one(crate::model::service::TABLE_INSTANCE, &self.tenant_id, key)
            .await?;
        instance.last_heartbeat = crate::eventbus::now_millis();
        instance.health = HealthStatus::Healthy;
        self.store
            .update(crate::model::service::TABLE_INSTANCE, &self.tenant_id, key, &instance)
            .await?;
        self.refresh(service_id).await
    }

    /// Persists the instance through `Store` and broadcasts the change via
    /// `EventBus` so peer nodes refresh their own cache reactively instead
    /// of waiting on their next lazy miss (spec.md section 4.C).
    pub async fn register(&self, instance: ServiceInstance) -> Result<(), GatewayError> {
        let service_id = instance.service_id.clone();
        let instance_id = instance.instance_id.clone();
        self.store
            .insert(crate::model::service::TABLE_INSTANCE, &self.tenant_id, &instance_id, &instance)
            .await?;
        self.refresh(&service_id).await?;
        self.bus
            .publish("service_changed", &json!({"serviceId": service_id, "instanceId": instance_id}))
            .await?;
        Ok(())
    }

    pub async fn deregister(&self, service_id: &str, instance_id: &str) -> Result<(), GatewayError> {
        self.store
            .delete(crate::model::service::TABLE_INSTANCE, &self.tenant_id, instance_id)
            .await?;
        self.refresh(service_id).await?;
        self.bus
            .publish("service_changed", &json!({"serviceId": service_id, "instanceId": instance_id}))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AuditFields;
    use crate::store::MemoryStore;

    fn instance(id: &str, svc: &str, status: InstanceStatus, health: HealthStatus, heartbeat: i64) -> ServiceInstance {
        ServiceInstance {
            instance_id: id.to_string(),
            service_id: svc.to_string(),
            host: "10.0.0.1".to_string(),
            port: 8080,
            weight: 1,
            status,
            health,
            last_heartbeat: heartbeat,
            audit: AuditFields::new("t1", "sys", 0),
        }
    }

    #[tokio::test]
    async fn resolve_filters_ineligible_instances() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let bus = EventBus::new(store.clone(), "t1", "node1");
        let registry = ServiceRegistry::new(store, bus, "t1", Duration::from_secs(5));
        registry
            .register(instance("i1", "svc1", InstanceStatus::Up, HealthStatus::Healthy, crate::eventbus::now_millis()))
            .await
            .unwrap();
        registry
            .register(instance("i2", "svc1", InstanceStatus::Down, HealthStatus::Healthy, crate::eventbus::now_millis()))
            .await
            .unwrap();

        let resolved = registry.resolve("svc1").await.unwrap();
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].instance_id, "i1");
    }

    #[tokio::test]
    async fn stale_heartbeat_is_treated_as_unhealthy() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let bus = EventBus::new(store.clone(), "t1", "node1");
        let registry = ServiceRegistry::new(store, bus, "t1", Duration::from_millis(10));
        registry
            .register(instance("i1", "svc1", InstanceStatus::Up, HealthStatus::Healthy, 0))
            .await
            .unwrap();

        let resolved = registry.resolve("svc1").await.unwrap();
        assert!(resolved.is_empty());
    }

    #[tokio::test]
    async fn heartbeat_refreshes_health_and_timestamp() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let bus = EventBus::new(store.clone(), "t1", "node1");
        let registry = ServiceRegistry::new(store, bus, "t1", Duration::from_secs(3600));
        registry
            .register(instance("i1", "svc1", InstanceStatus::Up, HealthStatus::Unhealthy, 0))
            .await
            .unwrap();
        registry.heartbeat("svc1", "i1").await.unwrap();

        let resolved = registry.resolve("svc1").await.unwrap();
        assert_eq!(resolved.len(), 1);
    }

    #[tokio::test]
    async fn register_broadcasts_service_changed_event() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let bus = EventBus::new(store.clone(), "t1", "node1");
        let registry = ServiceRegistry::new(store.clone(), bus, "t1", Duration::from_secs(5));
        registry
            .register(instance("i1", "svc1", InstanceStatus::Up, HealthStatus::Healthy, crate::eventbus::now_millis()))
            .await
            .unwrap();

        let events: crate::store::PageResult<crate::model::ClusterEvent> = store
            .query(crate::model::cluster_event::TABLE_EVENT, "t1", "", PageRequest::new(0, 10))
            .await
            .unwrap();
        assert_eq!(events.total, 1);
        assert_eq!(events.items[0].event_type, "service_changed");
    }

    #[tokio::test]
    async fn deregister_removes_instance_from_cache() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let bus = EventBus::new(store.clone(), "t1", "node1");
        let registry = ServiceRegistry::new(store, bus, "t1", Duration::from_secs(3600));
        registry
            .register(instance("i1", "svc1", InstanceStatus::Up, HealthStatus::Healthy, crate::eventbus::now_millis()))
            .await
            .unwrap();
        registry.deregister("svc1", "i1").await.unwrap();

        let resolved = registry.resolve("svc1").await.unwrap();
        assert!(resolved.is_empty());
    }
}
