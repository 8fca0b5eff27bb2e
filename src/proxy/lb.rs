// src/proxy/lb.rs

//! Load-balancer instance selection (spec.md section 4.E "Load balancer").

use crate::model::{LoadBalanceStrategy, ServiceInstance};
use crate::proxy::breaker::CircuitBreakerRegistry;
use dashmap::DashMap;
use rand::Rng;
use std::net::IpAddr;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};

#[derive(Default)]
pub struct LoadBalancer {
    round_robin_counter: AtomicUsize,
    smooth_wrr: DashMap<String, AtomicI64>,
    active_connections: DashMap<String, AtomicUsize>,
}

impl LoadBalancer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Selects one eligible, breaker-available instance. Returns `None`
    /// when the candidate set is empty after filtering — callers map that
    /// to `ServiceUnavailable` or, if every instance is merely `Open`, to
    /// the `521` circuit-breaker-open status.
    pub fn select<'a>(
        &self,
        service_id: &str,
        strategy: LoadBalanceStrategy,
        instances: &'a [ServiceInstance],
        breaker: &CircuitBreakerRegistry,
        client_ip: Option<IpAddr>,
    ) -> Option<&'a ServiceInstance> {
        let available: Vec<&ServiceInstance> = instances
            .iter()
            .filter(|inst| breaker.is_available(service_id, &inst.instance_id))
            .collect();
        if available.is_empty() {
            return None;
        }

        match strategy {
            LoadBalanceStrategy::RoundRobin => {
                let idx = self.round_robin_counter.fetch_add(1, Ordering::Relaxed) % available.len();
                Some(available[idx])
            }
            LoadBalanceStrategy::WeightedRoundRobin => self.smooth_weighted(service_id, &available),
            LoadBalanceStrategy::LeastConnections => available
                .into_iter()
                .min_by_key(|inst| self.connections(&inst.instance_id)),
            LoadBalanceStrategy::Random => {
                let idx = rand::thread_rng().gen_range(0..available.len());
                Some(available[idx])
            }
            LoadBalanceStrategy::IpHash => {
                let hash = client_ip.map(ip_hash).unwrap_or(0);
                Some(available[(hash as usize) % available.len()])
            }
        }
    }

    pub fn on_connection_opened(&self, instance_id: &str) {
        self.active_connections
            .entry(instance_id.to_string())
            .or_default()
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn on_connection_closed(&self, instance_id: &str) {
        if let Some(counter) = self.active_connections.get(instance_id) {
            counter.fetch_sub(1, Ordering::Relaxed);
        }
    }

    fn connections(&self, instance_id: &str) -> usize {
        self.active_connections
            .get(instance_id)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Nginx-style smooth weighted round robin: every instance's current
    /// weight accumulates by its configured weight each pick; the instance
    /// with the highest current weight wins and has the total weight
    /// subtracted back off (spec.md section 4.E).
    fn smooth_weighted<'a>(&self, service_id: &str, available: &[&'a ServiceInstance]) -> Option<&'a ServiceInstance> {
        let total_weight: i64 = available.iter().map(|i| i.weight.max(1) as i64).sum();
        let mut best_idx = 0;
        let mut best_weight = i64::MIN;
        let mut new_weights = Vec::with_capacity(available.len());

        for inst in available {
            let key = format!("{service_id}:{}", inst.instance_id);
            let current = self
                .smooth_wrr
                .entry(key)
                .or_insert_with(|| AtomicI64::new(0));
            let updated = current.fetch_add(inst.weight.max(1) as i64, Ordering::AcqRel) + inst.weight.max(1) as i64;
            new_weights.push(updated);
        }

        for (idx, &weight) in new_weights.iter().enumerate() {
            if weight > best_weight {
                best_weight = weight;
                best_idx = idx;
            }
        }

        let winner = available[best_idx];
        let key = format!("{service_id}:{}", winner.instance_id);
        if let Some(current) = self.smooth_wrr.get(&key) {
            current.fetch_sub(total_weight, Ordering::AcqRel);
        }
        Some(winner)
    }
}

fn ip_hash(ip: IpAddr) -> u64 {
    let bytes = match ip {
        IpAddr::V4(v4) => v4.octets().to_vec(),
        IpAddr::V6(v6) => v6.octets().to_vec(),
    };
    bytes.iter().fold(0u64, |acc, b| acc.wrapping_mul(31).wrapping_add(*b as u64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AuditFields, HealthStatus, InstanceStatus};
    use crate::proxy::breaker::{BreakerConfig, CircuitBreakerRegistry};

    fn instance(id: &str, weight: u32) -> ServiceInstance {
        ServiceInstance {
            instance_id: id.to_string(),
            service_id: "svc".to_string(),
            host: "h".to_string(),
            port: 1,
            weight,
            status: InstanceStatus::Up,
            health: HealthStatus::Healthy,
            last_heartbeat: 0,
            audit: AuditFields::new("t1", "sys", 0),
        }
    }

    #[test]
    fn round_robin_cycles_through_instances() {
        let lb = LoadBalancer::new();
        let breaker = CircuitBreakerRegistry::new(BreakerConfig::default());
        let instances = vec![instance("a", 1), instance("b", 1)];
        let picks: Vec<&str> = (0..4)
            .map(|_| lb.select("svc", LoadBalanceStrategy::RoundRobin, &instances, &breaker, None).unwrap().instance_id.as_str())
            .collect();
        assert_eq!(picks, vec!["a", "b", "a", "b"]);
    }

    #[test]
    fn weighted_round_robin_favors_higher_weight() {
        let lb = LoadBalancer::new();
        let breaker = CircuitBreakerRegistry::new(BreakerConfig::default());
        let instances = vec![instance("a", 3), instance("b", 1)];
        let mut counts = std::collections::HashMap::new();
        for _ in 0..8 {
            let pick = lb.select("svc", LoadBalanceStrategy::WeightedRoundRobin, &instances, &breaker, None).unwrap();
            *counts.entry(pick.instance_id.clone()).or_insert(0) += 1;
        }
        assert_eq!(counts["a"], 6);
        assert_eq!(counts["b"], 2);
    }

    #[test]
    fn no_available_instances_returns_none() {
        let lb = LoadBalancer::new();
        let breaker = CircuitBreakerRegistry::new(BreakerConfig {
            failure_threshold: 1,
            ..BreakerConfig::default()
        });
        breaker.record_failure("svc", "a", 0);
        let instances = vec![instance("a", 1)];
        assert!(lb
            .select("svc", LoadBalanceStrategy::RoundRobin, &instances, &breaker, None)
            .is_none());
    }

    #[test]
    fn ip_hash_is_stable_for_same_client() {
        let lb = LoadBalancer::new();
        let breaker = CircuitBreakerRegistry::new(BreakerConfig::default());
        let instances = vec![instance("a", 1), instance("b", 1), instance("c", 1)];
        let ip: IpAddr = "10.0.0.5".parse().unwrap();
        let first = lb.select("svc", LoadBalanceStrategy::IpHash, &instances, &breaker, Some(ip)).unwrap().instance_id.clone();
        let second = lb.select("svc", LoadBalanceStrategy::IpHash, &instances, &breaker, Some(ip)).unwrap().instance_id.clone();
        assert_eq!(first, second);
    }
}
