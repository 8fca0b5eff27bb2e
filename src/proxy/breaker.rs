// src/proxy/breaker.rs

//! Per-`(serviceId, instanceId)` circuit breaker: `Closed -> Open ->
//! HalfOpen -> Closed` (spec.md section 4.E "Circuit breaker"). Grounded in
//! the teacher's `MasterStatus`/`FailoverState` perceived-health state
//! machine (`core/warden/state.rs`), rebuilt atomic-counter-only per
//! spec.md section 5 ("no locks on the hot path").

use dashmap::DashMap;
use std::sync::atomic::{AtomicI64, AtomicU32, AtomicU8, Ordering};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl From<u8> for BreakerState {
    fn from(value: u8) -> Self {
        match value {
            1 => BreakerState::Open,
            2 => BreakerState::HalfOpen,
            _ => BreakerState::Closed,
        }
    }
}

impl From<BreakerState> for u8 {
    fn from(value: BreakerState) -> Self {
        match value {
            BreakerState::Closed => 0,
            BreakerState::Open => 1,
            BreakerState::HalfOpen => 2,
        }
    }
}

pub struct BreakerConfig {
    pub failure_threshold: u32,
    pub rolling_window: Duration,
    pub cooldown: Duration,
    pub probe_successes: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            rolling_window: Duration::from_secs(30),
            cooldown: Duration::from_secs(30),
            probe_successes: 2,
        }
    }
}

struct BreakerEntry {
    state: AtomicU8,
    failures: AtomicU32,
    probe_successes: AtomicU32,
    window_start_ms: AtomicI64,
    opened_at_ms: AtomicI64,
}

impl BreakerEntry {
    fn new(now_ms: i64) -> Self {
        Self {
            state: AtomicU8::new(BreakerState::Closed.into()),
            failures: AtomicU32::new(0),
            probe_successes: AtomicU32::new(0),
            window_start_ms: AtomicI64::new(now_ms),
            opened_at_ms: AtomicI64::new(0),
        }
    }
}

/// Tracks breaker state for every `(serviceId, instanceId)` pair this node
/// has proxied to.
pub struct CircuitBreakerRegistry {
    config: BreakerConfig,
    entries: DashMap<(String, String), BreakerEntry>,
}

impl CircuitBreakerRegistry {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            entries: DashMap::new(),
        }
    }

    /// Whether this instance may currently be selected by the load
    /// balancer: `Closed` and `HalfOpen` are eligible (a `HalfOpen` probe
    /// still needs to go somewhere), `Open` is filtered out.
    pub fn is_available(&self, service_id: &str, instance_id: &str) -> bool {
        self.transition_if_cooldown_elapsed(service_id, instance_id);
        let key = (service_id.to_string(), instance_id.to_string());
        match self.entries.get(&key) {
            Some(entry) => BreakerState::from(entry.state.load(Ordering::Acquire)) != BreakerState::Open,
            None => true,
        }
    }

    pub fn state(&self, service_id: &str, instance_id: &str) -> BreakerState {
        let key = (service_id.to_string(), instance_id.to_string());
        self.entries
            .get(&key)
            .map(|e| BreakerState::from(e.state.load(Ordering::Acquire)))
            .unwrap_or(BreakerState::Closed)
    }

    pub fn record_success(&self, service_id: &str, instance_id: &str, now_ms: i64) {
        let key = (service_id.to_string(), instance_id.to_string());
        let entry = self
            .entries
            .entry(key)
            .or_insert_with(|| BreakerEntry::new(now_ms));
        match BreakerState::from(entry.state.load(Ordering::Acquire)) {
            BreakerState::Closed => {
                entry.failures.store(0, Ordering::Release);
            }
            BreakerState::HalfOpen => {
                let successes = entry.probe_successes.fetch_add(1, Ordering::AcqRel) + 1;
                if successes >= self.config.probe_successes {
                    entry.state.store(BreakerState::Closed.into(), Ordering::Release);
                    entry.failures.store(0, Ordering::Release);
                    entry.probe_successes.store(0, Ordering::Release);
                }
            }
            BreakerState::Open => {}
        }
    }

    pub fn record_failure(&self, service_id: &str, instance_id: &str, now_ms: i64) {
        let key = (service_id.to_string(), instance_id.to_string());
        let entry = self
            .entries
            .entry(key)
            .or_insert_with(|| BreakerEntry::new(now_ms));
        match BreakerState::from(entry.state.load(Ordering::Acquire)) {
            BreakerState::HalfOpen => {
                self.trip_open(&entry, now_ms);
            }
            BreakerState::Closed => {
                let window_start = entry.window_start_ms.load(Ordering::Acquire);
                if now_ms - window_start > self.config.rolling_window.as_millis() as i64 {
                    entry.window_start_ms.store(now_ms, Ordering::Release);
                    entry.failures.store(1, Ordering::Release);
                } else {
                    let failures = entry.failures.fetch_add(1, Ordering::AcqRel) + 1;
                    if failures >= self.config.failure_threshold {
                        self.trip_open(&entry, now_ms);
                    }
                }
            }
            BreakerState::Open => {}
        }
    }

    fn trip_open(&self, entry: &BreakerEntry, now_ms: i64) {
        entry.state.store(BreakerState::Open.into(), Ordering::Release);
        entry.opened_at_ms.store(now_ms, Ordering::Release);
        entry.probe_successes.store(0, Ordering::Release);
        crate::core::metrics::PrometheusMeter.incr_counter("circuit_breaker_open_total", &[]);
    }

    fn transition_if_cooldown_elapsed(&self, service_id: &str, instance_id: &str) {
        let key = (service_id.to_string(), instance_id.to_string());
        if let Some(entry) = self.entries.get(&key) {
            if BreakerState::from(entry.state.load(Ordering::Acquire)) == BreakerState::Open {
                let opened_at = entry.opened_at_ms.load(Ordering::Acquire);
                let now = crate::eventbus::now_millis();
                if now - opened_at >= self.config.cooldown.as_millis() as i64 {
                    entry.state.store(BreakerState::HalfOpen.into(), Ordering::Release);
                    entry.probe_successes.store(0, Ordering::Release);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> CircuitBreakerRegistry {
        CircuitBreakerRegistry::new(BreakerConfig {
            failure_threshold: 2,
            rolling_window: Duration::from_secs(30),
            cooldown: Duration::from_millis(10),
            probe_successes: 1,
        })
    }

    #[test]
    fn trips_open_after_threshold_failures() {
        let breaker = registry();
        breaker.record_failure("svc", "i1", 0);
        assert!(breaker.is_available("svc", "i1"));
        breaker.record_failure("svc", "i1", 1);
        assert!(!breaker.is_available("svc", "i1"));
        assert_eq!(breaker.state("svc", "i1"), BreakerState::Open);
    }

    #[test]
    fn half_open_failure_returns_to_open() {
        let breaker = registry();
        breaker.record_failure("svc", "i1", 0);
        breaker.record_failure("svc", "i1", 1);
        std::thread::sleep(Duration::from_millis(15));
        assert!(breaker.is_available("svc", "i1"));
        assert_eq!(breaker.state("svc", "i1"), BreakerState::HalfOpen);
        breaker.record_failure("svc", "i1", 100);
        assert_eq!(breaker.state("svc", "i1"), BreakerState::Open);
    }

    #[test]
    fn half_open_success_closes_breaker() {
        let breaker = registry();
        breaker.record_failure("svc", "i1", 0);
        breaker.record_failure("svc", "i1", 1);
        std::thread::sleep(Duration::from_millis(15));
        assert!(breaker.is_available("svc", "i1"));
        breaker.record_success("svc", "i1", 100);
        assert_eq!(breaker.state("svc", "i1"), BreakerState::Closed);
    }
}
