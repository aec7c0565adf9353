//! In-process discovery backend
//!
//! Keeps registrations, TTL check states and statically configured peers in memory. A passing
//! check that goes longer than its TTL without an update reads as critical. Used
//! for local runs without a Consul agent and by the test suite, which can also flip the
//! backend into an "unavailable" state to simulate a registry outage.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::debug;

use super::backend::{DiscoveryBackend, HealthSnapshot};
use crate::core::error::{GatewayError, GatewayResult};
use crate::core::types::{HealthStatus, Registration, ServiceInstance};

#[derive(Debug, Clone)]
struct CheckState {
    instance_id: String,
    status: HealthStatus,
    ttl: Duration,
    last_update: Option<Instant>,
    updates: u64,
}

impl CheckState {
    /// Reported status, downgraded to critical once the TTL runs out without an update
    fn current_status(&self) -> HealthStatus {
        match self.last_update {
            Some(at) if self.status == HealthStatus::Passing && at.elapsed() > self.ttl => HealthStatus::Critical,
            _ => self.status,
        }
    }
}

/// Discovery backend kept entirely in memory
pub struct StaticBackend {
    registrations: DashMap<String, Registration>,
    checks: DashMap<String, CheckState>,
    peers: DashMap<String, ServiceInstance>,
    available: AtomicBool,
    version: watch::Sender<u64>,
}

impl StaticBackend {
    pub fn new() -> Self {
        let (version, _) = watch::channel(1);
        Self {
            registrations: DashMap::new(),
            checks: DashMap::new(),
            peers: DashMap::new(),
            available: AtomicBool::new(true),
            version,
        }
    }

    /// Add a peer instance that needs no heartbeat
    pub fn add_instance(&self, instance: ServiceInstance) {
        debug!(instance_id = %instance.id, service = %instance.name, "Adding static instance");
        self.peers.insert(instance.id.clone(), instance);
        self.bump();
    }

    pub fn remove_instance(&self, instance_id: &str) -> Option<ServiceInstance> {
        let removed = self.peers.remove(instance_id).map(|(_, instance)| instance);
        if removed.is_some() {
            self.bump();
        }
        removed
    }

    /// Simulate the registry becoming reachable or unreachable
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Registration stored under `instance_id`, if any
    pub fn registration(&self, instance_id: &str) -> Option<Registration> {
        self.registrations.get(instance_id).map(|entry| entry.clone())
    }

    /// Current status of a TTL check
    pub fn check_status(&self, check_id: &str) -> Option<HealthStatus> {
        self.checks.get(check_id).map(|state| state.current_status())
    }

    /// Number of TTL updates received for a check
    pub fn ttl_updates(&self, check_id: &str) -> u64 {
        self.checks.get(check_id).map(|state| state.updates).unwrap_or(0)
    }

    pub fn registered_ids(&self) -> Vec<String> {
        self.registrations.iter().map(|entry| entry.key().clone()).collect()
    }

    fn bump(&self) {
        self.version.send_modify(|version| *version += 1);
    }

    fn ensure_available(&self) -> GatewayResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(GatewayError::service_discovery("static registry is unavailable"))
        }
    }

    fn passing_instances(&self, service: &str) -> Vec<ServiceInstance> {
        let mut instances: Vec<ServiceInstance> = self
            .peers
            .iter()
            .filter(|entry| entry.name == service && entry.is_passing())
            .map(|entry| entry.value().clone())
            .collect();

        for entry in self.registrations.iter() {
            if entry.name != service {
                continue;
            }
            let status = self
                .checks
                .get(&entry.check.check_id)
                .map(|state| state.current_status())
                .unwrap_or(HealthStatus::Critical);
            if status == HealthStatus::Passing {
                instances.push(entry.as_instance(status));
            }
        }

        instances.sort_by(|a, b| a.id.cmp(&b.id));
        instances
    }
}

impl Default for StaticBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DiscoveryBackend for StaticBackend {
    async fn register(&self, registration: &Registration) -> GatewayResult<()> {
        self.ensure_available()?;

        // A fresh registration stays critical until the first TTL update arrives
        self.checks.insert(
            registration.check.check_id.clone(),
            CheckState {
                instance_id: registration.id.clone(),
                status: HealthStatus::Critical,
                ttl: registration.check.ttl,
                last_update: None,
                updates: 0,
            },
        );
        self.registrations
            .insert(registration.id.clone(), registration.clone());
        self.bump();
        Ok(())
    }

    async fn deregister(&self, instance_id: &str) -> GatewayResult<()> {
        self.ensure_available()?;

        if self.registrations.remove(instance_id).is_some() {
            self.checks.retain(|_, state| state.instance_id != instance_id);
            self.bump();
        }
        Ok(())
    }

    async fn healthy_instances(&self, service: &str) -> GatewayResult<Vec<ServiceInstance>> {
        self.ensure_available()?;
        Ok(self.passing_instances(service))
    }

    async fn watch_healthy(
        &self,
        service: &str,
        last_index: u64,
        wait: Duration,
    ) -> GatewayResult<HealthSnapshot> {
        self.ensure_available()?;

        let mut receiver = self.version.subscribe();
        let current = *receiver.borrow_and_update();

        if last_index == 0 || current != last_index {
            return Ok(HealthSnapshot {
                index: current,
                instances: self.passing_instances(service),
            });
        }

        // Timing out without a change is a normal blocking-query outcome
        let _ = tokio::time::timeout(wait, receiver.changed()).await;
        self.ensure_available()?;

        let index = *receiver.borrow();
        Ok(HealthSnapshot {
            index,
            instances: self.passing_instances(service),
        })
    }

    async fn update_ttl(&self, check_id: &str, status: HealthStatus, _output: &str) -> GatewayResult<()> {
        self.ensure_available()?;

        let changed = {
            let mut state = self.checks.get_mut(check_id).ok_or_else(|| {
                GatewayError::service_discovery(format!("unknown check '{}'", check_id))
            })?;
            state.updates += 1;
            let changed = state.current_status() != status;
            state.status = status;
            state.last_update = Some(Instant::now());
            changed
        };

        if changed {
            self.bump();
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "static"
    }
}
