//! The seam between the registry and whatever actually stores registrations.

use async_trait::async_trait;
use std::time::Duration;

use crate::core::error::GatewayResult;
use crate::core::types::{HealthStatus, Registration, ServiceInstance};

/// Result of a (possibly blocking) health query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthSnapshot {
    /// Backend index the snapshot was taken at; pass it back to block for the next change
    pub index: u64,

    /// Passing instances at that index
    pub instances: Vec<ServiceInstance>,
}

/// Operations the registry needs from a discovery backend
///
/// Implementations exist for the Consul agent HTTP API and for an in-process registry
/// used by tests and local runs.
#[async_trait]
pub trait DiscoveryBackend: Send + Sync {
    /// Register an instance together with its TTL check
    async fn register(&self, registration: &Registration) -> GatewayResult<()>;

    /// Remove an instance registration
    async fn deregister(&self, instance_id: &str) -> GatewayResult<()>;

    /// Passing instances of a logical service
    async fn healthy_instances(&self, service: &str) -> GatewayResult<Vec<ServiceInstance>>;

    /// Block until the passing set of `service` changes past `last_index`, or `wait` elapses
    ///
    /// `last_index == 0` returns the current state immediately.
    async fn watch_healthy(
        &self,
        service: &str,
        last_index: u64,
        wait: Duration,
    ) -> GatewayResult<HealthSnapshot>;

    /// Report the status of a TTL check
    async fn update_ttl(&self, check_id: &str, status: HealthStatus, output: &str) -> GatewayResult<()>;

    /// Backend name for logs
    fn name(&self) -> &'static str;
}
