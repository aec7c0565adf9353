//! # Service Registry
//!
//! Owns this process's registration and resolves peers by logical name.
//!
//! ## Key Features
//!
//! - **Self-registration** with a TTL health check and a background heartbeat
//! - **Liveness signal**: heartbeat failures are reported through [`RegistrationHandle`]
//!   instead of terminating the process
//! - **Per-call discovery**: every [`ServiceRegistry::discover`] re-resolves against the backend
//! - **Membership watch** driven by blocking queries, for logging only
//!
//! ## Rust Concepts Used
//!
//! - `Arc<Self>` receivers so background tasks can hold the registry
//! - `tokio::sync::watch` to publish the liveness state to any number of waiters
//! - `CancellationToken` child tokens so every background task stops on shutdown

use metrics::counter;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::backend::DiscoveryBackend;
use crate::core::config::{CheckIdPolicy, RegistryConfig};
use crate::core::error::{GatewayError, GatewayResult};
use crate::core::types::{CheckDefinition, HealthStatus, Registration, ServiceInstance};
use crate::load_balancing::{build_selector, InstanceSelector};

/// Output attached to every passing TTL update
const HEARTBEAT_OUTPUT: &str = "online";

const DEFAULT_WATCH_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Liveness of this process's registration
#[derive(Debug, Clone)]
pub enum Liveness {
    Alive,
    /// The heartbeat failed; the registry will mark the instance critical once the TTL expires
    Lost(GatewayError),
}

/// Membership change of a watched service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceChange {
    pub service: String,
    pub joined: Vec<ServiceInstance>,
    pub left: Vec<ServiceInstance>,
    /// Passing members after the change
    pub members: Vec<ServiceInstance>,
}

/// Registration and discovery against a [`DiscoveryBackend`]
pub struct ServiceRegistry {
    backend: Arc<dyn DiscoveryBackend>,
    selector: Box<dyn InstanceSelector>,
    config: RegistryConfig,
    active: Mutex<Option<Registration>>,
    shutdown: CancellationToken,
    watch_retry_delay: Duration,
}

impl ServiceRegistry {
    pub fn new(backend: Arc<dyn DiscoveryBackend>, config: RegistryConfig) -> Self {
        let selector = build_selector(config.selection);
        info!(
            backend = backend.name(),
            selection = selector.name(),
            check_id_policy = ?config.check_id_policy,
            "Service registry created"
        );

        Self {
            backend,
            selector,
            config,
            active: Mutex::new(None),
            shutdown: CancellationToken::new(),
            watch_retry_delay: DEFAULT_WATCH_RETRY_DELAY,
        }
    }

    /// Delay before a failed watch query is retried
    pub fn with_watch_retry_delay(mut self, delay: Duration) -> Self {
        self.watch_retry_delay = delay;
        self
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    pub fn backend(&self) -> &Arc<dyn DiscoveryBackend> {
        &self.backend
    }

    /// The registration currently held by this process, if any
    pub fn active_registration(&self) -> Option<Registration> {
        self.active.lock().clone()
    }

    /// Build a registration record with a fresh instance id
    pub fn build_registration(&self, name: &str, address: &str, port: u16) -> Registration {
        let suffix = Uuid::new_v4().simple().to_string();
        let id = format!("{}-{}", name, &suffix[..8]);

        let check_id = match self.config.check_id_policy {
            CheckIdPolicy::PerService => format!("{}-health-check", name),
            CheckIdPolicy::PerInstance => format!("{}-health-check", id),
        };

        let tags = self.config.tags_for(name);

        Registration {
            id,
            name: name.to_string(),
            address: address.to_string(),
            port,
            tags,
            check: CheckDefinition {
                check_id,
                ttl: self.config.ttl,
                deregister_critical_after: self.config.deregister_critical_after,
            },
        }
    }

    /// Register this process and start its heartbeat
    ///
    /// Fails when a registration is already active or the backend rejects the request.
    /// The first heartbeat is sent right away so the instance turns passing without
    /// waiting a full interval.
    pub async fn register(
        self: &Arc<Self>,
        name: &str,
        address: &str,
        port: u16,
    ) -> GatewayResult<RegistrationHandle> {
        if let Some(existing) = self.active.lock().as_ref() {
            return Err(GatewayError::registration(format!(
                "instance '{}' is already registered",
                existing.id
            )));
        }

        let registration = self.build_registration(name, address, port);
        self.backend.register(&registration).await.map_err(|e| {
            error!(service = %name, error = %e, "Service registration failed");
            GatewayError::registration(e.to_string())
        })?;

        {
            let mut active = self.active.lock();
            if let Some(existing) = active.as_ref() {
                return Err(GatewayError::registration(format!(
                    "instance '{}' is already registered",
                    existing.id
                )));
            }
            *active = Some(registration.clone());
        }

        info!(
            instance_id = %registration.id,
            service = %registration.name,
            check_id = %registration.check.check_id,
            ttl = ?registration.check.ttl,
            "Service registered"
        );

        let (liveness_tx, liveness_rx) = watch::channel(Liveness::Alive);
        let stop = self.shutdown.child_token();
        let heartbeat_task = tokio::spawn(Arc::clone(self).heartbeat_loop(
            registration.clone(),
            liveness_tx,
            stop.clone(),
        ));

        Ok(RegistrationHandle {
            registration,
            registry: Arc::clone(self),
            liveness: liveness_rx,
            stop,
            heartbeat_task,
        })
    }

    async fn heartbeat_loop(
        self: Arc<Self>,
        registration: Registration,
        liveness: watch::Sender<Liveness>,
        stop: CancellationToken,
    ) {
        let mut interval = tokio::time::interval(self.config.heartbeat_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = stop.cancelled() => {
                    debug!(instance_id = %registration.id, "Heartbeat stopped");
                    return;
                }
                _ = interval.tick() => {}
            }

            if let Err(e) = self.heartbeat(&registration.check.check_id).await {
                counter!("registry_heartbeat_failures_total", "service" => registration.name.clone())
                    .increment(1);
                error!(
                    instance_id = %registration.id,
                    check_id = %registration.check.check_id,
                    error = %e,
                    "Heartbeat failed, liveness lost"
                );
                liveness.send_replace(Liveness::Lost(GatewayError::LivenessLost {
                    instance_id: registration.id.clone(),
                    reason: e.to_string(),
                }));
                return;
            }
        }
    }

    /// Mark a TTL check as passing
    pub async fn heartbeat(&self, check_id: &str) -> GatewayResult<()> {
        self.backend
            .update_ttl(check_id, HealthStatus::Passing, HEARTBEAT_OUTPUT)
            .await?;
        debug!(check_id = %check_id, "Heartbeat sent");
        Ok(())
    }

    /// All passing instances of `name`
    pub async fn healthy_instances(&self, name: &str) -> GatewayResult<Vec<ServiceInstance>> {
        self.backend.healthy_instances(name).await
    }

    /// Resolve one passing instance of `name`
    pub async fn discover(&self, name: &str) -> GatewayResult<ServiceInstance> {
        let instances = self.backend.healthy_instances(name).await.map_err(|e| {
            warn!(service = %name, error = %e, "Service discovery failed");
            e
        })?;

        let instance = self
            .selector
            .select(name, &instances)
            .cloned()
            .ok_or_else(|| GatewayError::NoHealthyInstances {
                service: name.to_string(),
            })?;

        debug!(
            service = %name,
            instance_id = %instance.id,
            address = %instance.address,
            port = instance.port,
            candidates = instances.len(),
            "Service discovered"
        );
        Ok(instance)
    }

    /// Watch the passing member set of `name`, calling `on_change` on every join or leave
    ///
    /// The first non-empty snapshot is reported as a join of every member.
    pub fn watch<F>(self: &Arc<Self>, name: &str, on_change: F) -> WatchHandle
    where
        F: Fn(ServiceChange) + Send + Sync + 'static,
    {
        let stop = self.shutdown.child_token();
        let registry = Arc::clone(self);
        let service = name.to_string();
        let token = stop.clone();

        let task = tokio::spawn(async move {
            registry.watch_loop(service, on_change, token).await;
        });

        WatchHandle { stop, task }
    }

    async fn watch_loop<F>(&self, service: String, on_change: F, stop: CancellationToken)
    where
        F: Fn(ServiceChange) + Send + Sync + 'static,
    {
        let mut index = 0u64;
        let mut known: BTreeMap<String, ServiceInstance> = BTreeMap::new();
        info!(service = %service, "Watching service membership");

        loop {
            let result = tokio::select! {
                _ = stop.cancelled() => break,
                result = self.backend.watch_healthy(&service, index, self.config.watch_wait) => result,
            };

            match result {
                Ok(snapshot) => {
                    // An index moving backwards means the backend state was reset
                    index = if snapshot.index < index { 0 } else { snapshot.index };

                    let current: BTreeMap<String, ServiceInstance> = snapshot
                        .instances
                        .into_iter()
                        .map(|instance| (instance.id.clone(), instance))
                        .collect();

                    let joined: Vec<ServiceInstance> = current
                        .iter()
                        .filter(|(id, _)| !known.contains_key(*id))
                        .map(|(_, instance)| instance.clone())
                        .collect();
                    let left: Vec<ServiceInstance> = known
                        .iter()
                        .filter(|(id, _)| !current.contains_key(*id))
                        .map(|(_, instance)| instance.clone())
                        .collect();

                    if !joined.is_empty() || !left.is_empty() {
                        info!(
                            service = %service,
                            joined = joined.len(),
                            left = left.len(),
                            members = current.len(),
                            "Service membership changed"
                        );
                        on_change(ServiceChange {
                            service: service.clone(),
                            joined,
                            left,
                            members: current.values().cloned().collect(),
                        });
                    }
                    known = current;

                    if index == 0 && !self.pause(&stop).await {
                        break;
                    }
                }
                Err(e) => {
                    warn!(service = %service, error = %e, "Watch query failed, retrying");
                    index = 0;
                    if !self.pause(&stop).await {
                        break;
                    }
                }
            }
        }

        debug!(service = %service, "Watch stopped");
    }

    /// Sleep for the retry delay; false when stopped meanwhile
    async fn pause(&self, stop: &CancellationToken) -> bool {
        tokio::select! {
            _ = stop.cancelled() => false,
            _ = tokio::time::sleep(self.watch_retry_delay) => true,
        }
    }

    /// Remove the active registration, logging instead of failing
    pub async fn deregister(&self) {
        let Some(registration) = self.active.lock().take() else {
            debug!("No active registration to remove");
            return;
        };

        match self.backend.deregister(&registration.id).await {
            Ok(()) => info!(instance_id = %registration.id, "Service deregistered"),
            Err(e) => warn!(
                instance_id = %registration.id,
                error = %e,
                "Failed to deregister service"
            ),
        }
    }

    /// Stop every heartbeat and watch task started by this registry
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

/// Handle to this process's registration
pub struct RegistrationHandle {
    registration: Registration,
    registry: Arc<ServiceRegistry>,
    liveness: watch::Receiver<Liveness>,
    stop: CancellationToken,
    heartbeat_task: JoinHandle<()>,
}

impl std::fmt::Debug for RegistrationHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistrationHandle")
            .field("registration", &self.registration)
            .finish_non_exhaustive()
    }
}

impl RegistrationHandle {
    pub fn registration(&self) -> &Registration {
        &self.registration
    }

    pub fn liveness(&self) -> Liveness {
        self.liveness.borrow().clone()
    }

    /// Resolve once the heartbeat reports lost liveness
    ///
    /// Never resolves if the heartbeat is stopped normally.
    pub async fn liveness_lost(&self) -> GatewayError {
        let mut receiver = self.liveness.clone();
        loop {
            let lost = match &*receiver.borrow_and_update() {
                Liveness::Lost(e) => Some(e.clone()),
                Liveness::Alive => None,
            };
            if let Some(e) = lost {
                return e;
            }
            if receiver.changed().await.is_err() {
                return std::future::pending::<GatewayError>().await;
            }
        }
    }

    /// Stop the heartbeat and deregister, best-effort
    pub async fn deregister(self) {
        self.stop.cancel();
        if let Err(e) = self.heartbeat_task.await {
            warn!(error = %e, "Heartbeat task ended abnormally");
        }
        self.registry.deregister().await;
    }
}

/// Handle to a membership watch
pub struct WatchHandle {
    stop: CancellationToken,
    task: JoinHandle<()>,
}

impl WatchHandle {
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub async fn stop(self) {
        self.stop.cancel();
        if let Err(e) = self.task.await {
            warn!(error = %e, "Watch task ended abnormally");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::static_backend::StaticBackend;

    fn registry_with(policy: CheckIdPolicy) -> ServiceRegistry {
        let config = RegistryConfig {
            check_id_policy: policy,
            ..RegistryConfig::default()
        };
        ServiceRegistry::new(Arc::new(StaticBackend::new()), config)
    }

    #[test]
    fn test_instance_id_has_random_suffix() {
        let registry = registry_with(CheckIdPolicy::PerService);
        let a = registry.build_registration("services-management", "localhost", 8080);
        let b = registry.build_registration("services-management", "localhost", 8080);

        assert!(a.id.starts_with("services-management-"));
        assert_eq!(a.id.len(), "services-management-".len() + 8);
        assert_ne!(a.id, b.id);
        assert_eq!(a.tags, vec!["rust".to_string(), "services-management".to_string()]);
    }

    #[test]
    fn test_registration_uses_configured_tags() {
        let config = RegistryConfig {
            tags: vec!["edge".to_string(), "v2".to_string()],
            ..RegistryConfig::default()
        };
        let registry = ServiceRegistry::new(Arc::new(StaticBackend::new()), config);

        let registration = registry.build_registration("menu-service", "localhost", 8080);
        assert_eq!(registration.tags, vec!["edge".to_string(), "v2".to_string()]);
    }

    #[test]
    fn test_check_id_policies() {
        let per_service = registry_with(CheckIdPolicy::PerService)
            .build_registration("services-management", "localhost", 8080);
        assert_eq!(per_service.check.check_id, "services-management-health-check");

        let per_instance = registry_with(CheckIdPolicy::PerInstance)
            .build_registration("services-management", "localhost", 8080);
        assert_eq!(
            per_instance.check.check_id,
            format!("{}-health-check", per_instance.id)
        );
    }

    #[tokio::test]
    async fn test_discover_without_instances_fails() {
        let registry = registry_with(CheckIdPolicy::PerService);
        let result = registry.discover("main-service").await;
        assert!(matches!(result, Err(GatewayError::NoHealthyInstances { .. })));
    }
}
