//! Shared fixtures for the integration tests.
//!
//! Every fixture resolves the main service through an in-process [`StaticBackend`] whose only
//! peer points at a `wiremock` server, so outbound calls hit a real socket.

#![allow(dead_code)]

use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use wiremock::MockServer;

use services_gateway::caching::{EntityCache, InMemoryCache, KeyedEntityCache};
use services_gateway::core::config::{DiscoveryBackendKind, GatewayClientConfig, RegistryConfig};
use services_gateway::discovery::{DiscoveryBackend, StaticBackend};
use services_gateway::load_balancing::SelectionStrategy;
use services_gateway::{GatewayClient, ServiceInstance, ServiceRegistry};

pub const MAIN_SERVICE: &str = "main-service";

pub fn registry_config() -> RegistryConfig {
    RegistryConfig {
        backend: DiscoveryBackendKind::Static,
        selection: SelectionStrategy::FirstHealthy,
        ..Default::default()
    }
}

/// Registry over a fresh static backend
pub fn static_registry(config: RegistryConfig) -> (Arc<StaticBackend>, Arc<ServiceRegistry>) {
    let backend = Arc::new(StaticBackend::new());
    let dyn_backend: Arc<dyn DiscoveryBackend> = backend.clone();
    let registry = Arc::new(ServiceRegistry::new(dyn_backend, config));
    (backend, registry)
}

/// Register the mock server as a passing instance of the main service
pub fn add_mock_peer(backend: &StaticBackend, server: &MockServer) {
    let address = server.address();
    backend.add_instance(ServiceInstance::new(
        "main-service-1",
        MAIN_SERVICE,
        address.ip().to_string(),
        address.port(),
    ));
}

pub fn gateway_client(registry: Arc<ServiceRegistry>) -> Arc<GatewayClient> {
    let config = GatewayClientConfig {
        main_service_name: MAIN_SERVICE.to_string(),
        request_timeout: Duration::from_secs(5),
    };
    Arc::new(GatewayClient::new(MAIN_SERVICE, registry, &config).expect("gateway client"))
}

/// Mock server plus a client that resolves the main service to it
pub struct GatewayFixture {
    pub server: MockServer,
    pub backend: Arc<StaticBackend>,
    pub client: Arc<GatewayClient>,
}

pub async fn gateway_fixture() -> GatewayFixture {
    let server = MockServer::start().await;
    let (backend, registry) = static_registry(registry_config());
    add_mock_peer(&backend, &server);
    let client = gateway_client(registry);
    GatewayFixture {
        server,
        backend,
        client,
    }
}

pub fn memory_entity_cache() -> Arc<KeyedEntityCache> {
    Arc::new(KeyedEntityCache::new(
        Arc::new(InMemoryCache::new(128)),
        Duration::from_secs(60),
    ))
}

pub fn as_entity_cache(cache: &Arc<KeyedEntityCache>) -> Arc<dyn EntityCache> {
    cache.clone()
}

/// Successful response envelope around `data`
pub fn envelope(data: Value) -> Value {
    json!({
        "status_code": 200,
        "message": "success",
        "data": data,
    })
}

pub fn failed_envelope(status_code: i64, message: &str) -> Value {
    json!({
        "status_code": status_code,
        "message": message,
        "data": null,
    })
}

pub async fn received_count(server: &MockServer) -> usize {
    server
        .received_requests()
        .await
        .map(|requests| requests.len())
        .unwrap_or(0)
}
