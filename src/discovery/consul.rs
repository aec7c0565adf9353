//! # Consul Discovery Backend
//!
//! Talks to the local Consul agent over its HTTP API:
//!
//! | Operation | Endpoint |
//! |---|---|
//! | register | `PUT /v1/agent/service/register` |
//! | deregister | `PUT /v1/agent/service/deregister/{id}` |
//! | TTL update | `PUT /v1/agent/check/update/{check_id}` |
//! | discovery | `GET /v1/health/service/{name}?passing=true` |
//! | watch | same endpoint as a blocking query (`index`, `wait`, `X-Consul-Index`) |
//!
//! Unlike peer calls, agent error bodies are short plain-text diagnostics, so they are read
//! and included in the returned error.

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

use super::backend::{DiscoveryBackend, HealthSnapshot};
use crate::core::config::ConsulConfig;
use crate::core::error::{GatewayError, GatewayResult};
use crate::core::types::{HealthStatus, Registration, ServiceInstance};

const CONSUL_INDEX_HEADER: &str = "X-Consul-Index";
const CONSUL_TOKEN_HEADER: &str = "X-Consul-Token";

/// Extra time granted to a blocking query on top of its `wait`
///
/// Consul adds up to `wait / 16` of jitter before answering.
const BLOCKING_QUERY_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Serialize)]
struct AgentServiceRegistration<'a> {
    #[serde(rename = "ID")]
    id: &'a str,
    #[serde(rename = "Name")]
    name: &'a str,
    #[serde(rename = "Address")]
    address: &'a str,
    #[serde(rename = "Port")]
    port: u16,
    #[serde(rename = "Tags")]
    tags: &'a [String],
    #[serde(rename = "Check")]
    check: AgentServiceCheck<'a>,
}

#[derive(Debug, Serialize)]
struct AgentServiceCheck<'a> {
    #[serde(rename = "CheckID")]
    check_id: &'a str,
    #[serde(rename = "TTL")]
    ttl: String,
    #[serde(rename = "DeregisterCriticalServiceAfter")]
    deregister_critical_service_after: String,
}

#[derive(Debug, Serialize)]
struct CheckUpdate<'a> {
    #[serde(rename = "Status")]
    status: &'a str,
    #[serde(rename = "Output")]
    output: &'a str,
}

#[derive(Debug, Deserialize)]
struct HealthServiceEntry {
    #[serde(rename = "Node")]
    node: NodeEntry,
    #[serde(rename = "Service")]
    service: AgentService,
    #[serde(rename = "Checks", default)]
    checks: Vec<HealthCheckEntry>,
}

#[derive(Debug, Deserialize)]
struct NodeEntry {
    #[serde(rename = "Node", default)]
    node: String,
    #[serde(rename = "Address", default)]
    address: String,
}

#[derive(Debug, Deserialize)]
struct AgentService {
    #[serde(rename = "ID")]
    id: String,
    #[serde(rename = "Service")]
    service: String,
    #[serde(rename = "Address", default)]
    address: String,
    #[serde(rename = "Port")]
    port: u16,
    #[serde(rename = "Tags", default)]
    tags: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct HealthCheckEntry {
    #[serde(rename = "Status")]
    status: String,
}

impl HealthServiceEntry {
    /// Worst status across the entry's checks
    fn aggregated_health(&self) -> HealthStatus {
        self.checks
            .iter()
            .map(|check| HealthStatus::from_consul(&check.status))
            .fold(HealthStatus::Passing, |worst, status| match (worst, status) {
                (HealthStatus::Critical, _) | (_, HealthStatus::Critical) => HealthStatus::Critical,
                (HealthStatus::Warning, _) | (_, HealthStatus::Warning) => HealthStatus::Warning,
                _ => HealthStatus::Passing,
            })
    }

    fn into_instance(self) -> ServiceInstance {
        let health = self.aggregated_health();
        // An empty service address means "use the node's address"
        let address = if self.service.address.is_empty() {
            self.node.address
        } else {
            self.service.address
        };

        ServiceInstance {
            id: self.service.id,
            name: self.service.service,
            address,
            port: self.service.port,
            tags: self.service.tags.unwrap_or_default(),
            health,
        }
    }
}

/// Format a duration the way Consul's Go duration parser accepts it
fn consul_duration(duration: Duration) -> String {
    if duration.subsec_millis() == 0 {
        format!("{}s", duration.as_secs())
    } else {
        format!("{}ms", duration.as_millis())
    }
}

/// Consul agent backend
pub struct ConsulBackend {
    client: Client,
    base_url: String,
    token: Option<String>,
    datacenter: Option<String>,
    request_timeout: Duration,
}

impl ConsulBackend {
    /// Create a backend for the agent described by `config`
    pub fn new(config: &ConsulConfig) -> GatewayResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| GatewayError::config(format!("Failed to create Consul HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url(),
            token: config.token.clone(),
            datacenter: config.datacenter.clone(),
            request_timeout: config.request_timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let mut request = self
            .client
            .request(method, format!("{}{}", self.base_url, path))
            .timeout(self.request_timeout);

        if let Some(token) = &self.token {
            request = request.header(CONSUL_TOKEN_HEADER, token);
        }
        if let Some(dc) = &self.datacenter {
            request = request.query(&[("dc", dc)]);
        }
        request
    }

    /// Send a request and turn transport failures and error statuses into errors
    async fn send(&self, request: RequestBuilder, operation: &str) -> GatewayResult<Response> {
        let response = request.send().await.map_err(|e| {
            GatewayError::service_discovery(format!("Consul {} request failed: {}", operation, e))
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(GatewayError::service_discovery(format!(
            "Consul {} returned {}: {}",
            operation,
            status,
            body.trim()
        )))
    }

    async fn decode_health(response: Response, service: &str) -> GatewayResult<HealthSnapshot> {
        let index = response
            .headers()
            .get(CONSUL_INDEX_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<u64>().ok())
            .unwrap_or(0);

        let entries: Vec<HealthServiceEntry> = response.json().await.map_err(|e| {
            GatewayError::service_discovery(format!(
                "Failed to decode Consul health response for '{}': {}",
                service, e
            ))
        })?;

        let instances = entries
            .into_iter()
            .map(|entry| {
                debug!(service = %entry.service.service, node = %entry.node.node, "Consul health entry");
                entry.into_instance()
            })
            .filter(ServiceInstance::is_passing)
            .collect();

        Ok(HealthSnapshot { index, instances })
    }
}

#[async_trait]
impl DiscoveryBackend for ConsulBackend {
    async fn register(&self, registration: &Registration) -> GatewayResult<()> {
        let body = AgentServiceRegistration {
            id: &registration.id,
            name: &registration.name,
            address: &registration.address,
            port: registration.port,
            tags: &registration.tags,
            check: AgentServiceCheck {
                check_id: &registration.check.check_id,
                ttl: consul_duration(registration.check.ttl),
                deregister_critical_service_after: consul_duration(
                    registration.check.deregister_critical_after,
                ),
            },
        };

        let request = self
            .request(Method::PUT, "/v1/agent/service/register")
            .json(&body);
        self.send(request, "service register").await?;

        info!(
            instance_id = %registration.id,
            service = %registration.name,
            address = %registration.address,
            port = registration.port,
            "Registered service with Consul"
        );
        Ok(())
    }

    async fn deregister(&self, instance_id: &str) -> GatewayResult<()> {
        let request = self.request(
            Method::PUT,
            &format!("/v1/agent/service/deregister/{}", instance_id),
        );
        self.send(request, "service deregister").await?;

        info!(instance_id = %instance_id, "Deregistered service from Consul");
        Ok(())
    }

    async fn healthy_instances(&self, service: &str) -> GatewayResult<Vec<ServiceInstance>> {
        let request = self
            .request(Method::GET, &format!("/v1/health/service/{}", service))
            .query(&[("passing", "true")]);
        let response = self.send(request, "health query").await?;

        Ok(Self::decode_health(response, service).await?.instances)
    }

    async fn watch_healthy(
        &self,
        service: &str,
        last_index: u64,
        wait: Duration,
    ) -> GatewayResult<HealthSnapshot> {
        let mut request = self
            .request(Method::GET, &format!("/v1/health/service/{}", service))
            .query(&[("passing", "true")]);

        if last_index > 0 {
            request = request
                .query(&[("index", last_index.to_string()), ("wait", consul_duration(wait))])
                .timeout(wait + BLOCKING_QUERY_GRACE);
        }

        let response = self.send(request, "blocking health query").await?;
        Self::decode_health(response, service).await
    }

    async fn update_ttl(&self, check_id: &str, status: HealthStatus, output: &str) -> GatewayResult<()> {
        let request = self
            .request(Method::PUT, &format!("/v1/agent/check/update/{}", check_id))
            .json(&CheckUpdate {
                status: status.as_str(),
                output,
            });
        self.send(request, "check update").await?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "consul"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_consul_duration_format() {
        assert_eq!(consul_duration(Duration::from_secs(15)), "15s");
        assert_eq!(consul_duration(Duration::from_millis(1500)), "1500ms");
    }

    #[test]
    fn test_entry_falls_back_to_node_address() {
        let raw = r#"{
            "Node": {"Node": "node-1", "Address": "10.0.0.9"},
            "Service": {"ID": "main-service-1", "Service": "main-service", "Address": "", "Port": 8080, "Tags": null},
            "Checks": [{"Status": "passing"}, {"Status": "passing"}]
        }"#;
        let entry: HealthServiceEntry = serde_json::from_str(raw).unwrap();
        let instance = entry.into_instance();

        assert_eq!(instance.address, "10.0.0.9");
        assert!(instance.tags.is_empty());
        assert_eq!(instance.health, HealthStatus::Passing);
    }

    #[test]
    fn test_entry_health_is_worst_check() {
        let raw = r#"{
            "Node": {"Node": "node-1", "Address": "10.0.0.9"},
            "Service": {"ID": "a", "Service": "main-service", "Address": "10.0.0.5", "Port": 8080},
            "Checks": [{"Status": "passing"}, {"Status": "warning"}]
        }"#;
        let entry: HealthServiceEntry = serde_json::from_str(raw).unwrap();
        assert_eq!(entry.aggregated_health(), HealthStatus::Warning);
    }
}
