//! # Core Types
//!
//! Data shared between the registry, the gateway client and the facades:
//!
//! - [`ServiceInstance`]: one resolved peer, produced per discovery call and never persisted
//! - [`Registration`] / [`CheckDefinition`]: this process's own entry in the registry
//! - [`RequestContext`]: the request-scoped data a caller hands to a facade (bearer token,
//!   propagated headers, cancellation)

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Header used to propagate the caller's application language to peers
pub const APP_LANGUAGE_HEADER: &str = "X-App-Language";

/// Language used when the inbound header is absent or unparsable
pub const DEFAULT_APP_LANGUAGE: u32 = 1;

/// Health status of a registered instance, as reported by the discovery backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Passing,
    Warning,
    Critical,
}

impl HealthStatus {
    /// Parse the status strings Consul uses; anything unknown counts as critical
    pub fn from_consul(status: &str) -> Self {
        match status {
            "passing" => HealthStatus::Passing,
            "warning" => HealthStatus::Warning,
            _ => HealthStatus::Critical,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Passing => "passing",
            HealthStatus::Warning => "warning",
            HealthStatus::Critical => "critical",
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A live instance of a logical service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceInstance {
    /// Instance identifier assigned at registration
    pub id: String,

    /// Logical service name
    pub name: String,

    /// Host name or IP the instance advertised
    pub address: String,

    /// Port the instance listens on
    pub port: u16,

    /// Registration tags
    #[serde(default)]
    pub tags: Vec<String>,

    /// Aggregated health of the instance checks
    pub health: HealthStatus,
}

impl ServiceInstance {
    /// Create a passing instance
    pub fn new(id: impl Into<String>, name: impl Into<String>, address: impl Into<String>, port: u16) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            address: address.into(),
            port,
            tags: Vec::new(),
            health: HealthStatus::Passing,
        }
    }

    /// Set the health status (builder style)
    pub fn with_health(mut self, health: HealthStatus) -> Self {
        self.health = health;
        self
    }

    pub fn is_passing(&self) -> bool {
        self.health == HealthStatus::Passing
    }

    /// Absolute plaintext URL for `path` on this instance
    ///
    /// Peers are reached over the internal mesh only, so no TLS is involved.
    pub fn url_for(&self, path: &str) -> String {
        format!("http://{}:{}{}", self.address, self.port, path)
    }
}

/// TTL health check attached to a registration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckDefinition {
    /// Check identifier used by heartbeats
    pub check_id: String,

    /// Window within which a heartbeat must arrive
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,

    /// How long the instance may stay critical before the registry drops it
    #[serde(with = "humantime_serde")]
    pub deregister_critical_after: Duration,
}

/// This process's own registry entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    pub id: String,
    pub name: String,
    pub address: String,
    pub port: u16,
    pub tags: Vec<String>,
    pub check: CheckDefinition,
}

impl Registration {
    /// View this registration as a discoverable instance with the given health
    pub fn as_instance(&self, health: HealthStatus) -> ServiceInstance {
        ServiceInstance {
            id: self.id.clone(),
            name: self.name.clone(),
            address: self.address.clone(),
            port: self.port,
            tags: self.tags.clone(),
            health,
        }
    }
}

/// Request-scoped data passed from a handler into the gateway facades
///
/// Cloning is cheap and clones share the same cancellation token, so cancelling the
/// inbound request aborts every outbound call made on its behalf.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    token: Option<String>,
    app_language: Option<u32>,
    user_id: Option<String>,
    timeout: Option<Duration>,
    cancellation: CancellationToken,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach the bearer token (without the `Bearer ` prefix)
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_app_language(mut self, language: u32) -> Self {
        self.app_language = Some(language);
        self
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Override the client's default per-call deadline for calls made with this context
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = cancellation;
        self
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn app_language(&self) -> Option<u32> {
        self.app_language
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Headers that must follow the request to peer services
    pub fn forwarded_headers(&self) -> HashMap<String, String> {
        let mut headers = HashMap::new();
        if let Some(language) = self.app_language {
            headers.insert(APP_LANGUAGE_HEADER.to_string(), language.to_string());
        }
        headers
    }
}

/// Parse an inbound app-language header value
///
/// Clients send the value with or without quotes; anything that is not an unsigned
/// integer falls back to `default`.
pub fn parse_app_language(header: &str, default: u32) -> u32 {
    header
        .trim()
        .trim_matches('"')
        .trim()
        .parse()
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_url_is_plain_http() {
        let instance = ServiceInstance::new("main-1", "main-service", "10.0.0.5", 8080);
        assert_eq!(
            instance.url_for("/v1/gateway/teachers/T1"),
            "http://10.0.0.5:8080/v1/gateway/teachers/T1"
        );
    }

    #[test]
    fn test_consul_status_parsing() {
        assert_eq!(HealthStatus::from_consul("passing"), HealthStatus::Passing);
        assert_eq!(HealthStatus::from_consul("warning"), HealthStatus::Warning);
        assert_eq!(HealthStatus::from_consul("maintenance"), HealthStatus::Critical);
    }

    #[test]
    fn test_parse_app_language() {
        assert_eq!(parse_app_language("2", 1), 2);
        assert_eq!(parse_app_language(" \"3\" ", 1), 3);
        assert_eq!(parse_app_language("vi", 1), 1);
        assert_eq!(parse_app_language("", 7), 7);
    }

    #[test]
    fn test_forwarded_headers_only_carry_language() {
        let ctx = RequestContext::new().with_token("abc");
        assert!(ctx.forwarded_headers().is_empty());

        let ctx = ctx.with_app_language(2);
        let headers = ctx.forwarded_headers();
        assert_eq!(headers.get(APP_LANGUAGE_HEADER).map(String::as_str), Some("2"));
        assert_eq!(headers.len(), 1);
    }

    #[test]
    fn test_context_clones_share_cancellation() {
        let ctx = RequestContext::new();
        let clone = ctx.clone();
        ctx.cancellation().cancel();
        assert!(clone.cancellation().is_cancelled());
    }
}
