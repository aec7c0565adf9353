//! # Configuration Module
//!
//! Process configuration for a service that registers itself in Consul, discovers peers and
//! calls them through the gateway client.
//!
//! ## Key Features
//! - YAML configuration parsing with serde (`humantime` strings for durations)
//! - Environment variable overrides using the variable names the deployment already sets
//!   (`SERVER_PORT`, `CONSUL_HOST`, `REDIS_HOST`, ...)
//! - Validation that reports every problem at once

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::core::error::{GatewayError, GatewayResult};
use crate::load_balancing::SelectionStrategy;
use crate::observability::config::{LogConfig, LogFormat};

/// Complete process configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Address this process listens on
    pub server: ServerConfig,

    /// Self-registration and discovery settings
    pub registry: RegistryConfig,

    /// Outbound gateway client settings
    pub gateway: GatewayClientConfig,

    /// Read-through cache backend settings
    pub cache: CacheConfig,

    /// Logging settings
    pub logging: LogConfig,
}

impl AppConfig {
    /// Load configuration from a YAML file, then apply environment overrides and validate
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> GatewayResult<Self> {
        let content = tokio::fs::read_to_string(path.as_ref()).await.map_err(|e| {
            GatewayError::config(format!(
                "Failed to read config file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;

        let mut config = Self::from_yaml(&content)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Build configuration from defaults plus environment overrides
    pub fn from_env() -> GatewayResult<Self> {
        let mut config = Self::default();
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse YAML without applying overrides
    pub fn from_yaml(content: &str) -> GatewayResult<Self> {
        serde_yaml::from_str(content)
            .map_err(|e| GatewayError::config(format!("Failed to parse config: {}", e)))
    }

    /// Apply overrides from the process environment
    pub fn apply_env_overrides(&mut self) -> GatewayResult<()> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable lookup
    ///
    /// Empty values are ignored, matching how the services treat unset variables.
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> GatewayResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|value| !value.is_empty());

        if let Some(host) = var("SERVER_HOST") {
            self.server.host = host;
        }
        if let Some(port) = var("SERVER_PORT") {
            self.server.port = parse_var("SERVER_PORT", &port)?;
        }

        if let Some(host) = var("CONSUL_HOST") {
            self.registry.consul.host = host;
        }
        if let Some(port) = var("CONSUL_PORT") {
            self.registry.consul.port = parse_var("CONSUL_PORT", &port)?;
        }
        if let Some(token) = var("CONSUL_TOKEN") {
            self.registry.consul.token = Some(token);
        }
        if let Some(host) = var("REGISTRY_HOST") {
            self.registry.advertise_host = host;
        }
        if let Some(name) = var("SERVICE_NAME") {
            self.registry.service_name = name;
        }
        if let Some(ttl) = var("REGISTRY_TTL") {
            self.registry.ttl = parse_duration_var("REGISTRY_TTL", &ttl)?;
        }
        if let Some(interval) = var("REGISTRY_HEARTBEAT_INTERVAL") {
            self.registry.heartbeat_interval =
                parse_duration_var("REGISTRY_HEARTBEAT_INTERVAL", &interval)?;
        }

        if let Some(name) = var("MAIN_SERVICE_NAME") {
            self.gateway.main_service_name = name;
        }
        if let Some(timeout) = var("GATEWAY_REQUEST_TIMEOUT") {
            self.gateway.request_timeout = parse_duration_var("GATEWAY_REQUEST_TIMEOUT", &timeout)?;
        }

        if let Some(host) = var("REDIS_HOST") {
            self.cache.redis.host = host;
        }
        if let Some(port) = var("REDIS_PORT") {
            self.cache.redis.port = parse_var("REDIS_PORT", &port)?;
        }
        if let Some(password) = var("REDIS_PASSWORD") {
            self.cache.redis.password = Some(password);
        }
        if let Some(db) = var("REDIS_DB") {
            self.cache.redis.db = parse_var("REDIS_DB", &db)?;
        }

        if let Some(level) = var("LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = var("LOG_FORMAT") {
            self.logging.format = match format.to_lowercase().as_str() {
                "json" => LogFormat::Json,
                "text" => LogFormat::Text,
                other => {
                    return Err(GatewayError::config(format!("Invalid LOG_FORMAT: {}", other)))
                }
            };
        }

        Ok(())
    }

    /// Validate the configuration, collecting every error into one message
    pub fn validate(&self) -> GatewayResult<()> {
        let mut errors = Vec::new();

        if self.server.port == 0 {
            errors.push("server.port must be greater than 0".to_string());
        }

        if self.registry.service_name.is_empty() {
            errors.push("registry.service_name cannot be empty".to_string());
        }
        if self.registry.advertise_host.is_empty() {
            errors.push("registry.advertise_host cannot be empty".to_string());
        }
        if self.registry.heartbeat_interval.is_zero() {
            errors.push("registry.heartbeat_interval must be greater than 0".to_string());
        }
        if self.registry.heartbeat_interval >= self.registry.ttl {
            errors.push(format!(
                "registry.heartbeat_interval ({}) must be shorter than registry.ttl ({})",
                humantime::format_duration(self.registry.heartbeat_interval),
                humantime::format_duration(self.registry.ttl)
            ));
        }
        if self.registry.backend == DiscoveryBackendKind::Consul && self.registry.consul.host.is_empty() {
            errors.push("registry.consul.host cannot be empty".to_string());
        }

        if self.gateway.main_service_name.is_empty() {
            errors.push("gateway.main_service_name cannot be empty".to_string());
        }
        if self.gateway.request_timeout.is_zero() {
            errors.push("gateway.request_timeout must be greater than 0".to_string());
        }

        if self.cache.backend == CacheBackendKind::Redis && self.cache.redis.host.is_empty() {
            errors.push("cache.redis.host cannot be empty when the redis backend is selected".to_string());
        }
        if self.cache.entry_ttl.is_zero() {
            errors.push("cache.entry_ttl must be greater than 0".to_string());
        }

        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => errors.push(format!("Invalid log level: {}", other)),
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(GatewayError::config(errors.join("; ")))
        }
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, value: &str) -> GatewayResult<T>
where
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e| GatewayError::config(format!("Invalid {}: {}", key, e)))
}

fn parse_duration_var(key: &str, value: &str) -> GatewayResult<Duration> {
    humantime::parse_duration(value)
        .map_err(|e| GatewayError::config(format!("Invalid {}: {}", key, e)))
}

/// Listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

/// Which discovery backend the registry talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryBackendKind {
    Consul,
    /// In-process registry, for local runs without Consul
    Static,
}

/// How the TTL check identifier is derived
///
/// `PerService` shares one check id between every instance of a logical service, which is
/// how the services are deployed today. Two replicas registered against the same agent then
/// refresh each other's check. `PerInstance` gives each registration its own check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckIdPolicy {
    PerService,
    PerInstance,
}

/// Self-registration and discovery configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Logical name this process registers under
    pub service_name: String,

    /// Address peers should use to reach this process
    pub advertise_host: String,

    /// Registration tags; defaults to `["rust", <service_name>]` when empty
    pub tags: Vec<String>,

    /// TTL of the health check
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,

    /// Interval between heartbeats; must be shorter than `ttl`
    #[serde(with = "humantime_serde")]
    pub heartbeat_interval: Duration,

    /// How long Consul keeps a critical instance before removing it
    #[serde(with = "humantime_serde")]
    pub deregister_critical_after: Duration,

    /// Check id derivation
    pub check_id_policy: CheckIdPolicy,

    /// Instance selection among healthy peers
    pub selection: SelectionStrategy,

    /// Maximum wait of one blocking watch query
    #[serde(with = "humantime_serde")]
    pub watch_wait: Duration,

    /// Exit the process when liveness is lost
    pub fail_fast: bool,

    /// Backend selection
    pub backend: DiscoveryBackendKind,

    /// Consul agent connection
    pub consul: ConsulConfig,
}

impl RegistryConfig {
    /// Tags to register `name` with; without configured tags, `["rust", name]`
    pub fn tags_for(&self, name: &str) -> Vec<String> {
        if self.tags.is_empty() {
            vec!["rust".to_string(), name.to_string()]
        } else {
            self.tags.clone()
        }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            service_name: "services-management".to_string(),
            advertise_host: "localhost".to_string(),
            tags: Vec::new(),
            ttl: Duration::from_secs(15),
            heartbeat_interval: Duration::from_secs(5),
            deregister_critical_after: Duration::from_secs(15),
            check_id_policy: CheckIdPolicy::PerService,
            selection: SelectionStrategy::RoundRobin,
            watch_wait: Duration::from_secs(30),
            fail_fast: true,
            backend: DiscoveryBackendKind::Consul,
            consul: ConsulConfig::default(),
        }
    }
}

/// Consul agent connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsulConfig {
    pub host: String,
    pub port: u16,

    /// ACL token sent as `X-Consul-Token`
    pub token: Option<String>,

    /// Datacenter to query; the agent's own when unset
    pub datacenter: Option<String>,

    /// Timeout of non-blocking agent requests
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
}

impl ConsulConfig {
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

impl Default for ConsulConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8500,
            token: None,
            datacenter: None,
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Outbound gateway client settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayClientConfig {
    /// Logical name of the user/organization service the facades call
    pub main_service_name: String,

    /// Default deadline of one outbound call
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
}

impl Default for GatewayClientConfig {
    fn default() -> Self {
        Self {
            main_service_name: "main-service".to_string(),
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// Which store backs the read-through cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheBackendKind {
    Memory,
    Redis,
    Disabled,
}

/// Read-through cache settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub backend: CacheBackendKind,

    /// TTL applied by writers; bounds how stale a cached entity can get
    #[serde(with = "humantime_serde")]
    pub entry_ttl: Duration,

    /// Capacity of the in-memory store
    pub max_entries: usize,

    pub redis: RedisConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackendKind::Disabled,
            entry_ttl: Duration::from_secs(600),
            max_entries: 10_000,
            redis: RedisConfig::default(),
        }
    }
}

/// Redis connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
    pub db: u32,

    /// Prefix shared with the writers that populate the cache
    pub key_prefix: String,
}

impl RedisConfig {
    /// Connection URL in the form the redis crate expects
    pub fn url(&self) -> String {
        match &self.password {
            Some(password) => format!("redis://:{}@{}:{}/{}", password, self.host, self.port, self.db),
            None => format!("redis://{}:{}/{}", self.host, self.port, self.db),
        }
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 6379,
            password: None,
            db: 0,
            key_prefix: "main-gateway:".to_string(),
        }
    }
}
