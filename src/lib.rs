//! # Services Gateway Library
//!
//! Service-to-service plumbing for the services-management microservices:
//!
//! - **Service discovery**: register this process in Consul with a TTL health check, keep it
//!   alive with a heartbeat, resolve healthy peers by logical name and watch membership
//! - **Gateway client**: one resolved, authenticated HTTP round trip with a uniform
//!   `{status_code, message, data}` envelope
//! - **Typed facades**: [`gateway::UserGateway`] and [`gateway::MenuGateway`]
//! - **Read-through cache**: selected user lookups consult a shared cache before the network
//!
//! ## Module Layout
//!
//! - `core`: errors, configuration and shared types
//! - `discovery`: registry, backends (Consul, static), liveness and watch
//! - `load_balancing`: instance selection among healthy peers
//! - `caching`: cache stores, entity cache and read-through policy
//! - `gateway`: client, envelope, DTOs and facades
//! - `middleware`: axum request context extraction and the `secured` guard
//! - `observability`: logging initialisation

/// Error types, configuration and the data shared by every other module
pub mod core;

/// Self-registration, heartbeat, discovery and membership watch
pub mod discovery;

/// Strategies for picking one instance among healthy peers
pub mod load_balancing;

/// Cache stores and the read-through policy used by the facades
pub mod caching;

/// Gateway client and typed facades over the main service
pub mod gateway;

/// Inbound axum middleware
pub mod middleware;

/// Structured logging setup
pub mod observability;

pub use crate::core::config::AppConfig;
pub use crate::core::error::{GatewayError, GatewayResult};
pub use crate::core::types::{RequestContext, ServiceInstance};
pub use crate::discovery::{RegistrationHandle, ServiceRegistry};
pub use crate::gateway::{GatewayClient, MenuGateway, UserGateway};
