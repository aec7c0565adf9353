//! # Service Discovery
//!
//! Self-registration, liveness and peer resolution. [`ServiceRegistry`] holds the logic and
//! delegates storage to a [`DiscoveryBackend`]: the Consul agent in production or
//! [`StaticBackend`] for local runs and tests.

pub mod backend;
pub mod consul;
pub mod registry;
pub mod static_backend;

pub use backend::{DiscoveryBackend, HealthSnapshot};
pub use consul::ConsulBackend;
pub use registry::{Liveness, RegistrationHandle, ServiceChange, ServiceRegistry, WatchHandle};
pub use static_backend::StaticBackend;
