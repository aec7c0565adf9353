//! # Error Handling Module
//!
//! This module defines every error the gateway core can surface, using the `thiserror` crate.
//! The variants follow the failure taxonomy of the system:
//!
//! - **Fatal at the process level**: [`GatewayError::Registration`] at startup and
//!   [`GatewayError::LivenessLost`] from the heartbeat loop. The library never exits the process
//!   itself; the binary decides what to do with these.
//! - **Recoverable, surfaced to the caller**: discovery failures, transport failures, HTTP status
//!   errors, decode failures, non-200 envelopes and a missing bearer token.
//! - **Best-effort**: cache failures, represented by [`crate::caching::CacheError`], which are logged
//!   and never escape a facade call.
//!
//! ## Rust Concepts Used
//!
//! - `Result<T, E>` instead of exceptions, with the `?` operator for propagation
//! - `thiserror` derives `Display` and `Error` from the `#[error("...")]` attributes
//! - `#[source]` keeps the error chain intact when wrapping with operation context
//! - `From` impls let `?` convert library errors (reqwest, serde) into `GatewayError`

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// Main result type used throughout the gateway core
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Error types for the gateway client, registry and facades
#[derive(Debug, Error, Clone)]
pub enum GatewayError {
    /// Configuration-related errors (invalid config, missing files, etc.)
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// The discovery backend could not be queried
    #[error("Service discovery error: {message}")]
    ServiceDiscovery { message: String },

    /// The discovery backend answered, but no passing instance exists
    #[error("Service discovery error: no healthy instances of '{service}'")]
    NoHealthyInstances { service: String },

    /// Self-registration with the discovery backend failed
    #[error("Service registration failed: {message}")]
    Registration { message: String },

    /// The heartbeat could not refresh the TTL check; the instance will turn critical
    #[error("Liveness lost for '{instance_id}': {reason}")]
    LivenessLost { instance_id: String, reason: String },

    /// Transport failures when talking to a peer (connect, reset, body read)
    #[error("HTTP client error: {message}")]
    HttpClient { message: String },

    /// The peer answered with HTTP status >= 400; only the status line is kept
    #[error("http error: {status}")]
    UpstreamStatus { status: String },

    /// The outbound call exceeded its deadline
    #[error("Request timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// The caller cancelled the request while it was in flight
    #[error("Request cancelled: {operation}")]
    Cancelled { operation: String },

    /// JSON serialization/deserialization errors
    #[error("JSON error: {message}")]
    Json { message: String },

    /// The response envelope carried a `status_code` other than 200
    #[error("gateway error: {message}")]
    Envelope { status_code: i64, message: String },

    /// No bearer token was present in the request context
    #[error("token not found in context")]
    MissingToken,

    /// A facade operation failed; wraps the underlying cause with the operation name
    #[error("{operation} failed: {source}")]
    Remote {
        operation: String,
        #[source]
        source: Box<GatewayError>,
    },

    /// Cache backend errors that were promoted to hard failures (setup, not lookups)
    #[error("Cache error: {message}")]
    Cache { message: String },

    /// Request validation errors (invalid header names, malformed values, etc.)
    #[error("Request validation failed: {field} - {reason}")]
    RequestValidation { field: String, reason: String },

    /// I/O errors (file operations, listener binding, etc.)
    #[error("I/O error: {message}")]
    Io { message: String },

    /// YAML parsing errors for configuration files
    #[error("YAML error: {message}")]
    Yaml { message: String },

    /// Internal errors for unexpected failures
    #[error("Internal server error: {message}")]
    Internal { message: String },
}

impl GatewayError {
    /// Create a configuration error with a custom message
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a service discovery error with a custom message
    pub fn service_discovery<S: Into<String>>(message: S) -> Self {
        Self::ServiceDiscovery {
            message: message.into(),
        }
    }

    /// Create a registration error with a custom message
    pub fn registration<S: Into<String>>(message: S) -> Self {
        Self::Registration {
            message: message.into(),
        }
    }

    /// Create a transport error with a custom message
    pub fn http_client<S: Into<String>>(message: S) -> Self {
        Self::HttpClient {
            message: message.into(),
        }
    }

    /// Create an internal error with a custom message
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Create an invalid input error for a specific field
    pub fn invalid_input<F: Into<String>, S: Into<String>>(field: F, reason: S) -> Self {
        Self::RequestValidation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Wrap an error with the name of the facade operation that produced it
    ///
    /// Errors that are already wrapped are returned unchanged so the chain does not nest.
    pub fn remote<S: Into<String>>(operation: S, source: GatewayError) -> Self {
        match source {
            wrapped @ Self::Remote { .. } => wrapped,
            source => Self::Remote {
                operation: operation.into(),
                source: Box::new(source),
            },
        }
    }

    /// The innermost error, skipping any `Remote` wrappers
    pub fn root_cause(&self) -> &GatewayError {
        match self {
            Self::Remote { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Get the appropriate HTTP status code for this error
    ///
    /// Handlers that sit in front of the facades use this to turn a failed peer call
    /// into a response for their own caller.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::MissingToken => StatusCode::UNAUTHORIZED,
            Self::RequestValidation { .. } => StatusCode::BAD_REQUEST,
            Self::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            Self::ServiceDiscovery { .. } => StatusCode::BAD_GATEWAY,
            Self::NoHealthyInstances { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::HttpClient { .. } => StatusCode::BAD_GATEWAY,
            Self::UpstreamStatus { .. } => StatusCode::BAD_GATEWAY,
            Self::Envelope { .. } => StatusCode::BAD_GATEWAY,
            Self::Json { .. } => StatusCode::BAD_GATEWAY,
            Self::Cancelled { .. } => StatusCode::BAD_REQUEST,
            Self::Remote { source, .. } => source.status_code(),
            Self::Configuration { .. }
            | Self::Registration { .. }
            | Self::LivenessLost { .. }
            | Self::Cache { .. }
            | Self::Io { .. }
            | Self::Yaml { .. }
            | Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Check if this error is transient
    ///
    /// The core never retries on its own; callers that keep a fallback use this to decide.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ServiceDiscovery { .. } => true,
            Self::NoHealthyInstances { .. } => true,
            Self::HttpClient { .. } => true,
            Self::Timeout { .. } => true,
            Self::Remote { source, .. } => source.is_retryable(),
            _ => false,
        }
    }

    /// Check if this error should stop the process under a fail-fast policy
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Registration { .. } | Self::LivenessLost { .. })
    }

    /// Get a string representation of the error type for API responses
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Configuration { .. } => "configuration_error",
            Self::ServiceDiscovery { .. } => "service_discovery_error",
            Self::NoHealthyInstances { .. } => "no_healthy_instances",
            Self::Registration { .. } => "registration_error",
            Self::LivenessLost { .. } => "liveness_lost",
            Self::HttpClient { .. } => "http_client_error",
            Self::UpstreamStatus { .. } => "upstream_status_error",
            Self::Timeout { .. } => "timeout",
            Self::Cancelled { .. } => "cancelled",
            Self::Json { .. } => "json_error",
            Self::Envelope { .. } => "gateway_envelope_error",
            Self::MissingToken => "missing_token",
            Self::Remote { source, .. } => source.error_type(),
            Self::Cache { .. } => "cache_error",
            Self::RequestValidation { .. } => "request_validation_error",
            Self::Io { .. } => "io_error",
            Self::Yaml { .. } => "yaml_error",
            Self::Internal { .. } => "internal_error",
        }
    }
}

/// Implement conversion from std::io::Error
impl From<std::io::Error> for GatewayError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
        }
    }
}

/// Implement conversion from serde_json::Error
impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json {
            message: err.to_string(),
        }
    }
}

/// Implement conversion from serde_yaml::Error
impl From<serde_yaml::Error> for GatewayError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Yaml {
            message: err.to_string(),
        }
    }
}

/// Implement conversion from reqwest::Error
impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        Self::HttpClient {
            message: err.to_string(),
        }
    }
}

/// Implement `IntoResponse` so handlers can return `GatewayResult<T>` directly
impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let error_response = json!({
            "error": {
                "code": status.as_u16(),
                "message": self.to_string(),
                "type": self.error_type(),
                "retryable": self.is_retryable(),
            }
        });

        (status, Json(error_response)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_codes() {
        assert_eq!(GatewayError::MissingToken.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            GatewayError::NoHealthyInstances { service: "main-service".into() }.status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            GatewayError::UpstreamStatus { status: "404 Not Found".into() }.status_code(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn test_remote_wrapping_keeps_message_and_does_not_nest() {
        let inner = GatewayError::Envelope {
            status_code: 500,
            message: "db down".into(),
        };
        let wrapped = GatewayError::remote("get teacher info", inner);
        assert_eq!(wrapped.to_string(), "get teacher info failed: gateway error: db down");

        let rewrapped = GatewayError::remote("outer", wrapped.clone());
        assert_eq!(rewrapped.to_string(), wrapped.to_string());
        assert!(matches!(rewrapped.root_cause(), GatewayError::Envelope { .. }));
    }

    #[test]
    fn test_retryable_and_fatal_errors() {
        assert!(GatewayError::http_client("connection refused").is_retryable());
        assert!(GatewayError::Timeout { timeout_ms: 5000 }.is_retryable());
        assert!(!GatewayError::MissingToken.is_retryable());
        assert!(GatewayError::registration("consul unreachable").is_fatal());
        assert!(!GatewayError::service_discovery("consul unreachable").is_fatal());
    }
}
