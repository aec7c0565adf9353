//! # Gateway Client
//!
//! One resolved, authenticated HTTP round trip to a peer service.
//!
//! ## Key Features
//!
//! - **Per-call discovery**: the target instance is resolved through the [`ServiceRegistry`]
//!   for every request; when nothing is healthy no request is sent
//! - **Header ordering**: `Content-Type: application/json`, then `Authorization: Bearer`,
//!   then caller headers, each overwriting the previous value
//! - **Deadline and cancellation**: every call is bounded by the context timeout (or the
//!   client default) and aborts as soon as the request context is cancelled
//! - **Opaque results**: the raw body is returned; envelope decoding belongs to the facades
//!
//! ## Error bodies
//!
//! [`GatewayClient::call`] reports HTTP status >= 400 with the status line only and never
//! reads the body. [`GatewayClient::call_with_multipart`] reads the body and logs it before
//! returning the same error.

use bytes::Bytes;
use metrics::{counter, histogram};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Method;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

use crate::core::config::GatewayClientConfig;
use crate::core::error::{GatewayError, GatewayResult};
use crate::core::types::RequestContext;
use crate::discovery::ServiceRegistry;

const JSON_CONTENT_TYPE: &str = "application/json";

/// A request before its target instance is resolved
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<Bytes>,
    pub content_type: String,
    pub token: Option<String>,
    pub headers: HashMap<String, String>,
}

impl OutboundRequest {
    /// JSON request; `body` is serialized when present and omitted otherwise
    pub fn json<B: Serialize + ?Sized>(
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> GatewayResult<Self> {
        let body = body
            .map(|body| {
                serde_json::to_vec(body).map(Bytes::from).map_err(|e| GatewayError::Json {
                    message: format!("marshal body failed: {}", e),
                })
            })
            .transpose()?;

        Ok(Self {
            method,
            path: path.to_string(),
            body,
            content_type: JSON_CONTENT_TYPE.to_string(),
            token: None,
            headers: HashMap::new(),
        })
    }

    /// Pre-encoded body with a caller-chosen content type (multipart boundary included)
    pub fn raw(method: Method, path: &str, body: Bytes, content_type: &str) -> Self {
        Self {
            method,
            path: path.to_string(),
            body: Some(body),
            content_type: content_type.to_string(),
            token: None,
            headers: HashMap::new(),
        }
    }

    pub fn with_token(mut self, token: Option<&str>) -> Self {
        self.token = token.filter(|t| !t.is_empty()).map(str::to_string);
        self
    }

    pub fn with_headers(mut self, headers: &HashMap<String, String>) -> Self {
        self.headers.extend(headers.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    /// Final header set; later entries overwrite earlier ones with the same name
    pub fn header_map(&self) -> GatewayResult<HeaderMap> {
        let mut headers = HeaderMap::new();

        headers.insert(CONTENT_TYPE, header_value("Content-Type", &self.content_type)?);

        if let Some(token) = &self.token {
            headers.insert(AUTHORIZATION, header_value("Authorization", &format!("Bearer {}", token))?);
        }

        for (name, value) in &self.headers {
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| GatewayError::invalid_input(name.as_str(), e.to_string()))?;
            headers.insert(header_name, header_value(name, value)?);
        }

        Ok(headers)
    }
}

fn header_value(name: &str, value: &str) -> GatewayResult<HeaderValue> {
    HeaderValue::from_str(value).map_err(|e| GatewayError::invalid_input(name, e.to_string()))
}

/// HTTP client bound to one logical peer service
pub struct GatewayClient {
    service_name: String,
    registry: Arc<ServiceRegistry>,
    http: reqwest::Client,
    default_timeout: Duration,
}

impl GatewayClient {
    pub fn new(
        service_name: impl Into<String>,
        registry: Arc<ServiceRegistry>,
        config: &GatewayClientConfig,
    ) -> GatewayResult<Self> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| GatewayError::config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            service_name: service_name.into(),
            registry,
            http,
            default_timeout: config.request_timeout,
        })
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// JSON call; returns the raw response body
    pub async fn call<B: Serialize + ?Sized>(
        &self,
        ctx: &RequestContext,
        method: Method,
        path: &str,
        body: Option<&B>,
        headers: &HashMap<String, String>,
    ) -> GatewayResult<Bytes> {
        let request = OutboundRequest::json(method, path, body)?
            .with_token(ctx.token())
            .with_headers(headers);
        self.execute(ctx, request, false).await
    }

    /// Call with a pre-built multipart body; returns the raw response body
    pub async fn call_with_multipart(
        &self,
        ctx: &RequestContext,
        method: Method,
        path: &str,
        body: Bytes,
        content_type: &str,
    ) -> GatewayResult<Bytes> {
        let request = OutboundRequest::raw(method, path, body, content_type).with_token(ctx.token());
        self.execute(ctx, request, true).await
    }

    async fn execute(
        &self,
        ctx: &RequestContext,
        request: OutboundRequest,
        log_error_body: bool,
    ) -> GatewayResult<Bytes> {
        let deadline = ctx.timeout().unwrap_or(self.default_timeout);
        let operation = format!("{} {}", request.method, request.path);
        let method_label = request.method.to_string();
        let started = Instant::now();

        let result = tokio::select! {
            biased;
            _ = ctx.cancellation().cancelled() => Err(GatewayError::Cancelled {
                operation: operation.clone(),
            }),
            result = tokio::time::timeout(deadline, self.dispatch(request, log_error_body)) => {
                result.unwrap_or_else(|_| Err(GatewayError::Timeout {
                    timeout_ms: deadline.as_millis() as u64,
                }))
            }
        };

        let outcome = match &result {
            Ok(_) => "success",
            Err(e) => e.error_type(),
        };
        counter!(
            "gateway_client_requests_total",
            "service" => self.service_name.clone(),
            "method" => method_label,
            "outcome" => outcome
        )
        .increment(1);
        histogram!("gateway_client_request_duration_seconds", "service" => self.service_name.clone())
            .record(started.elapsed().as_secs_f64());

        if let Err(e) = &result {
            warn!(service = %self.service_name, operation = %operation, error = %e, "Gateway call failed");
        }
        result
    }

    async fn dispatch(&self, request: OutboundRequest, log_error_body: bool) -> GatewayResult<Bytes> {
        let instance = self.registry.discover(&self.service_name).await.map_err(|e| {
            error!(service = %self.service_name, error = %e, "Service discovery failed");
            e
        })?;

        let url = instance.url_for(&request.path);
        let headers = request.header_map()?;

        let mut builder = self.http.request(request.method.clone(), &url).headers(headers);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        debug!(service = %self.service_name, url = %url, method = %request.method, "Calling peer service");

        let response = builder.send().await.map_err(|e| {
            GatewayError::http_client(format!("http call failed: {}", e))
        })?;

        let status = response.status();
        if status.as_u16() >= 400 {
            if log_error_body {
                let body = response.text().await.unwrap_or_default();
                warn!(
                    service = %self.service_name,
                    url = %url,
                    status = status.as_u16(),
                    response = %body,
                    "Peer service returned an error"
                );
            }
            return Err(GatewayError::UpstreamStatus {
                status: status.to_string(),
            });
        }

        response
            .bytes()
            .await
            .map_err(|e| GatewayError::http_client(format!("read response body failed: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_caller_headers_override_defaults() {
        let mut extra = HashMap::new();
        extra.insert("content-type".to_string(), "text/plain".to_string());
        extra.insert("X-App-Language".to_string(), "2".to_string());

        let request = OutboundRequest::json(Method::GET, "/v1/user/current-user", None::<&()>)
            .unwrap()
            .with_token(Some("abc"))
            .with_headers(&extra);
        let headers = request.header_map().unwrap();

        assert_eq!(headers.get(CONTENT_TYPE).unwrap(), "text/plain");
        assert_eq!(headers.get(AUTHORIZATION).unwrap(), "Bearer abc");
        assert_eq!(headers.get("x-app-language").unwrap(), "2");
    }

    #[test]
    fn test_empty_token_sends_no_authorization() {
        let request = OutboundRequest::json(Method::GET, "/", None::<&()>)
            .unwrap()
            .with_token(Some(""));
        let headers = request.header_map().unwrap();
        assert!(headers.get(AUTHORIZATION).is_none());
        assert_eq!(headers.get(CONTENT_TYPE).unwrap(), JSON_CONTENT_TYPE);
    }

    #[test]
    fn test_json_body_is_serialized_only_when_present() {
        let without = OutboundRequest::json(Method::GET, "/", None::<&()>).unwrap();
        assert!(without.body.is_none());

        let with = OutboundRequest::json(Method::POST, "/", Some(&json!({"key": "k"}))).unwrap();
        assert_eq!(with.body.unwrap(), Bytes::from_static(br#"{"key":"k"}"#));
    }

    #[test]
    fn test_invalid_header_name_is_rejected() {
        let mut extra = HashMap::new();
        extra.insert("bad header".to_string(), "x".to_string());
        let request = OutboundRequest::json(Method::GET, "/", None::<&()>)
            .unwrap()
            .with_headers(&extra);
        assert!(matches!(
            request.header_map(),
            Err(GatewayError::RequestValidation { .. })
        ));
    }
}
