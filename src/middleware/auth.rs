//! # Authentication Middleware
//!
//! Builds the [`RequestContext`] handlers pass to the gateway facades, and guards routes that
//! need an authenticated caller.
//!
//! The `secured` middleware:
//! 1. parses `X-App-Language` (default `1`) and echoes it on the response
//! 2. answers `403` when `Authorization` is absent and `401` when it is not a bearer token
//!    or the token is empty
//! 3. resolves the caller through [`UserGateway::get_current_user`]; failure answers `401`
//!    with `{"error":"unauthorized"}`
//! 4. stores the [`RequestContext`] and the [`CurrentUser`] in the request extensions
//!
//! ## Rust Concepts Used
//!
//! - `axum::middleware::from_fn_with_state` for a plain async function middleware
//! - `FromRequestParts` so handlers can take `RequestContext` as an argument
//! - `DropGuard` to cancel outbound calls when the inbound request is dropped

use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::core::types::{parse_app_language, RequestContext, APP_LANGUAGE_HEADER, DEFAULT_APP_LANGUAGE};
use crate::gateway::UserGateway;

const BEARER_PREFIX: &str = "Bearer ";

/// App language of an inbound request
pub fn app_language(headers: &HeaderMap) -> u32 {
    headers
        .get(APP_LANGUAGE_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(|value| parse_app_language(value, DEFAULT_APP_LANGUAGE))
        .unwrap_or(DEFAULT_APP_LANGUAGE)
}

/// Bearer token of an inbound request, if the header carries one
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix(BEARER_PREFIX))
        .map(|rest| rest.split(' ').next().unwrap_or_default().to_string())
        .filter(|token| !token.is_empty())
}

fn context_from_headers(headers: &HeaderMap) -> RequestContext {
    let ctx = RequestContext::new().with_app_language(app_language(headers));
    match extract_bearer_token(headers) {
        Some(token) => ctx.with_token(token),
        None => ctx,
    }
}

/// The context stored by `secured`, or one built from the headers on open routes
#[async_trait]
impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(ctx) = parts.extensions.get::<RequestContext>() {
            return Ok(ctx.clone());
        }
        Ok(context_from_headers(&parts.headers))
    }
}

fn with_language(mut response: Response, language: u32) -> Response {
    if let Ok(value) = HeaderValue::from_str(&language.to_string()) {
        response.headers_mut().insert(APP_LANGUAGE_HEADER, value);
    }
    response
}

/// Require an authenticated caller
pub async fn secured(
    State(users): State<Arc<dyn UserGateway>>,
    mut request: Request,
    next: Next,
) -> Response {
    let language = app_language(request.headers());

    let authorization = match request.headers().get(AUTHORIZATION) {
        Some(value) => value.to_str().unwrap_or_default().to_string(),
        None => {
            debug!(path = %request.uri().path(), "Missing Authorization header");
            return with_language(StatusCode::FORBIDDEN.into_response(), language);
        }
    };
    if authorization.is_empty() {
        return with_language(StatusCode::FORBIDDEN.into_response(), language);
    }

    let Some(rest) = authorization.strip_prefix(BEARER_PREFIX) else {
        debug!(path = %request.uri().path(), "Authorization header is not a bearer token");
        return with_language(StatusCode::UNAUTHORIZED.into_response(), language);
    };
    let token = rest.split(' ').next().unwrap_or_default().to_string();
    if token.is_empty() {
        debug!(path = %request.uri().path(), "Bearer token is empty");
        return with_language(StatusCode::UNAUTHORIZED.into_response(), language);
    }

    // Outbound calls made for this request stop when the request future is dropped
    let cancellation = CancellationToken::new();
    let _cancel_on_drop = cancellation.clone().drop_guard();

    let ctx = RequestContext::new()
        .with_app_language(language)
        .with_token(token)
        .with_cancellation(cancellation);

    let user = match users.get_current_user(&ctx).await {
        Ok(user) => user,
        Err(e) => {
            warn!(path = %request.uri().path(), error = %e, "Failed to resolve current user");
            let response = (StatusCode::UNAUTHORIZED, Json(json!({ "error": "unauthorized" }))).into_response();
            return with_language(response, language);
        }
    };

    let ctx = ctx.with_user_id(user.id.clone());
    request.extensions_mut().insert(ctx);
    request.extensions_mut().insert(user);

    with_language(next.run(request).await, language)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_extraction() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer test-token"));
        assert_eq!(extract_bearer_token(&headers), Some("test-token".to_string()));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(extract_bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(extract_bearer_token(&headers), None);
    }

    #[test]
    fn test_app_language_defaults() {
        let mut headers = HeaderMap::new();
        assert_eq!(app_language(&headers), DEFAULT_APP_LANGUAGE);

        headers.insert(APP_LANGUAGE_HEADER, HeaderValue::from_static("\"2\""));
        assert_eq!(app_language(&headers), 2);

        headers.insert(APP_LANGUAGE_HEADER, HeaderValue::from_static("en"));
        assert_eq!(app_language(&headers), DEFAULT_APP_LANGUAGE);
    }

    #[test]
    fn test_context_from_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        headers.insert(APP_LANGUAGE_HEADER, HeaderValue::from_static("3"));

        let ctx = context_from_headers(&headers);
        assert_eq!(ctx.token(), Some("abc"));
        assert_eq!(ctx.app_language(), Some(3));
    }
}
