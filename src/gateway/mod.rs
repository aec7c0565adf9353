//! # Gateway Module
//!
//! Typed access to the main service. [`GatewayClient`] performs the resolved HTTP round trip;
//! the facades ([`UserGateway`], [`MenuGateway`]) add the fixed verb and path of each remote
//! capability, envelope decoding and, for a subset of user lookups, the read-through cache.
//!
//! ## Rust Concepts Used
//!
//! - `async_trait` so facades can be swapped for fakes behind `Arc<dyn UserGateway>`
//! - Generic decode helpers (`T: DeserializeOwned`) instead of one copy per payload type
//! - Errors wrapped with the operation name via [`GatewayError::remote`]

pub mod client;
pub mod dto;
pub mod envelope;
pub mod menu;
pub mod user;

pub use client::{GatewayClient, OutboundRequest};
pub use envelope::{decode_envelope, decode_envelope_list, GatewayEnvelope};
pub use menu::{MenuGateway, MenuGatewayImpl};
pub use user::{UserGateway, UserGatewayImpl};

use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::core::error::{GatewayError, GatewayResult};
use crate::core::types::RequestContext;

/// Bearer token of the calling request, or [`GatewayError::MissingToken`]
///
/// An empty token is treated as absent; no request ever leaves without credentials.
pub(crate) fn require_token(ctx: &RequestContext) -> GatewayResult<&str> {
    ctx.token()
        .filter(|token| !token.is_empty())
        .ok_or(GatewayError::MissingToken)
}

/// Authenticated call whose envelope payload decodes into `T`
pub(crate) async fn fetch_enveloped<T, B>(
    client: &GatewayClient,
    ctx: &RequestContext,
    operation: &str,
    method: Method,
    path: &str,
    body: Option<&B>,
) -> GatewayResult<T>
where
    T: DeserializeOwned,
    B: Serialize + ?Sized,
{
    require_token(ctx)?;
    let raw = client
        .call(ctx, method, path, body, &ctx.forwarded_headers())
        .await
        .map_err(|e| GatewayError::remote(operation, e))?;
    decode_envelope(&raw).map_err(|e| GatewayError::remote(operation, e))
}

/// Authenticated call whose envelope payload is a list; `null` decodes as empty
pub(crate) async fn fetch_enveloped_list<T, B>(
    client: &GatewayClient,
    ctx: &RequestContext,
    operation: &str,
    method: Method,
    path: &str,
    body: Option<&B>,
) -> GatewayResult<Vec<T>>
where
    T: DeserializeOwned,
    B: Serialize + ?Sized,
{
    require_token(ctx)?;
    let raw = client
        .call(ctx, method, path, body, &ctx.forwarded_headers())
        .await
        .map_err(|e| GatewayError::remote(operation, e))?;
    decode_envelope_list(&raw).map_err(|e| GatewayError::remote(operation, e))
}
