//! # Middleware Module
//!
//! Inbound request plumbing for the axum server: request context extraction and the
//! `secured` guard.

pub mod auth;

pub use auth::{app_language, extract_bearer_token, secured};
