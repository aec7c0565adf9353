//! # Core Module
//!
//! Building blocks used by every other module: the error type, configuration loading and
//! the shared data types.

pub mod config;
pub mod error;
pub mod types;
