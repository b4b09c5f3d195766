//! # Swift Provider
//!
//! Implements the `ObjectStore` trait for OpenStack-Swift-compatible
//! object stores.
//!
//! ## Overview
//!
//! This module provides:
//! - Marker-based paginated container listing
//! - Object stat, transfer, delete and server-side copy
//! - Token-header authentication
//! - Rate limiting and exponential backoff
//!
//! The reqwest-backed transport ships behind the default `reqwest-client`
//! feature; hosts with their own transport disable it and supply an
//! `HttpClient` implementation.

pub mod connector;
pub mod error;
#[cfg(feature = "reqwest-client")]
pub mod http;
pub mod types;

pub use connector::SwiftConnector;
pub use error::{Result, SwiftError};
#[cfg(feature = "reqwest-client")]
pub use http::ReqwestHttpClient;
