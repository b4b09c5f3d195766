//! # Relay Trait Abstractions
//!
//! Platform-agnostic traits decoupling the relay engine from concrete
//! object-store providers and HTTP transports.
//!
//! ## Overview
//!
//! The relay engine synchronizes a local working tree with a remote object
//! store through exactly one seam: the [`ObjectStore`] trait. Connectors for
//! real stores implement it over an [`HttpClient`]; test and mounted-share
//! deployments implement it over a directory tree.
//!
//! ## Modules
//!
//! - **`error`**: `StoreError` and the crate `Result` alias
//! - **`http`**: HTTP request/response types and the `HttpClient` trait
//! - **`store`**: the `ObjectStore` contract

pub mod error;
pub mod http;
pub mod store;

pub use error::{Result, StoreError};
pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
pub use store::ObjectStore;
