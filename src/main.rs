//! IconML relay daemon
//!
//! Wires a configuration, an object-store provider and the relay
//! coordinator together, then runs the pipeline loops until a shutdown
//! signal arrives.
//!
//! Environment:
//! - `ICONML_RELAY_CONFIG`: optional path to a JSON [`RelayConfig`] file
//! - `ICONML_RELAY_ROOT`: overrides the local working-tree root
//! - `ICONML_RELAY_STORE`: provider selector:
//!   `dir:<path>` for a mounted directory tree, or
//!   `swift:<storage-url>|<container>[|<token-env-var>]` for a
//!   Swift-compatible store
//! - `RUST_LOG`, `ICONML_RELAY_LOG_FORMAT`: logging (see `logging`)

mod logging;

use anyhow::{bail, Context, Result};
use core_relay::{RelayConfig, RelayCoordinator};
use provider_localdir::LocalDirStore;
use provider_swift::{ReqwestHttpClient, SwiftConnector};
use relay_traits::store::ObjectStore;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

fn load_config() -> Result<RelayConfig> {
    let mut config = match std::env::var("ICONML_RELAY_CONFIG") {
        Ok(path) => {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file {}", path))?;
            serde_json::from_str(&raw)
                .with_context(|| format!("Failed to parse config file {}", path))?
        }
        Err(_) => RelayConfig::default(),
    };

    if let Ok(root) = std::env::var("ICONML_RELAY_ROOT") {
        config.local.root = PathBuf::from(root);
    }
    Ok(config)
}

fn build_store() -> Result<Arc<dyn ObjectStore>> {
    let selector = std::env::var("ICONML_RELAY_STORE").context(
        "ICONML_RELAY_STORE is not set; use `dir:<path>` or \
         `swift:<storage-url>|<container>[|<token-env-var>]`",
    )?;

    if let Some(path) = selector.strip_prefix("dir:") {
        info!(root = %path, "Using directory-backed store");
        return Ok(Arc::new(LocalDirStore::new(path)));
    }

    if let Some(rest) = selector.strip_prefix("swift:") {
        let mut parts = rest.split('|');
        let (Some(storage_url), Some(container)) = (parts.next(), parts.next()) else {
            bail!("Malformed swift selector: {}", selector);
        };
        let token = match parts.next() {
            Some(token_env) => std::env::var(token_env).with_context(|| {
                format!("Token environment variable {} is not set", token_env)
            })?,
            None => String::new(),
        };
        info!(endpoint = %storage_url, container = %container, "Using Swift store");
        let http_client = Arc::new(ReqwestHttpClient::new());
        return Ok(Arc::new(SwiftConnector::new(
            http_client,
            storage_url,
            container,
            token,
        )));
    }

    bail!("Unknown store selector: {}", selector);
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init(logging::LogFormat::from_env())?;

    let config = load_config()?;
    let store = build_store()?;
    let coordinator = RelayCoordinator::new(config, store)?;

    let shutdown = coordinator.shutdown_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received");
            shutdown.cancel();
        }
    });

    coordinator.run().await?;
    Ok(())
}
