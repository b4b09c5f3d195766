//! # File Stability Probe
//!
//! Decides when a filesystem entry has finished being written.
//!
//! Result artifacts are produced by an external worker whose writes are not
//! atomic from the relay's viewpoint; shipping a half-written file would
//! propagate corrupt data upstream. The probe samples the file size twice
//! across a short debounce window and only reports stable when the size is
//! nonzero and unchanged.

use std::path::Path;
use std::time::Duration;
use tokio::fs;

/// Two-sample size probe with a fixed debounce window
#[derive(Debug, Clone)]
pub struct StabilityProbe {
    debounce: Duration,
}

impl StabilityProbe {
    pub fn new(debounce: Duration) -> Self {
        Self { debounce }
    }

    /// Whether `path` looks fully written.
    ///
    /// A file that disappears mid-check (raced by another consumer) is
    /// reported not-stable, not an error.
    pub async fn is_stable(&self, path: &Path) -> bool {
        let first = match fs::metadata(path).await {
            Ok(metadata) => metadata.len(),
            Err(_) => return false,
        };

        tokio::time::sleep(self.debounce).await;

        let second = match fs::metadata(path).await {
            Ok(metadata) => metadata.len(),
            Err(_) => return false,
        };

        first == second && first > 0
    }
}
