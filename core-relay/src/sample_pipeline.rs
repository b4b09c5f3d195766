//! # Sample Side-Channel Pipeline
//!
//! Manifest in → externally produced manifest out → archive. No correlation
//! against per-item results: the worker consumes a sample manifest from the
//! local inbox and writes a same-named completion artifact when it has
//! folded the samples into its index. Completion is binary per manifest.

use relay_traits::store::ObjectStore;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::config::RelayConfig;
use crate::error::Result;
use crate::fsutil::{self, basename, file_name_string, path_exists};
use crate::stability::StabilityProbe;
use crate::watch::WatchTable;

/// Sample manifest relay
pub struct SamplePipeline {
    store: Arc<dyn ObjectStore>,
    config: RelayConfig,
    probe: StabilityProbe,

    /// Remote manifest name → last-seen store mtime
    remote_seen: WatchTable,

    /// Pending manifests: local name → remote source key
    pending: HashMap<String, String>,
}

impl SamplePipeline {
    pub fn new(store: Arc<dyn ObjectStore>, config: RelayConfig) -> Self {
        let probe = StabilityProbe::new(config.stability_debounce());
        let remote_seen = WatchTable::new(config.mtime_tolerance());
        Self {
            store,
            config,
            probe,
            remote_seen,
            pending: HashMap::new(),
        }
    }

    /// Run one full scan pass
    pub async fn tick(&mut self) -> Result<()> {
        self.pull_sample_manifests().await?;
        self.deliver_processed_manifests().await?;
        Ok(())
    }

    /// Configuration this pipeline runs with
    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Pending manifests (observability)
    pub fn pending_manifests(&self) -> usize {
        self.pending.len()
    }

    #[instrument(skip(self))]
    async fn pull_sample_manifests(&mut self) -> Result<()> {
        let keys = self
            .store
            .list(&self.config.remote.add_samples_prefix)
            .await?;
        for key in keys {
            if !key.ends_with(".txt") {
                continue;
            }
            let name = basename(&key).to_string();

            let mtime = match self.store.last_modified(&key).await {
                Ok(Some(mtime)) => mtime,
                Ok(None) => continue,
                Err(e) => {
                    warn!(key = %key, error = %e, "Sample manifest stat failed; retrying next tick");
                    continue;
                }
            };
            let local_path = self.config.local.add_samples().join(&name);
            // Same-name overwrite re-arms the manifest; a lost local copy is
            // also refetched
            if !self.remote_seen.is_new_or_updated(&name, mtime)
                && path_exists(&local_path).await
            {
                continue;
            }

            if let Err(e) = self.store.download(&key, &local_path).await {
                warn!(key = %key, error = %e, "Sample manifest download failed; retrying next tick");
                continue;
            }
            self.remote_seen.record(&name, mtime);
            self.pending.insert(name.clone(), key);
            info!(manifest = %name, "Sample manifest enqueued");
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn deliver_processed_manifests(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let dir = self.config.local.add_sample_processed();
        for path in fsutil::list_files_with_suffix(&dir, ".txt").await? {
            let Some(name) = file_name_string(&path) else {
                continue;
            };
            if !self.pending.contains_key(&name) {
                continue;
            }
            if !self.probe.is_stable(&path).await {
                continue;
            }

            let done_key = format!(
                "{}{}",
                self.config.remote.add_sample_processed_prefix, name
            );
            if let Err(e) = self.store.upload(&path, &done_key).await {
                warn!(manifest = %name, error = %e, "Processed manifest upload failed; retrying next tick");
                continue;
            }

            let Some(source_key) = self.pending.remove(&name) else {
                continue;
            };
            if let Err(e) = self.store.delete(&source_key).await {
                warn!(key = %source_key, error = %e, "Sample manifest cleanup failed");
            }

            let bak = self.config.local.bak_add_sample_processed();
            if let Err(e) = fsutil::archive_file(&path, &bak).await {
                warn!(manifest = %name, error = %e, "Processed manifest archive failed");
            }
            let original = self.config.local.add_samples().join(&name);
            if path_exists(&original).await {
                if let Err(e) = fsutil::archive_file(&original, &bak).await {
                    warn!(manifest = %name, error = %e, "Sample manifest archive failed");
                }
            }
            info!(manifest = %name, "Sample manifest delivered");
        }
        Ok(())
    }
}
