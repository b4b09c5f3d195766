//! # Reconciliation Sweeper
//!
//! Unconditional incremental uploader over the two result directories.
//!
//! The pipelines' pending tables are in-memory only; a restart loses them.
//! The sweeper guarantees delivery anyway: any stable result file whose
//! mtime exceeds the last time that exact file was swept is uploaded to its
//! mirrored remote prefix and archived, regardless of whether any pending
//! entry references it. Re-uploads are idempotent, so racing the request
//! pipeline over the same artifact is harmless.

use relay_traits::store::ObjectStore;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};

use crate::config::RelayConfig;
use crate::error::Result;
use crate::fsutil::{self, file_name_string};
use crate::stability::StabilityProbe;
use crate::watch::WatchTable;

/// Queue-independent result uploader
pub struct ResultSweeper {
    store: Arc<dyn ObjectStore>,
    config: RelayConfig,
    probe: StabilityProbe,

    /// Remote-key-scoped file name → mtime at last successful sweep.
    /// Zero tolerance: only local mtimes are compared against each other.
    swept: WatchTable,
}

impl ResultSweeper {
    pub fn new(store: Arc<dyn ObjectStore>, config: RelayConfig) -> Self {
        let probe = StabilityProbe::new(config.stability_debounce());
        Self {
            store,
            config,
            probe,
            swept: WatchTable::new(Duration::ZERO),
        }
    }

    /// Configuration this sweeper runs with
    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Run one full sweep pass
    pub async fn tick(&mut self) -> Result<()> {
        let info_dir = self.config.local.info_results();
        let info_prefix = self.config.remote.info_results_prefix.clone();
        let info_bak = self.config.local.bak_results();
        self.sweep_dir(&info_dir, &info_prefix, &info_bak).await?;

        let image_dir = self.config.local.image_results();
        let image_prefix = self.config.remote.image_results_prefix.clone();
        let image_bak = self.config.local.bak_image_results();
        self.sweep_dir(&image_dir, &image_prefix, &image_bak).await?;
        Ok(())
    }

    #[instrument(skip(self, dir, bak_dir), fields(prefix = %prefix))]
    async fn sweep_dir(&mut self, dir: &Path, prefix: &str, bak_dir: &PathBuf) -> Result<()> {
        for path in fsutil::list_files_with_suffix(dir, ".json").await? {
            let Some(name) = file_name_string(&path) else {
                continue;
            };
            if !self.probe.is_stable(&path).await {
                continue;
            }
            let Some(mtime) = fsutil::modified_time(&path).await? else {
                // Raced away by the request pipeline's archive move
                continue;
            };

            // Scope by remote key so same-named files in the two result
            // directories track independently
            let key = format!("{}{}", prefix, name);
            if !self.swept.is_new_or_updated(&key, mtime) {
                continue;
            }

            if let Err(e) = self.store.upload(&path, &key).await {
                warn!(artifact = %name, error = %e, "Sweep upload failed; retrying next tick");
                continue;
            }
            if let Err(e) = fsutil::archive_file(&path, bak_dir).await {
                // Not recorded as swept: the next pass re-uploads
                // idempotently and retries the archive
                warn!(artifact = %name, error = %e, "Sweep archive failed");
                continue;
            }
            self.swept.record(&key, mtime);
            info!(artifact = %name, key = %key, "Swept untracked result");
        }
        Ok(())
    }
}
