//! # Batch Pipeline
//!
//! Manifest-of-ids → barrier-wait over many single items → summary artifact.
//!
//! ## Workflow
//!
//! A manifest (`<name>.txt`, one id per line) pulled from the batch inbox
//! opens a completion barrier over its member ids. Every tick re-checks each
//! member independently against the local working tree: a member is
//! satisfied when its descriptor was produced locally and both of its result
//! artifacts exist (in the result directory or already archived). The batch
//! finalizes when every member is satisfied or its deadline elapses,
//! whichever comes first.
//!
//! Finalization writes a human-readable summary under the manifest's own
//! name, uploads it to the done prefix, deletes the remote manifest, and
//! archives summary and manifest locally. Deadline finalization is a
//! deliberate partial-success outcome: completed members are reported as
//! completed, the rest as pending. It is never an error.
//!
//! Resubmitting a manifest under the same name with a newer mtime replaces
//! the prior membership and restarts the clock. An id whose descriptor
//! never appears is indistinguishable from "still in progress" and is
//! reported pending.

use chrono::Utc;
use relay_traits::store::ObjectStore;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::config::RelayConfig;
use crate::descriptor::{parse_manifest, Descriptor};
use crate::error::Result;
use crate::fsutil::{self, basename, path_exists};
use crate::watch::WatchTable;

/// One open completion barrier
#[derive(Debug)]
struct Batch {
    /// Member ids in first-seen manifest order
    members: Vec<String>,
    started_at: Instant,
}

/// Manifest pull → barrier wait → summary state machine
pub struct BatchPipeline {
    store: Arc<dyn ObjectStore>,
    config: RelayConfig,

    /// Remote manifest name → last-seen store mtime
    manifest_seen: WatchTable,

    /// Open batches by manifest name
    batches: HashMap<String, Batch>,
}

impl BatchPipeline {
    pub fn new(store: Arc<dyn ObjectStore>, config: RelayConfig) -> Self {
        let manifest_seen = WatchTable::new(config.mtime_tolerance());
        Self {
            store,
            config,
            manifest_seen,
            batches: HashMap::new(),
        }
    }

    /// Run one full scan pass
    pub async fn tick(&mut self) -> Result<()> {
        self.pull_manifests().await?;
        self.finalize_ready().await;
        Ok(())
    }

    /// Configuration this pipeline runs with
    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Open batches (observability)
    pub fn open_batches(&self) -> usize {
        self.batches.len()
    }

    #[instrument(skip(self))]
    async fn pull_manifests(&mut self) -> Result<()> {
        let keys = self
            .store
            .list(&self.config.remote.request_by_hash_prefix)
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
                    warn!(key = %key, error = %e, "Manifest stat failed; retrying next tick");
                    continue;
                }
            };
            if !self.manifest_seen.is_new_or_updated(&name, mtime) {
                continue;
            }

            let local_path = self.config.local.request_by_hash().join(&name);
            if let Err(e) = self.store.download(&key, &local_path).await {
                warn!(key = %key, error = %e, "Manifest download failed; retrying next tick");
                continue;
            }
            self.manifest_seen.record(&name, mtime);

            let content = match tokio::fs::read_to_string(&local_path).await {
                Ok(content) => content,
                Err(e) => {
                    warn!(manifest = %name, error = %e, "Manifest unreadable; skipped");
                    continue;
                }
            };
            let members = parse_manifest(&content);
            if members.is_empty() {
                warn!(manifest = %name, "Manifest has no ids; skipped");
                continue;
            }

            // Same-name resubmission replaces the prior membership and
            // restarts the deadline clock
            let replaced = self.batches.contains_key(&name);
            info!(
                manifest = %name,
                members = members.len(),
                replaced,
                "Batch opened"
            );
            self.batches.insert(
                name,
                Batch {
                    members,
                    started_at: Instant::now(),
                },
            );
        }
        Ok(())
    }

    async fn finalize_ready(&mut self) {
        let deadline = self.config.batch_deadline();
        let names: Vec<String> = self.batches.keys().cloned().collect();

        for name in names {
            let Some(batch) = self.batches.get(&name) else {
                continue;
            };

            let mut completed = Vec::new();
            let mut pending = Vec::new();
            for id in &batch.members {
                if self.member_satisfied(id).await {
                    completed.push(id.clone());
                } else {
                    pending.push(id.clone());
                }
            }

            let expired = batch.started_at.elapsed() >= deadline;
            if !pending.is_empty() && !expired {
                debug!(
                    manifest = %name,
                    completed = completed.len(),
                    pending = pending.len(),
                    "Batch still waiting"
                );
                continue;
            }

            match self.finalize(&name, &completed, &pending).await {
                Ok(()) => {
                    self.batches.remove(&name);
                    info!(
                        manifest = %name,
                        completed = completed.len(),
                        pending = pending.len(),
                        expired,
                        "Batch finalized"
                    );
                }
                Err(e) => {
                    warn!(manifest = %name, error = %e, "Batch finalization failed; retrying next tick");
                }
            }
        }
    }

    /// Whether both result artifacts of a member id exist locally.
    ///
    /// Results may still sit in their result directory or already be
    /// archived; either counts. A missing or unreadable descriptor reports
    /// the member pending, not failed.
    async fn member_satisfied(&self, id: &str) -> bool {
        let descriptor_name = format!("{}.json", id);
        let descriptor_path = self.config.local.request().join(&descriptor_name);
        let Ok(descriptor) = Descriptor::load(&descriptor_path).await else {
            return false;
        };

        let info_present = path_exists(&self.config.local.info_results().join(&descriptor_name))
            .await
            || path_exists(&self.config.local.bak_results().join(&descriptor_name)).await;
        if !info_present {
            return false;
        }

        match descriptor.icon_stem() {
            None => true,
            Some(stem) => {
                let image_name = format!("{}.json", stem);
                path_exists(&self.config.local.image_results().join(&image_name)).await
                    || path_exists(&self.config.local.bak_image_results().join(&image_name)).await
            }
        }
    }

    /// Produce, deliver and archive the summary, then archive the manifest.
    ///
    /// Remote steps come first so a partial failure retries the whole
    /// sequence next tick (uploads are idempotent); the local archive runs
    /// last and therefore exactly once.
    async fn finalize(&self, name: &str, completed: &[String], pending: &[String]) -> Result<()> {
        let summary = render_summary(name, completed, pending);
        let local_done = self.config.local.request_by_hash_done().join(name);
        if let Some(parent) = local_done.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&local_done, summary).await?;

        let done_key = format!(
            "{}{}",
            self.config.remote.request_by_hash_done_prefix, name
        );
        self.store.upload(&local_done, &done_key).await?;

        // Remove the remote manifest so a restarted relay (empty watch
        // table) cannot re-run the batch
        let manifest_key = format!("{}{}", self.config.remote.request_by_hash_prefix, name);
        self.store.delete(&manifest_key).await?;

        let bak = self.config.local.bak_request_by_hash_done();
        fsutil::archive_file(&local_done, &bak).await?;

        let local_manifest = self.config.local.request_by_hash().join(name);
        if path_exists(&local_manifest).await {
            if let Err(e) = fsutil::archive_file(&local_manifest, &bak).await {
                warn!(manifest = %name, error = %e, "Manifest archive failed");
            }
        }
        Ok(())
    }
}

/// Render the completion summary.
///
/// The two id lists partition the member set; each id appears exactly once.
fn render_summary(name: &str, completed: &[String], pending: &[String]) -> String {
    let mut lines = vec![
        format!("# requestbyhash summary: {}", name),
        format!("# generated: {}", Utc::now().to_rfc3339()),
        format!("SUCCESS COMPLETED ({}): {}", completed.len(), completed.join(", "))
            .trim_end()
            .to_string(),
        format!("PENDING_OR_TIMEOUT ({}): {}", pending.len(), pending.join(", "))
            .trim_end()
            .to_string(),
    ];
    lines.push(String::new());
    lines.join("\n")
}
