//! # Single-Item Request Pipeline
//!
//! Shuttles per-item work descriptors from the remote inbox to the local
//! working tree and their two correlated results back.
//!
//! ## Workflow
//!
//! 1. Poll the remote request prefix; a new/updated `<id>.json` is pulled
//!    into the local inbox, marked in-flight (best-effort move to the
//!    processing prefix) and its referenced icon fetched when absent.
//! 2. Track the item as a [`Task`] with two wait-slots: the info result
//!    (`<id>.json`) and the image result (`<icon stem>.json`).
//! 3. Poll the local result directories; a stable artifact is uploaded to
//!    its mirrored prefix, the ancillary remote transition performed
//!    (processing → processed, optional icon cleanup) and the artifact
//!    archived. Each slot retires independently; partial retirement is
//!    normal and can persist across many ticks.
//!
//! ## Failure model
//!
//! Per-item failures are logged and retried on the next tick; a malformed
//! descriptor aborts only itself. The pending tables are private to this
//! pipeline and never persisted; on restart, tasks are re-derived from the
//! local inbox plus one scan of the remote marker prefixes, and anything the
//! tables can no longer explain is still delivered by the reconciliation
//! sweeper.

use relay_traits::store::ObjectStore;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::config::RelayConfig;
use crate::descriptor::Descriptor;
use crate::error::Result;
use crate::fsutil::{self, basename, file_name_string, path_exists, stem_of};
use crate::stability::StabilityProbe;
use crate::task::{derive_state, Task, TaskState};
use crate::watch::WatchTable;

/// Request → two correlated results → archive state machine
pub struct RequestPipeline {
    store: Arc<dyn ObjectStore>,
    config: RelayConfig,
    probe: StabilityProbe,

    /// Remote descriptor name → last-seen store mtime
    remote_seen: WatchTable,

    /// Pending info slots, keyed by descriptor filename (`<id>.json`)
    pending_results: HashMap<String, Task>,

    /// Pending image slots, keyed by icon stem
    pending_image_results: HashMap<String, Task>,
}

impl RequestPipeline {
    pub fn new(store: Arc<dyn ObjectStore>, config: RelayConfig) -> Self {
        let probe = StabilityProbe::new(config.stability_debounce());
        let remote_seen = WatchTable::new(config.mtime_tolerance());
        Self {
            store,
            config,
            probe,
            remote_seen,
            pending_results: HashMap::new(),
            pending_image_results: HashMap::new(),
        }
    }

    /// Run one full scan pass
    pub async fn tick(&mut self) -> Result<()> {
        self.poll_remote_requests().await?;
        self.rebuild_from_local().await?;
        self.deliver_info_results().await?;
        self.retire_archived_info_slots().await;
        self.deliver_image_results().await?;
        self.retire_archived_image_slots().await;
        Ok(())
    }

    /// Configuration this pipeline runs with
    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Pending info slots (observability)
    pub fn pending_info_slots(&self) -> usize {
        self.pending_results.len()
    }

    /// Pending image slots (observability)
    pub fn pending_image_slots(&self) -> usize {
        self.pending_image_results.len()
    }

    #[instrument(skip(self))]
    async fn poll_remote_requests(&mut self) -> Result<()> {
        let keys = self.store.list(&self.config.remote.request_prefix).await?;
        for key in keys {
            if !key.ends_with(".json") {
                continue;
            }
            let name = basename(&key).to_string();

            let mtime = match self.store.last_modified(&key).await {
                Ok(Some(mtime)) => mtime,
                // Vanished between list and stat: another instance or a
                // submitter withdrew it
                Ok(None) => continue,
                Err(e) => {
                    warn!(key = %key, error = %e, "Descriptor stat failed; retrying next tick");
                    continue;
                }
            };
            if !self.remote_seen.is_new_or_updated(&name, mtime) {
                continue;
            }

            let local_path = self.config.local.request().join(&name);
            if let Err(e) = self.store.download(&key, &local_path).await {
                warn!(key = %key, error = %e, "Descriptor download failed; retrying next tick");
                continue;
            }
            self.remote_seen.record(&name, mtime);

            // In-flight marker; best effort, the move's non-atomic window is
            // tolerated by re-deriving state from scans
            let processing_key =
                format!("{}{}", self.config.remote.processing_prefix, name);
            if let Err(e) = self.store.move_object(&key, &processing_key).await {
                warn!(key = %key, error = %e, "request -> processing move failed");
            }

            let descriptor = match Descriptor::load(&local_path).await {
                Ok(descriptor) => descriptor,
                Err(e) => {
                    warn!(key = %key, error = %e, "Skipping malformed descriptor");
                    continue;
                }
            };

            let id = stem_of(&name);
            let task = Task::new(id, descriptor.icon_filename.clone(), Some(processing_key));
            self.fetch_icon_if_missing(&task).await;
            info!(descriptor = %name, icon = ?task.icon_filename, "Task enqueued");
            self.register_task(task, true, true);
        }
        Ok(())
    }

    /// Re-register tasks for local descriptors the tables no longer explain
    /// (process restart). The in-flight marker is re-derived from one scan
    /// of the remote marker prefixes.
    async fn rebuild_from_local(&mut self) -> Result<()> {
        let request_dir = self.config.local.request();
        let mut orphans: Vec<(String, Descriptor, bool, bool)> = Vec::new();

        for path in fsutil::list_files_with_suffix(&request_dir, ".json").await? {
            let Some(name) = file_name_string(&path) else {
                continue;
            };
            if self.pending_results.contains_key(&name) {
                continue;
            }
            let Ok(descriptor) = Descriptor::load(&path).await else {
                continue;
            };
            let stem = descriptor.icon_stem();
            if let Some(stem) = &stem {
                if self.pending_image_results.contains_key(stem) {
                    continue;
                }
            }

            let info_done = path_exists(&self.config.local.bak_results().join(&name)).await;
            let image_done = match &stem {
                None => true,
                Some(stem) => {
                    path_exists(
                        &self
                            .config
                            .local
                            .bak_image_results()
                            .join(format!("{}.json", stem)),
                    )
                    .await
                }
            };
            if info_done && image_done {
                continue;
            }
            orphans.push((name, descriptor, info_done, image_done));
        }

        if orphans.is_empty() {
            return Ok(());
        }

        let mut remote_keys: HashSet<String> = HashSet::new();
        for prefix in [
            &self.config.remote.request_prefix,
            &self.config.remote.processing_prefix,
            &self.config.remote.processed_prefix,
        ] {
            remote_keys.extend(self.store.list(prefix).await?);
        }

        for (name, descriptor, info_done, image_done) in orphans {
            let id = stem_of(&name);
            let state = derive_state(&id, &self.config.remote, &remote_keys, true);
            let processing_key = (state == Some(TaskState::Processing)).then(|| {
                format!("{}{}", self.config.remote.processing_prefix, name)
            });

            let task = Task::new(id, descriptor.icon_filename.clone(), processing_key);
            self.fetch_icon_if_missing(&task).await;
            info!(
                descriptor = %name,
                state = %state.map(|s| s.as_str()).unwrap_or("unknown"),
                "Recovered task from local inbox"
            );
            self.register_task(task, !info_done, !image_done);
        }
        Ok(())
    }

    fn register_task(&mut self, task: Task, need_info: bool, need_image: bool) {
        if need_image {
            if let Some(stem) = task.icon_stem.clone() {
                self.pending_image_results.insert(stem, task.clone());
            }
        }
        if need_info {
            self.pending_results.insert(task.descriptor_name(), task);
        }
    }

    async fn fetch_icon_if_missing(&self, task: &Task) {
        let Some(icon) = &task.icon_filename else {
            return;
        };
        let local_icon = self.config.local.upload_images().join(icon);
        if path_exists(&local_icon).await {
            return;
        }
        let key = format!("{}{}", self.config.remote.images_prefix, icon);
        match self.store.download(&key, &local_icon).await {
            Ok(()) => debug!(icon = %icon, "Icon fetched"),
            Err(e) => {
                warn!(icon = %icon, error = %e, "Icon fetch failed; task stays pending until the icon appears")
            }
        }
    }

    #[instrument(skip(self))]
    async fn deliver_info_results(&mut self) -> Result<()> {
        if self.pending_results.is_empty() {
            return Ok(());
        }
        let dir = self.config.local.info_results();
        for path in fsutil::list_files_with_suffix(&dir, ".json").await? {
            let Some(name) = file_name_string(&path) else {
                continue;
            };
            if !self.pending_results.contains_key(&name) {
                continue;
            }
            if !self.probe.is_stable(&path).await {
                continue;
            }

            let key = format!("{}{}", self.config.remote.info_results_prefix, name);
            if let Err(e) = self.store.upload(&path, &key).await {
                warn!(artifact = %name, error = %e, "Info result upload failed; retrying next tick");
                continue;
            }
            let Some(task) = self.pending_results.remove(&name) else {
                continue;
            };
            self.finish_processing_marker(&task).await;
            if let Err(e) = fsutil::archive_file(&path, &self.config.local.bak_results()).await {
                // Upload already happened; the sweeper re-archives idempotently
                warn!(artifact = %name, error = %e, "Info result archive failed");
            }
            info!(artifact = %name, "Info result delivered");
        }
        Ok(())
    }

    /// Retire info slots whose artifact the sweeper already delivered.
    ///
    /// Only an archive entry at least as new as the task counts: an older
    /// entry is a leftover from a previous same-name round and must not
    /// satisfy the re-armed slot.
    async fn retire_archived_info_slots(&mut self) {
        let bak = self.config.local.bak_results();
        let names: Vec<String> = self.pending_results.keys().cloned().collect();
        for name in names {
            let Ok(Some(archived_at)) = fsutil::modified_time(&bak.join(&name)).await else {
                continue;
            };
            let Some(task) = self.pending_results.get(&name) else {
                continue;
            };
            if archived_at < task.created_at {
                continue;
            }
            if let Some(task) = self.pending_results.remove(&name) {
                self.finish_processing_marker(&task).await;
                info!(artifact = %name, "Info result already swept; slot retired");
            }
        }
    }

    #[instrument(skip(self))]
    async fn deliver_image_results(&mut self) -> Result<()> {
        if self.pending_image_results.is_empty() {
            return Ok(());
        }
        let dir = self.config.local.image_results();
        for path in fsutil::list_files_with_suffix(&dir, ".json").await? {
            let Some(name) = file_name_string(&path) else {
                continue;
            };
            let stem = stem_of(&name);
            if !self.pending_image_results.contains_key(&stem) {
                continue;
            }
            if !self.probe.is_stable(&path).await {
                continue;
            }

            let key = format!("{}{}", self.config.remote.image_results_prefix, name);
            if let Err(e) = self.store.upload(&path, &key).await {
                warn!(artifact = %name, error = %e, "Image result upload failed; retrying next tick");
                continue;
            }
            let Some(task) = self.pending_image_results.remove(&stem) else {
                continue;
            };
            self.cleanup_remote_icon(&task).await;
            if let Err(e) =
                fsutil::archive_file(&path, &self.config.local.bak_image_results()).await
            {
                warn!(artifact = %name, error = %e, "Image result archive failed");
            }
            info!(artifact = %name, "Image result delivered");
        }
        Ok(())
    }

    /// Retire image slots whose artifact the sweeper already delivered.
    /// Same freshness rule as the info side.
    async fn retire_archived_image_slots(&mut self) {
        let bak = self.config.local.bak_image_results();
        let stems: Vec<String> = self.pending_image_results.keys().cloned().collect();
        for stem in stems {
            let archived = bak.join(format!("{}.json", stem));
            let Ok(Some(archived_at)) = fsutil::modified_time(&archived).await else {
                continue;
            };
            let Some(task) = self.pending_image_results.get(&stem) else {
                continue;
            };
            if archived_at < task.created_at {
                continue;
            }
            if let Some(task) = self.pending_image_results.remove(&stem) {
                self.cleanup_remote_icon(&task).await;
                info!(artifact = %stem, "Image result already swept; slot retired");
            }
        }
    }

    /// processing → processed transition; best effort
    async fn finish_processing_marker(&self, task: &Task) {
        let Some(processing_key) = &task.processing_key else {
            return;
        };
        let processed_key = format!(
            "{}{}",
            self.config.remote.processed_prefix,
            task.descriptor_name()
        );
        if let Err(e) = self.store.move_object(processing_key, &processed_key).await {
            warn!(id = %task.id, error = %e, "processing -> processed move failed");
        }
    }

    /// Remove the fetched icon from the store once its result is delivered.
    /// Behavior is configurable; defaults to keeping the icon.
    async fn cleanup_remote_icon(&self, task: &Task) {
        if !self.config.delete_delivered_icons {
            return;
        }
        let Some(icon) = &task.icon_filename else {
            return;
        };
        let key = format!("{}{}", self.config.remote.images_prefix, icon);
        if let Err(e) = self.store.delete(&key).await {
            warn!(icon = %icon, error = %e, "Delivered icon cleanup failed");
        }
    }
}

