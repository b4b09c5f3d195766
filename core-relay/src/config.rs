//! # Relay Configuration
//!
//! Remote prefix layout, local directory layout, and timing knobs for the
//! relay pipelines.
//!
//! ## Overview
//!
//! The default layout is a compatibility contract with the worker and with
//! upstream submitters: prefix and directory names are consumed by filename
//! pattern on both sides and must not drift. Defaults are safe to use as-is;
//! `validate()` fail-fasts on hand-edited configs before any loop starts.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{RelayError, Result};

/// Remote object-store prefix layout
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteLayout {
    /// Inbox of work descriptors (`<id>.json`)
    pub request_prefix: String,

    /// Icons referenced by descriptors
    pub images_prefix: String,

    /// In-flight marker location (descriptor filename, copied)
    pub processing_prefix: String,

    /// Processed marker location (descriptor filename, copied)
    pub processed_prefix: String,

    /// Delivered info results (`<id>.json`)
    pub info_results_prefix: String,

    /// Delivered image results (`<icon stem>.json`)
    pub image_results_prefix: String,

    /// Sample-manifest inbox (side channel)
    pub add_samples_prefix: String,

    /// Completed sample manifests
    pub add_sample_processed_prefix: String,

    /// Batch manifest inbox (`<name>.txt`, one id per line)
    pub request_by_hash_prefix: String,

    /// Batch summaries (same filename as the manifest)
    pub request_by_hash_done_prefix: String,
}

impl Default for RemoteLayout {
    fn default() -> Self {
        Self {
            request_prefix: "iconml/request/".to_string(),
            images_prefix: "iconml/images/".to_string(),
            processing_prefix: "iconml/processing/".to_string(),
            processed_prefix: "iconml/processed/".to_string(),
            info_results_prefix: "iconml/inforesults/".to_string(),
            image_results_prefix: "iconml/imageresults/".to_string(),
            add_samples_prefix: "iconml/addsamples/".to_string(),
            add_sample_processed_prefix: "iconml/addsampleprocessed/".to_string(),
            request_by_hash_prefix: "iconml/requestbyhash/".to_string(),
            request_by_hash_done_prefix: "iconml/requestbyhashdone/".to_string(),
        }
    }
}

impl RemoteLayout {
    fn prefixes(&self) -> [(&'static str, &str); 10] {
        [
            ("request_prefix", &self.request_prefix),
            ("images_prefix", &self.images_prefix),
            ("processing_prefix", &self.processing_prefix),
            ("processed_prefix", &self.processed_prefix),
            ("info_results_prefix", &self.info_results_prefix),
            ("image_results_prefix", &self.image_results_prefix),
            ("add_samples_prefix", &self.add_samples_prefix),
            ("add_sample_processed_prefix", &self.add_sample_processed_prefix),
            ("request_by_hash_prefix", &self.request_by_hash_prefix),
            ("request_by_hash_done_prefix", &self.request_by_hash_done_prefix),
        ]
    }
}

/// Local working-tree layout shared with the worker
///
/// Every role is a single flat directory scanned by filename pattern.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalLayout {
    /// Root of the working tree; all role directories live directly under it
    pub root: PathBuf,

    /// Descriptor inbox read by the worker
    pub request_dir: String,

    /// Fetched-icon cache read by the worker
    pub upload_images_dir: String,

    /// Info results written by the worker
    pub info_results_dir: String,

    /// Image results written by the worker
    pub image_results_dir: String,

    /// Archive of delivered info results
    pub bak_results_dir: String,

    /// Archive of delivered image results
    pub bak_image_results_dir: String,

    /// Sample-manifest inbox handed to the worker
    pub add_samples_dir: String,

    /// Completed sample manifests produced by the worker
    pub add_sample_processed_dir: String,

    /// Archive of delivered sample manifests
    pub bak_add_sample_processed_dir: String,

    /// Batch manifests pulled from the store
    pub request_by_hash_dir: String,

    /// Batch summaries before upload
    pub request_by_hash_done_dir: String,

    /// Archive of batch manifests and summaries
    pub bak_request_by_hash_done_dir: String,
}

impl Default for LocalLayout {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            request_dir: "request".to_string(),
            upload_images_dir: "uploadimages".to_string(),
            info_results_dir: "inforesults".to_string(),
            image_results_dir: "imageresults".to_string(),
            bak_results_dir: "bakresults".to_string(),
            bak_image_results_dir: "bakimageresults".to_string(),
            add_samples_dir: "addsamples".to_string(),
            add_sample_processed_dir: "addsampleprocessed".to_string(),
            bak_add_sample_processed_dir: "bakaddsampleprocessed".to_string(),
            request_by_hash_dir: "requestbyhash".to_string(),
            request_by_hash_done_dir: "requestbyhashdone".to_string(),
            bak_request_by_hash_done_dir: "bakrequestbyhashdone".to_string(),
        }
    }
}

impl LocalLayout {
    pub fn request(&self) -> PathBuf {
        self.root.join(&self.request_dir)
    }

    pub fn upload_images(&self) -> PathBuf {
        self.root.join(&self.upload_images_dir)
    }

    pub fn info_results(&self) -> PathBuf {
        self.root.join(&self.info_results_dir)
    }

    pub fn image_results(&self) -> PathBuf {
        self.root.join(&self.image_results_dir)
    }

    pub fn bak_results(&self) -> PathBuf {
        self.root.join(&self.bak_results_dir)
    }

    pub fn bak_image_results(&self) -> PathBuf {
        self.root.join(&self.bak_image_results_dir)
    }

    pub fn add_samples(&self) -> PathBuf {
        self.root.join(&self.add_samples_dir)
    }

    pub fn add_sample_processed(&self) -> PathBuf {
        self.root.join(&self.add_sample_processed_dir)
    }

    pub fn bak_add_sample_processed(&self) -> PathBuf {
        self.root.join(&self.bak_add_sample_processed_dir)
    }

    pub fn request_by_hash(&self) -> PathBuf {
        self.root.join(&self.request_by_hash_dir)
    }

    pub fn request_by_hash_done(&self) -> PathBuf {
        self.root.join(&self.request_by_hash_done_dir)
    }

    pub fn bak_request_by_hash_done(&self) -> PathBuf {
        self.root.join(&self.bak_request_by_hash_done_dir)
    }

    fn dir_names(&self) -> [(&'static str, &str); 12] {
        [
            ("request_dir", &self.request_dir),
            ("upload_images_dir", &self.upload_images_dir),
            ("info_results_dir", &self.info_results_dir),
            ("image_results_dir", &self.image_results_dir),
            ("bak_results_dir", &self.bak_results_dir),
            ("bak_image_results_dir", &self.bak_image_results_dir),
            ("add_samples_dir", &self.add_samples_dir),
            ("add_sample_processed_dir", &self.add_sample_processed_dir),
            (
                "bak_add_sample_processed_dir",
                &self.bak_add_sample_processed_dir,
            ),
            ("request_by_hash_dir", &self.request_by_hash_dir),
            ("request_by_hash_done_dir", &self.request_by_hash_done_dir),
            (
                "bak_request_by_hash_done_dir",
                &self.bak_request_by_hash_done_dir,
            ),
        ]
    }

    /// All role directories as absolute paths
    pub fn all_dirs(&self) -> Vec<PathBuf> {
        self.dir_names()
            .iter()
            .map(|(_, name)| self.root.join(name))
            .collect()
    }

    /// Create every role directory
    pub async fn ensure_dirs(&self) -> std::io::Result<()> {
        for dir in self.all_dirs() {
            tokio::fs::create_dir_all(&dir).await?;
        }
        Ok(())
    }
}

/// Relay engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Remote prefix layout
    pub remote: RemoteLayout,

    /// Local directory layout
    pub local: LocalLayout,

    /// Poll interval for remote prefix scans (seconds)
    pub remote_poll_secs: f64,

    /// Poll interval for local directory scans (seconds)
    pub local_poll_secs: f64,

    /// Debounce window of the stability probe (seconds)
    pub stability_debounce_secs: f64,

    /// Skew tolerance when comparing observed against recorded mtimes
    /// (seconds); absorbs clock/storage granularity differences
    pub mtime_tolerance_secs: f64,

    /// Completion deadline for a batch, measured from manifest pull (seconds)
    pub batch_deadline_secs: f64,

    /// Sleep after a failed tick before the loop resumes (seconds)
    pub error_backoff_secs: f64,

    /// Whether a delivered image result also deletes the fetched icon from
    /// the remote images prefix
    pub delete_delivered_icons: bool,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            remote: RemoteLayout::default(),
            local: LocalLayout::default(),
            remote_poll_secs: 2.0,
            local_poll_secs: 1.0,
            stability_debounce_secs: 0.2,
            mtime_tolerance_secs: 1.0,
            batch_deadline_secs: 30.0 * 60.0,
            error_backoff_secs: 1.0,
            delete_delivered_icons: false,
        }
    }
}

impl RelayConfig {
    pub fn remote_poll_interval(&self) -> Duration {
        Duration::from_secs_f64(self.remote_poll_secs)
    }

    pub fn local_poll_interval(&self) -> Duration {
        Duration::from_secs_f64(self.local_poll_secs)
    }

    pub fn stability_debounce(&self) -> Duration {
        Duration::from_secs_f64(self.stability_debounce_secs)
    }

    pub fn mtime_tolerance(&self) -> Duration {
        Duration::from_secs_f64(self.mtime_tolerance_secs)
    }

    pub fn batch_deadline(&self) -> Duration {
        Duration::from_secs_f64(self.batch_deadline_secs)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_secs_f64(self.error_backoff_secs)
    }

    /// Fail-fast validation of a loaded configuration
    pub fn validate(&self) -> Result<()> {
        for (field, prefix) in self.remote.prefixes() {
            if prefix.is_empty() {
                return Err(RelayError::Config(format!("remote.{} is empty", field)));
            }
            if !prefix.ends_with('/') {
                return Err(RelayError::Config(format!(
                    "remote.{} must end with '/': {}",
                    field, prefix
                )));
            }
        }

        for (field, name) in self.local.dir_names() {
            if name.is_empty() {
                return Err(RelayError::Config(format!("local.{} is empty", field)));
            }
            if name.contains('/') || name.contains(std::path::MAIN_SEPARATOR) {
                return Err(RelayError::Config(format!(
                    "local.{} must be a bare directory name: {}",
                    field, name
                )));
            }
        }

        for (field, value) in [
            ("remote_poll_secs", self.remote_poll_secs),
            ("local_poll_secs", self.local_poll_secs),
            ("batch_deadline_secs", self.batch_deadline_secs),
            ("error_backoff_secs", self.error_backoff_secs),
        ] {
            if value <= 0.0 || !value.is_finite() {
                return Err(RelayError::Config(format!(
                    "{} must be positive: {}",
                    field, value
                )));
            }
        }
        if self.stability_debounce_secs < 0.0 || !self.stability_debounce_secs.is_finite() {
            return Err(RelayError::Config(format!(
                "stability_debounce_secs must be non-negative: {}",
                self.stability_debounce_secs
            )));
        }
        if self.mtime_tolerance_secs < 0.0 || !self.mtime_tolerance_secs.is_finite() {
            return Err(RelayError::Config(format!(
                "mtime_tolerance_secs must be non-negative: {}",
                self.mtime_tolerance_secs
            )));
        }

        Ok(())
    }
}
