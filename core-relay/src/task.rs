//! # Task Tracking
//!
//! In-memory bookkeeping for one unit of work flowing through the
//! single-item pipeline, plus the explicit state derivation the directories
//! encode.
//!
//! ## State Machine
//!
//! ```text
//! Discovered → Fetched → Processing → Processed
//! ```
//!
//! The directories themselves are the single source of truth: a tracked id's
//! state is a pure function of which prefix currently holds its descriptor
//! filename and whether the descriptor was downloaded locally. Tasks are
//! never persisted; after a restart [`derive_state`] recovers what the
//! directories still encode and the reconciliation sweeper recovers the
//! rest.

use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::path::Path;

use crate::config::RemoteLayout;

/// One tracked unit of work with two independently retired result slots
///
/// The info slot is keyed by the descriptor filename (`<id>.json`), the
/// image slot by the icon stem. Either may retire first; the task is done
/// when both are.
#[derive(Debug, Clone)]
pub struct Task {
    /// Opaque id (descriptor filename stem)
    pub id: String,

    /// Referenced icon filename, when the descriptor names one
    pub icon_filename: Option<String>,

    /// Icon filename without extension, the image-result key
    pub icon_stem: Option<String>,

    /// Remote in-flight marker, when the processing move was attempted
    pub processing_key: Option<String>,

    pub created_at: DateTime<Utc>,
}

impl Task {
    pub fn new(
        id: impl Into<String>,
        icon_filename: Option<String>,
        processing_key: Option<String>,
    ) -> Self {
        let icon_stem = icon_filename.as_deref().map(|icon| {
            Path::new(icon)
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_else(|| icon.to_string())
        });
        Self {
            id: id.into(),
            icon_filename,
            icon_stem,
            processing_key,
            created_at: Utc::now(),
        }
    }

    /// Descriptor filename: `<id>.json`
    pub fn descriptor_name(&self) -> String {
        format!("{}.json", self.id)
    }
}

/// Lifecycle position of a tracked id, encoded by directory location
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Descriptor visible in the remote inbox, nothing pulled yet
    Discovered,
    /// Descriptor (and icon, when referenced) present locally
    Fetched,
    /// Remote in-flight marker set
    Processing,
    /// Remote processed marker set
    Processed,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Processed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Discovered => "discovered",
            TaskState::Fetched => "fetched",
            TaskState::Processing => "processing",
            TaskState::Processed => "processed",
        }
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Derive an id's state from prefix scans alone.
///
/// `remote_keys` is the union of one listing per marker prefix;
/// `local_descriptor_present` is whether `request/<id>.json` exists in the
/// local inbox. Returns `None` when the id has left every tracked location
/// (fully delivered and cleaned, or never existed).
///
/// The marker prefixes win over inbox presence: a non-atomic move can leave
/// the descriptor visible at both its source and destination, and the
/// destination is the truth.
pub fn derive_state(
    id: &str,
    remote: &RemoteLayout,
    remote_keys: &HashSet<String>,
    local_descriptor_present: bool,
) -> Option<TaskState> {
    let name = format!("{}.json", id);

    if remote_keys.contains(&format!("{}{}", remote.processed_prefix, name)) {
        return Some(TaskState::Processed);
    }
    if remote_keys.contains(&format!("{}{}", remote.processing_prefix, name)) {
        return Some(TaskState::Processing);
    }
    if local_descriptor_present {
        return Some(TaskState::Fetched);
    }
    if remote_keys.contains(&format!("{}{}", remote.request_prefix, name)) {
        return Some(TaskState::Discovered);
    }
    None
}
