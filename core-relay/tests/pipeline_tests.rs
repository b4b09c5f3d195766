//! Integration tests for the relay pipelines
//!
//! These tests drive pipeline ticks directly against a directory-backed
//! object store and a real local working tree, covering:
//! - The full single-item flow with independent result slots
//! - Restart recovery from the local inbox
//! - Same-name overwrite re-triggering
//! - The batch completion barrier, deadline and summary content
//! - The sample side channel
//! - The reconciliation sweeper and its race with the request pipeline

use core_relay::{BatchPipeline, RelayConfig, RequestPipeline, ResultSweeper, SamplePipeline};
use provider_localdir::LocalDirStore;
use relay_traits::store::ObjectStore;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::fs;

// ============================================================================
// Harness
// ============================================================================

struct Harness {
    remote_root: PathBuf,
    store: Arc<LocalDirStore>,
    config: RelayConfig,
    _remote_dir: TempDir,
    _local_dir: TempDir,
}

async fn harness() -> Harness {
    let remote_dir = tempfile::tempdir().unwrap();
    let local_dir = tempfile::tempdir().unwrap();

    let mut config = RelayConfig::default();
    config.local.root = local_dir.path().to_path_buf();
    config.stability_debounce_secs = 0.02;
    config.mtime_tolerance_secs = 0.0;
    config.local.ensure_dirs().await.unwrap();

    Harness {
        remote_root: remote_dir.path().to_path_buf(),
        store: Arc::new(LocalDirStore::new(remote_dir.path())),
        config,
        _remote_dir: remote_dir,
        _local_dir: local_dir,
    }
}

impl Harness {
    /// Place an object directly into the backing store
    async fn put_remote(&self, key: &str, content: &str) {
        let mut path = self.remote_root.clone();
        for part in key.split('/') {
            path.push(part);
        }
        fs::create_dir_all(path.parent().unwrap()).await.unwrap();
        fs::write(&path, content).await.unwrap();
    }

    async fn remote_exists(&self, key: &str) -> bool {
        self.store.last_modified(key).await.unwrap().is_some()
    }

    fn local(&self, rel: &str) -> PathBuf {
        self.config.local.root.join(rel)
    }

    async fn write_local(&self, rel: &str, content: &str) {
        let path = self.local(rel);
        fs::create_dir_all(path.parent().unwrap()).await.unwrap();
        fs::write(&path, content).await.unwrap();
    }

    async fn local_exists(&self, rel: &str) -> bool {
        fs::try_exists(self.local(rel)).await.unwrap()
    }

    async fn count_files(&self, rel: &str) -> usize {
        let mut count = 0;
        let mut entries = fs::read_dir(self.local(rel)).await.unwrap();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            if entry.file_type().await.unwrap().is_file() {
                count += 1;
            }
        }
        count
    }
}

// ============================================================================
// Single-item pipeline
// ============================================================================

#[tokio::test]
async fn test_single_item_flow_with_independent_slots() {
    let h = harness().await;
    h.put_remote(
        "iconml/request/A.json",
        r#"{"hash":"A","icon_filename":"icon_a.png","package":"com.example.a"}"#,
    )
    .await;
    h.put_remote("iconml/images/icon_a.png", "fake-png-bytes").await;

    let mut pipeline = RequestPipeline::new(h.store.clone(), h.config.clone());
    pipeline.tick().await.unwrap();

    // Descriptor pulled, icon fetched, in-flight marker moved
    assert!(h.local_exists("request/A.json").await);
    assert!(h.local_exists("uploadimages/icon_a.png").await);
    assert!(!h.remote_exists("iconml/request/A.json").await);
    assert!(h.remote_exists("iconml/processing/A.json").await);
    assert_eq!(pipeline.pending_info_slots(), 1);
    assert_eq!(pipeline.pending_image_slots(), 1);

    // Worker produces the info result only
    h.write_local("inforesults/A.json", r#"{"hash":"A","label":"Example"}"#)
        .await;
    pipeline.tick().await.unwrap();

    assert!(h.remote_exists("iconml/inforesults/A.json").await);
    assert!(!h.remote_exists("iconml/processing/A.json").await);
    assert!(h.remote_exists("iconml/processed/A.json").await);
    assert!(h.local_exists("bakresults/A.json").await);
    assert!(!h.local_exists("inforesults/A.json").await);
    // Only the info slot retired; the image slot stays pending
    assert_eq!(pipeline.pending_info_slots(), 0);
    assert_eq!(pipeline.pending_image_slots(), 1);

    // Worker produces the image result later
    h.write_local("imageresults/icon_a.json", r#"{"phash":"0011"}"#)
        .await;
    pipeline.tick().await.unwrap();

    assert!(h.remote_exists("iconml/imageresults/icon_a.json").await);
    assert!(h.local_exists("bakimageresults/icon_a.json").await);
    assert_eq!(pipeline.pending_image_slots(), 0);
    // Default behavior keeps the fetched icon in the store
    assert!(h.remote_exists("iconml/images/icon_a.png").await);
}

#[tokio::test]
async fn test_delivered_icon_cleanup_is_configurable() {
    let mut h = harness().await;
    h.config.delete_delivered_icons = true;
    h.put_remote(
        "iconml/request/A.json",
        r#"{"hash":"A","icon_filename":"icon_a.png"}"#,
    )
    .await;
    h.put_remote("iconml/images/icon_a.png", "fake-png-bytes").await;

    let mut pipeline = RequestPipeline::new(h.store.clone(), h.config.clone());
    pipeline.tick().await.unwrap();

    h.write_local("imageresults/icon_a.json", r#"{"phash":"0011"}"#)
        .await;
    pipeline.tick().await.unwrap();

    assert!(h.remote_exists("iconml/imageresults/icon_a.json").await);
    assert!(!h.remote_exists("iconml/images/icon_a.png").await);
}

#[tokio::test]
async fn test_malformed_descriptor_skips_only_itself() {
    let h = harness().await;
    h.put_remote("iconml/request/bad.json", "definitely not json").await;
    h.put_remote("iconml/request/good.json", r#"{"hash":"good"}"#).await;

    let mut pipeline = RequestPipeline::new(h.store.clone(), h.config.clone());
    pipeline.tick().await.unwrap();

    // Only the well-formed sibling is tracked
    assert_eq!(pipeline.pending_info_slots(), 1);
    assert_eq!(pipeline.pending_image_slots(), 0);

    h.write_local("inforesults/good.json", r#"{"hash":"good"}"#).await;
    pipeline.tick().await.unwrap();
    assert!(h.remote_exists("iconml/inforesults/good.json").await);
}

#[tokio::test]
async fn test_restart_recovers_pending_task_from_inbox() {
    let h = harness().await;
    h.put_remote("iconml/request/A.json", r#"{"hash":"A"}"#).await;

    let mut first = RequestPipeline::new(h.store.clone(), h.config.clone());
    first.tick().await.unwrap();
    assert!(h.remote_exists("iconml/processing/A.json").await);
    drop(first);

    // Restarted process: fresh tables, result arrives afterwards
    let mut second = RequestPipeline::new(h.store.clone(), h.config.clone());
    h.write_local("inforesults/A.json", r#"{"hash":"A"}"#).await;
    second.tick().await.unwrap();

    assert!(h.remote_exists("iconml/inforesults/A.json").await);
    assert!(h.remote_exists("iconml/processed/A.json").await);
    assert!(!h.remote_exists("iconml/processing/A.json").await);
    assert!(h.local_exists("bakresults/A.json").await);
    assert_eq!(second.pending_info_slots(), 0);
}

#[tokio::test]
async fn test_same_name_overwrite_rearms_task() {
    let h = harness().await;
    h.put_remote("iconml/request/A.json", r#"{"hash":"A"}"#).await;

    let mut pipeline = RequestPipeline::new(h.store.clone(), h.config.clone());
    pipeline.tick().await.unwrap();
    h.write_local("inforesults/A.json", r#"{"hash":"A"}"#).await;
    pipeline.tick().await.unwrap();
    assert_eq!(pipeline.pending_info_slots(), 0);

    // Resubmission under the same name with a newer mtime
    tokio::time::sleep(Duration::from_millis(150)).await;
    h.put_remote("iconml/request/A.json", r#"{"hash":"A","version":2}"#)
        .await;
    pipeline.tick().await.unwrap();

    assert_eq!(pipeline.pending_info_slots(), 1);
    assert!(h.remote_exists("iconml/processing/A.json").await);
}

// ============================================================================
// Batch pipeline
// ============================================================================

async fn satisfy_member(h: &Harness, id: &str, icon_stem: &str, archived: bool) {
    h.write_local(
        &format!("request/{}.json", id),
        &format!(r#"{{"hash":"{}","icon_filename":"{}.png"}}"#, id, icon_stem),
    )
    .await;
    let (info_dir, image_dir) = if archived {
        ("bakresults", "bakimageresults")
    } else {
        ("inforesults", "imageresults")
    };
    h.write_local(&format!("{}/{}.json", info_dir, id), r#"{"ok":true}"#)
        .await;
    h.write_local(
        &format!("{}/{}.json", image_dir, icon_stem),
        r#"{"ok":true}"#,
    )
    .await;
}

#[tokio::test]
async fn test_batch_deadline_produces_partial_summary_exactly_once() {
    let mut h = harness().await;
    h.config.batch_deadline_secs = 0.25;

    h.put_remote("iconml/requestbyhash/batch1.txt", "A\nB\n# comment\n\nC\n")
        .await;
    // A's results still sit in the result dirs, B's are already archived,
    // C's descriptor never appears
    satisfy_member(&h, "A", "icon_a", false).await;
    satisfy_member(&h, "B", "icon_b", true).await;

    let mut pipeline = BatchPipeline::new(h.store.clone(), h.config.clone());
    pipeline.tick().await.unwrap();

    assert_eq!(pipeline.open_batches(), 1);
    assert!(h.local_exists("requestbyhash/batch1.txt").await);
    assert!(!h.remote_exists("iconml/requestbyhashdone/batch1.txt").await);

    tokio::time::sleep(Duration::from_millis(300)).await;
    pipeline.tick().await.unwrap();

    assert_eq!(pipeline.open_batches(), 0);
    assert!(h.remote_exists("iconml/requestbyhashdone/batch1.txt").await);
    assert!(!h.remote_exists("iconml/requestbyhash/batch1.txt").await);

    let summary = fs::read_to_string(h.local("bakrequestbyhashdone/batch1.txt"))
        .await
        .unwrap();
    assert!(summary.contains("SUCCESS COMPLETED (2): A, B"), "{}", summary);
    assert!(summary.contains("PENDING_OR_TIMEOUT (1): C"), "{}", summary);

    // Summary + original manifest, archived exactly once
    assert_eq!(h.count_files("bakrequestbyhashdone").await, 2);

    // A further tick must not re-run the finalized batch
    pipeline.tick().await.unwrap();
    assert_eq!(h.count_files("bakrequestbyhashdone").await, 2);
    assert_eq!(pipeline.open_batches(), 0);
}

#[tokio::test]
async fn test_batch_completes_as_soon_as_all_members_are_satisfied() {
    let h = harness().await;
    h.put_remote("iconml/requestbyhash/fast.txt", "A\n").await;
    satisfy_member(&h, "A", "icon_a", false).await;

    let mut pipeline = BatchPipeline::new(h.store.clone(), h.config.clone());
    pipeline.tick().await.unwrap();

    assert_eq!(pipeline.open_batches(), 0);
    let summary = fs::read_to_string(h.local("bakrequestbyhashdone/fast.txt"))
        .await
        .unwrap();
    assert!(summary.contains("SUCCESS COMPLETED (1): A"));
    assert!(summary.contains("PENDING_OR_TIMEOUT (0):"));
}

#[tokio::test]
async fn test_batch_resubmission_replaces_membership() {
    let h = harness().await;
    h.put_remote("iconml/requestbyhash/batch1.txt", "A\n").await;
    satisfy_member(&h, "A", "icon_a", false).await;

    let mut pipeline = BatchPipeline::new(h.store.clone(), h.config.clone());
    pipeline.tick().await.unwrap();
    assert_eq!(pipeline.open_batches(), 0);

    // Same name, newer content: a brand-new batch over different members
    tokio::time::sleep(Duration::from_millis(150)).await;
    h.put_remote("iconml/requestbyhash/batch1.txt", "Z\n").await;
    pipeline.tick().await.unwrap();

    assert_eq!(pipeline.open_batches(), 1);
}

// ============================================================================
// Sample side channel
// ============================================================================

#[tokio::test]
async fn test_sample_manifest_round_trip() {
    let h = harness().await;
    h.put_remote("iconml/addsamples/s1.txt", "sample-a\nsample-b\n").await;

    let mut pipeline = SamplePipeline::new(h.store.clone(), h.config.clone());
    pipeline.tick().await.unwrap();

    assert!(h.local_exists("addsamples/s1.txt").await);
    assert_eq!(pipeline.pending_manifests(), 1);

    // Worker signals completion with a same-named artifact
    h.write_local("addsampleprocessed/s1.txt", "sample-a ok\nsample-b ok\n")
        .await;
    pipeline.tick().await.unwrap();

    assert!(h.remote_exists("iconml/addsampleprocessed/s1.txt").await);
    assert!(!h.remote_exists("iconml/addsamples/s1.txt").await);
    assert_eq!(pipeline.pending_manifests(), 0);
    // Both local copies archived (same name, so the second gets a suffix)
    assert_eq!(h.count_files("bakaddsampleprocessed").await, 2);
    assert!(!h.local_exists("addsampleprocessed/s1.txt").await);
    assert!(!h.local_exists("addsamples/s1.txt").await);
}

// ============================================================================
// Reconciliation sweeper
// ============================================================================

#[tokio::test]
async fn test_sweeper_delivers_untracked_results() {
    let h = harness().await;
    // No pipeline ever tracked these artifacts (restart lost the tables)
    h.write_local("inforesults/orphan.json", r#"{"hash":"orphan"}"#).await;
    h.write_local("imageresults/icon_x.json", r#"{"phash":"1100"}"#).await;

    let mut sweeper = ResultSweeper::new(h.store.clone(), h.config.clone());
    sweeper.tick().await.unwrap();

    assert!(h.remote_exists("iconml/inforesults/orphan.json").await);
    assert!(h.remote_exists("iconml/imageresults/icon_x.json").await);
    assert!(h.local_exists("bakresults/orphan.json").await);
    assert!(h.local_exists("bakimageresults/icon_x.json").await);
    assert!(!h.local_exists("inforesults/orphan.json").await);

    // Nothing left to sweep
    sweeper.tick().await.unwrap();
    assert_eq!(h.count_files("bakresults").await, 1);
}

#[tokio::test]
async fn test_sweeper_race_still_retires_request_slot() {
    let h = harness().await;
    h.put_remote("iconml/request/A.json", r#"{"hash":"A"}"#).await;

    let mut pipeline = RequestPipeline::new(h.store.clone(), h.config.clone());
    pipeline.tick().await.unwrap();
    assert_eq!(pipeline.pending_info_slots(), 1);

    // The sweeper wins the race to the artifact
    h.write_local("inforesults/A.json", r#"{"hash":"A"}"#).await;
    let mut sweeper = ResultSweeper::new(h.store.clone(), h.config.clone());
    sweeper.tick().await.unwrap();
    assert!(h.remote_exists("iconml/inforesults/A.json").await);
    assert!(h.local_exists("bakresults/A.json").await);

    // The request pipeline still completes its remote transitions
    pipeline.tick().await.unwrap();
    assert_eq!(pipeline.pending_info_slots(), 0);
    assert!(h.remote_exists("iconml/processed/A.json").await);
    assert!(!h.remote_exists("iconml/processing/A.json").await);
}
