//! # Relay Engine
//!
//! Keeps a remote object store and a local worker tree eventually
//! consistent under polling.
//!
//! ## Overview
//!
//! An external worker consumes job descriptors and publishes results through
//! a local directory tree; upstream systems submit work and collect results
//! through a remote object store. This crate is the synchronization engine
//! in between: independent watch loops, per-pipeline idempotency tables and
//! batch-completion logic providing at-least-once delivery with no locking,
//! tolerating process restarts and same-name overwrites.
//!
//! ## Components
//!
//! - **Stability Probe** (`stability`): decides when a file has finished
//!   being written
//! - **Watch Table** (`watch`): mtime-based new/updated/handled detection,
//!   surviving same-name overwrites
//! - **Request Pipeline** (`request_pipeline`): descriptor → two correlated
//!   results → archive state machine
//! - **Batch Pipeline** (`batch_pipeline`): manifest of ids → completion
//!   barrier → summary artifact
//! - **Sample Pipeline** (`sample_pipeline`): manifest-in / manifest-out
//!   side channel
//! - **Result Sweeper** (`sweeper`): queue-independent delivery backstop
//! - **Coordinator** (`coordinator`): spawns each pipeline as its own poll
//!   loop

pub mod batch_pipeline;
pub mod config;
pub mod coordinator;
pub mod descriptor;
pub mod error;
mod fsutil;
pub mod request_pipeline;
pub mod sample_pipeline;
pub mod stability;
pub mod sweeper;
pub mod task;
pub mod watch;

pub use batch_pipeline::BatchPipeline;
pub use config::{LocalLayout, RelayConfig, RemoteLayout};
pub use coordinator::{PollPipeline, RelayCoordinator};
pub use descriptor::{parse_manifest, Descriptor};
pub use error::{RelayError, Result};
pub use request_pipeline::RequestPipeline;
pub use sample_pipeline::SamplePipeline;
pub use stability::StabilityProbe;
pub use sweeper::ResultSweeper;
pub use task::{derive_state, Task, TaskState};
pub use watch::WatchTable;
