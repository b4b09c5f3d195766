//! # Relay Coordinator
//!
//! Owns one instance of every pipeline and runs each as an independent poll
//! loop on the tokio scheduler.
//!
//! ## Concurrency model
//!
//! The pipelines share no mutable state and take no locks; the local
//! filesystem and the object store are the only shared media, and
//! correctness comes from idempotent re-processing, not mutual exclusion.
//! Each loop fully completes one tick before sleeping its poll interval.
//! Cancellation is cooperative: the token is only consulted between ticks,
//! so a loop never stops mid-scan.
//!
//! A failed tick is logged with context and followed by a fixed backoff
//! sleep; loops run until shutdown and never terminate the process.

use async_trait::async_trait;
use relay_traits::store::ObjectStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::batch_pipeline::BatchPipeline;
use crate::config::RelayConfig;
use crate::error::Result;
use crate::request_pipeline::RequestPipeline;
use crate::sample_pipeline::SamplePipeline;
use crate::sweeper::ResultSweeper;

/// One tick-driven poll loop
#[async_trait]
pub trait PollPipeline: Send {
    /// Loop name for logs
    fn name(&self) -> &'static str;

    /// Sleep between successful ticks
    fn poll_interval(&self) -> Duration;

    /// Run one full scan pass
    async fn tick(&mut self) -> Result<()>;
}

#[async_trait]
impl PollPipeline for RequestPipeline {
    fn name(&self) -> &'static str {
        "request"
    }

    fn poll_interval(&self) -> Duration {
        self.config().remote_poll_interval()
    }

    async fn tick(&mut self) -> Result<()> {
        RequestPipeline::tick(self).await
    }
}

#[async_trait]
impl PollPipeline for BatchPipeline {
    fn name(&self) -> &'static str {
        "requestbyhash"
    }

    fn poll_interval(&self) -> Duration {
        self.config().remote_poll_interval()
    }

    async fn tick(&mut self) -> Result<()> {
        BatchPipeline::tick(self).await
    }
}

#[async_trait]
impl PollPipeline for SamplePipeline {
    fn name(&self) -> &'static str {
        "addsamples"
    }

    fn poll_interval(&self) -> Duration {
        self.config().remote_poll_interval()
    }

    async fn tick(&mut self) -> Result<()> {
        SamplePipeline::tick(self).await
    }
}

#[async_trait]
impl PollPipeline for ResultSweeper {
    fn name(&self) -> &'static str {
        "sweeper"
    }

    fn poll_interval(&self) -> Duration {
        self.config().local_poll_interval()
    }

    async fn tick(&mut self) -> Result<()> {
        ResultSweeper::tick(self).await
    }
}

/// Spawns and supervises the pipeline loops
pub struct RelayCoordinator {
    config: RelayConfig,
    store: Arc<dyn ObjectStore>,
    shutdown: CancellationToken,
}

impl RelayCoordinator {
    /// Create a coordinator after fail-fast config validation
    pub fn new(config: RelayConfig, store: Arc<dyn ObjectStore>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            store,
            shutdown: CancellationToken::new(),
        })
    }

    /// Token that stops every loop at its next tick boundary
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Create the local working tree and run all pipeline loops until the
    /// shutdown token fires.
    pub async fn run(self) -> Result<()> {
        self.config.local.ensure_dirs().await?;
        info!(root = %self.config.local.root.display(), "Relay starting");

        let backoff = self.config.error_backoff();
        let pipelines: Vec<Box<dyn PollPipeline>> = vec![
            Box::new(RequestPipeline::new(
                self.store.clone(),
                self.config.clone(),
            )),
            Box::new(BatchPipeline::new(self.store.clone(), self.config.clone())),
            Box::new(SamplePipeline::new(
                self.store.clone(),
                self.config.clone(),
            )),
            Box::new(ResultSweeper::new(self.store.clone(), self.config.clone())),
        ];

        let mut loops = JoinSet::new();
        for pipeline in pipelines {
            loops.spawn(run_pipeline(pipeline, backoff, self.shutdown.clone()));
        }

        while let Some(joined) = loops.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Pipeline loop aborted");
            }
        }
        info!("Relay stopped");
        Ok(())
    }
}

/// Drive one pipeline loop until cancellation
async fn run_pipeline(
    mut pipeline: Box<dyn PollPipeline>,
    backoff: Duration,
    shutdown: CancellationToken,
) {
    let name = pipeline.name();
    info!(pipeline = name, "Pipeline loop started");

    loop {
        let sleep = match pipeline.tick().await {
            Ok(()) => pipeline.poll_interval(),
            Err(e) => {
                error!(pipeline = name, error = %e, "Tick failed; backing off");
                backoff
            }
        };

        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(sleep) => {}
        }
    }

    info!(pipeline = name, "Pipeline loop stopped");
}
