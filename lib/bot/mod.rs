pub mod fetch_loop;
pub mod ports;
pub mod task;

use std::sync::Arc;
use std::time::Duration;

use log::{error, info};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::classifier::{Classifier, ClassifierError};
use crate::config::Config;
use crate::worker::{PoolError, WorkerContext, WorkerError, WorkerPool};
use fetch_loop::{FetchLoop, FetchLoopError, FetchRetryPolicy};
use ports::EventTransport;

#[derive(Debug, Clone)]
pub struct BotConfig {
    pub workers: usize,
    /// Capacity of the work queue.
    pub fetch_buffer: usize,
    pub poll_timeout: Duration,
    pub retry_policy: FetchRetryPolicy,
    pub initial_cursor: i64,
}

impl From<&Config> for BotConfig {
    fn from(config: &Config) -> Self {
        Self {
            workers: config.n_workers,
            fetch_buffer: config.fetch_buffer,
            poll_timeout: config.poll_timeout,
            retry_policy: FetchRetryPolicy {
                backoff: config.fetch_retry_backoff,
            },
            initial_cursor: 0,
        }
    }
}

#[derive(Error, Debug)]
pub enum StopError {
    #[error("Fetch loop failed: {0}")]
    FetchLoop(#[from] FetchLoopError),

    #[error("Fetch loop task joined with an error: {0}")]
    FetchLoopJoin(String),

    #[error(transparent)]
    Worker(#[from] WorkerError),

    #[error("Could not release the classifier: {0}")]
    Release(#[from] ClassifierError),
}

/// What the drain accomplished, reported even when parts of shutdown failed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownReport {
    /// `None` if the fetch loop did not return normally.
    pub final_cursor: Option<i64>,
    pub processed: usize,
    pub skipped: usize,
}

#[derive(Error, Debug)]
pub struct ShutdownError {
    pub report: ShutdownReport,
    pub errors: Vec<StopError>,
}

impl std::fmt::Display for ShutdownError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Errors during shutdown: {:?}", self.errors)
    }
}

/// Fetch loop plus worker pool, not yet running.
pub struct Bot {
    transport: Arc<dyn EventTransport>,
    context: WorkerContext,
    config: BotConfig,
}

impl Bot {
    pub fn new(
        transport: Arc<dyn EventTransport>,
        context: WorkerContext,
        config: BotConfig,
    ) -> Self {
        Self {
            transport,
            context,
            config,
        }
    }

    /// Spawns the fetch loop and workers.
    ///
    /// Cancelling `cancel` stops fetching too, but only [`RunningBot::stop`] waits for the
    /// drain and releases the classifier.
    pub fn start(self, cancel: &CancellationToken) -> RunningBot {
        let Self {
            transport,
            context,
            config,
        } = self;

        let (sender, receiver) = flume::bounded(config.fetch_buffer.max(1));
        let stop_signal = cancel.child_token();

        let fetch_loop =
            FetchLoop::new(transport, sender, config.poll_timeout, config.retry_policy)
                .with_cursor(config.initial_cursor);
        let fetch_handle = tokio::spawn(fetch_loop.run(stop_signal.clone()));

        let pool = WorkerPool::spawn(config.workers, receiver, context.clone());
        info!(
            "Bot started with {} workers and a queue of {}",
            config.workers, config.fetch_buffer
        );

        RunningBot {
            stop_signal,
            fetch_handle,
            pool,
            classifier: context.classifier,
        }
    }
}

/// Handle to a started bot. Consumed by [`RunningBot::stop`], so shutdown runs once.
pub struct RunningBot {
    stop_signal: CancellationToken,
    fetch_handle: JoinHandle<Result<i64, FetchLoopError>>,
    pool: WorkerPool,
    classifier: Arc<dyn Classifier>,
}

impl RunningBot {
    /// Stops fetching, drains every queued task, then releases the classifier.
    ///
    /// Each step runs even if an earlier one failed; all failures come back together.
    pub async fn stop(self) -> Result<ShutdownReport, ShutdownError> {
        info!("Stopping bot: no new updates will be fetched");
        self.stop_signal.cancel();

        let mut errors = vec![];
        let final_cursor = match self.fetch_handle.await {
            Ok(Ok(cursor)) => Some(cursor),
            Ok(Err(e)) => {
                errors.push(StopError::FetchLoop(e));
                None
            }
            Err(e) => {
                errors.push(StopError::FetchLoopJoin(e.to_string()));
                None
            }
        };

        info!("Waiting for workers to drain the queue");
        let pool_report = match self.pool.join_all().await {
            Ok(report) => report,
            Err(PoolError {
                report,
                errors: worker_errors,
            }) => {
                errors.extend(worker_errors.into_iter().map(StopError::Worker));
                report
            }
        };

        if let Err(e) = self.classifier.shutdown().await {
            errors.push(StopError::Release(e));
        }

        let report = ShutdownReport {
            final_cursor,
            processed: pool_report.processed,
            skipped: pool_report.skipped,
        };
        if errors.is_empty() {
            info!(
                "Bot stopped: {} processed, {} skipped",
                report.processed, report.skipped
            );
            Ok(report)
        } else {
            error!("Bot stopped with {} errors", errors.len());
            Err(ShutdownError { report, errors })
        }
    }
}
