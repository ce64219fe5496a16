use flume::Receiver;
use thiserror::Error;
use tokio::task::JoinHandle;

use super::worker::{worker, WorkerContext, WorkerStats};
use crate::bot::task::UpdateTask;

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Worker {worker} task joined with an error: {message}")]
    JoinError { worker: usize, message: String },
}

/// Totals across every worker that exited normally.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PoolReport {
    pub processed: usize,
    pub skipped: usize,
}

/// Some workers died; the report still covers the ones that drained.
#[derive(Error, Debug)]
pub struct PoolError {
    pub report: PoolReport,
    pub errors: Vec<WorkerError>,
}

impl std::fmt::Display for PoolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Errors while joining workers: {:?}", self.errors)
    }
}

pub struct WorkerPool {
    workers: Vec<JoinHandle<WorkerStats>>,
}

impl WorkerPool {
    /// Starts `num_workers` consumers on a shared receiver. They run until every sender is
    /// dropped and the queue is empty.
    pub fn spawn(
        num_workers: usize,
        receiver: Receiver<UpdateTask>,
        context: WorkerContext,
    ) -> Self {
        let workers = (0..num_workers)
            .map(|id| {
                let worker_receiver = receiver.clone();
                let worker_context = context.clone();
                tokio::spawn(async move { worker(id, worker_receiver, worker_context).await })
            })
            .collect();
        Self { workers }
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Waits for every worker, collecting join errors instead of stopping at the first.
    pub async fn join_all(self) -> Result<PoolReport, PoolError> {
        let mut report = PoolReport::default();
        let mut errors = vec![];
        for (id, handle) in self.workers.into_iter().enumerate() {
            match handle.await {
                Ok(stats) => {
                    report.processed += stats.processed;
                    report.skipped += stats.skipped;
                }
                Err(e) => errors.push(WorkerError::JoinError {
                    worker: id,
                    message: e.to_string(),
                }),
            }
        }

        if errors.is_empty() {
            Ok(report)
        } else {
            Err(PoolError { report, errors })
        }
    }
}
