pub mod pool;
pub mod worker;

pub use pool::{PoolError, PoolReport, WorkerError, WorkerPool};
pub use worker::{process_task, TaskOutcome, WorkerContext, WorkerStats, FAILURE_REPLY};
