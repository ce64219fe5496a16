//! Run one unit of work on its own task and wait for its single result.

use std::future::Future;
use std::time::Duration;

use log::{debug, warn};
use thiserror::Error;
use tokio::sync::oneshot;

/// Write half of a single-use result channel. Consuming `complete` makes a second write
/// impossible.
pub struct ResultSink<T> {
    sender: oneshot::Sender<T>,
}

impl<T> ResultSink<T> {
    /// Delivers the outcome. If the waiter already gave up the value is dropped.
    pub fn complete(self, value: T) {
        if self.sender.send(value).is_err() {
            debug!("Result receiver dropped before completion");
        }
    }
}

/// Fresh sink and the receiver the caller waits on.
pub fn result_sink<T>() -> (ResultSink<T>, oneshot::Receiver<T>) {
    let (sender, receiver) = oneshot::channel();
    (ResultSink { sender }, receiver)
}

#[derive(Error, Debug)]
pub enum BridgeError<E> {
    #[error("{0}")]
    Failed(E),

    /// The task ended without writing a result, which only happens if it panicked.
    #[error("Task ended without producing a result")]
    Abandoned,

    #[error("No result within {0:?}")]
    TimedOut(Duration),
}

/// Spawns exactly one task per request and blocks the caller on its private sink.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncBridge {
    timeout: Option<Duration>,
}

impl SyncBridge {
    /// Waits as long as the task takes.
    pub fn new() -> Self {
        Self { timeout: None }
    }

    pub fn with_timeout(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }

    /// Runs `work` on a new task and returns its outcome.
    ///
    /// On timeout the task keeps running to completion; its result is discarded.
    pub async fn request_once<F, T, E>(&self, work: F) -> Result<T, BridgeError<E>>
    where
        F: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        let (sink, receiver) = result_sink();
        tokio::spawn(async move {
            let outcome = work.await;
            sink.complete(outcome);
        });

        let received = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, receiver).await {
                Ok(received) => received,
                Err(_) => {
                    warn!("Gave up waiting for result after {:?}", limit);
                    return Err(BridgeError::TimedOut(limit));
                }
            },
            None => receiver.await,
        };

        match received {
            Ok(outcome) => outcome.map_err(BridgeError::Failed),
            Err(_) => Err(BridgeError::Abandoned),
        }
    }
}
