use std::time::Duration;

use flume::Sender;
use log::{debug, info, warn};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use super::ports::{EventTransport, TransportError};
use super::task::UpdateTask;
use crate::server::monitoring::BOT_METRICS;

#[derive(Error, Debug)]
pub enum FetchLoopError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Work queue closed: every worker has exited")]
    QueueClosed,
}

/// Retry behaviour for failed polls.
///
/// Failures are assumed to be transient: the loop retries at a fixed interval, without an
/// attempt cap, until it is cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchRetryPolicy {
    pub backoff: Duration,
}

impl Default for FetchRetryPolicy {
    fn default() -> Self {
        Self {
            backoff: Duration::from_secs(3),
        }
    }
}

/// Sole producer of the work queue.
///
/// Owns the only `Sender`; the queue closes when the loop returns and drops it.
pub struct FetchLoop<T: EventTransport> {
    transport: T,
    sender: Sender<UpdateTask>,
    cursor: i64,
    poll_timeout: Duration,
    retry_policy: FetchRetryPolicy,
}

impl<T: EventTransport> FetchLoop<T> {
    pub fn new(
        transport: T,
        sender: Sender<UpdateTask>,
        poll_timeout: Duration,
        retry_policy: FetchRetryPolicy,
    ) -> Self {
        Self {
            transport,
            sender,
            cursor: 0,
            poll_timeout,
            retry_policy,
        }
    }

    pub fn with_cursor(mut self, cursor: i64) -> Self {
        self.cursor = cursor;
        self
    }

    /// Next sequence number the loop will ask for.
    pub fn cursor(&self) -> i64 {
        self.cursor
    }

    /// Polls once and enqueues every new event in transport order.
    ///
    /// Enqueueing waits while the queue is full. The cursor moves to one past the highest
    /// sequence number only after the whole batch is enqueued; on any error it stays put.
    pub async fn poll_once(&mut self) -> Result<usize, FetchLoopError> {
        let events = self
            .transport
            .fetch_events(self.cursor, self.poll_timeout)
            .await?;

        let mut next_cursor = self.cursor;
        let mut enqueued = 0;
        for event in events {
            if event.update_id < self.cursor {
                debug!("Dropping already-dispatched update {}", event.update_id);
                continue;
            }
            let update_id = event.update_id;
            self.sender
                .send_async(UpdateTask::from(event))
                .await
                .map_err(|_| FetchLoopError::QueueClosed)?;
            next_cursor = next_cursor.max(update_id + 1);
            enqueued += 1;
        }
        self.cursor = next_cursor;

        if let Some(metrics) = BOT_METRICS.get() {
            metrics.updates_received.inc_by(enqueued as u64);
            metrics.queue_depth.set(self.sender.len() as i64);
            metrics.cursor.set(self.cursor);
        }
        Ok(enqueued)
    }

    /// Polls until `stop` fires, then closes the queue and returns the final cursor.
    ///
    /// Cancellation is checked before each poll; an in-flight poll is never interrupted.
    pub async fn run(mut self, stop: CancellationToken) -> Result<i64, FetchLoopError> {
        info!("Fetch loop starting at cursor {}", self.cursor);
        loop {
            if stop.is_cancelled() {
                break;
            }

            match self.poll_once().await {
                Ok(0) => {}
                Ok(n) => debug!("Enqueued {} updates, cursor now {}", n, self.cursor),
                Err(FetchLoopError::Transport(err)) => {
                    warn!(
                        "Failed to get updates, retrying in {:?}: {}",
                        self.retry_policy.backoff, err
                    );
                    if let Some(metrics) = BOT_METRICS.get() {
                        metrics.fetch_failures.inc();
                    }
                    tokio::select! {
                        _ = stop.cancelled() => break,
                        _ = tokio::time::sleep(self.retry_policy.backoff) => {}
                    }
                }
                Err(err) => return Err(err),
            }
        }

        let Self { sender, cursor, .. } = self;
        drop(sender);
        info!("Fetch loop stopped at cursor {}; work queue closed", cursor);
        Ok(cursor)
    }
}
