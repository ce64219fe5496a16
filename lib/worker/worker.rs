use std::sync::Arc;

use flume::Receiver;
use log::{debug, error, info, warn};
use thiserror::Error;

use crate::bot::ports::{PayloadFetcher, ReplyTransport, TransportError};
use crate::bot::task::{Payload, UpdateTask};
use crate::classifier::{Classifier, ClassifierError, Prediction};
use crate::server::monitoring::BOT_METRICS;

/// Sent instead of a prediction whenever download or classification fails.
pub const FAILURE_REPLY: &str = "There was an error, I'm sorry :(";

/// Collaborators shared by every worker.
#[derive(Clone)]
pub struct WorkerContext {
    pub payloads: Arc<dyn PayloadFetcher>,
    pub replies: Arc<dyn ReplyTransport>,
    pub classifier: Arc<dyn Classifier>,
}

#[derive(Error, Debug)]
enum ProcessError {
    #[error("Could not fetch photo: {0}")]
    Payload(#[from] TransportError),

    #[error("Could not classify photo: {0}")]
    Classification(#[from] ClassifierError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    /// Nothing to classify; no reply sent.
    Skipped,
    Classified,
    Failed,
}

/// Per-worker tally, summed by the pool on join.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WorkerStats {
    pub processed: usize,
    pub skipped: usize,
}

async fn classify_payload(
    context: &WorkerContext,
    payload: &Payload,
) -> Result<Prediction, ProcessError> {
    let fetched;
    let image: &[u8] = match payload {
        Payload::Embedded(bytes) => bytes,
        Payload::Remote(reference) => {
            fetched = context.payloads.fetch_bytes(reference).await?;
            &fetched
        }
    };
    Ok(context.classifier.classify(image).await?)
}

/// Runs one task to completion. Never fails: every error ends in a log line and, where
/// possible, the fixed failure reply.
pub async fn process_task(context: &WorkerContext, task: &UpdateTask) -> TaskOutcome {
    let Some((chat_id, payload)) = task.actionable() else {
        debug!("Update {} has no photo, skipping", task.update_id);
        if let Some(metrics) = BOT_METRICS.get() {
            metrics.tasks_skipped.inc();
        }
        return TaskOutcome::Skipped;
    };

    let (reply, outcome) = match classify_payload(context, payload).await {
        Ok(prediction) => {
            if let Some(metrics) = BOT_METRICS.get() {
                metrics.predictions_succeeded.inc();
            }
            (prediction.to_string(), TaskOutcome::Classified)
        }
        Err(err) => {
            error!("Update {}: {}", task.update_id, err);
            if let Some(metrics) = BOT_METRICS.get() {
                metrics.predictions_failed.inc();
            }
            (FAILURE_REPLY.to_string(), TaskOutcome::Failed)
        }
    };

    if let Err(err) = context.replies.send(chat_id, &reply).await {
        warn!(
            "Failed to reply to chat {} for update {}: {}",
            chat_id, task.update_id, err
        );
        if let Some(metrics) = BOT_METRICS.get() {
            metrics.replies_failed.inc();
        }
    }
    outcome
}

/// Pulls tasks until the queue is closed and empty.
pub async fn worker(
    id: usize,
    receiver: Receiver<UpdateTask>,
    context: WorkerContext,
) -> WorkerStats {
    let mut stats = WorkerStats::default();
    while let Ok(task) = receiver.recv_async().await {
        if let Some(metrics) = BOT_METRICS.get() {
            metrics.queue_depth.set(receiver.len() as i64);
        }
        match process_task(&context, &task).await {
            TaskOutcome::Skipped => stats.skipped += 1,
            TaskOutcome::Classified | TaskOutcome::Failed => stats.processed += 1,
        }
    }
    info!(
        "Worker {} finished: {} processed, {} skipped",
        id, stats.processed, stats.skipped
    );
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{EchoPayloads, RecordingReplies, StubClassifier};

    fn context(
        payloads: EchoPayloads,
        replies: Arc<RecordingReplies>,
        classifier: Arc<StubClassifier>,
    ) -> WorkerContext {
        WorkerContext {
            payloads: Arc::new(payloads),
            replies,
            classifier,
        }
    }

    fn photo_task(update_id: i64, chat_id: i64, payload: Payload) -> UpdateTask {
        UpdateTask {
            update_id,
            reply_to: Some(chat_id),
            payload: Some(payload),
        }
    }

    #[tokio::test]
    async fn successful_prediction_is_sent_to_the_chat() {
        let replies = Arc::new(RecordingReplies::default());
        let classifier = Arc::new(StubClassifier::ok("cat", 0.75));
        let context = context(EchoPayloads::default(), replies.clone(), classifier.clone());

        let outcome =
            process_task(&context, &photo_task(1, 42, Payload::Remote("file-1".into()))).await;

        assert_eq!(outcome, TaskOutcome::Classified);
        assert_eq!(
            replies.sent(),
            vec![(42, "I'm 75.0% sure this is a cat".to_string())]
        );
        assert_eq!(classifier.calls(), 1);
    }

    #[tokio::test]
    async fn embedded_bytes_skip_the_payload_fetcher() {
        let replies = Arc::new(RecordingReplies::default());
        let payloads = Arc::new(EchoPayloads::default());
        let context = WorkerContext {
            payloads: payloads.clone(),
            replies: replies.clone(),
            classifier: Arc::new(StubClassifier::ok("dog", 1.0)),
        };

        let outcome =
            process_task(&context, &photo_task(2, 7, Payload::Embedded(b"jpeg".to_vec()))).await;

        assert_eq!(outcome, TaskOutcome::Classified);
        assert_eq!(payloads.fetches(), 0);
        assert_eq!(replies.sent().len(), 1);
    }

    #[tokio::test]
    async fn download_failure_sends_fixed_apology_without_classifying() {
        let replies = Arc::new(RecordingReplies::default());
        let classifier = Arc::new(StubClassifier::ok("cat", 0.9));
        let context = context(
            EchoPayloads::failing_on(&["gone"]),
            replies.clone(),
            classifier.clone(),
        );

        let outcome =
            process_task(&context, &photo_task(3, 42, Payload::Remote("gone".into()))).await;

        assert_eq!(outcome, TaskOutcome::Failed);
        assert_eq!(replies.sent(), vec![(42, FAILURE_REPLY.to_string())]);
        assert_eq!(classifier.calls(), 0);
    }

    #[tokio::test]
    async fn classifier_error_text_never_reaches_the_user() {
        let replies = Arc::new(RecordingReplies::default());
        let context = context(
            EchoPayloads::default(),
            replies.clone(),
            Arc::new(StubClassifier::failing()),
        );

        process_task(&context, &photo_task(4, 42, Payload::Remote("file-4".into()))).await;

        let sent = replies.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1, FAILURE_REPLY);
        assert!(!sent[0].1.contains("tensor"));
    }

    #[tokio::test]
    async fn update_without_photo_is_skipped_silently() {
        let replies = Arc::new(RecordingReplies::default());
        let classifier = Arc::new(StubClassifier::ok("cat", 0.9));
        let context = context(EchoPayloads::default(), replies.clone(), classifier.clone());
        let task = UpdateTask {
            update_id: 5,
            reply_to: Some(42),
            payload: None,
        };

        assert_eq!(process_task(&context, &task).await, TaskOutcome::Skipped);
        assert!(replies.sent().is_empty());
        assert_eq!(classifier.calls(), 0);
    }

    #[tokio::test]
    async fn reply_failure_does_not_stop_the_worker() {
        let replies = Arc::new(RecordingReplies::failing());
        let context = context(
            EchoPayloads::default(),
            replies.clone(),
            Arc::new(StubClassifier::ok("cat", 0.9)),
        );
        let (tx, rx) = flume::bounded(4);
        for id in 0..3 {
            tx.send(photo_task(id, 42, Payload::Remote(format!("file-{id}"))))
                .unwrap();
        }
        drop(tx);

        let stats = worker(0, rx, context).await;

        assert_eq!(stats.processed, 3);
        // Attempted once each, never retried.
        assert_eq!(replies.sent().len(), 3);
    }
}
