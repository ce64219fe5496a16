use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use futures::future::BoxFuture;

use crate::bot::ports::{EventTransport, PayloadFetcher, ReplyTransport, TransportError};
use crate::bot::task::{InboundEvent, Payload};
use crate::classifier::{Classifier, ClassifierError, Prediction};

/// Photo update from chat 1 whose payload resolves to `file-<id>`.
pub(crate) fn event(update_id: i64) -> InboundEvent {
    InboundEvent {
        update_id,
        chat_id: Some(1),
        payload: Some(Payload::Remote(format!("file-{update_id}"))),
    }
}

/// Replays scripted poll results, then behaves like an idle long poll.
pub(crate) struct ScriptedTransport {
    script: Mutex<VecDeque<Result<Vec<InboundEvent>, TransportError>>>,
    cursors: Mutex<Vec<i64>>,
}

impl ScriptedTransport {
    pub(crate) fn new(script: Vec<Result<Vec<InboundEvent>, TransportError>>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            cursors: Mutex::new(Vec::new()),
        }
    }

    /// Cursor passed to each poll, in call order.
    pub(crate) fn cursors(&self) -> Vec<i64> {
        self.cursors.lock().expect("cursors mutex poisoned").clone()
    }
}

impl EventTransport for ScriptedTransport {
    fn fetch_events<'a>(
        &'a self,
        cursor: i64,
        _timeout: Duration,
    ) -> BoxFuture<'a, Result<Vec<InboundEvent>, TransportError>> {
        Box::pin(async move {
            self.cursors
                .lock()
                .expect("cursors mutex poisoned")
                .push(cursor);
            let next = self.script.lock().expect("script mutex poisoned").pop_front();
            match next {
                Some(result) => result,
                None => {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    Ok(Vec::new())
                }
            }
        })
    }
}

/// Resolves `reference` to its own bytes unless told to fail on it.
#[derive(Default)]
pub(crate) struct EchoPayloads {
    failing: HashSet<String>,
    fetches: AtomicUsize,
}

impl EchoPayloads {
    pub(crate) fn failing_on(references: &[&str]) -> Self {
        Self {
            failing: references.iter().map(|r| r.to_string()).collect(),
            fetches: AtomicUsize::new(0),
        }
    }

    pub(crate) fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl PayloadFetcher for EchoPayloads {
    fn fetch_bytes<'a>(
        &'a self,
        reference: &'a str,
    ) -> BoxFuture<'a, Result<Vec<u8>, TransportError>> {
        Box::pin(async move {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            if self.failing.contains(reference) {
                Err(TransportError::Status(404))
            } else {
                Ok(reference.as_bytes().to_vec())
            }
        })
    }
}

#[derive(Default)]
pub(crate) struct RecordingReplies {
    sent: Mutex<Vec<(i64, String)>>,
    fail: bool,
}

impl RecordingReplies {
    pub(crate) fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub(crate) fn sent(&self) -> Vec<(i64, String)> {
        self.sent.lock().expect("sent mutex poisoned").clone()
    }
}

impl ReplyTransport for RecordingReplies {
    fn send<'a>(
        &'a self,
        chat_id: i64,
        text: &'a str,
    ) -> BoxFuture<'a, Result<(), TransportError>> {
        Box::pin(async move {
            self.sent
                .lock()
                .expect("sent mutex poisoned")
                .push((chat_id, text.to_string()));
            if self.fail {
                Err(TransportError::Api {
                    code: Some(403),
                    description: "Forbidden: bot was blocked by the user".into(),
                })
            } else {
                Ok(())
            }
        })
    }
}

pub(crate) struct StubClassifier {
    prediction: Option<Prediction>,
    delay: Duration,
    fail_shutdown: bool,
    calls: AtomicUsize,
    shutdowns: AtomicUsize,
}

impl StubClassifier {
    pub(crate) fn ok(class: &str, probability: f32) -> Self {
        Self {
            prediction: Some(Prediction::new(class, probability)),
            delay: Duration::ZERO,
            fail_shutdown: false,
            calls: AtomicUsize::new(0),
            shutdowns: AtomicUsize::new(0),
        }
    }

    pub(crate) fn failing() -> Self {
        Self {
            prediction: None,
            ..Self::ok("unused", 0.0)
        }
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub(crate) fn with_failing_shutdown(mut self) -> Self {
        self.fail_shutdown = true;
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn shutdowns(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }
}

impl Classifier for StubClassifier {
    fn classify<'a>(
        &'a self,
        _image: &'a [u8],
    ) -> BoxFuture<'a, Result<Prediction, ClassifierError>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.prediction
                .clone()
                .ok_or_else(|| ClassifierError::Other("tensor shape mismatch".into()))
        })
    }

    fn shutdown<'a>(&'a self) -> BoxFuture<'a, Result<(), ClassifierError>> {
        Box::pin(async move {
            self.shutdowns.fetch_add(1, Ordering::SeqCst);
            if self.fail_shutdown {
                Err(ClassifierError::Other("session close failed".into()))
            } else {
                Ok(())
            }
        })
    }
}
