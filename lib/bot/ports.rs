use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use thiserror::Error;

use super::task::InboundEvent;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("API error {code:?}: {description}")]
    Api {
        code: Option<i64>,
        description: String,
    },

    #[error("Unexpected status code {0}")]
    Status(u16),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Transport unavailable: {0}")]
    Unavailable(String),
}

/// Polls for new updates.
///
/// Implemented by the Bot API client and by scripted doubles in tests.
pub trait EventTransport: Send + Sync {
    /// Returns every update with a sequence number `>= cursor`, waiting up to `timeout`
    /// for at least one to arrive.
    fn fetch_events<'a>(
        &'a self,
        cursor: i64,
        timeout: Duration,
    ) -> BoxFuture<'a, Result<Vec<InboundEvent>, TransportError>>;
}

/// Resolves a remote payload reference into raw bytes.
pub trait PayloadFetcher: Send + Sync {
    fn fetch_bytes<'a>(&'a self, reference: &'a str)
        -> BoxFuture<'a, Result<Vec<u8>, TransportError>>;
}

/// Delivers a text reply to a chat.
pub trait ReplyTransport: Send + Sync {
    fn send<'a>(&'a self, chat_id: i64, text: &'a str) -> BoxFuture<'a, Result<(), TransportError>>;
}

impl<T> EventTransport for Arc<T>
where
    T: EventTransport + ?Sized,
{
    fn fetch_events<'a>(
        &'a self,
        cursor: i64,
        timeout: Duration,
    ) -> BoxFuture<'a, Result<Vec<InboundEvent>, TransportError>> {
        (**self).fetch_events(cursor, timeout)
    }
}

impl<T> PayloadFetcher for Arc<T>
where
    T: PayloadFetcher + ?Sized,
{
    fn fetch_bytes<'a>(
        &'a self,
        reference: &'a str,
    ) -> BoxFuture<'a, Result<Vec<u8>, TransportError>> {
        (**self).fetch_bytes(reference)
    }
}

impl<T> ReplyTransport for Arc<T>
where
    T: ReplyTransport + ?Sized,
{
    fn send<'a>(
        &'a self,
        chat_id: i64,
        text: &'a str,
    ) -> BoxFuture<'a, Result<(), TransportError>> {
        (**self).send(chat_id, text)
    }
}
