pub mod types;

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use log::debug;
use serde::de::DeserializeOwned;

use crate::bot::ports::{EventTransport, PayloadFetcher, ReplyTransport, TransportError};
use crate::bot::task::InboundEvent;
use types::{ApiResponse, File, SendMessage, Update};

/// Extra time on top of the long-poll timeout before the HTTP request itself gives up.
const POLL_REQUEST_MARGIN: Duration = Duration::from_secs(5);

/// Bot API client acting as event, payload, and reply transport.
pub struct TelegramClient {
    client: reqwest::Client,
    api_url: String,
    token: String,
    /// Shared by every worker so bursts of replies stay under the API flood limit.
    reply_limiter: Arc<DefaultDirectRateLimiter>,
}

impl TelegramClient {
    pub fn new(api_url: String, token: String, replies_per_second: u32) -> Self {
        let per_second = NonZeroU32::new(replies_per_second).unwrap_or(nonzero_ext::nonzero!(1u32));
        Self {
            client: reqwest::Client::new(),
            api_url: api_url.trim_end_matches('/').to_string(),
            token,
            reply_limiter: Arc::new(RateLimiter::direct(Quota::per_second(per_second))),
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_url, self.token, method)
    }

    fn file_url(&self, file_path: &str) -> String {
        format!("{}/file/bot{}/{}", self.api_url, self.token, file_path)
    }

    pub async fn get_updates(
        &self,
        offset: i64,
        timeout: Duration,
    ) -> Result<Vec<Update>, TransportError> {
        let request = self
            .client
            .get(self.method_url("getUpdates"))
            .query(&[
                ("offset", offset.to_string()),
                ("timeout", timeout.as_secs().to_string()),
            ])
            .timeout(timeout + POLL_REQUEST_MARGIN);
        self.call(request).await
    }

    pub async fn get_file(&self, file_id: &str) -> Result<File, TransportError> {
        let request = self
            .client
            .get(self.method_url("getFile"))
            .query(&[("file_id", file_id)]);
        self.call(request).await
    }

    pub async fn download_file(&self, file_id: &str) -> Result<Vec<u8>, TransportError> {
        let file = self.get_file(file_id).await?;
        let file_path = file.file_path.ok_or_else(|| {
            TransportError::Decode(format!("file {} has no download path", file.file_id))
        })?;

        let response = self
            .client
            .get(self.file_url(&file_path))
            .send()
            .await
            .map_err(strip_url)?;
        if !response.status().is_success() {
            return Err(TransportError::Status(response.status().as_u16()));
        }
        let bytes = response.bytes().await.map_err(strip_url)?;
        debug!("Downloaded {} bytes for file {}", bytes.len(), file_id);
        Ok(bytes.to_vec())
    }

    pub async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), TransportError> {
        self.reply_limiter.until_ready().await;
        let request = self
            .client
            .post(self.method_url("sendMessage"))
            .json(&SendMessage { chat_id, text });
        let _: serde_json::Value = self.call(request).await?;
        Ok(())
    }

    async fn call<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, TransportError> {
        let response = request.send().await.map_err(strip_url)?;
        let envelope = response
            .json::<ApiResponse<T>>()
            .await
            .map_err(strip_url)?;
        unwrap_envelope(envelope)
    }
}

/// Request URLs embed the bot token; keep it out of errors and logs.
fn strip_url(err: reqwest::Error) -> TransportError {
    TransportError::Request(err.without_url())
}

fn unwrap_envelope<T>(envelope: ApiResponse<T>) -> Result<T, TransportError> {
    match envelope {
        ApiResponse {
            ok: true,
            result: Some(result),
            ..
        } => Ok(result),
        ApiResponse { ok: true, .. } => {
            Err(TransportError::Decode("response is missing `result`".into()))
        }
        ApiResponse {
            error_code,
            description,
            ..
        } => Err(TransportError::Api {
            code: error_code,
            description: description.unwrap_or_else(|| "unknown error".into()),
        }),
    }
}

impl EventTransport for TelegramClient {
    fn fetch_events<'a>(
        &'a self,
        cursor: i64,
        timeout: Duration,
    ) -> BoxFuture<'a, Result<Vec<InboundEvent>, TransportError>> {
        Box::pin(async move {
            let updates = self.get_updates(cursor, timeout).await?;
            Ok(updates.into_iter().map(InboundEvent::from).collect())
        })
    }
}

impl PayloadFetcher for TelegramClient {
    fn fetch_bytes<'a>(
        &'a self,
        reference: &'a str,
    ) -> BoxFuture<'a, Result<Vec<u8>, TransportError>> {
        Box::pin(self.download_file(reference))
    }
}

impl ReplyTransport for TelegramClient {
    fn send<'a>(
        &'a self,
        chat_id: i64,
        text: &'a str,
    ) -> BoxFuture<'a, Result<(), TransportError>> {
        Box::pin(self.send_message(chat_id, text))
    }
}
