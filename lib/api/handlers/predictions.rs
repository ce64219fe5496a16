use std::fmt::Display;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::Response;
use futures::future::BoxFuture;
use log::warn;
use serde::Serialize;

use crate::api::ApiState;
use crate::prediction::{ErrorResponse, PredictionService};

/// Caller-owned transport the outcome of one prediction is written to.
pub trait ResponseChannel: Send {
    type Error: Display + Send;

    fn send_text<'a>(&'a mut self, text: String) -> BoxFuture<'a, Result<(), Self::Error>>;

    /// Consumes the channel, so it is closed at most once.
    fn close(self) -> BoxFuture<'static, Result<(), Self::Error>>;
}

impl ResponseChannel for WebSocket {
    type Error = axum::Error;

    fn send_text<'a>(&'a mut self, text: String) -> BoxFuture<'a, Result<(), Self::Error>> {
        Box::pin(WebSocket::send(self, Message::Text(text)))
    }

    fn close(self) -> BoxFuture<'static, Result<(), Self::Error>> {
        Box::pin(WebSocket::close(self))
    }
}

async fn write_json<C: ResponseChannel, T: Serialize>(
    channel: &mut C,
    value: &T,
) -> Result<(), String> {
    let text = serde_json::to_string(value).map_err(|e| e.to_string())?;
    channel.send_text(text).await.map_err(|e| e.to_string())
}

/// Computes one prediction and writes exactly one JSON message for it, then closes the
/// channel on every path.
pub async fn respond_with_prediction<C: ResponseChannel>(
    service: &PredictionService,
    id: &str,
    mut channel: C,
) {
    match service.request_once(id).await {
        Ok(prediction) => {
            if let Err(e) = write_json(&mut channel, &prediction).await {
                warn!("Error writing prediction to websocket: {}", e);
                if let Err(e) = write_json(&mut channel, &ErrorResponse::server_error()).await {
                    warn!("Error writing websocket error response: {}", e);
                }
            }
        }
        Err(err) => {
            if let Err(e) = write_json(&mut channel, &err.response()).await {
                warn!("Error writing websocket error response: {}", e);
            }
        }
    }

    if let Err(e) = channel.close().await {
        warn!("Error closing websocket: {}", e);
    }
}

/// `GET /predictions/:id`, upgraded to a websocket.
pub async fn get_prediction(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| async move {
        respond_with_prediction(&state.predictions, &id, socket).await;
    })
}

/// `GET /predictions` with no id: answers with the client error over the socket.
pub async fn get_prediction_without_id(
    State(state): State<ApiState>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| async move {
        respond_with_prediction(&state.predictions, "", socket).await;
    })
}
