pub mod monitoring;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::StatusCode;
use axum::{extract::State, routing::get, Router};
use log::{error, info, warn};
use prometheus_client::encoding::text::encode;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::state::AppState;
use monitoring::{ApiMetrics, BotMetrics, API_METRICS, BOT_METRICS};

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Could not bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: hyper::Error,
    },

    #[error("Server error: {0}")]
    Serve(#[from] hyper::Error),

    #[error("Server task failed: {0}")]
    Task(String),
}

// Health endpoint handler
async fn health_handler() -> String {
    "Healthy".to_string()
}

async fn expose_metrics(state: State<Arc<AppState>>) -> Result<String, StatusCode> {
    let mut buffer = String::new();
    let registry = state.registry.read().await;
    encode(&mut buffer, &registry).map_err(|e| {
        error!("Could not encode metrics: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    Ok(buffer)
}

/// Registers both metric families once per process.
pub async fn register_metrics(state: &AppState) {
    let mut registry = state.registry.write().await;
    if BOT_METRICS.get().is_none() {
        let _ = BOT_METRICS.set(BotMetrics::register(&mut registry, "bot"));
    }
    if API_METRICS.get().is_none() {
        let _ = API_METRICS.set(ApiMetrics::register(&mut registry, "api"));
    }
}

/// Binds `addr` and serves health, metrics, and `routes` until the shutdown token fires.
pub async fn setup_server(
    state: Arc<AppState>,
    addr: SocketAddr,
    routes: Option<Router>,
) -> Result<JoinHandle<Result<(), ServerError>>, ServerError> {
    register_metrics(&state).await;

    let shutdown_token = state.shutdown_token.clone();
    let mut app = Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(expose_metrics))
        .with_state(state);
    if let Some(routes) = routes {
        app = app.merge(routes);
    }

    let server = axum::Server::try_bind(&addr)
        .map_err(|source| ServerError::Bind { addr, source })?
        .serve(app.into_make_service());
    info!("Listening on {}", server.local_addr());

    let server_handle = tokio::spawn(async move {
        server
            .with_graceful_shutdown(async move {
                shutdown_token.cancelled().await;
            })
            .await?;
        info!("Server stopped");
        Ok(())
    });

    Ok(server_handle)
}

/// Waits for the shutdown token or for the server to exit, whichever comes first.
///
/// A server that stops on its own cancels `shutdown_token`, so the rest of the process
/// winds down instead of waiting for a signal.
pub async fn wait_for_server(
    mut server_handle: JoinHandle<Result<(), ServerError>>,
    shutdown_token: &CancellationToken,
) -> Result<(), ServerError> {
    let joined = tokio::select! {
        _ = shutdown_token.cancelled() => (&mut server_handle).await,
        joined = &mut server_handle => {
            warn!("Server exited before shutdown was requested");
            shutdown_token.cancel();
            joined
        }
    };
    joined.map_err(|e| ServerError::Task(e.to_string()))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn metrics_are_registered_once() {
        let state = AppState::new(CancellationToken::new());
        register_metrics(&state).await;
        register_metrics(&state).await;
        assert!(BOT_METRICS.get().is_some());
        assert!(API_METRICS.get().is_some());
    }

    #[tokio::test]
    async fn second_bind_on_same_port_fails() {
        let token = CancellationToken::new();
        let state = Arc::new(AppState::new(token.clone()));
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let result = setup_server(state, addr, None).await;
        assert!(matches!(result, Err(ServerError::Bind { .. })));
        drop(listener);
    }

    #[tokio::test]
    async fn server_exiting_early_cancels_the_token() {
        let token = CancellationToken::new();
        let handle = tokio::spawn(async { Err(ServerError::Task("listener lost".to_string())) });

        let result = tokio::time::timeout(Duration::from_secs(1), wait_for_server(handle, &token))
            .await
            .expect("should not wait for a signal");

        assert!(matches!(result, Err(ServerError::Task(_))));
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn cancelled_token_waits_for_graceful_stop() {
        let token = CancellationToken::new();
        let state = Arc::new(AppState::new(token.clone()));
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let handle = setup_server(state, addr, None).await.unwrap();

        token.cancel();
        assert!(wait_for_server(handle, &token).await.is_ok());
    }
}
