pub mod handlers;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;

use crate::prediction::PredictionService;
use crate::storage::ObjectStore;

/// Largest accepted upload.
const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

#[derive(Clone)]
pub struct ApiState {
    pub store: Arc<dyn ObjectStore>,
    pub predictions: PredictionService,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route(
            "/images",
            post(handlers::images::upload_image).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/images/:id", get(handlers::images::get_image))
        .route("/predictions", get(handlers::predictions::get_prediction_without_id))
        .route("/predictions/:id", get(handlers::predictions::get_prediction))
        .with_state(state)
}
