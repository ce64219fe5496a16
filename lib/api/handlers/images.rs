use axum::extract::multipart::MultipartRejection;
use axum::extract::{Multipart, Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::api::ApiState;
use crate::server::monitoring::API_METRICS;
use crate::storage::StorageError;

const FILE_FORM_KEY: &str = "file";
const STATIC_PICTURE_NAME: &str = "picture.jpg";
pub const INVALID_FORM_MESSAGE: &str = "invalid or missing http form data";
pub const INVALID_FORM_FILE_MESSAGE: &str =
    "invalid form key. Please provide an image file under the key 'file'";

/// Identifies a stored upload.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ImageParams {
    pub id: String,
    pub original_name: String,
}

/// `POST /images`: stores the single `file` field under a fresh id.
pub async fn upload_image(
    State(state): State<ApiState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<ImageParams>, (StatusCode, &'static str)> {
    let mut multipart = multipart.map_err(|e| {
        warn!("Invalid http form: {}", e);
        (StatusCode::BAD_REQUEST, INVALID_FORM_MESSAGE)
    })?;

    let mut files = vec![];
    loop {
        match multipart.next_field().await {
            Ok(Some(field)) => {
                if field.name() != Some(FILE_FORM_KEY) {
                    continue;
                }
                let data = field.bytes().await.map_err(|e| {
                    warn!("Could not read file from http form: {}", e);
                    (StatusCode::BAD_REQUEST, INVALID_FORM_FILE_MESSAGE)
                })?;
                files.push(data);
            }
            Ok(None) => break,
            Err(e) => {
                warn!("Invalid http form: {}", e);
                return Err((StatusCode::BAD_REQUEST, INVALID_FORM_MESSAGE));
            }
        }
    }

    if files.len() != 1 {
        warn!("Invalid number of files in form: {}", files.len());
        return Err((StatusCode::BAD_REQUEST, INVALID_FORM_FILE_MESSAGE));
    }
    let data = files.remove(0);

    let id = Ulid::new().to_string();
    state.store.put(&id, data.to_vec()).await.map_err(|e| {
        error!("Could not store uploaded image: {}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
    })?;
    info!("Stored image {} ({} bytes)", id, data.len());
    if let Some(metrics) = API_METRICS.get() {
        metrics.images_stored.inc();
    }

    Ok(Json(ImageParams {
        id,
        original_name: STATIC_PICTURE_NAME.to_string(),
    }))
}

/// `GET /images/:id`: raw bytes of a stored upload.
pub async fn get_image(State(state): State<ApiState>, Path(id): Path<String>) -> Response {
    match state.store.get(&id).await {
        Ok(bytes) => ([(header::CONTENT_TYPE, "image/jpeg")], bytes).into_response(),
        Err(e @ (StorageError::NotFound(_) | StorageError::InvalidKey(_))) => {
            warn!("Image lookup failed: {}", e);
            StatusCode::NOT_FOUND.into_response()
        }
        Err(e) => {
            error!("Could not read image {}: {}", id, e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
