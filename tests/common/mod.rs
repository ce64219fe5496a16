#![allow(dead_code)]

use std::net::{SocketAddr, TcpListener as StdTcpListener};
use std::time::Duration;

use axum::{http::StatusCode, routing::post, Json, Router};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use photo_classifier_lib::classifier::{parse_labels, HttpClassifier};
use serde_json::{json, Value};
use tokio::task::JoinHandle;

/// Bytes the fake model server refuses to classify.
pub const POISON_IMAGE: &[u8] = b"poison";

pub fn free_addr() -> SocketAddr {
    let listener = StdTcpListener::bind("127.0.0.1:0").expect("failed to bind ephemeral port");
    listener.local_addr().expect("no local addr")
}

/// Serves `router` on an ephemeral port until the returned handle is aborted.
pub fn spawn_upstream(router: Router) -> (SocketAddr, JoinHandle<()>) {
    let listener = StdTcpListener::bind("127.0.0.1:0").expect("failed to bind ephemeral port");
    let addr = listener.local_addr().expect("no local addr");
    let server = axum::Server::from_tcp(listener)
        .expect("failed to adopt listener")
        .serve(router.into_make_service());
    let handle = tokio::spawn(async move {
        server.await.expect("upstream server failed");
    });
    (addr, handle)
}

async fn predict(Json(body): Json<Value>) -> Result<Json<Value>, StatusCode> {
    let encoded = body["instances"][0]["b64"]
        .as_str()
        .ok_or(StatusCode::BAD_REQUEST)?;
    let image = STANDARD
        .decode(encoded)
        .map_err(|_| StatusCode::BAD_REQUEST)?;
    if image == POISON_IMAGE {
        return Err(StatusCode::INTERNAL_SERVER_ERROR);
    }
    Ok(Json(json!({ "predictions": [[0.1, 0.9]] })))
}

/// TF-Serving style model server that always answers "cat" at 90%.
pub fn spawn_model_server() -> (String, JoinHandle<()>) {
    let router = Router::new().route("/v1/models/*model", post(predict));
    let (addr, handle) = spawn_upstream(router);
    (
        format!("http://{addr}/v1/models/classifier:predict"),
        handle,
    )
}

pub fn classifier(predict_url: String) -> HttpClassifier {
    let labels = parse_labels("index,name\n0,dog\n1,cat\n").expect("labels parse");
    HttpClassifier::new(predict_url, labels).expect("classifier")
}

/// Polls `condition` until it holds or `limit` passes.
pub async fn wait_until(limit: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
