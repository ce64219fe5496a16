pub mod response;

use std::sync::Arc;
use std::time::Instant;

use log::{error, info};
use thiserror::Error;

use crate::bridge::{BridgeError, SyncBridge};
use crate::classifier::{Classifier, ClassifierError, Prediction};
use crate::server::monitoring::API_METRICS;
use crate::storage::{ObjectStore, StorageError};
pub use response::{ErrorResponse, Fault};

#[derive(Error, Debug)]
pub enum PredictionError {
    #[error("Could not load image: {0}")]
    Storage(#[from] StorageError),

    #[error("Could not classify image: {0}")]
    Classifier(#[from] ClassifierError),
}

#[derive(Error, Debug)]
pub enum RequestError {
    #[error("Request is missing an image id")]
    MissingId,

    #[error(transparent)]
    Bridge(#[from] BridgeError<PredictionError>),
}

impl RequestError {
    /// Which side is to blame, for the response sent back to the caller.
    pub fn fault(&self) -> Fault {
        match self {
            RequestError::MissingId => Fault::Client,
            RequestError::Bridge(BridgeError::Failed(PredictionError::Storage(
                StorageError::NotFound(_) | StorageError::InvalidKey(_),
            ))) => Fault::Client,
            RequestError::Bridge(_) => Fault::Server,
        }
    }

    pub fn response(&self) -> ErrorResponse {
        match self {
            RequestError::MissingId => ErrorResponse::missing_id(),
            _ => ErrorResponse::from_fault(self.fault()),
        }
    }
}

/// Classifies stored images on behalf of synchronous callers.
#[derive(Clone)]
pub struct PredictionService {
    storage: Arc<dyn ObjectStore>,
    classifier: Arc<dyn Classifier>,
    bridge: SyncBridge,
}

impl PredictionService {
    pub fn new(
        storage: Arc<dyn ObjectStore>,
        classifier: Arc<dyn Classifier>,
        bridge: SyncBridge,
    ) -> Self {
        Self {
            storage,
            classifier,
            bridge,
        }
    }

    /// Reads the image stored under `id` and classifies it.
    pub async fn calculate_prediction(&self, id: &str) -> Result<Prediction, PredictionError> {
        calculate_prediction(self.storage.as_ref(), self.classifier.as_ref(), id).await
    }

    /// Runs one prediction on its own task and waits for the outcome.
    ///
    /// An empty id is rejected before anything is spawned.
    pub async fn request_once(&self, id: &str) -> Result<Prediction, RequestError> {
        let id = id.trim();
        if id.is_empty() {
            return Err(RequestError::MissingId);
        }
        if let Some(metrics) = API_METRICS.get() {
            metrics.prediction_requests.inc();
        }

        let started = Instant::now();
        let storage = Arc::clone(&self.storage);
        let classifier = Arc::clone(&self.classifier);
        let owned_id = id.to_string();
        let result = self
            .bridge
            .request_once(async move {
                calculate_prediction(storage.as_ref(), classifier.as_ref(), &owned_id).await
            })
            .await;

        if let Some(metrics) = API_METRICS.get() {
            metrics.request_seconds.observe(started.elapsed().as_secs_f64());
        }
        match result {
            Ok(prediction) => Ok(prediction),
            Err(err) => {
                error!("Error getting prediction for image {}: {}", id, err);
                Err(err.into())
            }
        }
    }
}

async fn calculate_prediction(
    storage: &dyn ObjectStore,
    classifier: &dyn Classifier,
    id: &str,
) -> Result<Prediction, PredictionError> {
    let started = Instant::now();
    let image = storage.get(id).await?;
    if let Some(metrics) = API_METRICS.get() {
        metrics.storage_seconds.observe(started.elapsed().as_secs_f64());
    }

    let started = Instant::now();
    let prediction = classifier.classify(&image).await?;
    if let Some(metrics) = API_METRICS.get() {
        metrics
            .classification_seconds
            .observe(started.elapsed().as_secs_f64());
    }
    info!(
        "Image {} classified as {} ({})",
        id, prediction.class, prediction.probability
    );
    Ok(prediction)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::storage::MemoryObjectStore;
    use crate::test_support::StubClassifier;

    async fn service_with(
        classifier: Arc<StubClassifier>,
        bridge: SyncBridge,
    ) -> PredictionService {
        let store = Arc::new(MemoryObjectStore::new());
        store.put("img-1", b"jpeg".to_vec()).await.unwrap();
        PredictionService::new(store, classifier, bridge)
    }

    #[tokio::test]
    async fn stored_image_is_classified() {
        let classifier = Arc::new(StubClassifier::ok("cat", 0.8));
        let service = service_with(classifier.clone(), SyncBridge::new()).await;

        let prediction = service.request_once("img-1").await.unwrap();

        assert_eq!(prediction, Prediction::new("cat", 0.8));
        assert_eq!(classifier.calls(), 1);
    }

    #[tokio::test]
    async fn calculate_prediction_runs_inline() {
        let classifier = Arc::new(StubClassifier::ok("dog", 0.6));
        let service = service_with(classifier, SyncBridge::new()).await;

        assert_eq!(
            service.calculate_prediction("img-1").await.unwrap(),
            Prediction::new("dog", 0.6)
        );
        assert!(matches!(
            service.calculate_prediction("missing").await,
            Err(PredictionError::Storage(StorageError::NotFound(_)))
        ));
    }

    #[tokio::test]
    async fn missing_id_is_a_client_fault_without_classifying() {
        let classifier = Arc::new(StubClassifier::ok("cat", 0.8));
        let service = service_with(classifier.clone(), SyncBridge::new()).await;

        for id in ["", "   "] {
            let err = service.request_once(id).await.unwrap_err();
            assert!(matches!(err, RequestError::MissingId));
            assert_eq!(err.fault(), Fault::Client);
        }
        assert_eq!(classifier.calls(), 0);
    }

    #[tokio::test]
    async fn engine_error_is_a_server_fault() {
        let service = service_with(Arc::new(StubClassifier::failing()), SyncBridge::new()).await;

        let err = service.request_once("img-1").await.unwrap_err();

        assert_eq!(err.fault(), Fault::Server);
        let body = err.response();
        assert_eq!(body.error_type, Fault::Server);
        assert!(!body.message.contains("tensor"));
    }

    #[tokio::test]
    async fn unknown_image_is_a_client_fault() {
        let classifier = Arc::new(StubClassifier::ok("cat", 0.8));
        let service = service_with(classifier.clone(), SyncBridge::new()).await;

        let err = service.request_once("nope").await.unwrap_err();

        assert_eq!(err.fault(), Fault::Client);
        assert_eq!(classifier.calls(), 0);
    }

    #[tokio::test]
    async fn slow_engine_times_out_as_server_fault() {
        let classifier =
            Arc::new(StubClassifier::ok("cat", 0.8).with_delay(Duration::from_secs(5)));
        let bridge = SyncBridge::with_timeout(Some(Duration::from_millis(20)));
        let service = service_with(classifier, bridge).await;

        let err = service.request_once("img-1").await.unwrap_err();

        assert!(matches!(err, RequestError::Bridge(BridgeError::TimedOut(_))));
        assert_eq!(err.fault(), Fault::Server);
    }
}
