use std::sync::atomic::{AtomicBool, Ordering};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use futures::future::BoxFuture;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use super::{Classifier, ClassifierError, Label, Prediction};

#[derive(Serialize)]
struct PredictRequest<'a> {
    instances: [Instance<'a>; 1],
}

#[derive(Serialize)]
struct Instance<'a> {
    b64: &'a str,
}

#[derive(Deserialize, Debug)]
struct PredictResponse {
    predictions: Vec<Vec<f32>>,
}

/// Classifies images through a TF-Serving style REST endpoint.
///
/// Preprocessing and the model graph live on the model server; this client only ships the
/// encoded image and maps the returned probabilities onto the label list.
pub struct HttpClassifier {
    client: reqwest::Client,
    predict_url: String,
    labels: Vec<Label>,
    closed: AtomicBool,
}

impl HttpClassifier {
    pub fn new(predict_url: String, labels: Vec<Label>) -> Result<Self, ClassifierError> {
        if labels.is_empty() {
            return Err(ClassifierError::Other("label list is empty".into()));
        }
        Ok(Self {
            client: reqwest::Client::new(),
            predict_url,
            labels,
            closed: AtomicBool::new(false),
        })
    }

    async fn predict(&self, image: &[u8]) -> Result<Prediction, ClassifierError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ClassifierError::Closed);
        }

        let encoded = STANDARD.encode(image);
        let body = PredictRequest {
            instances: [Instance { b64: &encoded }],
        };
        let response = self
            .client
            .post(&self.predict_url)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ClassifierError::Status(response.status().as_u16()));
        }

        let parsed = response.json::<PredictResponse>().await?;
        let probabilities = parsed
            .predictions
            .into_iter()
            .next()
            .ok_or(ClassifierError::EmptyResponse)?;

        let prediction = select_label(&probabilities, &self.labels)?;
        info!(
            "Prediction finished. Predicted class=[{}] with probability=[{}]",
            prediction.class, prediction.probability
        );
        Ok(prediction)
    }
}

/// Picks the highest-probability class and resolves its label.
pub fn select_label(
    probabilities: &[f32],
    labels: &[Label],
) -> Result<Prediction, ClassifierError> {
    let (index, probability) = probabilities
        .iter()
        .copied()
        .enumerate()
        .filter(|(_, p)| !p.is_nan())
        .fold(None, |best: Option<(usize, f32)>, (idx, p)| match best {
            Some((_, best_p)) if best_p >= p => best,
            _ => Some((idx, p)),
        })
        .ok_or(ClassifierError::EmptyResponse)?;

    let label = labels
        .iter()
        .find(|label| label.index == index)
        .ok_or(ClassifierError::UnknownClass {
            index,
            labels: labels.len(),
        })?;

    Ok(Prediction::new(label.name.clone(), probability))
}

impl Classifier for HttpClassifier {
    fn classify<'a>(
        &'a self,
        image: &'a [u8],
    ) -> BoxFuture<'a, Result<Prediction, ClassifierError>> {
        Box::pin(self.predict(image))
    }

    fn shutdown<'a>(&'a self) -> BoxFuture<'a, Result<(), ClassifierError>> {
        Box::pin(async move {
            if self.closed.swap(true, Ordering::AcqRel) {
                debug!("Classifier already shut down");
            } else {
                info!("Classifier shut down");
            }
            Ok(())
        })
    }
}
