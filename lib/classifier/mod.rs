pub mod http;
pub mod labels;

use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use http::HttpClassifier;
pub use labels::{load_labels, parse_labels, Label};

#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Model server returned status {0}")]
    Status(u16),

    #[error("Model server produced an empty result")]
    EmptyResponse,

    #[error("No label for class index {index} ({labels} labels loaded)")]
    UnknownClass { index: usize, labels: usize },

    #[error("Classifier has been shut down")]
    Closed,

    #[error("{0}")]
    Other(String),
}

/// Best class for one image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub class: String,
    pub probability: f32,
}

impl Prediction {
    pub fn new(class: impl Into<String>, probability: f32) -> Self {
        Self {
            class: class.into(),
            probability,
        }
    }
}

impl fmt::Display for Prediction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "I'm {:.1}% sure this is a {}",
            self.probability * 100.0,
            self.class
        )
    }
}

/// Classification engine shared by every worker and the prediction API.
///
/// Implementations must tolerate concurrent `classify` calls.
pub trait Classifier: Send + Sync {
    fn classify<'a>(
        &'a self,
        image: &'a [u8],
    ) -> BoxFuture<'a, Result<Prediction, ClassifierError>>;

    /// Releases held resources. Called once, after every worker has drained.
    fn shutdown<'a>(&'a self) -> BoxFuture<'a, Result<(), ClassifierError>>;
}

impl<T> Classifier for Arc<T>
where
    T: Classifier + ?Sized,
{
    fn classify<'a>(
        &'a self,
        image: &'a [u8],
    ) -> BoxFuture<'a, Result<Prediction, ClassifierError>> {
        (**self).classify(image)
    }

    fn shutdown<'a>(&'a self) -> BoxFuture<'a, Result<(), ClassifierError>> {
        (**self).shutdown()
    }
}
