use serde::Serialize;

pub const MISSING_ID_MESSAGE: &str = "request is missing mandatory path parameter 'id'";
pub const PREDICTION_FAILED_MESSAGE: &str = "could not make prediction on image";
pub const IMAGE_NOT_FOUND_MESSAGE: &str = "no image stored under this id";

/// The two failure classes callers ever see.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Fault {
    #[serde(rename = "CLIENT_ERROR")]
    Client,
    #[serde(rename = "SERVER_ERROR")]
    Server,
}

/// JSON body sent in place of a prediction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ErrorResponse {
    pub error_type: Fault,
    pub message: String,
}

impl ErrorResponse {
    pub fn missing_id() -> Self {
        Self {
            error_type: Fault::Client,
            message: MISSING_ID_MESSAGE.to_string(),
        }
    }

    pub fn from_fault(fault: Fault) -> Self {
        let message = match fault {
            Fault::Client => IMAGE_NOT_FOUND_MESSAGE,
            Fault::Server => PREDICTION_FAILED_MESSAGE,
        };
        Self {
            error_type: fault,
            message: message.to_string(),
        }
    }

    pub fn server_error() -> Self {
        Self::from_fault(Fault::Server)
    }
}
