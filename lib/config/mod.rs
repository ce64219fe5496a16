use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::cli::Mode;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Environment variable error: {0}")]
    EnvVarError(#[from] env::VarError),

    #[error("Invalid value for {name}: {value}")]
    InvalidValue { name: String, value: String },
}

pub struct Config {
    /// Bot API token. Required whenever the bot runs.
    pub telegram_bot_token: String,
    pub telegram_api_url: String,
    /// REST endpoint of the model server.
    pub classifier_url: String,
    /// Directory holding `labels.csv`. Default: /model
    pub model_path: PathBuf,
    /// Default: 4
    pub n_workers: usize,
    /// Capacity of the update queue. Default: 100
    pub fetch_buffer: usize,
    pub poll_timeout: Duration,
    pub fetch_retry_backoff: Duration,
    pub prediction_timeout: Option<Duration>,
    pub reply_rate_limit: u32,
    pub listen_addr: SocketAddr,
    pub storage_root: PathBuf,
    pub storage_bucket_name: String,
    pub storage_object_folder: String,
}

impl Config {
    pub fn from_env(mode: Mode) -> Result<Self, ConfigError> {
        let telegram_bot_token = env::var("TELEGRAM_BOT_TOKEN").unwrap_or_default();
        if mode.runs_bot() && telegram_bot_token.is_empty() {
            return Err(ConfigError::MissingEnvVar("TELEGRAM_BOT_TOKEN".to_string()));
        }

        let telegram_api_url = env::var("TELEGRAM_API_URL")
            .unwrap_or_else(|_| "https://api.telegram.org".to_string());
        let classifier_url = env::var("CLASSIFIER_URL").unwrap_or_else(|_| {
            "http://localhost:8501/v1/models/classifier:predict".to_string()
        });
        let model_path = PathBuf::from(env::var("MODEL_PATH").unwrap_or_else(|_| "/model".into()));

        let n_workers = parse_var("N_WORKERS", 4usize)?;
        if n_workers == 0 {
            return Err(ConfigError::InvalidValue {
                name: "N_WORKERS".to_string(),
                value: "0".to_string(),
            });
        }
        let fetch_buffer = parse_var("FETCH_BUFFER", 100usize)?.max(1);
        let poll_timeout = Duration::from_secs(parse_var("POLL_TIMEOUT_SECS", 10u64)?);
        let fetch_retry_backoff =
            Duration::from_secs(parse_var("FETCH_RETRY_BACKOFF_SECS", 3u64)?);

        // 0 disables the bridge timeout
        let prediction_timeout = match parse_var("PREDICTION_TIMEOUT_SECS", 60u64)? {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };
        let reply_rate_limit = parse_var("REPLY_RATE_LIMIT", 30u32)?.max(1);

        let listen_addr = parse_var("LISTEN_ADDR", SocketAddr::from(([0, 0, 0, 0], 8080)))?;

        let storage_root =
            PathBuf::from(env::var("STORAGE_ROOT").unwrap_or_else(|_| "./data".into()));
        let storage_bucket_name =
            env::var("STORAGE_BUCKET_NAME").unwrap_or_else(|_| "images".to_string());
        let storage_object_folder =
            env::var("STORAGE_OBJECT_FOLDER").unwrap_or_else(|_| "uploaded-images/".to_string());

        Ok(Self {
            telegram_bot_token,
            telegram_api_url,
            classifier_url,
            model_path,
            n_workers,
            fetch_buffer,
            poll_timeout,
            fetch_retry_backoff,
            prediction_timeout,
            reply_rate_limit,
            listen_addr,
            storage_root,
            storage_bucket_name,
            storage_object_folder,
        })
    }

    pub fn labels_path(&self) -> PathBuf {
        self.model_path.join("labels.csv")
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(val) => val.trim().parse::<T>().map_err(|_| ConfigError::InvalidValue {
            name: name.to_string(),
            value: val,
        }),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_var_falls_back_to_default_when_unset() {
        let value = parse_var("PHOTO_CLASSIFIER_TEST_UNSET_VAR", 7usize).unwrap();
        assert_eq!(value, 7);
    }

    #[test]
    fn parse_var_rejects_malformed_values() {
        env::set_var("PHOTO_CLASSIFIER_TEST_BAD_VAR", "four");
        let err = parse_var("PHOTO_CLASSIFIER_TEST_BAD_VAR", 4usize).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue { ref name, .. } if name == "PHOTO_CLASSIFIER_TEST_BAD_VAR"
        ));
        env::remove_var("PHOTO_CLASSIFIER_TEST_BAD_VAR");
    }

    #[test]
    fn parse_var_trims_whitespace() {
        env::set_var("PHOTO_CLASSIFIER_TEST_PADDED_VAR", " 12 ");
        assert_eq!(parse_var("PHOTO_CLASSIFIER_TEST_PADDED_VAR", 0u64).unwrap(), 12);
        env::remove_var("PHOTO_CLASSIFIER_TEST_PADDED_VAR");
    }
}
