//! Process configuration, read once from the environment at startup.
//!
//! ## Environment Variables
//! - `PORT` - port to listen on (default: `5000`)
//! - `GOOGLE_VISION_API_KEY` - Vision API key (takes precedence over a service account)
//! - `GOOGLE_APPLICATION_CREDENTIALS` - path to a service account JSON key
//! - `VISION_ENDPOINT` - Vision API base URL (default: `https://vision.googleapis.com`)
//! - `VISION_TIMEOUT_SECS` - timeout for each Vision call (default: `30`)
//! - `FETCH_TIMEOUT_SECS` - timeout for fetching images by URL (default: `10`)
//! - `MAX_UPLOAD_BYTES` - request body limit (default: 20 MB)

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::constants::{
    DEFAULT_FETCH_TIMEOUT_SECS, DEFAULT_MAX_UPLOAD_BYTES, DEFAULT_PORT, DEFAULT_VISION_ENDPOINT,
    DEFAULT_VISION_TIMEOUT_SECS,
};

/// How the Vision client authenticates
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VisionCredentials {
    ApiKey(String),
    ServiceAccount(PathBuf),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub vision_endpoint: String,
    pub vision_credentials: VisionCredentials,
    pub vision_timeout: Duration,
    pub fetch_timeout: Duration,
    pub max_upload_bytes: usize,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no Vision credentials: set GOOGLE_VISION_API_KEY or GOOGLE_APPLICATION_CREDENTIALS")]
    MissingCredentials,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let vision_credentials = if let Some(key) = non_empty("GOOGLE_VISION_API_KEY") {
            VisionCredentials::ApiKey(key)
        } else if let Some(path) = non_empty("GOOGLE_APPLICATION_CREDENTIALS") {
            VisionCredentials::ServiceAccount(PathBuf::from(path))
        } else {
            return Err(ConfigError::MissingCredentials);
        };

        Ok(Self {
            port: positive(&lookup, "PORT", DEFAULT_PORT),
            vision_endpoint: non_empty("VISION_ENDPOINT")
                .unwrap_or_else(|| DEFAULT_VISION_ENDPOINT.to_string()),
            vision_credentials,
            vision_timeout: Duration::from_secs(positive(
                &lookup,
                "VISION_TIMEOUT_SECS",
                DEFAULT_VISION_TIMEOUT_SECS,
            )),
            fetch_timeout: Duration::from_secs(positive(
                &lookup,
                "FETCH_TIMEOUT_SECS",
                DEFAULT_FETCH_TIMEOUT_SECS,
            )),
            max_upload_bytes: positive(&lookup, "MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES),
        })
    }
}

/// Parse a positive number, falling back to the default when unset or invalid
fn positive<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: FromStr + PartialOrd + Default,
{
    lookup(key)
        .and_then(|s| s.trim().parse().ok())
        .filter(|v| *v > T::default())
        .unwrap_or(default)
}
