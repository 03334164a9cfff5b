//! DNS client error types

use thiserror::Error;

/// DNS API errors
#[derive(Error, Debug)]
pub enum DnsError {
    #[error("Zone not found: {0}")]
    ZoneNotFound(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),
}
