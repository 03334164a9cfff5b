//! Certificate lifecycle error types

use talon_dns::DnsError;
use talon_storage::StorageError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TlsError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Unknown private key type: {0}")]
    UnknownKeyType(String),

    #[error("Provider error: {0}")]
    Provider(String),

    /// One or more of the three certificate artifacts failed to persist.
    /// Callers must not use the bundle when this is returned.
    #[error("Partial certificate write, failed artifacts: {}", failed.join(", "))]
    PartialWrite { failed: Vec<String> },

    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<StorageError> for TlsError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(key) => TlsError::NotFound(key),
            StorageError::Configuration(msg) => TlsError::Configuration(msg),
            other => TlsError::Storage(other.to_string()),
        }
    }
}

impl From<DnsError> for TlsError {
    fn from(err: DnsError) -> Self {
        match err {
            DnsError::ZoneNotFound(zone) => TlsError::NotFound(format!("zone {}", zone)),
            DnsError::Configuration(msg) => TlsError::Configuration(msg),
            other => TlsError::Provider(other.to_string()),
        }
    }
}

impl From<instant_acme::Error> for TlsError {
    fn from(err: instant_acme::Error) -> Self {
        TlsError::Provider(format!("ACME error: {}", err))
    }
}

impl From<rcgen::Error> for TlsError {
    fn from(err: rcgen::Error) -> Self {
        TlsError::Provider(format!("Certificate generation error: {}", err))
    }
}

impl From<serde_json::Error> for TlsError {
    fn from(err: serde_json::Error) -> Self {
        TlsError::Parse(format!("JSON error: {}", err))
    }
}

#[derive(Error, Debug)]
pub enum BuilderError {
    #[error("Missing storage")]
    MissingStorage,

    #[error("Missing ACME directory client")]
    MissingAcme,

    #[error("Missing configuration")]
    MissingConfig,
}
