//! Key-addressed blob storage for certificate material
//!
//! One contract, two backends: a local filesystem tree and the Consul KV
//! store. Keys are path-like strings (`certs/example.com.crt`); the storage
//! layer never interprets key structure beyond prefix listing.
//!
//! Callers that branch on `exists` to decide between creating and loading
//! state rely on reads being strongly consistent, so the Consul backend
//! requests consistent reads on every lookup.

pub mod consul;
pub mod errors;
pub mod file;

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

pub use consul::ConsulStorage;
pub use errors::StorageError;
pub use file::FileStorage;

/// Key-addressed byte-blob storage contract.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Check whether a key exists.
    async fn exists(&self, key: &str) -> Result<bool, StorageError>;

    /// Write bytes under a key. Overwrites any existing value; safe to call
    /// repeatedly with the same key.
    async fn write(&self, key: &str, data: &[u8]) -> Result<(), StorageError>;

    /// Read the bytes stored under a key. Fails with
    /// [`StorageError::NotFound`] when the key is absent.
    async fn read(&self, key: &str) -> Result<Vec<u8>, StorageError>;

    /// List all keys under a prefix whose name ends with `suffix`.
    /// Ordering is unspecified.
    async fn find(&self, prefix: &str, suffix: &str) -> Result<Vec<String>, StorageError>;
}

/// Storage backend selection, resolved once at configuration-load time.
#[derive(Debug, Clone)]
pub enum StorageBackend {
    /// Local filesystem rooted at a directory.
    File { root: PathBuf },
    /// Consul KV over HTTP, e.g. `http://127.0.0.1:8500`.
    Consul {
        address: String,
        token: Option<String>,
    },
}

impl StorageBackend {
    /// Build the concrete storage for this backend.
    pub fn build(&self) -> Result<Arc<dyn Storage>, StorageError> {
        match self {
            StorageBackend::File { root } => Ok(Arc::new(FileStorage::new(root.clone()))),
            StorageBackend::Consul { address, token } => Ok(Arc::new(ConsulStorage::new(
                address.clone(),
                token.clone(),
            )?)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_backend_build() {
        let backend = StorageBackend::File {
            root: PathBuf::from("/tmp/talon-test"),
        };
        assert!(backend.build().is_ok());
    }

    #[test]
    fn test_consul_backend_build() {
        let backend = StorageBackend::Consul {
            address: "http://127.0.0.1:8500".to_string(),
            token: None,
        };
        assert!(backend.build().is_ok());
    }
}
