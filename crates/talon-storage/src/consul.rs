//! Consul KV storage backend
//!
//! Account-registration recovery branches on `exists` to decide between
//! creating and loading an account; a stale read there would register the
//! account twice. Every read therefore requests a consistent view
//! (`?consistent=true`), never the default eventually-consistent one.

use async_trait::async_trait;
use base64::Engine;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::debug;

use crate::errors::StorageError;
use crate::Storage;

/// One entry of a Consul KV read response. Values come back base64-encoded.
#[derive(Debug, Deserialize)]
struct KvPair {
    #[serde(rename = "Key")]
    #[allow(dead_code)]
    key: String,
    #[serde(rename = "Value")]
    value: Option<String>,
}

/// Consul KV storage talking to the HTTP API of a local or remote agent.
pub struct ConsulStorage {
    client: Client,
    address: String,
    token: Option<String>,
}

impl ConsulStorage {
    /// Create a storage bound to a Consul agent address
    /// (e.g. `http://127.0.0.1:8500`).
    pub fn new(address: String, token: Option<String>) -> Result<Self, StorageError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| StorageError::Backend(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            address: address.trim_end_matches('/').to_string(),
            token,
        })
    }

    fn kv_url(&self, key: &str) -> String {
        format!("{}/v1/kv/{}", self.address, key)
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.header("X-Consul-Token", token),
            None => request,
        }
    }

    /// Consistent read of a single key. `None` when the key is absent.
    async fn get_pair(&self, key: &str) -> Result<Option<KvPair>, StorageError> {
        let request = self
            .client
            .get(self.kv_url(key))
            .query(&[("consistent", "true")]);
        let response = self.authorized(request).send().await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let pairs: Vec<KvPair> = response.json().await?;
                Ok(pairs.into_iter().next())
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(StorageError::Backend(format!(
                    "Consul returned status {}: {}",
                    status, body
                )))
            }
        }
    }
}

#[async_trait]
impl Storage for ConsulStorage {
    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.get_pair(key).await?.is_some())
    }

    async fn write(&self, key: &str, data: &[u8]) -> Result<(), StorageError> {
        let request = self.client.put(self.kv_url(key)).body(data.to_vec());
        let response = self.authorized(request).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(StorageError::Backend(format!(
                "Consul returned status {}: {}",
                status, body
            )));
        }
        debug!(key = %key, bytes = data.len(), "wrote Consul key");
        Ok(())
    }

    async fn read(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let pair = self
            .get_pair(key)
            .await?
            .ok_or_else(|| StorageError::NotFound(key.to_string()))?;

        match pair.value {
            Some(encoded) => base64::engine::general_purpose::STANDARD
                .decode(encoded.as_bytes())
                .map_err(|e| StorageError::Backend(format!("Invalid base64 value: {}", e))),
            None => Ok(Vec::new()),
        }
    }

    async fn find(&self, prefix: &str, suffix: &str) -> Result<Vec<String>, StorageError> {
        let request = self
            .client
            .get(self.kv_url(&format!("{}/", prefix)))
            .query(&[("keys", ""), ("consistent", "true")]);
        let response = self.authorized(request).send().await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(Vec::new()),
            status if status.is_success() => {
                let keys: Vec<String> = response.json().await?;
                Ok(keys.into_iter().filter(|k| k.ends_with(suffix)).collect())
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(StorageError::Backend(format!(
                    "Consul returned status {}: {}",
                    status, body
                )))
            }
        }
    }
}
