//! Hetzner DNS API client
//!
//! Typed client over the Hetzner DNS HTTP API, authenticated with a static
//! API token. Only the operations needed for challenge provisioning are
//! implemented: zone lookup by name, record listing, bulk creation, and
//! deletion by record id.
//!
//! Create tokens at: https://dns.hetzner.com/settings/api-token

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::DnsError;
use crate::models::{BulkCreateResult, DnsRecord, DnsZone};
use crate::DnsApi;

const HETZNER_API_BASE: &str = "https://dns.hetzner.com/api/v1";

/// Hetzner DNS client
pub struct HetznerDnsClient {
    client: Client,
    api_token: String,
    base_url: String,
}

/// Hetzner API response structures
#[derive(Debug, Deserialize)]
struct ZonesResponse {
    zones: Vec<WireZone>,
}

#[derive(Debug, Deserialize)]
struct WireZone {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct RecordsResponse {
    records: Vec<WireRecord>,
}

#[derive(Debug, Clone, Deserialize)]
struct WireRecord {
    #[serde(default)]
    id: Option<String>,
    #[serde(rename = "type")]
    record_type: String,
    name: String,
    value: String,
    #[serde(default)]
    ttl: Option<u32>,
    #[serde(default)]
    zone_id: String,
}

#[derive(Debug, Serialize)]
struct BulkCreateRequest {
    records: Vec<CreateRecordRequest>,
}

#[derive(Debug, Serialize)]
struct CreateRecordRequest {
    name: String,
    #[serde(rename = "type")]
    record_type: String,
    value: String,
    zone_id: String,
    ttl: u32,
}

#[derive(Debug, Deserialize)]
struct BulkCreateResponse {
    #[serde(default)]
    valid_records: Vec<WireRecord>,
    #[serde(default)]
    invalid_records: Vec<WireRecord>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

impl HetznerDnsClient {
    /// Create a new client with the given API token
    pub fn new(api_token: impl Into<String>) -> Result<Self, DnsError> {
        Self::with_base(api_token.into(), HETZNER_API_BASE.to_string())
    }

    /// Create a client with a custom base URL (for testing)
    #[cfg(test)]
    pub fn with_base_url(api_token: impl Into<String>, base_url: String) -> Result<Self, DnsError> {
        Self::with_base(api_token.into(), base_url)
    }

    fn with_base(api_token: String, base_url: String) -> Result<Self, DnsError> {
        if api_token.is_empty() {
            return Err(DnsError::Configuration("DNS API token is empty".to_string()));
        }
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| DnsError::ApiError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_token,
            base_url,
        })
    }

    /// Make an authenticated request to the Hetzner DNS API
    async fn api_request<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        path: &str,
        query: &[(&str, &str)],
        body: Option<&impl Serialize>,
    ) -> Result<T, DnsError> {
        let url = format!("{}{}", self.base_url, path);

        debug!("Hetzner DNS API request: {} {}", method, path);

        let mut request = match method {
            "GET" => self.client.get(&url),
            "POST" => self.client.post(&url),
            "DELETE" => self.client.delete(&url),
            _ => {
                return Err(DnsError::ApiError(format!(
                    "Unsupported method: {}",
                    method
                )))
            }
        };

        request = request.header("Auth-API-Token", &self.api_token);
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            if let Ok(error) = serde_json::from_str::<ApiErrorResponse>(&error_body) {
                return Err(DnsError::ApiError(format!(
                    "Hetzner DNS API error ({}): {}",
                    status, error.error.message
                )));
            }
            return Err(DnsError::ApiError(format!(
                "API returned status {}: {}",
                status, error_body
            )));
        }

        let response_text = response.text().await?;
        if response_text.is_empty() {
            // DELETE returns no content
            return serde_json::from_str("{}").map_err(|e| DnsError::ApiError(e.to_string()));
        }

        serde_json::from_str(&response_text).map_err(|e| {
            DnsError::ApiError(format!(
                "Failed to parse response: {} - Body: {}",
                e, response_text
            ))
        })
    }

    fn convert_record(record: WireRecord) -> DnsRecord {
        DnsRecord {
            id: record.id,
            name: record.name,
            record_type: record.record_type,
            value: record.value,
            ttl_seconds: record.ttl.unwrap_or(0),
            zone_id: record.zone_id,
        }
    }
}

#[async_trait]
impl DnsApi for HetznerDnsClient {
    async fn resolve_zone(&self, domain: &str) -> Result<DnsZone, DnsError> {
        let name = domain.trim_end_matches('.');
        let response: ZonesResponse = self
            .api_request("GET", "/zones", &[("name", name)], None::<&()>)
            .await?;

        response
            .zones
            .into_iter()
            .find(|z| z.name == name)
            .map(|z| DnsZone {
                id: z.id,
                name: z.name,
            })
            .ok_or_else(|| DnsError::ZoneNotFound(name.to_string()))
    }

    async fn list_records(&self, zone_id: &str) -> Result<Vec<DnsRecord>, DnsError> {
        let response: RecordsResponse = self
            .api_request("GET", "/records", &[("zone_id", zone_id)], None::<&()>)
            .await?;

        Ok(response
            .records
            .into_iter()
            .map(Self::convert_record)
            .collect())
    }

    async fn bulk_create(
        &self,
        zone_id: &str,
        records: Vec<DnsRecord>,
    ) -> Result<BulkCreateResult, DnsError> {
        let request = BulkCreateRequest {
            records: records
                .into_iter()
                .map(|r| CreateRecordRequest {
                    name: r.name,
                    record_type: r.record_type,
                    value: r.value,
                    zone_id: zone_id.to_string(),
                    ttl: r.ttl_seconds,
                })
                .collect(),
        };

        let response: BulkCreateResponse = self
            .api_request("POST", "/records/bulk", &[], Some(&request))
            .await?;

        Ok(BulkCreateResult {
            valid: response
                .valid_records
                .into_iter()
                .map(Self::convert_record)
                .collect(),
            invalid: response
                .invalid_records
                .into_iter()
                .map(Self::convert_record)
                .collect(),
        })
    }

    async fn delete_record(&self, record_id: &str) -> Result<(), DnsError> {
        let url = format!("{}/records/{}", self.base_url, record_id);

        debug!("Hetzner DNS API request: DELETE /records/{}", record_id);

        let response = self
            .client
            .delete(&url)
            .header("Auth-API-Token", &self.api_token)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            // Already gone, nothing left to clean up.
            return Ok(());
        }
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(DnsError::ApiError(format!(
                "API returned status {}: {}",
                status, error_body
            )));
        }
        Ok(())
    }
}
