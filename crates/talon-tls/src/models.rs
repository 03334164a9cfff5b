//! Certificate lifecycle domain model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::TlsError;
use crate::keys::AccountKey;

pub const KEY_EXT: &str = ".key";
pub const CERT_EXT: &str = ".crt";
pub const ISSUER_EXT: &str = ".ca";

/// Certificate lifecycle configuration, passed explicitly into the manager.
#[derive(Debug, Clone)]
pub struct TlsConfig {
    pub email: String,
    pub domains: Vec<String>,
    pub cert_prefix: String,
    pub account_prefix: String,
    pub staging: bool,
    /// Renewal threshold in days. Negative disables the check (always renew).
    pub renewal_threshold_days: i64,
}

pub const DEFAULT_RENEWAL_THRESHOLD_DAYS: i64 = 30;

impl TlsConfig {
    pub fn new(email: impl Into<String>, domains: Vec<String>) -> Self {
        Self {
            email: email.into(),
            domains,
            cert_prefix: "certs".to_string(),
            account_prefix: "accounts".to_string(),
            staging: false,
            renewal_threshold_days: DEFAULT_RENEWAL_THRESHOLD_DAYS,
        }
    }

    pub fn validate(&self) -> Result<(), TlsError> {
        if self.email.is_empty() {
            return Err(TlsError::Configuration("account email is empty".to_string()));
        }
        if self.domains.is_empty() {
            return Err(TlsError::Configuration("no domains configured".to_string()));
        }
        Ok(())
    }
}

/// Directory endpoints captured at registration time, needed to rebuild
/// ACME credentials for a stored account key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEndpoints {
    pub directory_url: String,
    pub new_nonce: String,
    pub new_account: String,
    pub new_order: String,
}

/// The persisted ACME registration resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationResource {
    pub account_url: String,
    #[serde(default)]
    pub status: String,
    pub directory: DirectoryEndpoints,
}

/// Serialized account record, stored under `{prefix}/{email}.json`.
/// The private key is never part of this record; it lives in its own
/// `.key` file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountRecord {
    pub email: String,
    #[serde(default)]
    pub registration: Option<RegistrationResource>,
}

/// A usable ACME account: the persisted record plus its parsed private key.
#[derive(Debug, Clone)]
pub struct AcmeAccount {
    pub email: String,
    pub registration: RegistrationResource,
    pub key: AccountKey,
}

impl AcmeAccount {
    /// Assemble the ACME client credentials document for this account.
    pub fn credentials_json(&self) -> Result<Vec<u8>, TlsError> {
        crate::acme::credentials_json(&self.key, &self.registration)
    }
}

/// Read model for certificate listing; derived by parsing a stored
/// certificate, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TlsCertInfo {
    pub common_name: String,
    pub subject_alternative_names: Vec<String>,
    pub not_after: DateTime<Utc>,
    pub source_path: String,
}

/// What the ACME boundary is asked to obtain.
#[derive(Debug, Clone)]
pub struct ObtainRequest {
    pub domains: Vec<String>,
    /// Reuse this private key instead of generating a fresh one.
    pub private_key_pem: Option<String>,
}

/// What the ACME boundary hands back on success.
#[derive(Debug, Clone)]
pub struct IssuedCertificate {
    pub domain: String,
    pub private_key_pem: String,
    pub certificate_chain_pem: String,
    pub issuer_certificate_pem: String,
}

/// File-name-safe storage name for a domain artifact: wildcard markers are
/// replaced before IDNA-ASCII encoding, since raw `*` is not valid in a
/// storage key and Unicode labels are not ASCII-safe.
pub fn storage_file_name(domain: &str, ext: &str) -> Result<String, TlsError> {
    let replaced = format!("{}{}", domain.replace('*', "_"), ext);
    idna::domain_to_ascii(&replaced)
        .map_err(|e| TlsError::Parse(format!("cannot encode domain {}: {:?}", domain, e)))
}

/// Storage key for one certificate artifact of a domain.
pub fn certificate_key(prefix: &str, domain: &str, ext: &str) -> Result<String, TlsError> {
    Ok(format!("{}/{}", prefix, storage_file_name(domain, ext)?))
}

/// Storage key for the account private key of an email.
pub fn account_key_key(prefix: &str, email: &str) -> String {
    format!("{}/{}.key", prefix, email)
}

/// Storage key for the account record of an email.
pub fn account_record_key(prefix: &str, email: &str) -> String {
    format!("{}/{}.json", prefix, email)
}
