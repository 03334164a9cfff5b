//! DNS domain model

use serde::{Deserialize, Serialize};

/// A managed DNS zone, addressed by a provider-assigned identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsZone {
    pub id: String,
    pub name: String,
}

/// A single DNS record within a zone.
///
/// `id` is authoritative for deletion when present. When absent, a record is
/// identified by its `(name, value)` tuple within the zone; see
/// [`crate::reconciler::Reconciler::delete_records`] for the caveats of that
/// fallback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Record name relative to the zone (e.g. `_acme-challenge.www`).
    pub name: String,

    /// Record type (e.g. `TXT`).
    #[serde(rename = "type")]
    pub record_type: String,

    pub value: String,

    #[serde(rename = "ttl")]
    pub ttl_seconds: u32,

    /// Zone the record belongs to. Filled in by the reconciler once the
    /// zone has been resolved.
    #[serde(default)]
    pub zone_id: String,
}

impl DnsRecord {
    /// A TXT record, not yet bound to a zone.
    pub fn txt(name: impl Into<String>, value: impl Into<String>, ttl_seconds: u32) -> Self {
        Self {
            id: None,
            name: name.into(),
            record_type: "TXT".to_string(),
            value: value.into(),
            ttl_seconds,
            zone_id: String::new(),
        }
    }

    /// True when `other` names the same logical record by the
    /// `(name, value)` tuple.
    pub fn matches_name_value(&self, other: &DnsRecord) -> bool {
        self.name == other.name && self.value == other.value
    }
}

/// Partitioned result of a bulk record creation. The provider may accept
/// only part of a batch without reporting an error; callers must check
/// both sets.
#[derive(Debug, Clone, Default)]
pub struct BulkCreateResult {
    pub valid: Vec<DnsRecord>,
    pub invalid: Vec<DnsRecord>,
}
