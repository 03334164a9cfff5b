//! Zone-scoped DNS record management for ACME DNS-01 challenges
//!
//! A typed client over the Hetzner DNS API plus a reconciler that
//! provisions and removes the TXT records proving domain control.

pub mod errors;
pub mod hetzner;
pub mod models;
pub mod reconciler;

use async_trait::async_trait;

pub use errors::DnsError;
pub use hetzner::HetznerDnsClient;
pub use models::{BulkCreateResult, DnsRecord, DnsZone};
pub use reconciler::{DeleteFailure, DeleteOutcome, Reconciler};

/// Zone-scoped DNS record operations.
///
/// Implemented by [`HetznerDnsClient`]; the reconciler and the certificate
/// manager depend only on this trait.
#[async_trait]
pub trait DnsApi: Send + Sync {
    /// Look up the zone whose name exactly matches `domain` with any
    /// trailing dot stripped.
    async fn resolve_zone(&self, domain: &str) -> Result<DnsZone, DnsError>;

    /// List all records in a zone.
    async fn list_records(&self, zone_id: &str) -> Result<Vec<DnsRecord>, DnsError>;

    /// Create a batch of records. The provider may accept only part of the
    /// batch; the result partitions the input into valid and invalid sets
    /// and a non-error result can still carry invalid entries.
    async fn bulk_create(
        &self,
        zone_id: &str,
        records: Vec<DnsRecord>,
    ) -> Result<BulkCreateResult, DnsError>;

    /// Delete exactly one record by its provider-assigned id.
    async fn delete_record(&self, record_id: &str) -> Result<(), DnsError>;
}
