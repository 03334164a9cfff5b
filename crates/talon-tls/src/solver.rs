//! DNS-01 challenge solver
//!
//! Bridges the ACME order flow to the DNS reconciler: TXT records proving
//! domain control are created before validation and removed afterwards,
//! whether or not the order succeeded.

use std::sync::Arc;

use async_trait::async_trait;
use talon_dns::{DeleteFailure, DnsApi, DnsRecord, Reconciler};

use crate::errors::TlsError;

/// TTL for challenge TXT records. Short so a failed run does not pollute
/// resolver caches for long.
pub const CHALLENGE_TTL_SECONDS: u32 = 60;

/// Provisions and removes challenge-proof records for one ACME order.
///
/// `zone_domain` is the name of the managed zone the records live in.
/// Record names passed to [`Dns01Solver::present`] are fully qualified;
/// implementations translate them to whatever form their provider expects.
#[async_trait]
pub trait Dns01Solver: Send + Sync {
    /// Create the records and return the subset actually provisioned.
    async fn present(
        &self,
        zone_domain: &str,
        records: Vec<DnsRecord>,
    ) -> Result<Vec<DnsRecord>, TlsError>;

    /// Best-effort removal of previously provisioned records. Failures are
    /// returned for inspection, never raised.
    async fn cleanup(&self, zone_domain: &str, records: Vec<DnsRecord>) -> Vec<DeleteFailure>;
}

/// Solver backed by the bulk-create/fan-out-delete reconciler.
pub struct ReconcilerSolver {
    reconciler: Reconciler,
}

impl ReconcilerSolver {
    pub fn new(api: Arc<dyn DnsApi>) -> Self {
        Self {
            reconciler: Reconciler::new(api),
        }
    }

    /// Record name relative to the zone, as the provider API expects it.
    fn zone_relative(fqdn: &str, zone: &str) -> String {
        let fqdn = fqdn.trim_end_matches('.');
        if fqdn == zone {
            return "@".to_string();
        }
        match fqdn.strip_suffix(&format!(".{}", zone)) {
            Some(relative) => relative.to_string(),
            None => fqdn.to_string(),
        }
    }
}

#[async_trait]
impl Dns01Solver for ReconcilerSolver {
    async fn present(
        &self,
        zone_domain: &str,
        records: Vec<DnsRecord>,
    ) -> Result<Vec<DnsRecord>, TlsError> {
        let relative = records
            .into_iter()
            .map(|mut record| {
                record.name = Self::zone_relative(&record.name, zone_domain);
                record
            })
            .collect();

        Ok(self.reconciler.append_records(zone_domain, relative).await?)
    }

    async fn cleanup(&self, zone_domain: &str, records: Vec<DnsRecord>) -> Vec<DeleteFailure> {
        self.reconciler
            .delete_records(zone_domain, records)
            .await
            .failures
    }
}
