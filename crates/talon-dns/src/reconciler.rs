//! DNS record reconciliation
//!
//! Provisions challenge-proof records before validation and removes them
//! afterwards. Creation is a single bulk call per zone; deletion fans out
//! one concurrent network call per record and waits for all of them.

use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, warn};

use crate::errors::DnsError;
use crate::models::{DnsRecord, DnsZone};
use crate::DnsApi;

/// One record that could not be removed, with the reason.
#[derive(Debug)]
pub struct DeleteFailure {
    pub record: DnsRecord,
    pub reason: String,
}

/// Result of a best-effort record removal. `deleted` and `failures`
/// together never exceed the requested set; neither is ordered with
/// respect to the input.
#[derive(Debug, Default)]
pub struct DeleteOutcome {
    pub deleted: Vec<DnsRecord>,
    pub failures: Vec<DeleteFailure>,
}

impl DeleteOutcome {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Fan-out create/delete of DNS records against a zone-scoped API.
pub struct Reconciler {
    api: Arc<dyn DnsApi>,
}

impl Reconciler {
    pub fn new(api: Arc<dyn DnsApi>) -> Self {
        Self { api }
    }

    /// Create all requested records in the zone owning `domain`.
    ///
    /// The zone is resolved once and every record is bound to it before a
    /// single bulk-create call. Only the subset the provider reports as
    /// valid is returned; records absent from it were not provisioned.
    pub async fn append_records(
        &self,
        domain: &str,
        records: Vec<DnsRecord>,
    ) -> Result<Vec<DnsRecord>, DnsError> {
        let zone = self.api.resolve_zone(domain).await?;

        let bound: Vec<DnsRecord> = records
            .into_iter()
            .map(|mut record| {
                record.zone_id = zone.id.clone();
                record
            })
            .collect();

        let requested = bound.len();
        let result = self.api.bulk_create(&zone.id, bound).await?;

        if !result.invalid.is_empty() {
            warn!(
                zone = %zone.name,
                invalid = result.invalid.len(),
                requested,
                "provider rejected part of the record batch"
            );
        }
        debug!(zone = %zone.name, created = result.valid.len(), "created DNS records");

        Ok(result.valid)
    }

    /// Remove the given records from the zone owning `domain`, best-effort.
    ///
    /// Records carrying an id are deleted directly. Records without one are
    /// matched against the zone's current record list by their
    /// `(name, value)` tuple to recover an id. The fallback is deliberately
    /// lossy: two records sharing name and value in different record types
    /// are indistinguishable to it, and the first match wins.
    ///
    /// All deletes are issued concurrently, one network call per record with
    /// no cap, and the call waits for every one of them. A failed delete
    /// lands in [`DeleteOutcome::failures`] and never aborts the others;
    /// this function itself never fails.
    pub async fn delete_records(&self, domain: &str, records: Vec<DnsRecord>) -> DeleteOutcome {
        let mut outcome = DeleteOutcome::default();
        let mut targets: Vec<(DnsRecord, String)> = Vec::new();
        let mut unidentified: Vec<DnsRecord> = Vec::new();

        for record in records {
            match &record.id {
                Some(id) => {
                    let id = id.clone();
                    targets.push((record, id));
                }
                None => unidentified.push(record),
            }
        }

        if !unidentified.is_empty() {
            match self.lookup_zone_records(domain).await {
                Ok((zone, existing)) => {
                    for record in unidentified {
                        let matched = existing
                            .iter()
                            .find(|e| e.id.is_some() && e.matches_name_value(&record));
                        match matched {
                            Some(found) => {
                                let id = found.id.clone().unwrap_or_default();
                                debug!(
                                    zone = %zone.name,
                                    name = %record.name,
                                    id = %id,
                                    "matched record by name and value"
                                );
                                targets.push((record, id));
                            }
                            None => {
                                warn!(
                                    zone = %zone.name,
                                    name = %record.name,
                                    "no matching record found for deletion"
                                );
                                outcome.failures.push(DeleteFailure {
                                    record,
                                    reason: "no matching record in zone".to_string(),
                                });
                            }
                        }
                    }
                }
                Err(e) => {
                    warn!(domain = %domain, error = %e, "failed to list zone records for deletion");
                    let reason = e.to_string();
                    for record in unidentified {
                        outcome.failures.push(DeleteFailure {
                            record,
                            reason: reason.clone(),
                        });
                    }
                }
            }
        }

        let deletions = targets.into_iter().map(|(record, id)| {
            let api = Arc::clone(&self.api);
            async move {
                match api.delete_record(&id).await {
                    Ok(()) => Ok(record),
                    Err(e) => Err(DeleteFailure {
                        record,
                        reason: e.to_string(),
                    }),
                }
            }
        });

        for result in join_all(deletions).await {
            match result {
                Ok(record) => outcome.deleted.push(record),
                Err(failure) => {
                    warn!(
                        name = %failure.record.name,
                        reason = %failure.reason,
                        "failed to delete DNS record"
                    );
                    outcome.failures.push(failure);
                }
            }
        }

        outcome
    }

    async fn lookup_zone_records(
        &self,
        domain: &str,
    ) -> Result<(DnsZone, Vec<DnsRecord>), DnsError> {
        let zone = self.api.resolve_zone(domain).await?;
        let records = self.api.list_records(&zone.id).await?;
        Ok((zone, records))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BulkCreateResult;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// In-memory API double recording delete calls.
    struct MockApi {
        zone: Option<DnsZone>,
        existing: Vec<DnsRecord>,
        bulk_result: BulkCreateResult,
        fail_delete_ids: Vec<String>,
        fail_list: bool,
        deleted_ids: Mutex<Vec<String>>,
    }

    impl MockApi {
        fn new() -> Self {
            Self {
                zone: Some(DnsZone {
                    id: "zone1".to_string(),
                    name: "example.com".to_string(),
                }),
                existing: Vec::new(),
                bulk_result: BulkCreateResult::default(),
                fail_delete_ids: Vec::new(),
                fail_list: false,
                deleted_ids: Mutex::new(Vec::new()),
            }
        }

        fn deleted(&self) -> Vec<String> {
            self.deleted_ids.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl DnsApi for MockApi {
        async fn resolve_zone(&self, domain: &str) -> Result<DnsZone, DnsError> {
            self.zone
                .clone()
                .ok_or_else(|| DnsError::ZoneNotFound(domain.to_string()))
        }

        async fn list_records(&self, _zone_id: &str) -> Result<Vec<DnsRecord>, DnsError> {
            if self.fail_list {
                return Err(DnsError::ApiError("listing unavailable".to_string()));
            }
            Ok(self.existing.clone())
        }

        async fn bulk_create(
            &self,
            _zone_id: &str,
            _records: Vec<DnsRecord>,
        ) -> Result<BulkCreateResult, DnsError> {
            Ok(BulkCreateResult {
                valid: self.bulk_result.valid.clone(),
                invalid: self.bulk_result.invalid.clone(),
            })
        }

        async fn delete_record(&self, record_id: &str) -> Result<(), DnsError> {
            self.deleted_ids.lock().unwrap().push(record_id.to_string());
            if self.fail_delete_ids.iter().any(|id| id == record_id) {
                return Err(DnsError::ApiError(format!("cannot delete {}", record_id)));
            }
            Ok(())
        }
    }

    fn record_with_id(id: &str, name: &str, value: &str) -> DnsRecord {
        let mut record = DnsRecord::txt(name, value, 60);
        record.id = Some(id.to_string());
        record
    }

    #[tokio::test]
    async fn test_delete_by_id_issues_exactly_one_call() {
        let api = Arc::new(MockApi::new());
        let reconciler = Reconciler::new(api.clone());

        let outcome = reconciler
            .delete_records(
                "example.com",
                vec![record_with_id("abc", "_acme-challenge.example.com", "xyz")],
            )
            .await;

        assert_eq!(api.deleted(), vec!["abc"]);
        assert_eq!(outcome.deleted.len(), 1);
        assert!(outcome.is_clean());
    }

    #[tokio::test]
    async fn test_delete_falls_back_to_name_value_match() {
        let mut api = MockApi::new();
        api.existing = vec![
            record_with_id("other", "_acme-challenge.example.com", "different"),
            record_with_id("def", "_acme-challenge.example.com", "xyz"),
        ];
        let api = Arc::new(api);
        let reconciler = Reconciler::new(api.clone());

        let outcome = reconciler
            .delete_records(
                "example.com",
                vec![DnsRecord::txt("_acme-challenge.example.com", "xyz", 60)],
            )
            .await;

        assert_eq!(api.deleted(), vec!["def"]);
        assert_eq!(outcome.deleted.len(), 1);
        assert!(outcome.is_clean());
    }

    #[tokio::test]
    async fn test_delete_without_match_is_a_failure_not_an_error() {
        let api = Arc::new(MockApi::new());
        let reconciler = Reconciler::new(api.clone());

        let outcome = reconciler
            .delete_records(
                "example.com",
                vec![DnsRecord::txt("_acme-challenge.example.com", "xyz", 60)],
            )
            .await;

        assert!(api.deleted().is_empty());
        assert!(outcome.deleted.is_empty());
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].reason, "no matching record in zone");
    }

    #[tokio::test]
    async fn test_one_failed_delete_never_blocks_the_others() {
        let mut api = MockApi::new();
        api.fail_delete_ids = vec!["bad".to_string()];
        let api = Arc::new(api);
        let reconciler = Reconciler::new(api.clone());

        let outcome = reconciler
            .delete_records(
                "example.com",
                vec![
                    record_with_id("good", "_acme-challenge.a.example.com", "1"),
                    record_with_id("bad", "_acme-challenge.b.example.com", "2"),
                    record_with_id("also-good", "_acme-challenge.c.example.com", "3"),
                ],
            )
            .await;

        let mut deleted = api.deleted();
        deleted.sort();
        assert_eq!(deleted, vec!["also-good", "bad", "good"]);
        assert_eq!(outcome.deleted.len(), 2);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].record.id, Some("bad".to_string()));
    }

    #[tokio::test]
    async fn test_list_failure_only_fails_unidentified_records() {
        let mut api = MockApi::new();
        api.fail_list = true;
        let api = Arc::new(api);
        let reconciler = Reconciler::new(api.clone());

        let outcome = reconciler
            .delete_records(
                "example.com",
                vec![
                    record_with_id("abc", "_acme-challenge.a.example.com", "1"),
                    DnsRecord::txt("_acme-challenge.b.example.com", "2", 60),
                ],
            )
            .await;

        assert_eq!(api.deleted(), vec!["abc"]);
        assert_eq!(outcome.deleted.len(), 1);
        assert_eq!(outcome.failures.len(), 1);
        assert!(outcome.failures[0].record.id.is_none());
    }

    #[tokio::test]
    async fn test_append_returns_only_valid_records() {
        let mut api = MockApi::new();
        api.bulk_result = BulkCreateResult {
            valid: vec![
                record_with_id("rec1", "_acme-challenge.a.example.com", "1"),
                record_with_id("rec2", "_acme-challenge.b.example.com", "2"),
            ],
            invalid: vec![DnsRecord::txt("_acme-challenge.c.example.com", "3", 60)],
        };
        let api = Arc::new(api);
        let reconciler = Reconciler::new(api);

        let created = reconciler
            .append_records(
                "example.com",
                vec![
                    DnsRecord::txt("_acme-challenge.a.example.com", "1", 60),
                    DnsRecord::txt("_acme-challenge.b.example.com", "2", 60),
                    DnsRecord::txt("_acme-challenge.c.example.com", "3", 60),
                ],
            )
            .await
            .unwrap();

        assert_eq!(created.len(), 2);
        assert!(created.iter().all(|r| r.id.is_some()));
    }

    #[tokio::test]
    async fn test_append_fails_when_zone_missing() {
        let mut api = MockApi::new();
        api.zone = None;
        let reconciler = Reconciler::new(Arc::new(api));

        let err = reconciler
            .append_records(
                "unknown.com",
                vec![DnsRecord::txt("_acme-challenge.unknown.com", "1", 60)],
            )
            .await
            .unwrap_err();

        assert!(matches!(err, DnsError::ZoneNotFound(_)));
    }
}
