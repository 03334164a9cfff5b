//! Certificate lifecycle orchestration
//!
//! Ties the account manager, the ACME boundary, the renewal policy, and
//! storage together into the three exposed operations: issue, renew, list.

use std::sync::Arc;

use talon_storage::Storage;
use tracing::{error, info, warn};

use crate::account::AccountManager;
use crate::acme::AcmeDirectory;
use crate::errors::{BuilderError, TlsError};
use crate::keys::AccountKey;
use crate::models::{
    certificate_key, IssuedCertificate, ObtainRequest, TlsCertInfo, TlsConfig, CERT_EXT,
    ISSUER_EXT, KEY_EXT,
};
use crate::policy::needs_renewal;
use crate::x509;

pub struct TlsManager {
    storage: Arc<dyn Storage>,
    acme: Arc<dyn AcmeDirectory>,
    accounts: AccountManager,
    config: TlsConfig,
}

#[derive(Default)]
pub struct TlsManagerBuilder {
    storage: Option<Arc<dyn Storage>>,
    acme: Option<Arc<dyn AcmeDirectory>>,
    config: Option<TlsConfig>,
}

impl TlsManagerBuilder {
    pub fn storage(mut self, storage: Arc<dyn Storage>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn acme(mut self, acme: Arc<dyn AcmeDirectory>) -> Self {
        self.acme = Some(acme);
        self
    }

    pub fn config(mut self, config: TlsConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn build(self) -> Result<TlsManager, BuilderError> {
        let storage = self.storage.ok_or(BuilderError::MissingStorage)?;
        let acme = self.acme.ok_or(BuilderError::MissingAcme)?;
        let config = self.config.ok_or(BuilderError::MissingConfig)?;
        let accounts = AccountManager::new(
            Arc::clone(&storage),
            Arc::clone(&acme),
            config.account_prefix.clone(),
        );
        Ok(TlsManager {
            storage,
            acme,
            accounts,
            config,
        })
    }
}

impl TlsManager {
    pub fn builder() -> TlsManagerBuilder {
        TlsManagerBuilder::default()
    }

    /// Obtain a fresh certificate bundle for the configured domains and
    /// persist it. Fails at the first error; partial bundle writes are
    /// reported with every failing artifact named.
    pub async fn issue(&self) -> Result<(), TlsError> {
        self.config.validate()?;
        if self.config.staging {
            warn!("staging directory in use; issued certificates will not be publicly trusted");
        }

        let account = self.accounts.load_or_create(&self.config.email).await?;
        let credentials = account.credentials_json()?;

        info!(domains = ?self.config.domains, "requesting certificate");
        let request = ObtainRequest {
            domains: self.config.domains.clone(),
            private_key_pem: None,
        };
        let issued = self.acme.obtain(&credentials, &request).await?;

        self.save_bundle(&issued).await
    }

    /// Renew the first configured domain's certificate when the renewal
    /// policy says it is due; a no-op success otherwise. With `reuse_key`
    /// the stored private key is read back and reused instead of
    /// generating a fresh one.
    pub async fn renew(&self, reuse_key: bool) -> Result<(), TlsError> {
        self.config.validate()?;
        // Renewal needs the account that issued the certificate; an absent
        // registration is an error here, never a reason to create one.
        let account = self.accounts.load(&self.config.email).await?;

        let domain = &self.config.domains[0];
        let chain_key = certificate_key(&self.config.cert_prefix, domain, CERT_EXT)?;
        let chain = self.storage.read(&chain_key).await?;

        let leaf = x509::parse_leaf_certificate(&chain)?;
        if leaf.is_ca {
            // The bundle was stored or ordered incorrectly; renewing it
            // would silently propagate the broken chain.
            return Err(TlsError::Parse(
                "certificate bundle starts with a CA certificate".to_string(),
            ));
        }

        if !needs_renewal(leaf.not_after, self.config.renewal_threshold_days) {
            info!(domain = %domain, not_after = %leaf.not_after, "certificate does not need renewal yet");
            return Ok(());
        }

        let private_key_pem = if reuse_key {
            let key_key = certificate_key(&self.config.cert_prefix, domain, KEY_EXT)?;
            let bytes = self.storage.read(&key_key).await?;
            AccountKey::from_pem(&bytes)?;
            Some(String::from_utf8(bytes).map_err(|_| {
                TlsError::Parse("stored private key is not valid UTF-8".to_string())
            })?)
        } else {
            None
        };

        info!(domain = %domain, reuse_key, "renewing certificate");
        let request = ObtainRequest {
            domains: self.config.domains.clone(),
            private_key_pem,
        };
        let issued = self
            .acme
            .obtain(&account.credentials_json()?, &request)
            .await?;

        self.save_bundle(&issued).await
    }

    /// Summaries of every certificate stored under the certificate prefix.
    /// One unparsable file aborts the whole listing.
    pub async fn list(&self) -> Result<Vec<TlsCertInfo>, TlsError> {
        let keys = self
            .storage
            .find(&self.config.cert_prefix, CERT_EXT)
            .await?;

        let mut infos = Vec::with_capacity(keys.len());
        for key in keys {
            let pem = self.storage.read(&key).await?;
            let leaf = x509::parse_leaf_certificate(&pem)?;
            infos.push(TlsCertInfo {
                common_name: leaf.common_name,
                subject_alternative_names: leaf.subject_alternative_names,
                not_after: leaf.not_after,
                source_path: key,
            });
        }
        Ok(infos)
    }

    async fn save_bundle(&self, issued: &IssuedCertificate) -> Result<(), TlsError> {
        let artifacts = [
            (KEY_EXT, issued.private_key_pem.as_bytes()),
            (CERT_EXT, issued.certificate_chain_pem.as_bytes()),
            (ISSUER_EXT, issued.issuer_certificate_pem.as_bytes()),
        ];

        let mut failed = Vec::new();
        for (ext, data) in artifacts {
            let key = certificate_key(&self.config.cert_prefix, &issued.domain, ext)?;
            if let Err(e) = self.storage.write(&key, data).await {
                error!(key = %key, error = %e, "failed to persist certificate artifact");
                failed.push(key);
            }
        }

        if !failed.is_empty() {
            return Err(TlsError::PartialWrite { failed });
        }
        info!(domain = %issued.domain, "persisted certificate bundle");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acme::NewRegistration;
    use crate::models::{DirectoryEndpoints, RegistrationResource};
    use crate::x509::test_certs;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use talon_storage::FileStorage;
    use tempfile::TempDir;

    fn test_registration() -> RegistrationResource {
        RegistrationResource {
            account_url: "https://acme.example/acct/1".to_string(),
            status: "valid".to_string(),
            directory: DirectoryEndpoints {
                directory_url: "https://acme.example/directory".to_string(),
                new_nonce: "https://acme.example/new-nonce".to_string(),
                new_account: "https://acme.example/new-account".to_string(),
                new_order: "https://acme.example/new-order".to_string(),
            },
        }
    }

    struct MockDirectory {
        issued_chain: Mutex<String>,
        obtain_calls: AtomicUsize,
        last_request: Mutex<Option<ObtainRequest>>,
        key_der: Vec<u8>,
    }

    impl MockDirectory {
        fn new(chain_pem: String) -> Self {
            let key = rcgen::KeyPair::generate_for(&rcgen::PKCS_ECDSA_P384_SHA384).unwrap();
            let parsed = AccountKey::from_pem(key.serialize_pem().as_bytes()).unwrap();
            Self {
                issued_chain: Mutex::new(chain_pem),
                obtain_calls: AtomicUsize::new(0),
                last_request: Mutex::new(None),
                key_der: parsed.pkcs8_der().unwrap().to_vec(),
            }
        }
    }

    #[async_trait]
    impl AcmeDirectory for MockDirectory {
        async fn register(&self, _email: &str) -> Result<NewRegistration, TlsError> {
            Ok(NewRegistration {
                key_pkcs8_der: self.key_der.clone(),
                registration: test_registration(),
            })
        }

        async fn revalidate(&self, _credentials_json: &[u8]) -> Result<String, TlsError> {
            Ok("valid".to_string())
        }

        async fn obtain(
            &self,
            _credentials_json: &[u8],
            request: &ObtainRequest,
        ) -> Result<IssuedCertificate, TlsError> {
            self.obtain_calls.fetch_add(1, Ordering::SeqCst);
            *self.last_request.lock().unwrap() = Some(request.clone());

            let chain = self.issued_chain.lock().unwrap().clone();
            let key = request
                .private_key_pem
                .clone()
                .unwrap_or_else(|| rcgen::KeyPair::generate().unwrap().serialize_pem());
            Ok(IssuedCertificate {
                domain: request.domains[0].clone(),
                private_key_pem: key,
                certificate_chain_pem: chain.clone(),
                issuer_certificate_pem: x509::issuer_chain(&chain),
            })
        }
    }

    fn manager_with(
        dir: &TempDir,
        acme: Arc<MockDirectory>,
        config: TlsConfig,
    ) -> TlsManager {
        TlsManager::builder()
            .storage(Arc::new(FileStorage::new(dir.path())))
            .acme(acme)
            .config(config)
            .build()
            .unwrap()
    }

    fn seed_certificate(dir: &TempDir, name: &str, pem: &str) {
        std::fs::create_dir_all(dir.path().join("certs")).unwrap();
        std::fs::write(dir.path().join("certs").join(name), pem).unwrap();
    }

    fn seed_account(dir: &TempDir) {
        std::fs::create_dir_all(dir.path().join("accounts")).unwrap();
        let key = rcgen::KeyPair::generate_for(&rcgen::PKCS_ECDSA_P384_SHA384).unwrap();
        std::fs::write(
            dir.path().join("accounts/ops@example.com.key"),
            key.serialize_pem(),
        )
        .unwrap();
        let record = crate::models::AccountRecord {
            email: "ops@example.com".to_string(),
            registration: Some(test_registration()),
        };
        std::fs::write(
            dir.path().join("accounts/ops@example.com.json"),
            serde_json::to_vec(&record).unwrap(),
        )
        .unwrap();
    }

    #[tokio::test]
    async fn test_issue_writes_all_three_artifacts() {
        let dir = TempDir::new().unwrap();
        let chain = format!(
            "{}{}",
            test_certs::self_signed(&["example.com"], (2030, 1, 1)),
            test_certs::self_signed_ca("Test Root CA")
        );
        let acme = Arc::new(MockDirectory::new(chain));
        let config = TlsConfig::new("ops@example.com", vec!["example.com".to_string()]);
        let manager = manager_with(&dir, acme.clone(), config);

        manager.issue().await.unwrap();

        for ext in ["key", "crt", "ca"] {
            let path = dir.path().join(format!("certs/example.com.{}", ext));
            assert!(path.exists(), "missing artifact {:?}", path);
            assert!(!std::fs::read(&path).unwrap().is_empty());
        }
        assert_eq!(acme.obtain_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_issue_wildcard_unicode_storage_keys_are_safe() {
        let dir = TempDir::new().unwrap();
        let chain = test_certs::self_signed(&["safe.example.com"], (2030, 1, 1));
        let acme = Arc::new(MockDirectory::new(chain));
        let config = TlsConfig::new("ops@example.com", vec!["*.münchen.example".to_string()]);
        let manager = manager_with(&dir, acme, config);

        manager.issue().await.unwrap();

        let entries: Vec<String> = std::fs::read_dir(dir.path().join("certs"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(entries.len(), 3);
        for name in entries {
            assert!(!name.contains('*'));
            assert!(name.is_ascii());
            assert!(name.starts_with("_.xn--"));
        }
    }

    #[tokio::test]
    async fn test_issue_with_empty_domains_is_configuration_error() {
        let dir = TempDir::new().unwrap();
        let acme = Arc::new(MockDirectory::new(String::new()));
        let config = TlsConfig::new("ops@example.com", vec![]);
        let manager = manager_with(&dir, acme, config);

        let err = manager.issue().await.unwrap_err();
        assert!(matches!(err, TlsError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_renew_is_noop_when_not_due() {
        let dir = TempDir::new().unwrap();
        let acme = Arc::new(MockDirectory::new(String::new()));
        let config = TlsConfig::new("ops@example.com", vec!["example.com".to_string()]);
        seed_account(&dir);
        seed_certificate(
            &dir,
            "example.com.crt",
            &test_certs::self_signed(&["example.com"], (2099, 1, 1)),
        );
        let manager = manager_with(&dir, acme.clone(), config);

        manager.renew(false).await.unwrap();
        assert_eq!(acme.obtain_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_renew_when_expired() {
        let dir = TempDir::new().unwrap();
        let fresh = test_certs::self_signed(&["example.com"], (2030, 1, 1));
        let acme = Arc::new(MockDirectory::new(fresh));
        let config = TlsConfig::new("ops@example.com", vec!["example.com".to_string()]);
        seed_account(&dir);
        seed_certificate(
            &dir,
            "example.com.crt",
            &test_certs::self_signed(&["example.com"], (2020, 1, 1)),
        );
        let manager = manager_with(&dir, acme.clone(), config);

        manager.renew(false).await.unwrap();
        assert_eq!(acme.obtain_calls.load(Ordering::SeqCst), 1);

        // The stored chain was replaced by the renewed one.
        let stored = std::fs::read(dir.path().join("certs/example.com.crt")).unwrap();
        let leaf = x509::parse_leaf_certificate(&stored).unwrap();
        assert!(leaf.not_after > chrono::Utc::now());
    }

    #[tokio::test]
    async fn test_negative_threshold_always_renews() {
        let dir = TempDir::new().unwrap();
        let fresh = test_certs::self_signed(&["example.com"], (2031, 1, 1));
        let acme = Arc::new(MockDirectory::new(fresh));
        let mut config = TlsConfig::new("ops@example.com", vec!["example.com".to_string()]);
        config.renewal_threshold_days = -1;
        seed_account(&dir);
        seed_certificate(
            &dir,
            "example.com.crt",
            &test_certs::self_signed(&["example.com"], (2099, 1, 1)),
        );
        let manager = manager_with(&dir, acme.clone(), config);

        manager.renew(false).await.unwrap();
        assert_eq!(acme.obtain_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_renew_reuses_stored_private_key() {
        let dir = TempDir::new().unwrap();
        let fresh = test_certs::self_signed(&["example.com"], (2030, 1, 1));
        let acme = Arc::new(MockDirectory::new(fresh));
        let config = TlsConfig::new("ops@example.com", vec!["example.com".to_string()]);
        seed_account(&dir);
        seed_certificate(
            &dir,
            "example.com.crt",
            &test_certs::self_signed(&["example.com"], (2020, 1, 1)),
        );
        let key_pem = rcgen::KeyPair::generate().unwrap().serialize_pem();
        std::fs::write(dir.path().join("certs/example.com.key"), &key_pem).unwrap();
        let manager = manager_with(&dir, acme.clone(), config);

        manager.renew(true).await.unwrap();

        let request = acme.last_request.lock().unwrap().clone().unwrap();
        assert_eq!(request.private_key_pem.as_deref(), Some(key_pem.as_str()));
    }

    #[tokio::test]
    async fn test_renew_rejects_ca_first_bundle() {
        let dir = TempDir::new().unwrap();
        let acme = Arc::new(MockDirectory::new(String::new()));
        let config = TlsConfig::new("ops@example.com", vec!["example.com".to_string()]);
        seed_account(&dir);
        seed_certificate(&dir, "example.com.crt", &test_certs::self_signed_ca("Root"));
        let manager = manager_with(&dir, acme.clone(), config);

        let err = manager.renew(false).await.unwrap_err();
        match err {
            TlsError::Parse(msg) => assert!(msg.contains("CA certificate")),
            other => panic!("Expected Parse error, got {:?}", other),
        }
        assert_eq!(acme.obtain_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_renew_without_stored_certificate_is_not_found() {
        let dir = TempDir::new().unwrap();
        let acme = Arc::new(MockDirectory::new(String::new()));
        let config = TlsConfig::new("ops@example.com", vec!["example.com".to_string()]);
        seed_account(&dir);
        let manager = manager_with(&dir, acme, config);

        let err = manager.renew(false).await.unwrap_err();
        assert!(matches!(err, TlsError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_renew_without_account_never_registers_one() {
        let dir = TempDir::new().unwrap();
        let acme = Arc::new(MockDirectory::new(String::new()));
        let config = TlsConfig::new("ops@example.com", vec!["example.com".to_string()]);
        let manager = manager_with(&dir, acme.clone(), config);

        let err = manager.renew(false).await.unwrap_err();
        assert!(matches!(err, TlsError::NotFound(_)));

        // No account material was created as a side effect.
        assert!(!dir.path().join("accounts/ops@example.com.json").exists());
        assert!(!dir.path().join("accounts/ops@example.com.key").exists());
        assert_eq!(acme.obtain_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_list_round_trips_written_bundle() {
        let dir = TempDir::new().unwrap();
        let chain = test_certs::self_signed(&["example.com", "www.example.com"], (2030, 1, 1));
        let acme = Arc::new(MockDirectory::new(chain));
        let config = TlsConfig::new("ops@example.com", vec!["example.com".to_string()]);
        let manager = manager_with(&dir, acme, config);

        manager.issue().await.unwrap();
        let infos = manager.list().await.unwrap();

        assert_eq!(infos.len(), 1);
        let info = &infos[0];
        assert_eq!(info.common_name, "example.com");
        assert!(info
            .subject_alternative_names
            .contains(&"www.example.com".to_string()));
        assert_eq!(info.source_path, "certs/example.com.crt");
        use chrono::Datelike;
        assert_eq!(info.not_after.year(), 2030);
    }

    #[tokio::test]
    async fn test_list_fails_fast_on_unparsable_certificate() {
        let dir = TempDir::new().unwrap();
        let acme = Arc::new(MockDirectory::new(String::new()));
        let config = TlsConfig::new("ops@example.com", vec!["example.com".to_string()]);
        seed_certificate(
            &dir,
            "good.example.com.crt",
            &test_certs::self_signed(&["good.example.com"], (2030, 1, 1)),
        );
        seed_certificate(&dir, "bad.example.com.crt", "not a certificate");
        let manager = manager_with(&dir, acme, config);

        let err = manager.list().await.unwrap_err();
        assert!(matches!(err, TlsError::Parse(_)));
    }

    #[test]
    fn test_builder_requires_all_parts() {
        let err = TlsManager::builder().build().err().unwrap();
        assert!(matches!(err, BuilderError::MissingStorage));

        let dir = TempDir::new().unwrap();
        let err = TlsManager::builder()
            .storage(Arc::new(FileStorage::new(dir.path())))
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, BuilderError::MissingAcme));
    }
}
