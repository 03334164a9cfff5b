//! ACME directory boundary
//!
//! The protocol state machine (nonce, order, finalize) lives in the
//! `instant-acme` client library; this module supplies what the library
//! needs (account credentials, a DNS-01 solver, an obtain request) and
//! consumes the issued certificate back. Everything above it depends only
//! on the [`AcmeDirectory`] trait.

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use instant_acme::{
    Account, AccountCredentials, AuthorizationStatus, ChallengeType, Identifier, NewAccount,
    NewOrder, Order, OrderStatus,
};
use rcgen::{CertificateParams, DistinguishedName, KeyPair};
use serde::Deserialize;
use std::sync::Arc;
use talon_dns::DnsRecord;
use tracing::{debug, error, info, warn};

use crate::errors::TlsError;
use crate::keys::AccountKey;
use crate::models::{
    DirectoryEndpoints, IssuedCertificate, ObtainRequest, RegistrationResource,
};
use crate::solver::{Dns01Solver, CHALLENGE_TTL_SECONDS};
use crate::x509;

/// Result of registering a brand-new account: the key the directory bound
/// the account to, and the registration resource to persist.
pub struct NewRegistration {
    pub key_pkcs8_der: Vec<u8>,
    pub registration: RegistrationResource,
}

/// The ACME operations the certificate lifecycle manager needs.
#[async_trait]
pub trait AcmeDirectory: Send + Sync {
    /// Register a new terms-agreed account for `email`.
    async fn register(&self, email: &str) -> Result<NewRegistration, TlsError>;

    /// Check stored credentials against the directory, returning the
    /// account status on success.
    ///
    /// Implementations may only verify that the credentials are usable for
    /// signing, not fetch live account state: a deactivated account can
    /// still pass here and only fail on the next order.
    async fn revalidate(&self, credentials_json: &[u8]) -> Result<String, TlsError>;

    /// Run the full DNS-01 challenge/order/finalize exchange and return the
    /// issued certificate.
    async fn obtain(
        &self,
        credentials_json: &[u8],
        request: &ObtainRequest,
    ) -> Result<IssuedCertificate, TlsError>;
}

/// Mirror of the credential document the client library emits; used to
/// pull out the account URL and directory endpoints for persistence.
#[derive(Deserialize)]
struct CredentialsView {
    id: String,
    key_pkcs8: String,
    #[serde(default)]
    directory: Option<String>,
    urls: DirectoryUrlsView,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DirectoryUrlsView {
    new_nonce: String,
    new_account: String,
    new_order: String,
}

/// Assemble the client library's credential document from a stored account
/// key and registration resource.
pub(crate) fn credentials_json(
    key: &AccountKey,
    registration: &RegistrationResource,
) -> Result<Vec<u8>, TlsError> {
    let der = key.pkcs8_der()?;
    let doc = serde_json::json!({
        "id": registration.account_url,
        "key_pkcs8": URL_SAFE_NO_PAD.encode(der),
        "directory": registration.directory.directory_url,
        "urls": {
            "newNonce": registration.directory.new_nonce,
            "newAccount": registration.directory.new_account,
            "newOrder": registration.directory.new_order,
        },
    });
    Ok(serde_json::to_vec(&doc)?)
}

/// The zone-owning base name of a domain: wildcard marker stripped.
pub(crate) fn base_domain(domain: &str) -> &str {
    domain.strip_prefix("*.").unwrap_or(domain)
}

/// ACME client bound to one directory URL and a DNS-01 solver.
pub struct InstantAcmeClient {
    solver: Arc<dyn Dns01Solver>,
    directory_url: String,
}

impl InstantAcmeClient {
    pub fn new(solver: Arc<dyn Dns01Solver>, staging: bool) -> Self {
        let directory_url = if staging {
            instant_acme::LetsEncrypt::Staging.url().to_string()
        } else {
            instant_acme::LetsEncrypt::Production.url().to_string()
        };
        Self {
            solver,
            directory_url,
        }
    }

    /// Use a custom directory URL (e.g. a local Pebble instance).
    pub fn with_directory_url(solver: Arc<dyn Dns01Solver>, directory_url: String) -> Self {
        Self {
            solver,
            directory_url,
        }
    }

    fn parse_credentials(credentials_json: &[u8]) -> Result<AccountCredentials, TlsError> {
        serde_json::from_slice(credentials_json)
            .map_err(|e| TlsError::Parse(format!("invalid account credentials: {}", e)))
    }

    /// Collect one TXT record and validation URL per pending authorization.
    fn challenge_records(
        order: &Order,
        authorizations: &[instant_acme::Authorization],
    ) -> Result<(Vec<DnsRecord>, Vec<String>), TlsError> {
        let mut records = Vec::new();
        let mut challenge_urls = Vec::new();

        for authz in authorizations {
            match authz.status {
                AuthorizationStatus::Pending => {}
                AuthorizationStatus::Valid => continue,
                status => {
                    return Err(TlsError::Provider(format!(
                        "unexpected authorization status: {:?}",
                        status
                    )))
                }
            }

            let Identifier::Dns(domain) = &authz.identifier;

            let challenge = authz
                .challenges
                .iter()
                .find(|c| c.r#type == ChallengeType::Dns01)
                .ok_or_else(|| {
                    TlsError::Provider(format!("no DNS-01 challenge offered for {}", domain))
                })?;

            let value = order.key_authorization(challenge).dns_value();
            let name = format!("_acme-challenge.{}", base_domain(domain));
            debug!(domain = %domain, record = %name, "prepared challenge record");

            records.push(DnsRecord::txt(name, value, CHALLENGE_TTL_SECONDS));
            challenge_urls.push(challenge.url.clone());
        }

        Ok((records, challenge_urls))
    }

    async fn wait_for_order_ready(&self, order: &mut Order) -> Result<(), TlsError> {
        const MAX_ATTEMPTS: u8 = 6;
        const BASE_DELAY_SECS: u64 = 1;
        const MAX_DELAY_SECS: u64 = 30;

        for attempt in 1..=MAX_ATTEMPTS {
            let delay_secs = std::cmp::min(
                BASE_DELAY_SECS * 2u64.pow((attempt - 1) as u32),
                MAX_DELAY_SECS,
            );
            tokio::time::sleep(std::time::Duration::from_secs(delay_secs)).await;
            let state = order.refresh().await?;

            match state.status {
                OrderStatus::Ready => {
                    info!("order is ready after {} attempt(s)", attempt);
                    return Ok(());
                }
                OrderStatus::Invalid => {
                    let msg = format!("order validation failed after {} attempt(s)", attempt);
                    error!("{}", msg);
                    return Err(TlsError::Provider(msg));
                }
                _ if attempt < MAX_ATTEMPTS => {
                    debug!(attempt, "order not ready yet, retrying");
                }
                _ => break,
            }
        }

        Err(TlsError::Provider(format!(
            "order validation timed out after {} attempts",
            MAX_ATTEMPTS
        )))
    }

    /// Everything between record provisioning and certificate download.
    /// Split out so cleanup can run on both the success and failure paths.
    async fn drive_order(
        &self,
        order: &mut Order,
        request: &ObtainRequest,
        challenge_urls: &[String],
    ) -> Result<IssuedCertificate, TlsError> {
        for url in challenge_urls {
            order.set_challenge_ready(url).await?;
        }
        if !challenge_urls.is_empty() {
            self.wait_for_order_ready(order).await?;
        }

        let private_key = match &request.private_key_pem {
            Some(pem) => KeyPair::from_pem(pem)
                .map_err(|e| TlsError::Parse(format!("invalid private key: {}", e)))?,
            None => KeyPair::generate()?,
        };

        let mut params = CertificateParams::new(request.domains.clone())?;
        params.distinguished_name = DistinguishedName::new();
        let csr = params.serialize_request(&private_key)?;

        order.finalize(csr.der()).await?;

        let chain_pem = loop {
            match order.certificate().await? {
                Some(cert) => break cert,
                None => tokio::time::sleep(std::time::Duration::from_secs(1)).await,
            }
        };

        let issuer_certificate_pem = x509::issuer_chain(&chain_pem);

        Ok(IssuedCertificate {
            domain: request.domains[0].clone(),
            private_key_pem: private_key.serialize_pem(),
            certificate_chain_pem: chain_pem,
            issuer_certificate_pem,
        })
    }
}

#[async_trait]
impl AcmeDirectory for InstantAcmeClient {
    async fn register(&self, email: &str) -> Result<NewRegistration, TlsError> {
        info!(email = %email, directory = %self.directory_url, "registering ACME account");

        let (_account, credentials) = Account::create(
            &NewAccount {
                contact: &[format!("mailto:{}", email).as_str()],
                terms_of_service_agreed: true,
                only_return_existing: false,
            },
            &self.directory_url,
            None,
        )
        .await?;

        let serialized = serde_json::to_vec(&credentials)?;
        let view: CredentialsView = serde_json::from_slice(&serialized)?;
        let key_pkcs8_der = URL_SAFE_NO_PAD
            .decode(view.key_pkcs8.as_bytes())
            .map_err(|e| TlsError::Parse(format!("invalid account key encoding: {}", e)))?;

        Ok(NewRegistration {
            key_pkcs8_der,
            registration: RegistrationResource {
                account_url: view.id,
                status: "valid".to_string(),
                directory: DirectoryEndpoints {
                    directory_url: view
                        .directory
                        .unwrap_or_else(|| self.directory_url.clone()),
                    new_nonce: view.urls.new_nonce,
                    new_account: view.urls.new_account,
                    new_order: view.urls.new_order,
                },
            },
        })
    }

    async fn revalidate(&self, credentials_json: &[u8]) -> Result<String, TlsError> {
        let credentials = Self::parse_credentials(credentials_json)?;
        // The client library exposes no account-state fetch; rebuilding the
        // account from credentials proves the key and URLs are coherent but
        // cannot detect a deactivated account.
        Account::from_credentials(credentials).await?;
        Ok("valid".to_string())
    }

    async fn obtain(
        &self,
        credentials_json: &[u8],
        request: &ObtainRequest,
    ) -> Result<IssuedCertificate, TlsError> {
        if request.domains.is_empty() {
            return Err(TlsError::Configuration("no domains requested".to_string()));
        }

        let credentials = Self::parse_credentials(credentials_json)?;
        let account = Account::from_credentials(credentials).await?;

        let identifiers: Vec<Identifier> = request
            .domains
            .iter()
            .map(|d| Identifier::Dns(d.clone()))
            .collect();

        let mut order = account
            .new_order(&NewOrder {
                identifiers: &identifiers,
            })
            .await?;

        let zone_domain = base_domain(&request.domains[0]).to_string();
        let mut challenge_urls = Vec::new();
        let mut provisioned = Vec::new();

        if order.state().status != OrderStatus::Ready {
            let authorizations = order.authorizations().await?;
            let (records, urls) = Self::challenge_records(&order, &authorizations)?;
            challenge_urls = urls;

            if !records.is_empty() {
                let requested = records.len();
                provisioned = self.solver.present(&zone_domain, records).await?;
                if provisioned.len() != requested {
                    let created = provisioned.len();
                    // Clean up whatever went in before failing the order.
                    let failures = self
                        .solver
                        .cleanup(&zone_domain, std::mem::take(&mut provisioned))
                        .await;
                    for failure in &failures {
                        warn!(record = %failure.record.name, reason = %failure.reason,
                              "failed to remove challenge record");
                    }
                    return Err(TlsError::Provider(format!(
                        "only {} of {} challenge records were provisioned",
                        created, requested
                    )));
                }
            }
        }

        let outcome = self.drive_order(&mut order, request, &challenge_urls).await;

        // Challenge records come down whether the order succeeded or not;
        // leaked records pollute the zone.
        if !provisioned.is_empty() {
            let failures = self.solver.cleanup(&zone_domain, provisioned).await;
            for failure in &failures {
                warn!(record = %failure.record.name, reason = %failure.reason,
                      "failed to remove challenge record");
            }
        }

        outcome
    }
}
