pub mod issue;
pub mod list;
pub mod renew;

pub use issue::IssueCommand;
pub use list::ListCommand;
pub use renew::RenewCommand;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, ValueEnum};
use talon_dns::HetznerDnsClient;
use talon_storage::StorageBackend;
use talon_tls::{
    InstantAcmeClient, ReconcilerSolver, TlsConfig, TlsManager, DEFAULT_RENEWAL_THRESHOLD_DAYS,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StorageKind {
    /// Local filesystem
    File,
    /// Consul KV store
    Consul,
}

/// Configuration shared by every certificate command.
#[derive(Args)]
pub struct TlsArgs {
    /// Account email for ACME registration
    #[arg(long, env = "TALON_EMAIL")]
    pub email: String,

    /// Domain to manage; repeat for SAN certificates
    #[arg(long = "domain", env = "TALON_DOMAINS", value_delimiter = ',')]
    pub domains: Vec<String>,

    /// Hetzner DNS API token
    #[arg(long, env = "TALON_DNS_TOKEN", hide_env_values = true)]
    pub dns_token: String,

    /// Where certificate and account material is stored
    #[arg(long, value_enum, default_value_t = StorageKind::File)]
    pub storage: StorageKind,

    /// Root directory for file storage
    #[arg(long, default_value = "data")]
    pub storage_root: PathBuf,

    /// Consul HTTP address for consul storage
    #[arg(long, env = "CONSUL_HTTP_ADDR", default_value = "http://127.0.0.1:8500")]
    pub consul_address: String,

    /// Consul ACL token
    #[arg(long, env = "CONSUL_HTTP_TOKEN", hide_env_values = true)]
    pub consul_token: Option<String>,

    /// Storage prefix for certificate bundles
    #[arg(long, default_value = "certs")]
    pub cert_prefix: String,

    /// Storage prefix for ACME accounts
    #[arg(long, default_value = "accounts")]
    pub account_prefix: String,

    /// Use the Let's Encrypt staging directory
    #[arg(long)]
    pub staging: bool,

    /// Renew when this many days or fewer remain; negative always renews
    #[arg(long, default_value_t = DEFAULT_RENEWAL_THRESHOLD_DAYS)]
    pub threshold_days: i64,
}

impl TlsArgs {
    pub fn build_manager(&self) -> anyhow::Result<TlsManager> {
        let backend = match self.storage {
            StorageKind::File => StorageBackend::File {
                root: self.storage_root.clone(),
            },
            StorageKind::Consul => StorageBackend::Consul {
                address: self.consul_address.clone(),
                token: self.consul_token.clone(),
            },
        };
        let storage = backend.build().map_err(talon_tls::TlsError::from)?;

        let dns = Arc::new(
            HetznerDnsClient::new(self.dns_token.clone()).map_err(talon_tls::TlsError::from)?,
        );
        let solver = Arc::new(ReconcilerSolver::new(dns));
        let acme = Arc::new(InstantAcmeClient::new(solver, self.staging));

        let mut config = TlsConfig::new(self.email.clone(), self.domains.clone());
        config.cert_prefix = self.cert_prefix.clone();
        config.account_prefix = self.account_prefix.clone();
        config.staging = self.staging;
        config.renewal_threshold_days = self.threshold_days;

        Ok(TlsManager::builder()
            .storage(storage)
            .acme(acme)
            .config(config)
            .build()?)
    }
}
