//! Certificate lifecycle management over ACME DNS-01
//!
//! Issues, renews, and lists X.509 certificates. Domain control is proven
//! with DNS-01 challenge records provisioned through [`talon_dns`], and
//! account and certificate material is persisted through [`talon_storage`].
//!
//! The entry point is [`TlsManager`], built from a storage backend, an
//! [`AcmeDirectory`] implementation, and a [`TlsConfig`].

pub mod account;
pub mod acme;
pub mod errors;
pub mod keys;
pub mod manager;
pub mod models;
pub mod policy;
pub mod solver;
pub mod x509;

pub use account::AccountManager;
pub use acme::{AcmeDirectory, InstantAcmeClient, NewRegistration};
pub use errors::{BuilderError, TlsError};
pub use keys::AccountKey;
pub use manager::{TlsManager, TlsManagerBuilder};
pub use models::{
    AccountRecord, AcmeAccount, DirectoryEndpoints, IssuedCertificate, ObtainRequest,
    RegistrationResource, TlsCertInfo, TlsConfig, DEFAULT_RENEWAL_THRESHOLD_DAYS,
};
pub use policy::needs_renewal;
pub use solver::{Dns01Solver, ReconcilerSolver, CHALLENGE_TTL_SECONDS};
