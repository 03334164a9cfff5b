//! X.509 parsing helpers for stored certificate material

use chrono::{DateTime, TimeZone, Utc};
use x509_parser::extensions::GeneralName;
use x509_parser::prelude::FromDer;

use crate::errors::TlsError;

const END_CERTIFICATE: &str = "-----END CERTIFICATE-----";

/// Owned view of the first certificate in a PEM chain.
#[derive(Debug, Clone)]
pub struct ParsedLeaf {
    pub common_name: String,
    pub subject_alternative_names: Vec<String>,
    pub not_after: DateTime<Utc>,
    pub is_ca: bool,
}

/// Parse the first certificate of a PEM chain.
pub fn parse_leaf_certificate(pem_bytes: &[u8]) -> Result<ParsedLeaf, TlsError> {
    let (_, pem) = x509_parser::pem::parse_x509_pem(pem_bytes)
        .map_err(|e| TlsError::Parse(format!("failed to parse PEM: {}", e)))?;

    let (_, x509) = x509_parser::certificate::X509Certificate::from_der(&pem.contents)
        .map_err(|e| TlsError::Parse(format!("failed to parse X.509 certificate: {}", e)))?;

    let common_name = x509
        .subject()
        .iter_common_name()
        .next()
        .and_then(|cn| cn.as_str().ok())
        .unwrap_or_default()
        .to_string();

    let subject_alternative_names = match x509.subject_alternative_name() {
        Ok(Some(san)) => san
            .value
            .general_names
            .iter()
            .filter_map(|name| match name {
                GeneralName::DNSName(dns) => Some(dns.to_string()),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    };

    let not_after = Utc
        .timestamp_opt(x509.validity().not_after.timestamp(), 0)
        .single()
        .ok_or_else(|| TlsError::Parse("invalid notAfter timestamp".to_string()))?;

    Ok(ParsedLeaf {
        common_name,
        subject_alternative_names,
        not_after,
        is_ca: x509.is_ca(),
    })
}

/// Everything after the first certificate of a PEM chain: the issuer part
/// of a bundled chain. Empty when the chain holds a single certificate.
pub fn issuer_chain(chain_pem: &str) -> String {
    match chain_pem.find(END_CERTIFICATE) {
        Some(idx) => chain_pem[idx + END_CERTIFICATE.len()..]
            .trim_start()
            .to_string(),
        None => String::new(),
    }
}
