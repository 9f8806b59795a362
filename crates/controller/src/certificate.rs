//! Read-only view of the certificate held in a secret.

use chrono::{DateTime, Utc};
use x509_parser::prelude::*;

use certwarden_common::SecretRecord;

/// Domains and expiry parsed from a secret's `tls.crt`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateView {
    /// DNS SANs plus subject common names, lowercased and deduplicated
    pub domains: Vec<String>,
    /// `notAfter`, or why it could not be read
    pub not_after: Result<DateTime<Utc>, String>,
}

impl CertificateView {
    /// Parse the leaf certificate of `record`.
    ///
    /// Never fails: unreadable content yields no domains and an expiry error.
    pub fn from_record(record: &SecretRecord) -> Self {
        match record.certificate_pem() {
            Some(pem) => Self::from_pem(pem),
            None => Self::unreadable("secret has no certificate data".to_string()),
        }
    }

    pub fn from_pem(pem: &[u8]) -> Self {
        match parse_leaf(pem) {
            Ok(view) => view,
            Err(e) => Self::unreadable(e),
        }
    }

    fn unreadable(reason: String) -> Self {
        Self {
            domains: Vec::new(),
            not_after: Err(reason),
        }
    }

    /// Hosts from `hosts` the certificate does not name (exact match),
    /// in request order.
    pub fn missing_hosts(&self, hosts: &[String]) -> Vec<String> {
        hosts
            .iter()
            .filter(|host| !self.domains.contains(*host))
            .cloned()
            .collect()
    }
}

fn parse_leaf(pem_bytes: &[u8]) -> Result<CertificateView, String> {
    let (_, pem) =
        pem::parse_x509_pem(pem_bytes).map_err(|e| format!("failed to parse PEM: {}", e))?;
    let (_, cert) = X509Certificate::from_der(&pem.contents)
        .map_err(|e| format!("failed to parse certificate: {}", e))?;

    let mut domains: Vec<String> = Vec::new();
    let mut push = |name: &str| {
        let name = name.to_lowercase();
        if !domains.contains(&name) {
            domains.push(name);
        }
    };

    for cn in cert.subject().iter_common_name() {
        if let Ok(cn) = cn.as_str() {
            push(cn);
        }
    }
    if let Ok(Some(san)) = cert.subject_alternative_name() {
        for name in &san.value.general_names {
            if let GeneralName::DNSName(dns) = name {
                push(*dns);
            }
        }
    }

    let timestamp = cert.validity().not_after.timestamp();
    let not_after = DateTime::from_timestamp(timestamp, 0)
        .ok_or_else(|| format!("invalid expiry timestamp {}", timestamp));

    Ok(CertificateView { domains, not_after })
}
