//! Self-signed issuer
//!
//! Signs each certificate with a freshly generated key. Useful for local
//! clusters and tests; no certificate authority is contacted.

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Utc};
use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair};
use tracing::{debug, info};

use super::{CaClient, CaError, CertificateBundle};

const MAX_EXPIRY_YEAR: i32 = 9999;

/// `CaClient` producing self-signed certificates with `rcgen`.
#[derive(Debug, Clone)]
pub struct SelfSignedIssuer {
    validity_days: u64,
}

impl SelfSignedIssuer {
    pub fn new(validity_days: u64) -> Self {
        Self { validity_days }
    }

    /// Expiry of a certificate issued at `now`.
    ///
    /// X.509 times stop at year 9999; longer lifetimes are refused.
    fn expiry_from(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>, CaError> {
        i64::try_from(self.validity_days)
            .ok()
            .and_then(chrono::Duration::try_days)
            .and_then(|validity| now.checked_add_signed(validity))
            .filter(|expires| expires.year() <= MAX_EXPIRY_YEAR)
            .ok_or_else(|| {
                CaError::Issuance(format!(
                    "validity of {} days ends after year {}",
                    self.validity_days, MAX_EXPIRY_YEAR
                ))
            })
    }

    fn issue(&self, hosts: &[String]) -> Result<CertificateBundle, CaError> {
        if hosts.is_empty() {
            return Err(CaError::Issuance("no hosts requested".to_string()));
        }

        let now = Utc::now();
        let expires = self.expiry_from(now)?;

        let key_pair = KeyPair::generate()
            .map_err(|e| CaError::Issuance(format!("failed to generate key: {}", e)))?;

        let mut params = CertificateParams::new(hosts.to_vec())
            .map_err(|e| CaError::Issuance(format!("invalid hosts {:?}: {}", hosts, e)))?;

        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, hosts[0].as_str());
        params.distinguished_name = dn;

        params.not_before = rcgen::date_time_ymd(now.year(), now.month() as u8, now.day() as u8);
        params.not_after =
            rcgen::date_time_ymd(expires.year(), expires.month() as u8, expires.day() as u8);

        let cert = params
            .self_signed(&key_pair)
            .map_err(|e| CaError::Issuance(format!("failed to sign certificate: {}", e)))?;

        debug!(domains = ?hosts, expires = %expires.date_naive(), "Signed self-signed certificate");

        Ok(CertificateBundle {
            certificate: cert.pem().into_bytes(),
            private_key: key_pair.serialize_pem().into_bytes(),
        })
    }
}

#[async_trait]
impl CaClient for SelfSignedIssuer {
    async fn obtain_certificate(&self, hosts: &[String]) -> Result<CertificateBundle, CaError> {
        let bundle = self.issue(hosts)?;
        info!(domains = ?hosts, validity_days = self.validity_days, "Issued self-signed certificate");
        Ok(bundle)
    }
}
