//! Certificate authority collaborator.

mod self_signed;

pub use self_signed::SelfSignedIssuer;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Errors a certificate authority can report for one issuance
#[derive(Debug, Error)]
pub enum CaError {
    /// The authority could not be reached
    #[error("network error talking to the certificate authority: {0}")]
    Network(String),

    /// Domain validation failed
    #[error("challenge failed for domain '{domain}': {message}")]
    ChallengeFailure { domain: String, message: String },

    /// The authority is throttling requests
    #[error("rate limited by the certificate authority{}", .retry_after.map(|d| format!(" (retry after {:?})", d)).unwrap_or_default())]
    RateLimited { retry_after: Option<Duration> },

    /// The account used for issuance is not usable
    #[error("invalid certificate authority account: {0}")]
    InvalidAccount(String),

    /// Local failure producing the certificate
    #[error("certificate issuance failed: {0}")]
    Issuance(String),
}

/// Certificate chain and private key returned by an issuance.
#[derive(Clone, PartialEq, Eq)]
pub struct CertificateBundle {
    /// PEM-encoded certificate chain
    pub certificate: Vec<u8>,
    /// PEM-encoded private key
    pub private_key: Vec<u8>,
}

impl std::fmt::Debug for CertificateBundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificateBundle")
            .field("certificate_len", &self.certificate.len())
            .field("private_key", &"<redacted>")
            .finish()
    }
}

/// Issues certificates for a set of hosts.
#[async_trait]
pub trait CaClient: Send + Sync {
    /// Obtain a certificate covering exactly `hosts`.
    async fn obtain_certificate(&self, hosts: &[String]) -> Result<CertificateBundle, CaError>;
}
