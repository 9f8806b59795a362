//! Certificate lifecycle for a single TLS requirement
//!
//! ```text
//! NoHosts                        (terminal, no error)
//! Evaluating ─┬─> UpToDate       (terminal)
//!             └─> NeedsRenewal ─> Requesting ─┬─> Issued  (terminal)
//!                                             └─> Failed  (terminal)
//! ```
//!
//! Failures are scoped to the requirement; the caller collects them.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use certwarden_common::{SecretRecord, TlsSpec};

use crate::ca::CaClient;
use crate::certificate::CertificateView;
use crate::errors::ControllerError;
use crate::store::ResourceStore;

/// Why a certificate has to be (re)issued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenewReason {
    /// No secret exists yet
    Missing,
    /// The stored certificate lacks some required hosts
    DomainsNotCovered { missing: Vec<String> },
    /// The stored certificate's expiry could not be read
    ExpiryUnreadable(String),
    /// Less than the minimum validity remains
    ExpiresSoon { remaining: chrono::Duration },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenewalDecision {
    Renew(RenewReason),
    UpToDate { remaining: chrono::Duration },
}

/// Decide whether the certificate in `existing` still serves `hosts`.
///
/// Checks run in order and the first match wins: missing secret, host
/// coverage, readable expiry, remaining validity.
pub fn decide(
    existing: Option<&CertificateView>,
    hosts: &[String],
    minimum_validity: chrono::Duration,
    now: DateTime<Utc>,
) -> RenewalDecision {
    let Some(view) = existing else {
        return RenewalDecision::Renew(RenewReason::Missing);
    };

    let missing = view.missing_hosts(hosts);
    if !missing.is_empty() {
        return RenewalDecision::Renew(RenewReason::DomainsNotCovered { missing });
    }

    let not_after = match &view.not_after {
        Ok(not_after) => *not_after,
        Err(e) => return RenewalDecision::Renew(RenewReason::ExpiryUnreadable(e.clone())),
    };

    let remaining = not_after - now;
    if remaining < minimum_validity {
        RenewalDecision::Renew(RenewReason::ExpiresSoon { remaining })
    } else {
        RenewalDecision::UpToDate { remaining }
    }
}

/// Terminal state of one lifecycle run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleOutcome {
    NoHosts,
    UpToDate { remaining_days: i64 },
    Issued { reason: RenewReason },
}

/// Drives evaluation, issuance and persistence for TLS requirements.
pub struct CertificateLifecycle {
    store: Arc<dyn ResourceStore>,
    ca: Arc<dyn CaClient>,
    minimum_validity: chrono::Duration,
}

impl CertificateLifecycle {
    pub fn new(store: Arc<dyn ResourceStore>, ca: Arc<dyn CaClient>, minimum_validity: Duration) -> Self {
        Self {
            store,
            ca,
            minimum_validity: chrono::Duration::from_std(minimum_validity)
                .unwrap_or(chrono::Duration::MAX),
        }
    }

    pub async fn process(&self, spec: &TlsSpec) -> Result<LifecycleOutcome, ControllerError> {
        if spec.hosts.is_empty() {
            info!(
                ingress = %spec.rule,
                secret = %spec.secret,
                "No hosts left after filtering, skipping certificate"
            );
            return Ok(LifecycleOutcome::NoHosts);
        }

        // Evaluating
        let existing = if spec.secret.name.is_empty() {
            None
        } else {
            self.store.get_secret(&spec.secret).await?
        };
        let view = existing.as_ref().map(CertificateView::from_record);

        let reason = match decide(view.as_ref(), &spec.hosts, self.minimum_validity, Utc::now()) {
            RenewalDecision::UpToDate { remaining } => {
                info!(
                    secret = %spec.secret,
                    domains = ?spec.hosts,
                    remaining_days = remaining.num_days(),
                    "Certificate is up to date"
                );
                return Ok(LifecycleOutcome::UpToDate {
                    remaining_days: remaining.num_days(),
                });
            }
            RenewalDecision::Renew(reason) => reason,
        };

        match &reason {
            RenewReason::Missing => info!(secret = %spec.secret, "No existing certificate, requesting one"),
            RenewReason::DomainsNotCovered { missing } => info!(
                secret = %spec.secret,
                missing = ?missing,
                "Certificate does not cover all hosts, renewing"
            ),
            RenewReason::ExpiryUnreadable(e) => warn!(
                secret = %spec.secret,
                error = %e,
                "Cannot read certificate expiry, renewing"
            ),
            RenewReason::ExpiresSoon { remaining } => info!(
                secret = %spec.secret,
                remaining_days = remaining.num_days(),
                "Certificate expires soon, renewing"
            ),
        }

        // Requesting
        if spec.secret.name.is_empty() {
            return Err(ControllerError::Configuration(
                "TLS entry has no secret name to store the certificate in".to_string(),
            ));
        }

        let bundle = self.ca.obtain_certificate(&spec.hosts).await?;
        debug!(secret = %spec.secret, "Certificate authority returned a certificate");

        let mut record = existing.unwrap_or_else(|| SecretRecord::new(spec.secret.clone()));
        record.set_issued(bundle.certificate, bundle.private_key);
        self.store.put_secret(&record).await?;

        info!(secret = %spec.secret, domains = ?spec.hosts, "Stored issued certificate");
        Ok(LifecycleOutcome::Issued { reason })
    }
}
