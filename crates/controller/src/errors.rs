//! Controller error types

use std::fmt;
use thiserror::Error;

use certwarden_common::{ObjectKey, TlsSpec};

use crate::ca::CaError;
use crate::store::StoreError;

/// Errors surfaced by a reconciliation pass or a single TLS requirement.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Listing, watching or persisting through the resource store failed
    #[error("resource store error: {0}")]
    Store(#[from] StoreError),

    /// The certificate authority refused or failed the issuance
    #[error("certificate authority error: {0}")]
    Ca(#[from] CaError),

    /// The declaration cannot be acted on as written
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The reconciler stopped before shutdown was requested
    #[error("reconciler exited unexpectedly: {0}")]
    ReconcilerExited(String),
}

/// Failure of one TLS requirement, with enough context to find it.
#[derive(Debug, Error)]
#[error("ingress {rule} (secret {secret}, hosts: {}): {source}", .hosts.join(", "))]
pub struct TlsError {
    pub rule: ObjectKey,
    pub secret: ObjectKey,
    pub hosts: Vec<String>,
    #[source]
    pub source: ControllerError,
}

impl TlsError {
    pub fn new(spec: &TlsSpec, source: ControllerError) -> Self {
        Self {
            rule: spec.rule.clone(),
            secret: spec.secret.clone(),
            hosts: spec.hosts.clone(),
            source,
        }
    }
}

/// Several TLS requirements name the same secret.
///
/// Not an error for the pass: every conflicting requirement is dropped
/// until the declarations are fixed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretConflict {
    pub secret: ObjectKey,
    /// (declaration, hosts) of every conflicting requirement, in order.
    pub claimants: Vec<(ObjectKey, Vec<String>)>,
}

impl fmt::Display for SecretConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "the secret {} is used multiple times. These linked TLS ingress elements were ignored: ",
            self.secret
        )?;
        for (i, (rule, hosts)) in self.claimants.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "ingress {} (hosts: {})", rule, hosts.join(", "))?;
        }
        Ok(())
    }
}
