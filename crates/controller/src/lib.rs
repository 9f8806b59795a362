//! Certwarden controller
//!
//! Keeps TLS certificates for routing declarations issued and fresh.
//! Change notifications and resync ticks are coalesced in a debounce queue;
//! a single reconciler drains it, running one full convergence pass per
//! trigger.
//!
//! Collaborators sit behind traits: [`store::ResourceStore`] for
//! declarations and secrets, [`ca::CaClient`] for issuance, and
//! [`provider::RoutingProvider`] for routing backends.

pub mod ca;
pub mod certificate;
pub mod controller;
pub mod errors;
pub mod lifecycle;
pub mod provider;
pub mod queue;
pub mod reconciler;
pub mod store;
pub mod version;
pub mod watcher;

pub use ca::{CaClient, CaError, CertificateBundle, SelfSignedIssuer};
pub use certificate::CertificateView;
pub use controller::Controller;
pub use errors::{ControllerError, SecretConflict, TlsError};
pub use lifecycle::{decide, CertificateLifecycle, LifecycleOutcome, RenewReason, RenewalDecision};
pub use provider::{LoggingProvider, ProviderError, ProviderRegistry, ProviderReport, RoutingProvider};
pub use queue::{DebounceQueue, ReconcileTrigger};
pub use reconciler::{dedup_secrets, PassReport, Reconciler};
pub use store::{FileStore, MemoryStore, ResourceStore, StoreError, WatchEvent, WatchStream};
pub use watcher::EventWatcher;
