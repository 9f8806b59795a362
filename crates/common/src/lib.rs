//! Shared model for Certwarden.
//!
//! Routing declarations, the TLS requirements extracted from them, and the
//! credential records certificates are persisted into.

pub mod annotations;
pub mod hosts;
pub mod ids;
pub mod rule;
pub mod secret;

pub use hosts::{normalize_hosts, HostFilter};
pub use ids::{ObjectKey, PassId};
pub use rule::{
    resolve_ingress_class, IgnoreReason, IngressDefaults, RoutePath, RouteRule, RoutingRule,
    TlsEntry, TlsSpec, UnsupportedClass,
};
pub use secret::SecretRecord;
