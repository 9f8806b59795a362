//! Well-known annotation keys and record shape constants.
//!
//! These values are shared with routing providers that read issued
//! credential records, so they must not change.

/// Marks a routing declaration as managed, and an issued secret as ours.
pub const ANNOTATION_ENABLED: &str = "kubernetes.io/tls-acme";

/// Selects the routing class of a declaration.
pub const ANNOTATION_INGRESS_CLASS: &str = "kubernetes.io/ingress.class";

/// Selects the routing provider of a declaration.
pub const ANNOTATION_INGRESS_PROVIDER: &str = "kubernetes.io/ingress.provider";

/// Type tag of a TLS credential record.
pub const SECRET_TYPE_TLS: &str = "kubernetes.io/tls";

/// Data key of the PEM certificate chain.
pub const TLS_CERT_KEY: &str = "tls.crt";

/// Data key of the PEM private key.
pub const TLS_PRIVATE_KEY_KEY: &str = "tls.key";
