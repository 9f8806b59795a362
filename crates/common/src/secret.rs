//! Persisted credential records.

use std::collections::BTreeMap;

use crate::annotations::{ANNOTATION_ENABLED, SECRET_TYPE_TLS, TLS_CERT_KEY, TLS_PRIVATE_KEY_KEY};
use crate::ids::ObjectKey;

/// A credential record (a secret) as stored in the resource store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretRecord {
    pub key: ObjectKey,
    pub annotations: BTreeMap<String, String>,
    pub secret_type: String,
    pub data: BTreeMap<String, Vec<u8>>,
}

impl SecretRecord {
    /// Empty record for `key`.
    pub fn new(key: ObjectKey) -> Self {
        Self {
            key,
            annotations: BTreeMap::new(),
            secret_type: String::new(),
            data: BTreeMap::new(),
        }
    }

    /// PEM certificate chain, if present.
    pub fn certificate_pem(&self) -> Option<&[u8]> {
        self.data.get(TLS_CERT_KEY).map(Vec::as_slice)
    }

    /// PEM private key, if present.
    pub fn private_key_pem(&self) -> Option<&[u8]> {
        self.data.get(TLS_PRIVATE_KEY_KEY).map(Vec::as_slice)
    }

    /// Whether the record carries the enabled marker.
    pub fn is_managed(&self) -> bool {
        self.annotations.get(ANNOTATION_ENABLED).map(String::as_str) == Some("true")
    }

    /// Give the record the issued shape: enabled marker as the only
    /// annotation, TLS type, and exactly the certificate and key payloads.
    pub fn set_issued(&mut self, certificate: Vec<u8>, private_key: Vec<u8>) {
        self.annotations = BTreeMap::from([(ANNOTATION_ENABLED.to_string(), "true".to_string())]);
        self.secret_type = SECRET_TYPE_TLS.to_string();
        self.data = BTreeMap::from([
            (TLS_CERT_KEY.to_string(), certificate),
            (TLS_PRIVATE_KEY_KEY.to_string(), private_key),
        ]);
    }
}
