//! Identifier types for Certwarden.
//!
//! Object keys identify cluster resources (routing declarations and
//! credential records) by namespace and name. Pass IDs tag each
//! reconciliation pass so its log lines can be correlated.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Namespace/name identity of a cluster resource.
///
/// Ordering is by namespace, then name, which is the order the resource
/// stores list objects in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Unique ID of one reconciliation pass.
///
/// Recorded on the pass span so every log line emitted while converging
/// can be tied back to the trigger that caused it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PassId(String);

impl PassId {
    /// Create a new random pass ID
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Get the inner string value
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for PassId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_key_display() {
        let key = ObjectKey::new("default", "web");
        assert_eq!(key.to_string(), "default/web");
        assert_eq!(key.namespace(), "default");
        assert_eq!(key.name(), "web");
    }

    #[test]
    fn test_object_key_ordering() {
        let mut keys = vec![
            ObjectKey::new("b", "a"),
            ObjectKey::new("a", "z"),
            ObjectKey::new("a", "b"),
        ];
        keys.sort();
        assert_eq!(
            keys,
            vec![
                ObjectKey::new("a", "b"),
                ObjectKey::new("a", "z"),
                ObjectKey::new("b", "a"),
            ]
        );
    }

    #[test]
    fn test_pass_id_unique() {
        assert_ne!(PassId::new(), PassId::new());
    }
}
