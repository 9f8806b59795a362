//! Resource store collaborator.
//!
//! The store is the only source of truth for routing declarations and
//! credential records. The controller lists declarations fresh on every
//! pass, reads secrets while evaluating renewal, and writes a secret only
//! after a successful issuance.

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use async_trait::async_trait;
use std::io;
use thiserror::Error;
use tokio::sync::mpsc;

use certwarden_common::{ObjectKey, RoutingRule, SecretRecord};

/// Errors from the resource store
#[derive(Debug, Error)]
pub enum StoreError {
    /// IO error during file operations
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Failed to serialize/deserialize data
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Listing routing declarations failed
    #[error("failed to list routing declarations: {0}")]
    List(String),

    /// Persisting a secret failed
    #[error("failed to persist secret {key}: {message}")]
    Persist { key: ObjectKey, message: String },

    /// Watch could not be established
    #[error("failed to watch routing declarations: {0}")]
    Watch(String),

    /// Namespace or name cannot be mapped onto the backend
    #[error("invalid object key '{0}'")]
    InvalidKey(ObjectKey),
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

/// Change notification for one routing declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    Added(RoutingRule),
    Updated { old: RoutingRule, new: RoutingRule },
    Deleted(RoutingRule),
}

impl WatchEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            WatchEvent::Added(_) => "ADD",
            WatchEvent::Updated { .. } => "UPDATE",
            WatchEvent::Deleted(_) => "DELETE",
        }
    }

    /// The declaration the event is about (the new one for updates).
    pub fn rule(&self) -> &RoutingRule {
        match self {
            WatchEvent::Added(rule) | WatchEvent::Deleted(rule) => rule,
            WatchEvent::Updated { new, .. } => new,
        }
    }
}

/// Stream of watch events; closes when the store stops watching.
pub type WatchStream = mpsc::UnboundedReceiver<WatchEvent>;

/// Access to routing declarations and credential records.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// List routing declarations, ordered by namespace and name.
    ///
    /// `None` lists all namespaces.
    async fn list_rules(&self, namespace: Option<&str>) -> Result<Vec<RoutingRule>, StoreError>;

    /// Fetch a secret; `Ok(None)` if it does not exist.
    async fn get_secret(&self, key: &ObjectKey) -> Result<Option<SecretRecord>, StoreError>;

    /// Create or replace a secret.
    async fn put_secret(&self, record: &SecretRecord) -> Result<(), StoreError>;

    /// Subscribe to declaration changes.
    async fn watch(&self, namespace: Option<&str>) -> Result<WatchStream, StoreError>;
}

/// Whether `rule` is visible in a watch or list scoped to `namespace`.
pub(crate) fn in_namespace(rule: &RoutingRule, namespace: Option<&str>) -> bool {
    namespace.map_or(true, |ns| rule.namespace() == ns)
}
