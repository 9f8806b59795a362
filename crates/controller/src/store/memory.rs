//! In-memory resource store with watch fan-out.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::mpsc;
use tracing::debug;

use certwarden_common::{ObjectKey, RoutingRule, SecretRecord};

use super::{in_namespace, ResourceStore, StoreError, WatchEvent, WatchStream};

#[derive(Default)]
struct State {
    rules: BTreeMap<ObjectKey, RoutingRule>,
    secrets: BTreeMap<ObjectKey, SecretRecord>,
    watchers: Vec<(Option<String>, mpsc::UnboundedSender<WatchEvent>)>,
    version: u64,
}

impl State {
    fn next_version(&mut self) -> String {
        self.version += 1;
        self.version.to_string()
    }

    fn broadcast(&mut self, event: WatchEvent) {
        self.watchers.retain(|(namespace, tx)| {
            if !in_namespace(event.rule(), namespace.as_deref()) {
                return true;
            }
            tx.send(event.clone()).is_ok()
        });
    }
}

/// Resource store kept entirely in memory.
///
/// Mutations made through [`MemoryStore::apply_rule`] and
/// [`MemoryStore::delete_rule`] bump the resource version and are
/// delivered to every open watch.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    secret_writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or update a declaration, emitting ADD or UPDATE.
    pub fn apply_rule(&self, mut rule: RoutingRule) {
        let mut state = self.state.lock();
        rule.resource_version = state.next_version();
        let event = match state.rules.insert(rule.key.clone(), rule.clone()) {
            Some(old) => WatchEvent::Updated { old, new: rule },
            None => WatchEvent::Added(rule),
        };
        debug!(kind = event.kind(), ingress = %event.rule().key, "Applied routing declaration");
        state.broadcast(event);
    }

    /// Remove a declaration, emitting DELETE if it existed.
    pub fn delete_rule(&self, key: &ObjectKey) -> Option<RoutingRule> {
        let mut state = self.state.lock();
        let removed = state.rules.remove(key)?;
        state.broadcast(WatchEvent::Deleted(removed.clone()));
        Some(removed)
    }

    /// Seed a secret without counting it as a controller write.
    pub fn insert_secret(&self, record: SecretRecord) {
        self.state.lock().secrets.insert(record.key.clone(), record);
    }

    pub fn secret(&self, key: &ObjectKey) -> Option<SecretRecord> {
        self.state.lock().secrets.get(key).cloned()
    }

    /// Number of successful `put_secret` calls.
    pub fn secret_writes(&self) -> usize {
        self.secret_writes.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ResourceStore for MemoryStore {
    async fn list_rules(&self, namespace: Option<&str>) -> Result<Vec<RoutingRule>, StoreError> {
        Ok(self
            .state
            .lock()
            .rules
            .values()
            .filter(|rule| in_namespace(rule, namespace))
            .cloned()
            .collect())
    }

    async fn get_secret(&self, key: &ObjectKey) -> Result<Option<SecretRecord>, StoreError> {
        Ok(self.secret(key))
    }

    async fn put_secret(&self, record: &SecretRecord) -> Result<(), StoreError> {
        self.state
            .lock()
            .secrets
            .insert(record.key.clone(), record.clone());
        self.secret_writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn watch(&self, namespace: Option<&str>) -> Result<WatchStream, StoreError> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.state
            .lock()
            .watchers
            .push((namespace.map(str::to_string), tx));
        Ok(rx)
    }
}
