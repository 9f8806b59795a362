//! Directory-backed resource store.
//!
//! # Directory Structure
//!
//! ```text
//! store/
//! ├── rules/
//! │   └── <namespace>/
//! │       └── <name>.json      # Routing declaration
//! └── secrets/
//!     └── <namespace>/
//!         └── <name>/
//!             ├── meta.json    # Annotations and type
//!             ├── tls.crt      # One file per data key
//!             └── tls.key
//! ```
//!
//! The resource version of a declaration is the modification time of its
//! file. Watches are driven by filesystem notifications: every burst of
//! changes triggers a rescan that is diffed against the previous one.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, UNIX_EPOCH};

use async_trait::async_trait;
use notify::{Event, RecursiveMode, Watcher};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use certwarden_common::{ObjectKey, RouteRule, RoutingRule, SecretRecord, TlsEntry};

use super::{ResourceStore, StoreError, WatchEvent, WatchStream};

const RULES_DIR: &str = "rules";
const SECRETS_DIR: &str = "secrets";
const SECRET_META_FILE: &str = "meta.json";

/// Quiet period after a filesystem event before rescanning
const WATCH_DEBOUNCE: Duration = Duration::from_millis(100);

/// On-disk body of a routing declaration; the key comes from the path.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct RuleDocument {
    annotations: BTreeMap<String, String>,
    tls: Vec<TlsEntry>,
    rules: Vec<RouteRule>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct SecretMeta {
    annotations: BTreeMap<String, String>,
    #[serde(rename = "type")]
    secret_type: String,
}

/// Resource store rooted at a directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    base_path: PathBuf,
}

impl FileStore {
    /// Open the store, creating the directory layout if missing.
    ///
    /// Directories get mode 0700 on Unix.
    pub fn new(base_path: &Path) -> Result<Self, StoreError> {
        let rules = base_path.join(RULES_DIR);
        let secrets = base_path.join(SECRETS_DIR);
        std::fs::create_dir_all(&rules)?;
        std::fs::create_dir_all(&secrets)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o700);
            std::fs::set_permissions(base_path, perms.clone())?;
            std::fs::set_permissions(&rules, perms.clone())?;
            std::fs::set_permissions(&secrets, perms)?;
        }

        info!(store_path = %base_path.display(), "Opened file resource store");

        Ok(Self {
            base_path: base_path.to_path_buf(),
        })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn rules_root(&self) -> PathBuf {
        self.base_path.join(RULES_DIR)
    }

    fn secret_path(&self, key: &ObjectKey) -> Result<PathBuf, StoreError> {
        if !is_path_component(&key.namespace) || !is_path_component(&key.name) {
            return Err(StoreError::InvalidKey(key.clone()));
        }
        Ok(self
            .base_path
            .join(SECRETS_DIR)
            .join(&key.namespace)
            .join(&key.name))
    }

    /// Write a routing declaration to disk.
    pub async fn write_rule(&self, rule: &RoutingRule) -> Result<(), StoreError> {
        if !is_path_component(rule.namespace()) || !is_path_component(rule.name()) {
            return Err(StoreError::InvalidKey(rule.key.clone()));
        }
        let dir = self.rules_root().join(rule.namespace());
        fs::create_dir_all(&dir).await?;

        let document = RuleDocument {
            annotations: rule.annotations.clone(),
            tls: rule.tls.clone(),
            rules: rule.rules.clone(),
        };
        let path = dir.join(format!("{}.json", rule.name()));
        fs::write(&path, serde_json::to_vec_pretty(&document)?).await?;
        debug!(ingress = %rule.key, path = %path.display(), "Wrote routing declaration");
        Ok(())
    }
}

fn is_path_component(s: &str) -> bool {
    !s.is_empty() && s != "." && s != ".." && !s.contains(['/', '\\'])
}

async fn list_dir(path: &Path) -> Result<Vec<(String, PathBuf, bool)>, StoreError> {
    let mut entries = Vec::new();
    let mut dir = match fs::read_dir(path).await {
        Ok(dir) => dir,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(entries),
        Err(e) => return Err(e.into()),
    };
    while let Some(entry) = dir.next_entry().await? {
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        let is_dir = entry.file_type().await?.is_dir();
        entries.push((name, entry.path(), is_dir));
    }
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(entries)
}

async fn read_rule(namespace: &str, name: &str, path: &Path) -> Result<RoutingRule, StoreError> {
    let content = fs::read(path).await?;
    let document: RuleDocument = serde_json::from_slice(&content)?;
    let resource_version = fs::metadata(path)
        .await?
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_nanos().to_string())
        .unwrap_or_default();

    let mut rule = RoutingRule::new(namespace, name);
    rule.resource_version = resource_version;
    rule.annotations = document.annotations;
    rule.tls = document.tls;
    rule.rules = document.rules;
    Ok(rule)
}

/// Read every declaration under `root`, ordered by namespace then name.
///
/// Files that fail to parse are skipped with a warning.
async fn scan_rules(root: &Path, namespace: Option<&str>) -> Result<Vec<RoutingRule>, StoreError> {
    let mut rules = Vec::new();
    for (ns, ns_path, is_dir) in list_dir(root).await? {
        if !is_dir || namespace.is_some_and(|want| want != ns) {
            continue;
        }
        for (file, path, is_dir) in list_dir(&ns_path).await? {
            let Some(name) = file.strip_suffix(".json").filter(|_| !is_dir) else {
                continue;
            };
            match read_rule(&ns, name, &path).await {
                Ok(rule) => rules.push(rule),
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable routing declaration"),
            }
        }
    }
    Ok(rules)
}

fn index(rules: Vec<RoutingRule>) -> BTreeMap<ObjectKey, RoutingRule> {
    rules.into_iter().map(|r| (r.key.clone(), r)).collect()
}

/// Events turning `old` into `new`.
fn diff(
    old: &BTreeMap<ObjectKey, RoutingRule>,
    new: &BTreeMap<ObjectKey, RoutingRule>,
) -> Vec<WatchEvent> {
    let mut events = Vec::new();
    for (key, rule) in new {
        match old.get(key) {
            None => events.push(WatchEvent::Added(rule.clone())),
            Some(previous) if previous != rule => events.push(WatchEvent::Updated {
                old: previous.clone(),
                new: rule.clone(),
            }),
            Some(_) => {}
        }
    }
    for (key, rule) in old {
        if !new.contains_key(key) {
            events.push(WatchEvent::Deleted(rule.clone()));
        }
    }
    events
}

#[async_trait]
impl ResourceStore for FileStore {
    async fn list_rules(&self, namespace: Option<&str>) -> Result<Vec<RoutingRule>, StoreError> {
        scan_rules(&self.rules_root(), namespace)
            .await
            .map_err(|e| StoreError::List(e.to_string()))
    }

    async fn get_secret(&self, key: &ObjectKey) -> Result<Option<SecretRecord>, StoreError> {
        let dir = self.secret_path(key)?;
        let meta_path = dir.join(SECRET_META_FILE);
        if !fs::try_exists(&meta_path).await? {
            trace!(secret = %key, "No stored secret found");
            return Ok(None);
        }

        let meta: SecretMeta = serde_json::from_slice(&fs::read(&meta_path).await?)?;
        let mut record = SecretRecord::new(key.clone());
        record.annotations = meta.annotations;
        record.secret_type = meta.secret_type;

        for (file, path, is_dir) in list_dir(&dir).await? {
            if is_dir || file == SECRET_META_FILE {
                continue;
            }
            record.data.insert(file, fs::read(&path).await?);
        }

        debug!(secret = %key, keys = record.data.len(), "Loaded stored secret");
        Ok(Some(record))
    }

    async fn put_secret(&self, record: &SecretRecord) -> Result<(), StoreError> {
        let dir = self.secret_path(&record.key)?;
        let persist = |e: std::io::Error| StoreError::Persist {
            key: record.key.clone(),
            message: e.to_string(),
        };

        fs::create_dir_all(&dir).await.map_err(persist)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&dir, std::fs::Permissions::from_mode(0o700))
                .await
                .map_err(persist)?;
        }

        // Drop payloads the new record no longer carries
        for (file, path, is_dir) in list_dir(&dir).await? {
            if !is_dir && file != SECRET_META_FILE && !record.data.contains_key(&file) {
                fs::remove_file(&path).await.map_err(persist)?;
            }
        }

        for (name, value) in &record.data {
            if !is_path_component(name) || name == SECRET_META_FILE {
                return Err(StoreError::Persist {
                    key: record.key.clone(),
                    message: format!("invalid data key '{}'", name),
                });
            }
            let path = dir.join(name);
            fs::write(&path, value).await.map_err(persist)?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))
                    .await
                    .map_err(persist)?;
            }
        }

        let meta = SecretMeta {
            annotations: record.annotations.clone(),
            secret_type: record.secret_type.clone(),
        };
        fs::write(dir.join(SECRET_META_FILE), serde_json::to_vec_pretty(&meta)?)
            .await
            .map_err(persist)?;

        info!(secret = %record.key, "Saved secret to store");
        Ok(())
    }

    async fn watch(&self, namespace: Option<&str>) -> Result<WatchStream, StoreError> {
        let root = self.rules_root();
        let namespace = namespace.map(str::to_string);
        let mut snapshot = index(scan_rules(&root, namespace.as_deref()).await?);

        let (fs_tx, mut fs_rx) = mpsc::channel(64);
        let mut watcher = notify::recommended_watcher(move |event: Result<Event, notify::Error>| {
            if let Ok(event) = event {
                let _ = fs_tx.blocking_send(event);
            }
        })
        .map_err(|e| StoreError::Watch(format!("failed to create file watcher: {}", e)))?;
        watcher
            .watch(&root, RecursiveMode::Recursive)
            .map_err(|e| StoreError::Watch(format!("failed to watch {}: {}", root.display(), e)))?;

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            // Dropping the watcher ends filesystem notifications
            let _watcher = watcher;

            while let Some(event) = fs_rx.recv().await {
                trace!(kind = ?event.kind, "Filesystem change under rules directory");
                tokio::time::sleep(WATCH_DEBOUNCE).await;
                while fs_rx.try_recv().is_ok() {}

                let current = match scan_rules(&root, namespace.as_deref()).await {
                    Ok(rules) => index(rules),
                    Err(e) => {
                        warn!(error = %e, "Rescan after filesystem change failed");
                        continue;
                    }
                };

                for change in diff(&snapshot, &current) {
                    if tx.send(change).is_err() {
                        debug!("Watch receiver dropped, stopping file watch");
                        return;
                    }
                }
                snapshot = current;
            }
            debug!("File watcher channel closed");
        });

        info!(path = %self.rules_root().display(), "Watching routing declarations");
        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use certwarden_common::annotations::ANNOTATION_ENABLED;
    use tempfile::TempDir;

    fn setup_store() -> (TempDir, FileStore) {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::new(temp_dir.path()).unwrap();
        (temp_dir, store)
    }

    fn rule(ns: &str, name: &str, hosts: Vec<&str>) -> RoutingRule {
        RoutingRule::new(ns, name)
            .with_annotation(ANNOTATION_ENABLED, "true")
            .with_tls(format!("{}-tls", name), hosts)
    }

    #[test]
    fn test_store_creation() {
        let (_temp_dir, store) = setup_store();
        assert!(store.base_path().join("rules").exists());
        assert!(store.base_path().join("secrets").exists());
    }

    #[tokio::test]
    async fn test_rules_listed_in_order() {
        let (_temp_dir, store) = setup_store();
        store.write_rule(&rule("shop", "web", vec!["a.example.com"])).await.unwrap();
        store.write_rule(&rule("blog", "web", vec!["b.example.com"])).await.unwrap();
        store.write_rule(&rule("shop", "api", vec!["c.example.com"])).await.unwrap();

        let rules = store.list_rules(None).await.unwrap();
        let keys: Vec<String> = rules.iter().map(|r| r.key.to_string()).collect();
        assert_eq!(keys, vec!["blog/web", "shop/api", "shop/web"]);
        assert!(!rules[0].resource_version.is_empty());
        assert_eq!(rules[0].tls[0].secret_name, "web-tls");

        let scoped = store.list_rules(Some("shop")).await.unwrap();
        assert_eq!(scoped.len(), 2);
    }

    #[tokio::test]
    async fn test_malformed_rule_skipped() {
        let (temp_dir, store) = setup_store();
        store.write_rule(&rule("shop", "web", vec!["a.example.com"])).await.unwrap();
        std::fs::write(temp_dir.path().join("rules/shop/broken.json"), "{not json").unwrap();

        let rules = store.list_rules(None).await.unwrap();
        assert_eq!(rules.len(), 1);
    }

    #[tokio::test]
    async fn test_secret_round_trip_and_permissions() {
        let (temp_dir, store) = setup_store();
        let key = ObjectKey::new("shop", "web-tls");
        assert!(store.get_secret(&key).await.unwrap().is_none());

        let mut record = SecretRecord::new(key.clone());
        record.data.insert("ca.crt".to_string(), b"stale".to_vec());
        store.put_secret(&record).await.unwrap();

        record.set_issued(b"cert".to_vec(), b"key".to_vec());
        store.put_secret(&record).await.unwrap();

        let loaded = store.get_secret(&key).await.unwrap().unwrap();
        assert_eq!(loaded, record);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let key_path = temp_dir.path().join("secrets/shop/web-tls/tls.key");
            let mode = std::fs::metadata(key_path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[tokio::test]
    async fn test_invalid_secret_key_rejected() {
        let (_temp_dir, store) = setup_store();
        let key = ObjectKey::new("shop", "");
        assert!(matches!(
            store.get_secret(&key).await,
            Err(StoreError::InvalidKey(_))
        ));
        let key = ObjectKey::new("shop", "..");
        assert!(matches!(
            store.put_secret(&SecretRecord::new(key)).await,
            Err(StoreError::InvalidKey(_))
        ));
    }

    #[test]
    fn test_diff_events() {
        let a = rule("shop", "a", vec!["a.example.com"]);
        let b = rule("shop", "b", vec!["b.example.com"]);
        let mut b2 = b.clone();
        b2.resource_version = "2".to_string();
        let c = rule("shop", "c", vec!["c.example.com"]);

        let old = index(vec![a.clone(), b.clone()]);
        let new = index(vec![b2.clone(), c.clone()]);

        let events = diff(&old, &new);
        assert_eq!(
            events,
            vec![
                WatchEvent::Updated { old: b, new: b2 },
                WatchEvent::Added(c),
                WatchEvent::Deleted(a),
            ]
        );
        assert!(diff(&new, &new).is_empty());
    }

    #[tokio::test]
    async fn test_watch_reports_new_rule() {
        let (_temp_dir, store) = setup_store();
        let mut events = store.watch(None).await.unwrap();

        store.write_rule(&rule("shop", "web", vec!["a.example.com"])).await.unwrap();

        let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.kind(), "ADD");
        assert_eq!(event.rule().key, ObjectKey::new("shop", "web"));
    }
}
