//! # Reconflux Store
//!
//! Crash-safe JSON document store for reconflux results and key-value state.
//!
//! ## Overview
//!
//! The store keeps one structured document in memory and mirrors every change
//! to a primary file on disk. Writes go through a backup-guarded rewrite so a
//! reader never observes a half-written primary:
//!
//! 1. copy the primary to the backup path
//! 2. rewrite and sync the primary
//! 3. delete the backup, or restore it if step 2 failed
//!
//! On open, a missing primary is replaced by its backup, a corrupt primary is
//! replaced by its backup (once), and if nothing usable remains the default
//! schema is written.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use reconflux_store::{JsonStore, StoreConfig};
//! use serde_json::json;
//!
//! fn main() -> Result<(), reconflux_store::StoreError> {
//!     let store = JsonStore::open(StoreConfig::default())?;
//!     store.set("settings", json!({ "theme": "dark" }))?;
//!     store.update("settings", json!({ "lang": "en" }))?;
//!     store.append_event("recon", "whois", json!({ "target": "example.com" }), json!({}))?;
//!     Ok(())
//! }
//! ```
//!
//! ## Document layout
//!
//! | Category | Operations |
//! |----------|------------|
//! | `vulnerability` | `xss`, `csrf`, `clickjacking`, `sql-injection`, `ssl-tls` |
//! | `network` | `http-enum`, `ssl-enum`, `dns-brute`, `nmap-scan`, ... |
//! | `encryption` | `generate-key-pair-ecdsa`, `sign-ecdsa`, ... |
//! | `recon` | `whois`, `shodan`, `censys`, ..., `multi-source` |
//!
//! The store assumes it is the only process writing its files.

pub mod atomic;
mod error;
pub mod schema;

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

pub use error::StoreError;
pub use schema::default_document;

/// Store document: category name to category contents.
pub type Document = Map<String, Value>;

/// File locations of the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Primary document file.
    pub primary_path: PathBuf,
    /// Sibling backup file, present only while a write is in progress.
    pub backup_path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        let mut config = Self::in_dir(resolve_reconflux_home());
        if let Some(path) = env::var_os("RECONFLUX_DB_PATH").filter(|path| !path.is_empty()) {
            config.primary_path = PathBuf::from(path);
        }
        if let Some(path) = env::var_os("RECONFLUX_DB_BACKUP_PATH").filter(|path| !path.is_empty())
        {
            config.backup_path = PathBuf::from(path);
        }
        config
    }
}

impl StoreConfig {
    /// `db.json` and `db.backup.json` inside `dir`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            primary_path: dir.join("db.json"),
            backup_path: dir.join("db.backup.json"),
        }
    }
}

/// One recorded operation result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreEvent {
    pub id: String,
    pub timestamp: String,
    #[serde(default)]
    pub params: Value,
    #[serde(default)]
    pub result: Value,
}

impl StoreEvent {
    pub fn new(params: Value, result: Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: now_rfc3339(),
            params,
            result,
        }
    }
}

/// JSON document store with backup-guarded writes.
///
/// All reads and writes are serialized under one lock. Share it across
/// components with an `Arc`.
#[derive(Debug)]
pub struct JsonStore {
    config: StoreConfig,
    document: Mutex<Document>,
}

impl JsonStore {
    /// Open the store at the default location.
    pub fn open_default() -> Result<Self, StoreError> {
        Self::open(StoreConfig::default())
    }

    /// Open the store, recovering or bootstrapping the document as needed.
    pub fn open(config: StoreConfig) -> Result<Self, StoreError> {
        if let Some(parent) = config.primary_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let document = load_document(&config, false)?;
        Ok(Self {
            config,
            document: Mutex::new(document),
        })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Value stored under a top-level key.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.lock().get(key).cloned()
    }

    /// Value stored under a top-level key, or `default` when absent.
    pub fn get_or(&self, key: &str, default: Value) -> Value {
        self.get(key).unwrap_or(default)
    }

    /// Replace a top-level key and persist.
    pub fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        let mut document = self.lock();
        let mut next = document.clone();
        next.insert(key.to_owned(), value);
        self.commit(&mut document, next)
    }

    /// Shallow-merge `partial` into the object stored at `key` and persist.
    ///
    /// When either side is not an object the stored value is replaced.
    pub fn update(&self, key: &str, partial: Value) -> Result<(), StoreError> {
        let mut document = self.lock();
        let mut next = document.clone();
        let Some(current) = next.get_mut(key) else {
            return Err(StoreError::KeyNotFound(key.to_owned()));
        };

        match (current, partial) {
            (Value::Object(existing), Value::Object(incoming)) => {
                for (field, value) in incoming {
                    existing.insert(field, value);
                }
            }
            (slot, partial) => *slot = partial,
        }
        self.commit(&mut document, next)
    }

    /// Flush the in-memory document to disk.
    pub fn save(&self) -> Result<(), StoreError> {
        let document = self.lock();
        atomic::write_json(
            &self.config.primary_path,
            &self.config.backup_path,
            &*document,
        )
    }

    /// Append an event to `category.operation`, creating missing containers.
    pub fn append_event(
        &self,
        category: &str,
        operation: &str,
        params: Value,
        result: Value,
    ) -> Result<StoreEvent, StoreError> {
        let event = StoreEvent::new(params, result);
        let mut document = self.lock();
        let mut next = document.clone();

        let operations = next
            .entry(category.to_owned())
            .or_insert_with(|| Value::Object(Map::new()))
            .as_object_mut()
            .ok_or_else(|| StoreError::UnexpectedShape {
                path: category.to_owned(),
                expected: "object",
            })?;
        let events = operations
            .entry(operation.to_owned())
            .or_insert_with(|| Value::Array(Vec::new()))
            .as_array_mut()
            .ok_or_else(|| StoreError::UnexpectedShape {
                path: format!("{category}.{operation}"),
                expected: "list",
            })?;
        events.push(serde_json::to_value(&event)?);

        self.commit(&mut document, next)?;
        debug!(category, operation, id = %event.id, "store event recorded");
        Ok(event)
    }

    /// Events recorded under `category.operation`, oldest first.
    ///
    /// Entries that do not have the event shape are skipped.
    pub fn events(&self, category: &str, operation: &str) -> Vec<StoreEvent> {
        let document = self.lock();
        document
            .get(category)
            .and_then(|operations| operations.get(operation))
            .and_then(Value::as_array)
            .map(|events| {
                events
                    .iter()
                    .filter_map(|event| serde_json::from_value(event.clone()).ok())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Copy of the whole document.
    pub fn snapshot(&self) -> Document {
        self.lock().clone()
    }

    /// Persist `next` and only then make it the in-memory state.
    fn commit(&self, current: &mut MutexGuard<'_, Document>, next: Document) -> Result<(), StoreError> {
        atomic::write_json(&self.config.primary_path, &self.config.backup_path, &next)?;
        **current = next;
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Document> {
        self.document
            .lock()
            .expect("store document lock is not poisoned")
    }
}

enum ReadFailure {
    Io(std::io::Error),
    Corrupt(String),
}

fn load_document(config: &StoreConfig, recovered: bool) -> Result<Document, StoreError> {
    let primary = config.primary_path.as_path();
    let backup = config.backup_path.as_path();

    if !primary.exists() {
        if backup.exists() {
            warn!(path = %primary.display(), "main store file not found, recovering from backup");
            fs::rename(backup, primary)?;
        } else {
            info!(path = %primary.display(), "no store file found, creating default schema");
            return bootstrap(config);
        }
    }

    match read_document(primary) {
        Ok(document) => Ok(document),
        Err(ReadFailure::Io(error)) => Err(StoreError::Io(error)),
        Err(ReadFailure::Corrupt(reason)) => {
            error!(path = %primary.display(), reason = %reason, "store corruption detected");
            if !recovered && backup.exists() {
                info!(path = %backup.display(), "attempting recovery from backup");
                fs::rename(backup, primary)?;
                return load_document(config, true);
            }
            error!(
                path = %primary.display(),
                "no usable backup available, store contents lost; creating default schema"
            );
            bootstrap(config)
        }
    }
}

fn read_document(path: &Path) -> Result<Document, ReadFailure> {
    let bytes = fs::read(path).map_err(ReadFailure::Io)?;
    match serde_json::from_slice::<Value>(&bytes) {
        Ok(Value::Object(document)) => Ok(document),
        Ok(_) => Err(ReadFailure::Corrupt(String::from(
            "top-level value is not an object",
        ))),
        Err(error) => Err(ReadFailure::Corrupt(error.to_string())),
    }
}

fn bootstrap(config: &StoreConfig) -> Result<Document, StoreError> {
    let document = schema::default_document();
    atomic::write_json(&config.primary_path, &config.backup_path, &document)?;
    Ok(document)
}

fn resolve_reconflux_home() -> PathBuf {
    if let Some(path) = env::var_os("RECONFLUX_HOME") {
        let path = PathBuf::from(path);
        if !path.as_os_str().is_empty() {
            return path;
        }
    }

    if let Some(home) = env::var_os("HOME") {
        return PathBuf::from(home).join(".reconflux");
    }

    PathBuf::from(".reconflux")
}

/// Current UTC time as RFC 3339.
pub fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| String::from("1970-01-01T00:00:00Z"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn update_merges_objects_and_replaces_scalars() {
        let temp = tempdir().expect("tempdir");
        let store = JsonStore::open(StoreConfig::in_dir(temp.path())).expect("open");

        store.set("settings", json!({ "a": 1, "b": 2 })).expect("set");
        store.update("settings", json!({ "b": 3, "c": 4 })).expect("update");
        assert_eq!(store.get("settings"), Some(json!({ "a": 1, "b": 3, "c": 4 })));

        store.set("counter", json!(1)).expect("set");
        store.update("counter", json!({ "n": 2 })).expect("update");
        assert_eq!(store.get("counter"), Some(json!({ "n": 2 })));
    }

    #[test]
    fn update_of_missing_key_fails_without_writing() {
        let temp = tempdir().expect("tempdir");
        let store = JsonStore::open(StoreConfig::in_dir(temp.path())).expect("open");

        let error = store
            .update("missing", json!({ "x": 1 }))
            .expect_err("missing key");
        assert!(matches!(error, StoreError::KeyNotFound(key) if key == "missing"));
        assert!(store.get("missing").is_none());
    }

    #[test]
    fn get_or_returns_default_for_absent_key() {
        let temp = tempdir().expect("tempdir");
        let store = JsonStore::open(StoreConfig::in_dir(temp.path())).expect("open");

        assert_eq!(store.get_or("nothing", json!([])), json!([]));
    }

    #[test]
    fn append_event_creates_missing_containers() {
        let temp = tempdir().expect("tempdir");
        let store = JsonStore::open(StoreConfig::in_dir(temp.path())).expect("open");

        let event = store
            .append_event("custom", "probe", json!({ "target": "a" }), json!("ok"))
            .expect("append");

        let events = store.events("custom", "probe");
        assert_eq!(events, vec![event]);
    }

    #[test]
    fn append_event_rejects_non_list_operation() {
        let temp = tempdir().expect("tempdir");
        let store = JsonStore::open(StoreConfig::in_dir(temp.path())).expect("open");
        store.set("custom", json!({ "probe": 5 })).expect("set");

        let error = store
            .append_event("custom", "probe", json!({}), json!({}))
            .expect_err("not a list");
        assert!(matches!(error, StoreError::UnexpectedShape { expected: "list", .. }));
        assert_eq!(store.get("custom"), Some(json!({ "probe": 5 })));
    }

    #[test]
    fn corrupt_primary_without_backup_resets_to_default_schema() {
        let temp = tempdir().expect("tempdir");
        let config = StoreConfig::in_dir(temp.path());
        fs::write(&config.primary_path, b"{ not json").expect("seed");

        let store = JsonStore::open(config.clone()).expect("open");

        assert_eq!(store.snapshot(), default_document());
        let on_disk: Value =
            serde_json::from_slice(&fs::read(&config.primary_path).expect("read")).expect("json");
        assert_eq!(on_disk, Value::Object(default_document()));
    }

    #[test]
    fn non_object_document_counts_as_corruption() {
        let temp = tempdir().expect("tempdir");
        let config = StoreConfig::in_dir(temp.path());
        fs::write(&config.primary_path, b"[1, 2, 3]").expect("seed");

        let store = JsonStore::open(config).expect("open");

        assert_eq!(store.snapshot(), default_document());
    }
}
