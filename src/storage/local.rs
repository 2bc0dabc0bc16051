//! Local JSON key-value store
//!
//! One JSON blob per key. Reads fall back instead of failing and writes are
//! best effort: a missing directory, a full disk or a corrupted file never
//! surfaces as an error to callers.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

#[derive(Clone, Debug)]
enum Backing {
    /// `<dir>/<key>.json` files
    Disk(PathBuf),
    /// Process memory, lost on restart
    Memory(Arc<DashMap<String, String>>),
    /// No storage context at all
    Unavailable,
}

/// Handle to the local store; cheap to clone
#[derive(Clone, Debug)]
pub struct LocalStore {
    backing: Backing,
}

impl LocalStore {
    /// Store blobs as files under `dir`, creating it when needed
    pub fn on_disk(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        if let Err(e) = fs::create_dir_all(&dir) {
            warn!(dir = %dir.display(), error = %e, "Local store directory unavailable");
        }
        Self {
            backing: Backing::Disk(dir),
        }
    }

    pub fn in_memory() -> Self {
        Self {
            backing: Backing::Memory(Arc::new(DashMap::new())),
        }
    }

    pub fn unavailable() -> Self {
        Self {
            backing: Backing::Unavailable,
        }
    }

    /// Disk store when a directory is configured, otherwise unavailable
    pub fn from_dir(dir: Option<&Path>) -> Self {
        match dir {
            Some(dir) => Self::on_disk(dir),
            None => Self::unavailable(),
        }
    }

    pub fn is_available(&self) -> bool {
        !matches!(self.backing, Backing::Unavailable)
    }

    /// Parsed value under `key`, or `fallback` when absent, unavailable or unparsable
    pub fn get_json<T: DeserializeOwned>(&self, key: &str, fallback: T) -> T {
        let raw = match self.read_raw(key) {
            Some(raw) if !raw.trim().is_empty() => raw,
            _ => return fallback,
        };

        match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(e) => {
                warn!(key, error = %e, "Discarding unreadable local value");
                fallback
            }
        }
    }

    /// Serialize and store `value`; failures are logged and dropped
    pub fn set_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) {
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(key, error = %e, "Failed to serialize local value");
                return;
            }
        };

        match &self.backing {
            Backing::Disk(dir) => {
                let path = blob_path(dir, key);
                let tmp = path.with_extension("json.tmp");
                let result = fs::write(&tmp, raw.as_bytes()).and_then(|_| fs::rename(&tmp, &path));
                if let Err(e) = result {
                    warn!(key, path = %path.display(), error = %e, "Failed to write local value");
                }
            }
            Backing::Memory(map) => {
                map.insert(key.to_string(), raw);
            }
            Backing::Unavailable => {
                debug!(key, "Local storage unavailable, write skipped");
            }
        }
    }

    fn read_raw(&self, key: &str) -> Option<String> {
        match &self.backing {
            Backing::Disk(dir) => match fs::read_to_string(blob_path(dir, key)) {
                Ok(raw) => Some(raw),
                Err(e) => {
                    if e.kind() != std::io::ErrorKind::NotFound {
                        warn!(key, error = %e, "Failed to read local value");
                    }
                    None
                }
            },
            Backing::Memory(map) => map.get(key).map(|entry| entry.value().clone()),
            Backing::Unavailable => None,
        }
    }
}

/// Keys are fixed identifiers; anything outside `[A-Za-z0-9_-]` is replaced
fn blob_path(dir: &Path, key: &str) -> PathBuf {
    let safe: String = key
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect();
    dir.join(format!("{}.json", safe))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use tempfile::TempDir;

    #[test]
    fn test_round_trip_on_disk() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::on_disk(dir.path());
        let value = json!([{"id": 1, "nombre": "Guantes", "cantidad": 20}]);

        store.set_json("insumos_medicos_v1", &value);

        let back: Value = store.get_json("insumos_medicos_v1", Value::Null);
        assert_eq!(back, value);
        assert!(dir.path().join("insumos_medicos_v1.json").exists());
    }

    #[test]
    fn test_round_trip_in_memory() {
        let store = LocalStore::in_memory();
        store.set_json("cuentas", &vec!["a", "b"]);

        let back: Vec<String> = store.get_json("cuentas", Vec::new());
        assert_eq!(back, vec!["a", "b"]);
    }

    #[test]
    fn test_missing_key_returns_fallback_without_writing() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::on_disk(dir.path());

        let first: Vec<i32> = store.get_json("consultas_v1", vec![7]);
        let second: Vec<i32> = store.get_json("consultas_v1", vec![7]);

        assert_eq!(first, vec![7]);
        assert_eq!(second, vec![7]);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_unparsable_blob_returns_fallback() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("consultas_v1.json"), "{not json").unwrap();
        let store = LocalStore::on_disk(dir.path());

        let visits: Vec<Value> = store.get_json("consultas_v1", Vec::new());
        assert!(visits.is_empty());
    }

    #[test]
    fn test_unavailable_store_never_fails() {
        let store = LocalStore::unavailable();
        store.set_json("cuentas", &json!({"x": 1}));

        let back: Value = store.get_json("cuentas", json!("fallback"));
        assert_eq!(back, json!("fallback"));
        assert!(!store.is_available());
    }

    #[test]
    fn test_failed_write_is_swallowed() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::on_disk(dir.path().join("gone"));
        fs::remove_dir_all(dir.path().join("gone")).unwrap();

        store.set_json("cuentas", &json!([1, 2]));

        let back: Vec<i32> = store.get_json("cuentas", Vec::new());
        assert!(back.is_empty());
    }

    #[test]
    fn test_keys_are_sanitized_into_file_names() {
        let path = blob_path(Path::new("/tmp/x"), "../etc/passwd");
        assert_eq!(path, Path::new("/tmp/x/___etc_passwd.json"));
    }
}
