//! Crash-safe JSON document store.
//!
//! Each key maps to `<root>/<key>.json`.  Documents are small and rewritten
//! wholesale on every mutation: the new content goes to `<key>.json.tmp`,
//! is fsynced, then renamed over the live file, so a crash mid-write leaves
//! either the old or the new document and never a truncated one.

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use pb_domain::error::{Error, Result};
use pb_domain::trace::TraceEvent;

pub struct JsonStore {
    root: PathBuf,
}

impl JsonStore {
    /// Open (creating if needed) the store rooted at `root`.
    pub fn open(root: &Path) -> Result<Self> {
        std::fs::create_dir_all(root).map_err(|e| Error::storage(root, e))?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}.json"))
    }

    /// Load a document, materializing `default` on disk first when the key
    /// has never been written.  Callers never observe "absent".
    pub fn load_or_init<T, F>(&self, key: &str, default: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> T,
    {
        let path = self.path_for(key);
        match std::fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw).map_err(|e| Error::storage(&path, e)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let doc = default();
                self.save(key, &doc)?;
                tracing::info!(path = %path.display(), "initialized empty document");
                Ok(doc)
            }
            Err(e) => Err(Error::storage(&path, e)),
        }
    }

    /// Replace the whole document for `key`.
    pub fn save<T: Serialize + ?Sized>(&self, key: &str, doc: &T) -> Result<()> {
        let path = self.path_for(key);
        let json = serde_json::to_string_pretty(doc).map_err(|e| Error::storage(&path, e))?;
        let tmp = path.with_extension("json.tmp");

        if let Err(e) = write_synced(&tmp, json.as_bytes()) {
            let _ = std::fs::remove_file(&tmp);
            return Err(Error::storage(&tmp, e));
        }
        if let Err(e) = std::fs::rename(&tmp, &path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(Error::storage(&path, e));
        }
        sync_dir(&self.root);

        TraceEvent::DocumentSaved {
            key: key.to_owned(),
            bytes: json.len(),
        }
        .emit();
        Ok(())
    }
}

fn write_synced(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut f = std::fs::File::create(path)?;
    f.write_all(bytes)?;
    f.sync_all()
}

/// Persist the rename itself.  Best-effort: not every platform lets a
/// directory be opened for syncing.
fn sync_dir(dir: &Path) {
    #[cfg(unix)]
    if let Ok(d) = std::fs::File::open(dir) {
        let _ = d.sync_all();
    }
    #[cfg(not(unix))]
    let _ = dir;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn missing_document_is_materialized() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::open(dir.path()).unwrap();

        let doc: Vec<i64> = store.load_or_init("premium", Vec::new).unwrap();
        assert!(doc.is_empty());

        let raw = std::fs::read_to_string(store.path_for("premium")).unwrap();
        assert_eq!(raw.trim(), "[]");
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::open(dir.path()).unwrap();

        let mut doc = BTreeMap::new();
        doc.insert("2002".to_string(), "15551234567".to_string());
        store.save("user_numbers", &doc).unwrap();

        let loaded: BTreeMap<String, String> =
            store.load_or_init("user_numbers", BTreeMap::new).unwrap();
        assert_eq!(loaded, doc);
    }

    #[test]
    fn existing_document_wins_over_default() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::open(dir.path()).unwrap();
        store.save("premium", &vec![1, 2, 3]).unwrap();

        let doc: Vec<i64> = store.load_or_init("premium", || vec![99]).unwrap();
        assert_eq!(doc, vec![1, 2, 3]);
    }

    #[test]
    fn save_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::open(dir.path()).unwrap();
        store.save("resellers", &vec![1001]).unwrap();

        assert!(store.path_for("resellers").exists());
        assert!(!store.path_for("resellers").with_extension("json.tmp").exists());
    }

    #[test]
    fn corrupt_document_is_a_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::open(dir.path()).unwrap();
        std::fs::write(store.path_for("premium"), "[1, 2").unwrap();

        let err = store.load_or_init::<Vec<i64>, _>("premium", Vec::new).unwrap_err();
        assert!(matches!(err, Error::Storage { .. }));
    }

    #[test]
    fn stale_temp_file_does_not_affect_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::open(dir.path()).unwrap();
        store.save("premium", &vec![7]).unwrap();
        // Simulates a crash after the temp write but before the rename.
        std::fs::write(store.path_for("premium").with_extension("json.tmp"), "[8, ").unwrap();

        let doc: Vec<i64> = store.load_or_init("premium", Vec::new).unwrap();
        assert_eq!(doc, vec![7]);
    }
}
