//! JSON file persistence
//!
//! Every service keeps its state in a plain JSON file: load defaults when
//! the file is missing or unreadable, write atomically via temp file +
//! rename so a crash mid-write never corrupts the store.

use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::Result;

/// Load a JSON file, falling back to the provided default when the file is
/// missing or does not parse.
pub fn load_or_default<T, F>(path: &Path, default: F) -> T
where
    T: DeserializeOwned,
    F: FnOnce() -> T,
{
    match std::fs::read_to_string(path) {
        Ok(contents) => match serde_json::from_str(&contents) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("Failed to parse {:?}: {}, using defaults", path, e);
                default()
            }
        },
        Err(_) => default(),
    }
}

/// Write a JSON file atomically: serialize into a temp file in the target
/// directory, then rename over the destination.
pub fn save_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;

    let tmp = tempfile::NamedTempFile::new_in(dir)?;
    serde_json::to_writer_pretty(&tmp, value)?;
    tmp.persist(path)
        .map_err(|e| crate::Error::Io(e.error))?;
    Ok(())
}

/// Best-effort save: log instead of propagating, for callers where losing a
/// write must not fail the operation that caused it.
pub fn save_best_effort<T: Serialize>(path: &Path, value: &T, what: &str) {
    if let Err(e) = save_atomic(path, value) {
        tracing::error!("Failed to save {} to {:?}: {}", what, path, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn missing_file_yields_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.json");
        let value: HashMap<String, u32> = load_or_default(&path, HashMap::new);
        assert!(value.is_empty());
    }

    #[test]
    fn round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let mut value = HashMap::new();
        value.insert("blocks".to_string(), 42u32);
        save_atomic(&path, &value).unwrap();

        let loaded: HashMap<String, u32> = load_or_default(&path, HashMap::new);
        assert_eq!(loaded.get("blocks"), Some(&42));
    }

    #[test]
    fn corrupt_file_yields_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{not json").unwrap();

        let value: HashMap<String, u32> = load_or_default(&path, HashMap::new);
        assert!(value.is_empty());
    }

    #[test]
    fn save_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("deep").join("state.json");
        save_atomic(&path, &serde_json::json!({"ok": true})).unwrap();
        assert!(path.exists());
    }
}
