//! Atomic JSON persistence.

use crate::StoreError;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::path::Path;
use tracing::debug;
use uuid::Uuid;

/// Write `data` to `path` atomically: temp file in the same directory, then
/// rename. Readers either see the old document or the new one, never a
/// partial write.
pub fn atomic_write(path: &Path, data: &[u8]) -> Result<(), StoreError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let tmp = dir.join(format!(".{}.tmp", Uuid::new_v4()));

    let io_err = |source| StoreError::Io {
        file: path.to_path_buf(),
        source,
    };

    fs::write(&tmp, data).map_err(io_err)?;
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(io_err(e));
    }
    debug!("Atomically wrote {}", path.display());
    Ok(())
}

/// Serialize and atomically persist a collection document.
pub fn save_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let data = serde_json::to_vec_pretty(value).map_err(|e| StoreError::Corrupted {
        file: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    atomic_write(path, &data)
}

/// Load a collection document. A missing file yields `None`; an unreadable
/// or malformed file is a corruption error, never silently dropped records.
pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    if !path.exists() {
        return Ok(None);
    }
    let data = fs::read(path).map_err(|source| StoreError::Io {
        file: path.to_path_buf(),
        source,
    })?;
    let value = serde_json::from_slice(&data).map_err(|e| StoreError::Corrupted {
        file: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    Ok(Some(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Doc {
        items: Vec<String>,
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.json");
        let doc = Doc {
            items: vec!["a".into(), "b".into()],
        };

        save_json(&path, &doc).unwrap();
        let loaded: Doc = load_json(&path).unwrap().unwrap();
        assert_eq!(loaded, doc);
    }

    #[test]
    fn test_missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let loaded: Option<Doc> = load_json(&dir.path().join("absent.json")).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn test_corrupt_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.json");
        fs::write(&path, b"{ not json").unwrap();

        let result: Result<Option<Doc>, _> = load_json(&path);
        assert!(matches!(result, Err(StoreError::Corrupted { .. })));
    }

    #[test]
    fn test_no_temp_files_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.json");
        save_json(&path, &Doc { items: vec![] }).unwrap();

        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec!["doc.json"]);
    }
}
