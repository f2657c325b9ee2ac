//! Typed, schema-checked JSON file store.

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::io::ErrorKind;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::StorageError;

/// Document types that carry a schema version and can self-validate.
pub trait Versioned {
    /// Schema version this build writes and accepts.
    const SCHEMA_VERSION: u32;

    /// Version recorded in the loaded document.
    fn schema_version(&self) -> u32;

    /// Semantic checks beyond what deserialization enforces.
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

/// JsonFileStore persists one document of type `T` at a fixed path.
#[derive(Debug, Clone)]
pub struct JsonFileStore<T> {
    path: PathBuf,
    _doc: PhantomData<fn() -> T>,
}

impl<T> JsonFileStore<T>
where
    T: Serialize + DeserializeOwned + Versioned,
{
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _doc: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the document. A missing file is `Ok(None)`.
    pub fn load(&self) -> Result<Option<T>, StorageError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let doc: T = serde_json::from_str(&content)?;

        if doc.schema_version() != T::SCHEMA_VERSION {
            return Err(StorageError::InvalidData(format!(
                "schema version {} (expected {})",
                doc.schema_version(),
                T::SCHEMA_VERSION
            )));
        }
        doc.validate().map_err(StorageError::InvalidData)?;

        Ok(Some(doc))
    }

    /// Reads the document, treating absence and corruption alike as `None`.
    pub fn load_or_empty(&self) -> Option<T> {
        match self.load() {
            Ok(doc) => doc,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Discarding unreadable state file");
                None
            }
        }
    }

    /// Writes the document via a temporary file and rename.
    pub fn save(&self, doc: &T) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let tmp = self.path.with_extension("json.tmp");
        let content = serde_json::to_string_pretty(doc)?;
        fs::write(&tmp, content)?;
        fs::rename(&tmp, &self.path)?;

        debug!(path = %self.path.display(), "State file written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Doc {
        version: u32,
        items: Vec<u32>,
    }

    impl Versioned for Doc {
        const SCHEMA_VERSION: u32 = 2;

        fn schema_version(&self) -> u32 {
            self.version
        }

        fn validate(&self) -> Result<(), String> {
            if self.items.iter().any(|i| *i == 0) {
                return Err("zero item".to_string());
            }
            Ok(())
        }
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::<Doc>::new(dir.path().join("nested").join("doc.json"));
        let doc = Doc {
            version: 2,
            items: vec![1, 2, 3],
        };

        store.save(&doc).unwrap();

        assert_eq!(store.load().unwrap(), Some(doc));
    }

    #[test]
    fn test_missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::<Doc>::new(dir.path().join("doc.json"));
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_corrupt_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.json");
        fs::write(&path, "{ not json").unwrap();

        let store = JsonFileStore::<Doc>::new(&path);

        assert!(store.load().is_err());
        assert!(store.load_or_empty().is_none());
    }

    #[test]
    fn test_wrong_version_and_invalid_content_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.json");
        let store = JsonFileStore::<Doc>::new(&path);

        fs::write(&path, r#"{"version": 1, "items": [1]}"#).unwrap();
        assert!(matches!(store.load(), Err(StorageError::InvalidData(_))));

        fs::write(&path, r#"{"version": 2, "items": [0]}"#).unwrap();
        assert!(store.load_or_empty().is_none());
    }
}
