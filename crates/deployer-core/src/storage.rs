//! Persisted signer session state.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::StorageError;

const DEFAULT_DIR_NAME: &str = "deployer-sessions";

/// Minimal key/value store owned by one signing mechanism.
pub trait Storage: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// One JSON object per `(network, mechanism)` file.
///
/// Every operation reads the whole file and writes it back. There is no
/// cross-process locking, so concurrent invocations against the same file
/// may lose writes.
#[derive(Debug, Clone)]
pub struct FsStorage {
    path: PathBuf,
}

impl FsStorage {
    /// Storage under the system temp directory.
    #[must_use]
    pub fn new(network: &str, mechanism: &str) -> Self {
        Self::new_with_base_dir(std::env::temp_dir().join(DEFAULT_DIR_NAME), network, mechanism)
    }

    /// Create storage with a custom base directory (for testing)
    #[must_use]
    pub fn new_with_base_dir(base_dir: impl AsRef<Path>, network: &str, mechanism: &str) -> Self {
        Self {
            path: base_dir
                .as_ref()
                .join(format!("{network}-{mechanism}.json")),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<BTreeMap<String, String>, StorageError> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let contents = fs::read_to_string(&self.path)?;
        if contents.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        Ok(serde_json::from_str(&contents)?)
    }

    fn save(&self, entries: &BTreeMap<String, String>) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_string_pretty(entries)?)?;
        Ok(())
    }
}

impl Storage for FsStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.load()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut entries = self.load()?;
        entries.insert(key.to_string(), value.to_string());
        self.save(&entries)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut entries = self.load()?;
        if entries.remove(key).is_some() {
            self.save(&entries)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_survive_a_new_instance() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = FsStorage::new_with_base_dir(dir.path(), "testnet", "bridge");
        storage.set("session", "{\"id\":1}").expect("set");

        let reopened = FsStorage::new_with_base_dir(dir.path(), "testnet", "bridge");
        assert_eq!(
            reopened.get("session").expect("get").as_deref(),
            Some("{\"id\":1}")
        );
        assert!(reopened.path().ends_with("testnet-bridge.json"));
    }

    #[test]
    fn namespaces_do_not_overlap() {
        let dir = tempfile::tempdir().expect("tempdir");
        FsStorage::new_with_base_dir(dir.path(), "mainnet", "bridge")
            .set("session", "main")
            .expect("set");

        let other = FsStorage::new_with_base_dir(dir.path(), "testnet", "bridge");
        assert_eq!(other.get("session").expect("get"), None);
    }

    #[test]
    fn remove_drops_only_the_key() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = FsStorage::new_with_base_dir(dir.path(), "custom", "bridge");
        storage.set("session", "a").expect("set");
        storage.set("other", "b").expect("set");

        storage.remove("session").expect("remove");
        storage.remove("missing").expect("remove missing");

        assert_eq!(storage.get("session").expect("get"), None);
        assert_eq!(storage.get("other").expect("get").as_deref(), Some("b"));
    }

    #[test]
    fn corrupt_file_is_reported() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = FsStorage::new_with_base_dir(dir.path(), "testnet", "bridge");
        fs::write(storage.path(), "not json").expect("write");

        assert!(matches!(storage.get("session"), Err(StorageError::Json(_))));
    }
}
