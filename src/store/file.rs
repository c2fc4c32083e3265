use std::collections::BTreeMap;
use std::fs::{remove_file, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde_json::{from_str as deserialize_items, to_string as serialize_items};

use crate::error::{storage_error, OidcResult};
use crate::store::WebStorage;

/// [`WebStorage`] persisted as a single JSON object on disk. Every write
/// rewrites the whole file; the file is deleted once the last item goes.
#[derive(Clone)]
pub struct FileWebStorage {
    path: Arc<PathBuf>,
    lock: Arc<Mutex<()>>,
}

impl std::fmt::Debug for FileWebStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileWebStorage")
            .field("path", &self.path)
            .finish()
    }
}

impl FileWebStorage {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: Arc::new(path.as_ref().to_path_buf()),
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_items(&self) -> OidcResult<BTreeMap<String, String>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }

        let mut file = File::open(&*self.path)
            .map_err(|err| storage_error(format!("Failed to open storage file: {err}")))?;
        let mut buffer = String::new();
        file.read_to_string(&mut buffer)
            .map_err(|err| storage_error(format!("Failed to read storage file: {err}")))?;

        if buffer.trim().is_empty() {
            return Ok(BTreeMap::new());
        }

        deserialize_items(&buffer)
            .map_err(|err| storage_error(format!("Failed to parse storage file: {err}")))
    }

    fn write_items(&self, items: &BTreeMap<String, String>) -> OidcResult<()> {
        if items.is_empty() {
            if self.path.exists() {
                remove_file(&*self.path)
                    .map_err(|err| storage_error(format!("Failed to remove storage file: {err}")))?;
            }
            return Ok(());
        }

        let serialized = serialize_items(items)?;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|err| storage_error(format!("Failed to create storage directory: {err}")))?;
        }
        let mut file = File::create(&*self.path)
            .map_err(|err| storage_error(format!("Failed to create storage file: {err}")))?;
        file.write_all(serialized.as_bytes())
            .map_err(|err| storage_error(format!("Failed to write storage file: {err}")))
    }
}

impl WebStorage for FileWebStorage {
    fn get_item(&self, key: &str) -> OidcResult<Option<String>> {
        let _guard = self.lock.lock().unwrap();
        Ok(self.read_items()?.remove(key))
    }

    fn set_item(&self, key: &str, value: &str) -> OidcResult<()> {
        let _guard = self.lock.lock().unwrap();
        let mut items = self.read_items()?;
        items.insert(key.to_string(), value.to_string());
        self.write_items(&items)
    }

    fn remove_item(&self, key: &str) -> OidcResult<()> {
        let _guard = self.lock.lock().unwrap();
        let mut items = self.read_items()?;
        if items.remove(key).is_some() {
            self.write_items(&items)?;
        }
        Ok(())
    }

    fn take_item(&self, key: &str) -> OidcResult<Option<String>> {
        let _guard = self.lock.lock().unwrap();
        let mut items = self.read_items()?;
        let existing = items.remove(key);
        if existing.is_some() {
            self.write_items(&items)?;
        }
        Ok(existing)
    }

    fn key(&self, index: usize) -> OidcResult<Option<String>> {
        let _guard = self.lock.lock().unwrap();
        Ok(self.read_items()?.into_keys().nth(index))
    }

    fn len(&self) -> OidcResult<usize> {
        let _guard = self.lock.lock().unwrap();
        Ok(self.read_items()?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!(
            "oidc-client-storage-test-{}-{}.json",
            name,
            std::process::id()
        ));
        path
    }

    #[test]
    fn items_survive_a_new_instance() {
        let path = temp_path("reopen");
        let storage = FileWebStorage::new(&path);
        storage.set_item("user:a", "{\"x\":1}").unwrap();

        let reopened = FileWebStorage::new(&path);
        assert_eq!(
            reopened.get_item("user:a").unwrap().as_deref(),
            Some("{\"x\":1}")
        );
        assert_eq!(reopened.key(0).unwrap().as_deref(), Some("user:a"));

        reopened.remove_item("user:a").unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn corrupt_file_is_a_storage_error() {
        let path = temp_path("corrupt");
        std::fs::write(&path, "not json").unwrap();
        let storage = FileWebStorage::new(&path);

        let err = storage.len().unwrap_err();
        assert!(matches!(err, crate::error::OidcError::Storage { .. }));

        let _ = remove_file(path);
    }
}
