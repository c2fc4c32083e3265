use std::collections::BTreeMap;
use std::sync::Mutex;

use crate::error::OidcResult;
use crate::store::WebStorage;

/// Process-local [`WebStorage`]; the default backend for both state and user
/// stores outside the browser.
#[derive(Debug, Default)]
pub struct InMemoryWebStorage {
    items: Mutex<BTreeMap<String, String>>,
}

impl InMemoryWebStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl WebStorage for InMemoryWebStorage {
    fn get_item(&self, key: &str) -> OidcResult<Option<String>> {
        Ok(self.items.lock().unwrap().get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> OidcResult<()> {
        self.items
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> OidcResult<()> {
        self.items.lock().unwrap().remove(key);
        Ok(())
    }

    fn take_item(&self, key: &str) -> OidcResult<Option<String>> {
        Ok(self.items.lock().unwrap().remove(key))
    }

    fn key(&self, index: usize) -> OidcResult<Option<String>> {
        Ok(self.items.lock().unwrap().keys().nth(index).cloned())
    }

    fn len(&self) -> OidcResult<usize> {
        Ok(self.items.lock().unwrap().len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn items_are_listed_by_index() {
        let storage = InMemoryWebStorage::new();
        storage.set_item("b", "2").unwrap();
        storage.set_item("a", "1").unwrap();

        assert_eq!(storage.len().unwrap(), 2);
        assert_eq!(storage.key(0).unwrap().as_deref(), Some("a"));
        assert_eq!(storage.key(2).unwrap(), None);

        storage.remove_item("a").unwrap();
        assert_eq!(storage.get_item("a").unwrap(), None);
        assert_eq!(storage.get_item("b").unwrap().as_deref(), Some("2"));
    }
}
