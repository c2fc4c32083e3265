use std::sync::Arc;

use async_trait::async_trait;

use crate::error::OidcResult;
use crate::store::{InMemoryWebStorage, StateStore, WebStorage};

pub const DEFAULT_STATE_STORE_PREFIX: &str = "oidc.";

/// [`StateStore`] over a [`WebStorage`] backend. Every key is namespaced with
/// `prefix`; `get_all_keys` only reports keys carrying it, with the prefix
/// stripped.
#[derive(Clone)]
pub struct WebStorageStateStore {
    prefix: String,
    store: Arc<dyn WebStorage>,
}

impl std::fmt::Debug for WebStorageStateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebStorageStateStore")
            .field("prefix", &self.prefix)
            .finish()
    }
}

impl Default for WebStorageStateStore {
    fn default() -> Self {
        Self::new(Arc::new(InMemoryWebStorage::new()))
    }
}

impl WebStorageStateStore {
    pub fn new(store: Arc<dyn WebStorage>) -> Self {
        Self::with_prefix(store, DEFAULT_STATE_STORE_PREFIX)
    }

    pub fn with_prefix(store: Arc<dyn WebStorage>, prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            store,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn storage_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }
}

#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
impl StateStore for WebStorageStateStore {
    async fn set(&self, key: &str, value: String) -> OidcResult<()> {
        self.store.set_item(&self.storage_key(key), &value)
    }

    async fn get(&self, key: &str) -> OidcResult<Option<String>> {
        self.store.get_item(&self.storage_key(key))
    }

    async fn remove(&self, key: &str) -> OidcResult<Option<String>> {
        self.store.take_item(&self.storage_key(key))
    }

    async fn get_all_keys(&self) -> OidcResult<Vec<String>> {
        let mut keys = Vec::new();
        for index in 0..self.store.len()? {
            if let Some(key) = self.store.key(index)? {
                if let Some(stripped) = key.strip_prefix(&self.prefix) {
                    keys.push(stripped.to_string());
                }
            }
        }
        Ok(keys)
    }
}
