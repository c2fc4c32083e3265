//! Persistence for per-request correlation state and signed-in users.
//!
//! [`StateStore`] is the async contract the client and the user manager talk
//! to. [`WebStorageStateStore`] adapts any synchronous [`WebStorage`] backend
//! (in-memory, file, or browser storage on wasm) to that contract.

#[cfg(not(all(feature = "wasm-web", target_arch = "wasm32")))]
mod file;
mod memory;
#[cfg(all(feature = "wasm-web", target_arch = "wasm32"))]
mod web;
mod web_storage;

use async_trait::async_trait;

use crate::error::OidcResult;

#[cfg(not(all(feature = "wasm-web", target_arch = "wasm32")))]
pub use file::FileWebStorage;
pub use memory::InMemoryWebStorage;
#[cfg(all(feature = "wasm-web", target_arch = "wasm32"))]
pub use web::{BrowserStorage, BrowserStorageDriver};
pub use web_storage::{WebStorageStateStore, DEFAULT_STATE_STORE_PREFIX};

/// Async key/value store for serialized state entries.
///
/// `remove` hands back the removed value so that only one caller can consume
/// a given entry.
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
pub trait StateStore: Send + Sync {
    async fn set(&self, key: &str, value: String) -> OidcResult<()>;
    async fn get(&self, key: &str) -> OidcResult<Option<String>>;
    async fn remove(&self, key: &str) -> OidcResult<Option<String>>;
    async fn get_all_keys(&self) -> OidcResult<Vec<String>>;
}

/// Synchronous storage backend modelled on the DOM `Storage` interface.
pub trait WebStorage: Send + Sync {
    fn get_item(&self, key: &str) -> OidcResult<Option<String>>;
    fn set_item(&self, key: &str, value: &str) -> OidcResult<()>;
    fn remove_item(&self, key: &str) -> OidcResult<()>;
    /// Removes `key` and returns its value in one step. Backends shared
    /// across threads must override this so that only one caller observes
    /// the value.
    fn take_item(&self, key: &str) -> OidcResult<Option<String>> {
        let existing = self.get_item(key)?;
        if existing.is_some() {
            self.remove_item(key)?;
        }
        Ok(existing)
    }
    /// Key at `index` in storage order, or `None` past the end.
    fn key(&self, index: usize) -> OidcResult<Option<String>>;
    fn len(&self) -> OidcResult<usize>;

    fn is_empty(&self) -> OidcResult<bool> {
        Ok(self.len()? == 0)
    }
}
