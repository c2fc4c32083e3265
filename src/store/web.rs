use wasm_bindgen::JsValue;
use web_sys::{Storage, Window};

use crate::error::{storage_error, OidcError, OidcResult};
use crate::store::WebStorage;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BrowserStorageDriver {
    Local,
    Session,
}

/// [`WebStorage`] backed by `window.localStorage` or `window.sessionStorage`.
///
/// The storage object is resolved on every call so the handle itself stays
/// `Send + Sync`.
#[derive(Debug, Clone, Copy)]
pub struct BrowserStorage {
    driver: BrowserStorageDriver,
}

impl BrowserStorage {
    pub fn local() -> Self {
        Self {
            driver: BrowserStorageDriver::Local,
        }
    }

    pub fn session() -> Self {
        Self {
            driver: BrowserStorageDriver::Session,
        }
    }

    fn storage(&self) -> OidcResult<Storage> {
        let window = Self::window()?;
        match self.driver {
            BrowserStorageDriver::Local => window.local_storage().map_err(map_js_error)?,
            BrowserStorageDriver::Session => window.session_storage().map_err(map_js_error)?,
        }
        .ok_or_else(|| storage_error("Web storage API is unavailable"))
    }

    fn window() -> OidcResult<Window> {
        web_sys::window()
            .ok_or_else(|| storage_error("window object is not available in this environment"))
    }
}

impl WebStorage for BrowserStorage {
    fn get_item(&self, key: &str) -> OidcResult<Option<String>> {
        self.storage()?.get_item(key).map_err(map_js_error)
    }

    fn set_item(&self, key: &str, value: &str) -> OidcResult<()> {
        self.storage()?.set_item(key, value).map_err(map_js_error)
    }

    fn remove_item(&self, key: &str) -> OidcResult<()> {
        self.storage()?.remove_item(key).map_err(map_js_error)
    }

    fn key(&self, index: usize) -> OidcResult<Option<String>> {
        let index = u32::try_from(index).map_err(|_| storage_error("storage index out of range"))?;
        self.storage()?.key(index).map_err(map_js_error)
    }

    fn len(&self) -> OidcResult<usize> {
        Ok(self.storage()?.length().map_err(map_js_error)? as usize)
    }
}

fn map_js_error(err: JsValue) -> OidcError {
    storage_error(format!("Web storage error: {}", stringify_js_error(err)))
}

fn stringify_js_error(err: JsValue) -> String {
    if let Some(string) = err.as_string() {
        return string;
    }

    if let Ok(stringified) = js_sys::JSON::stringify(&err) {
        if let Some(text) = stringified.as_string() {
            return text;
        }
    }

    format!("{err:?}")
}
