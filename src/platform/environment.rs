//! Client settings sourced from process environment variables.

use std::env;
use std::fs;
#[cfg(not(target_arch = "wasm32"))]
use std::path::Path;

use serde_json::{Map, Value};

/// `OIDC_CONFIG` may hold inline JSON, a path to a JSON file, or
/// `key=value,key=value` pairs.
pub const CONFIG_VAR: &str = "OIDC_CONFIG";

/// Single-setting variables and the settings key each one overrides.
pub const SETTING_VARS: &[(&str, &str)] = &[
    ("OIDC_AUTHORITY", "authority"),
    ("OIDC_CLIENT_ID", "client_id"),
    ("OIDC_REDIRECT_URI", "redirect_uri"),
    ("OIDC_SCOPE", "scope"),
    ("OIDC_RESPONSE_TYPE", "response_type"),
    ("OIDC_METADATA_URL", "metadata_url"),
];

/// Collects settings from the environment as a JSON object. Individual
/// variables win over keys of the same name in `OIDC_CONFIG`.
pub fn settings_json_from_env() -> Map<String, Value> {
    let mut map = env::var(CONFIG_VAR)
        .ok()
        .and_then(|raw| parse_config_source(&raw))
        .and_then(|value| match value {
            Value::Object(map) => Some(map),
            _ => None,
        })
        .unwrap_or_default();

    for (var, key) in SETTING_VARS {
        if let Ok(value) = env::var(var) {
            let value = value.trim();
            if !value.is_empty() {
                map.insert((*key).to_string(), Value::String(value.to_string()));
            }
        }
    }
    map
}

fn parse_config_source(raw: &str) -> Option<Value> {
    if let Ok(json) = serde_json::from_str::<Value>(raw) {
        if json.is_object() {
            return Some(json);
        }
    }

    if let Some(path) = treat_as_path(raw) {
        if let Ok(contents) = fs::read_to_string(&path) {
            if let Ok(json) = serde_json::from_str::<Value>(&contents) {
                if json.is_object() {
                    return Some(json);
                }
            }
        }
    }

    parse_key_value_config(raw)
}

#[cfg(not(target_arch = "wasm32"))]
fn treat_as_path(raw: &str) -> Option<String> {
    if raw.contains('=') {
        return None;
    }
    let trimmed = raw.trim();
    if Path::new(trimmed).exists() {
        Some(trimmed.to_string())
    } else {
        None
    }
}

#[cfg(target_arch = "wasm32")]
fn treat_as_path(_raw: &str) -> Option<String> {
    None
}

fn parse_key_value_config(raw: &str) -> Option<Value> {
    let mut map = Map::new();
    for entry in raw.split(',') {
        let mut parts = entry.splitn(2, '=');
        let key = parts.next()?.trim();
        let value = parts.next()?.trim();
        if key.is_empty() || value.is_empty() {
            continue;
        }
        map.insert(key.to_string(), Value::String(value.to_string()));
    }
    if map.is_empty() {
        None
    } else {
        Some(Value::Object(map))
    }
}
