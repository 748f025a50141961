//! Config loader: reads `~/.aiconf/config.json`, flattens it into
//! colon-delimited leaves, and layers environment variable overrides on top.
//!
//! # Loading precedence
//! 1. JSON file (objects become path segments, arrays use their index)
//! 2. Environment variables `AICONF_<SEGMENT>__<SEGMENT>...` (override JSON)
//!
//! ```text
//! { "ai": { "clients": { "openai": { "modelid": "gpt-4.1" } } } }
//!   → ai:clients:openai:modelid = gpt-4.1
//! AICONF_AI__CLIENTS__OPENAI__APIKEY=sk-...
//!   → ai:clients:openai:apikey = sk-...
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::path::{combine, fold, ALT_DELIMITER, KEY_DELIMITER};
use super::tree::ConfigTree;

/// Prefix for environment variable overrides.
pub const ENV_PREFIX: &str = "AICONF_";

/// Default config file path.
pub fn get_config_path() -> PathBuf {
    crate::utils::get_data_path().join("config.json")
}

/// Load configuration from `path` (or the default path) plus env vars.
///
/// A missing or unreadable file yields a tree holding only env overrides.
pub fn load_config(path: Option<&Path>) -> ConfigTree {
    let config_path = path.map(PathBuf::from).unwrap_or_else(get_config_path);

    let entries = match read_entries(&config_path) {
        Ok(entries) => entries,
        Err(e) => {
            if config_path.exists() {
                warn!("Failed to load config {}: {:#}", config_path.display(), e);
            } else {
                info!("No config file found at {}, starting empty", config_path.display());
            }
            Vec::new()
        }
    };

    ConfigTree::from_entries(apply_env_overrides(entries, std::env::vars()))
}

/// Re-read `path` into an existing tree as one edit batch.
///
/// On read or parse failure the tree is left untouched and the error is
/// returned. Returns whether the contents changed.
pub fn reload_config(tree: &ConfigTree, path: &Path) -> Result<bool> {
    let entries = read_entries(path)?;
    let changed = tree.replace_all(apply_env_overrides(entries, std::env::vars()));
    if changed {
        info!("Configuration reloaded from {}", path.display());
    } else {
        debug!("Configuration at {} unchanged", path.display());
    }
    Ok(changed)
}

/// Read and flatten a JSON config file.
pub fn read_entries(path: &Path) -> Result<Vec<(String, String)>> {
    debug!("Loading config from {}", path.display());
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let raw: Value = serde_json::from_str(&content)
        .with_context(|| format!("parsing {}", path.display()))?;
    Ok(flatten_json(&raw))
}

/// Flatten a JSON document into `(path, value)` leaves.
///
/// Strings are taken verbatim, numbers and booleans are stringified, `null`
/// is skipped.
pub fn flatten_json(value: &Value) -> Vec<(String, String)> {
    let mut out = Vec::new();
    flatten_into(String::new(), value, &mut out);
    out
}

fn flatten_into(prefix: String, value: &Value, out: &mut Vec<(String, String)>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                flatten_into(combine(&prefix, key), child, out);
            }
        }
        Value::Array(items) => {
            for (index, child) in items.iter().enumerate() {
                flatten_into(combine(&prefix, &index.to_string()), child, out);
            }
        }
        Value::Null => {}
        Value::String(s) => {
            if !prefix.is_empty() {
                out.push((prefix, s.clone()));
            }
        }
        other => {
            if !prefix.is_empty() {
                out.push((prefix, other.to_string()));
            }
        }
    }
}

/// Apply `AICONF_*` overrides from `vars` on top of file entries.
///
/// Env var format: `AICONF_<SEGMENT>__<SEGMENT>` (double underscore as
/// delimiter). Overrides replace file values case-insensitively.
pub fn apply_env_overrides<I>(entries: Vec<(String, String)>, vars: I) -> Vec<(String, String)>
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut merged: BTreeMap<String, (String, String)> = entries
        .into_iter()
        .map(|(path, value)| (fold(&path), (path, value)))
        .collect();

    for (name, value) in vars {
        let Some(rest) = name.strip_prefix(ENV_PREFIX) else {
            continue;
        };
        let path = rest.replace(ALT_DELIMITER, KEY_DELIMITER).to_lowercase();
        if path.is_empty() {
            continue;
        }
        debug!(key = %path, "Applying env override");
        merged.insert(fold(&path), (path, value));
    }

    merged.into_values().collect()
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
