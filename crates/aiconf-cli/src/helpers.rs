//! Shared CLI helpers: config path selection, registry loading, output.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use colored::Colorize;

use aiconf_clients::ClientRegistry;
use aiconf_core::config::{get_config_path, load_config};
use aiconf_core::types::ClientMetadata;
use aiconf_core::utils::{expand_home, mask_secret, truncate_string};

/// The config file to read: `--config` if given, else `~/.aiconf/config.json`.
pub fn config_path(flag: Option<&Path>) -> PathBuf {
    match flag {
        Some(path) => expand_home(&path.to_string_lossy()),
        None => get_config_path(),
    }
}

/// Load the tree at `path` and scan it into a registry.
pub fn load_registry(path: &Path) -> Result<ClientRegistry> {
    let tree = load_config(Some(path));
    ClientRegistry::new(tree)
        .with_context(|| format!("failed to scan {}", path.display()))
}

/// Label/value rows describing a client.
pub fn metadata_rows(metadata: &ClientMetadata, api_key: Option<&str>) -> Vec<(&'static str, String)> {
    vec![
        ("Id:", metadata.id.clone()),
        ("Section:", metadata.section_path.clone()),
        ("Provider:", metadata.provider_name.clone()),
        (
            "Endpoint:",
            metadata
                .provider_uri
                .as_ref()
                .map(|u| u.to_string())
                .unwrap_or_else(|| "(provider default)".to_string()),
        ),
        ("Model:", metadata.default_model_id.clone()),
        (
            "API key:",
            api_key.map(mask_secret).unwrap_or_else(|| "(not set)".to_string()),
        ),
    ]
}

/// Width of one-line previews of long values.
const PREVIEW_WIDTH: usize = 72;

/// First line of `text`, truncated for display.
pub fn preview(text: &str) -> String {
    let mut lines = text.trim().lines();
    let first = lines.next().unwrap_or_default().trim();
    let shown = truncate_string(first, PREVIEW_WIDTH);
    if shown == first && lines.next().is_some() {
        format!("{first}...")
    } else {
        shown
    }
}

/// Print client metadata as an aligned block.
pub fn print_metadata(metadata: &ClientMetadata, api_key: Option<&str>) {
    for (label, value) in metadata_rows(metadata, api_key) {
        println!("  {:<12} {}", label.bold(), value);
    }
}

/// Print a section heading.
pub fn print_heading(text: &str) {
    println!();
    println!("{}", text.cyan().bold());
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
