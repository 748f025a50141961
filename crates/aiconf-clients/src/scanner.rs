//! Declaration scanner.
//!
//! Finds client and agent declarations in the tree. A declaration is a
//! section under the prefix that carries the marker key: `modelid` for
//! clients, `client` for agents. Scanning has no side effects; nothing is
//! resolved or built here.

use std::collections::HashMap;

use tracing::debug;

use aiconf_core::config::path::{last_segment, parent_path, strip_section_prefix};
use aiconf_core::error::ConfigError;
use aiconf_core::ConfigTree;

use crate::identity::IdentityKey;

/// Marker key of a client declaration; also its default model.
pub const MODEL_ID_KEY: &str = "modelid";
/// Marker key of an agent declaration; names the client the agent uses.
pub const CLIENT_KEY: &str = "client";
/// Optional id override.
pub const ID_KEY: &str = "id";

/// One declared client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientDescriptor {
    /// Lookup id: the section's `id` value, or `name`.
    pub id: String,
    /// Section path relative to the scan prefix, e.g. `openai` or `team:grok`.
    pub name: String,
    /// Full section path, e.g. `ai:clients:openai`.
    pub section_path: String,
}

/// One declared agent. Same shape as a client declaration.
pub type AgentDescriptor = ClientDescriptor;

/// Scan for client declarations under `prefix`.
pub fn scan_clients(tree: &ConfigTree, prefix: &str) -> Result<Vec<ClientDescriptor>, ConfigError> {
    scan(tree, prefix, MODEL_ID_KEY)
}

/// Scan for agent declarations under `prefix`.
pub fn scan_agents(tree: &ConfigTree, prefix: &str) -> Result<Vec<AgentDescriptor>, ConfigError> {
    scan(tree, prefix, CLIENT_KEY)
}

fn scan(tree: &ConfigTree, prefix: &str, marker: &str) -> Result<Vec<ClientDescriptor>, ConfigError> {
    let mut found: Vec<ClientDescriptor> = Vec::new();
    let mut seen: HashMap<IdentityKey, usize> = HashMap::new();

    for (path, _) in tree.entries_under(prefix) {
        if !last_segment(&path).eq_ignore_ascii_case(marker) {
            continue;
        }
        let Some(section_path) = parent_path(&path) else {
            continue;
        };
        let Some(name) = strip_section_prefix(section_path, prefix) else {
            debug!(key = %path, "Marker directly under prefix, ignoring");
            continue;
        };

        let id = tree
            .section(section_path)
            .get(ID_KEY)
            .map(|id| id.trim().to_string())
            .unwrap_or_else(|| name.to_string());

        if let Some(&index) = seen.get(&IdentityKey::new(id.as_str())) {
            return Err(ConfigError::DuplicateId {
                id,
                first: found[index].section_path.clone(),
                second: section_path.to_string(),
            });
        }

        debug!(id = %id, section = section_path, "Found declaration");
        seen.insert(IdentityKey::new(id.as_str()), found.len());
        found.push(ClientDescriptor {
            id,
            name: name.to_string(),
            section_path: section_path.to_string(),
        });
    }

    Ok(found)
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn tree(entries: &[(&str, &str)]) -> ConfigTree {
        ConfigTree::from_entries(entries.iter().map(|(k, v)| (k.to_string(), v.to_string())))
    }

    #[test]
    fn test_scan_finds_marked_sections() {
        let tree = tree(&[
            ("ai:clients:openai:modelid", "gpt-4.1"),
            ("ai:clients:openai:apikey", "sk-x"),
            ("ai:clients:grok:modelid", "grok-4"),
            ("ai:clients:notes:comment", "no marker"),
            ("other:x:modelid", "outside prefix"),
        ]);
        let found = scan_clients(&tree, "ai:clients").unwrap();
        let ids: Vec<_> = found.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["grok", "openai"]);
        assert_eq!(found[1].section_path, "ai:clients:openai");
    }

    #[test]
    fn test_id_override() {
        let tree = tree(&[
            ("ai:clients:x:modelid", "grok-4"),
            ("ai:clients:x:id", " Grok "),
        ]);
        let found = scan_clients(&tree, "ai:clients").unwrap();
        assert_eq!(found[0].id, "Grok");
        assert_eq!(found[0].name, "x");
    }

    #[test]
    fn test_nested_section_id_is_path_suffix() {
        let tree = tree(&[("AI:Clients:Team:Grok:ModelId", "grok-4")]);
        let found = scan_clients(&tree, "ai:clients").unwrap();
        assert_eq!(found[0].id, "Team:Grok");
        assert_eq!(found[0].section_path, "AI:Clients:Team:Grok");
    }

    #[test]
    fn test_marker_at_prefix_is_ignored() {
        let tree = tree(&[
            ("ai:clients:modelid", "gpt-4.1"),
            ("ai:clients:openai:modelid", "gpt-4.1"),
        ]);
        let found = scan_clients(&tree, "ai:clients").unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "openai");
    }

    #[test]
    fn test_duplicate_ids_case_insensitive() {
        let tree = tree(&[
            ("ai:clients:a:modelid", "m"),
            ("ai:clients:a:id", "Grok"),
            ("ai:clients:b:modelid", "m"),
            ("ai:clients:b:id", "grok"),
        ]);
        let err = scan_clients(&tree, "ai:clients").unwrap_err();
        assert_eq!(
            err,
            ConfigError::DuplicateId {
                id: "grok".into(),
                first: "ai:clients:a".into(),
                second: "ai:clients:b".into(),
            }
        );
    }

    #[test]
    fn test_scan_agents_uses_client_marker() {
        let tree = tree(&[
            ("ai:agents:writer:client", "openai"),
            ("ai:agents:writer:instructions", "Write well."),
            ("ai:agents:idle:modelid", "gpt-4.1"),
        ]);
        let found = scan_agents(&tree, "ai:agents").unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "writer");
    }

    #[test]
    fn test_empty_tree() {
        assert!(scan_clients(&ConfigTree::new(), "ai:clients").unwrap().is_empty());
    }
}
