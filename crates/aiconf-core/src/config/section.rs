//! Section: a view of one sub-tree of a [`ConfigTree`].
//!
//! A section is the unit of resolution for one client declaration. It holds no
//! data of its own: every read goes to the live tree, so a section handed out
//! before an edit observes the edited values.

use std::collections::BTreeSet;
use std::fmt;

use super::path::{self, fold, KEY_DELIMITER};
use super::tree::ConfigTree;

/// A path-addressed view into a [`ConfigTree`].
#[derive(Clone)]
pub struct Section {
    tree: ConfigTree,
    path: String,
}

impl Section {
    pub(crate) fn new(tree: ConfigTree, path: &str) -> Self {
        Self {
            tree,
            path: path.to_string(),
        }
    }

    /// Full path of the section, e.g. `ai:clients:openai`.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Last path segment, e.g. `openai`.
    pub fn key(&self) -> &str {
        path::last_segment(&self.path)
    }

    /// The tree this section reads from.
    pub fn tree(&self) -> &ConfigTree {
        &self.tree
    }

    /// Value stored at the section path itself.
    pub fn value(&self) -> Option<String> {
        self.tree.get(&self.path)
    }

    /// Value of a direct or nested key below this section.
    ///
    /// Blank values are treated as absent.
    pub fn get(&self, key: &str) -> Option<String> {
        self.tree
            .get(&path::combine(&self.path, key))
            .filter(|v| !v.trim().is_empty())
    }

    /// Sub-section at `key`.
    pub fn child(&self, key: &str) -> Section {
        Section::new(self.tree.clone(), &path::combine(&self.path, key))
    }

    /// Enclosing section, or `None` at the root segment.
    pub fn parent(&self) -> Option<Section> {
        path::parent_path(&self.path).map(|p| Section::new(self.tree.clone(), p))
    }

    /// Whether any value lives at or below this section.
    pub fn exists(&self) -> bool {
        self.tree.has_section(&self.path)
    }

    /// Immediate child sections, in path order, deduplicated case-insensitively.
    pub fn children(&self) -> Vec<Section> {
        let mut seen = BTreeSet::new();
        let mut children = Vec::new();
        let skip = self.path.len() + KEY_DELIMITER.len();
        for (leaf, _) in self.tree.entries_under(&self.path) {
            let Some(rest) = leaf.get(skip..) else {
                continue;
            };
            let segment = rest.split(KEY_DELIMITER).next().unwrap_or(rest);
            if seen.insert(fold(segment)) {
                children.push(self.child(segment));
            }
        }
        children
    }

    /// All leaves below this section as `(relative path, value)`.
    pub fn entries(&self) -> Vec<(String, String)> {
        let skip = self.path.len() + KEY_DELIMITER.len();
        self.tree
            .entries_under(&self.path)
            .into_iter()
            .filter_map(|(leaf, value)| leaf.get(skip..).map(|rest| (rest.to_string(), value)))
            .collect()
    }
}

impl fmt::Debug for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Section").field("path", &self.path).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree() -> ConfigTree {
        ConfigTree::from_entries([
            ("ai:clients:openai:modelid", "gpt-4.1"),
            ("ai:clients:openai:headers:X-Team", "core"),
            ("ai:clients:Grok:modelid", "grok-4"),
            ("ai:clients:blank:apikey", "   "),
        ])
    }

    #[test]
    fn test_section_reads() {
        let section = tree().section("AI:Clients:OpenAI");
        assert_eq!(section.get("modelid").as_deref(), Some("gpt-4.1"));
        assert_eq!(section.get("headers:x-team").as_deref(), Some("core"));
        assert_eq!(section.key(), "OpenAI");
        assert!(section.exists());
    }

    #[test]
    fn test_blank_value_is_absent() {
        let section = tree().section("ai:clients:blank");
        assert!(section.get("apikey").is_none());
    }

    #[test]
    fn test_parent_chain() {
        let section = tree().section("ai:clients:openai");
        let parent = section.parent().unwrap();
        assert_eq!(parent.path(), "ai:clients");
        assert_eq!(parent.parent().unwrap().path(), "ai");
        assert!(parent.parent().unwrap().parent().is_none());
    }

    #[test]
    fn test_children() {
        let clients = tree().section("ai:clients");
        let keys: Vec<String> = clients.children().iter().map(|s| s.key().to_string()).collect();
        assert_eq!(keys, vec!["blank", "Grok", "openai"]);
    }

    #[test]
    fn test_entries_are_relative() {
        let section = tree().section("ai:clients:openai");
        let entries = section.entries();
        assert!(entries.contains(&("modelid".to_string(), "gpt-4.1".to_string())));
        assert!(entries.contains(&("headers:X-Team".to_string(), "core".to_string())));
    }

    #[test]
    fn test_section_sees_live_edits() {
        let tree = tree();
        let section = tree.section("ai:clients:openai");
        tree.set("ai:clients:openai:modelid", "gpt-5");
        assert_eq!(section.get("modelid").as_deref(), Some("gpt-5"));
    }

    #[test]
    fn test_missing_section() {
        let section = tree().section("ai:clients:nope");
        assert!(!section.exists());
        assert!(section.children().is_empty());
    }
}
