//! In-memory configuration tree.
//!
//! A flat map of colon-delimited leaf paths to string values, with
//! case-insensitive addressing and a generation counter that advances once per
//! committed edit batch. Handles are cheap to clone and share one store.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::watch;
use tracing::debug;

use super::change::ChangeToken;
use super::path::{fold, KEY_DELIMITER};
use super::section::Section;

// ─────────────────────────────────────────────
// ConfigTree
// ─────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Eq)]
struct Entry {
    /// Path with the casing it was written with.
    path: String,
    value: String,
}

struct Inner {
    /// Leaves keyed by folded (lowercase) path.
    entries: RwLock<BTreeMap<String, Entry>>,
    /// Advances once per committed batch; change tokens watch it.
    generation: watch::Sender<u64>,
}

/// Shared, hierarchical key/value configuration store.
#[derive(Clone)]
pub struct ConfigTree {
    inner: Arc<Inner>,
}

impl ConfigTree {
    /// Create an empty tree.
    pub fn new() -> Self {
        let (generation, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                entries: RwLock::new(BTreeMap::new()),
                generation,
            }),
        }
    }

    /// Create a tree pre-populated with `(path, value)` pairs.
    pub fn from_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let tree = Self::new();
        {
            let mut map = tree.inner.entries.write();
            for (key, value) in entries {
                insert(&mut map, key.into(), value.into());
            }
        }
        tree
    }

    // ── reads ──

    /// Value of a leaf, if present.
    pub fn get(&self, path: &str) -> Option<String> {
        self.inner
            .entries
            .read()
            .get(&fold(path))
            .map(|e| e.value.clone())
    }

    /// Whether a leaf exists at `path`.
    pub fn contains(&self, path: &str) -> bool {
        self.inner.entries.read().contains_key(&fold(path))
    }

    /// All leaves as `(path, value)` with original casing, ordered by path.
    pub fn entries(&self) -> Vec<(String, String)> {
        self.inner
            .entries
            .read()
            .values()
            .map(|e| (e.path.clone(), e.value.clone()))
            .collect()
    }

    /// Leaves strictly below `prefix` (not the prefix leaf itself).
    pub fn entries_under(&self, prefix: &str) -> Vec<(String, String)> {
        let start = format!("{}{KEY_DELIMITER}", fold(prefix));
        self.inner
            .entries
            .read()
            .range(start.clone()..)
            .take_while(|(key, _)| key.starts_with(&start))
            .map(|(_, e)| (e.path.clone(), e.value.clone()))
            .collect()
    }

    /// Whether any leaf lives at or below `path`.
    pub fn has_section(&self, path: &str) -> bool {
        self.contains(path) || !self.entries_under(path).is_empty()
    }

    /// A view of the sub-tree at `path`. The section need not exist yet.
    pub fn section(&self, path: &str) -> Section {
        Section::new(self.clone(), path)
    }

    /// Number of leaves.
    pub fn len(&self) -> usize {
        self.inner.entries.read().len()
    }

    /// Whether the tree has no leaves.
    pub fn is_empty(&self) -> bool {
        self.inner.entries.read().is_empty()
    }

    // ── change notification ──

    /// Current generation (number of committed batches).
    pub fn generation(&self) -> u64 {
        *self.inner.generation.borrow()
    }

    /// Arm a token that fires on the next committed batch.
    pub fn change_token(&self) -> ChangeToken {
        ChangeToken::new(self.inner.generation.subscribe())
    }

    // ── edits ──

    /// Set a single leaf (one batch).
    pub fn set(&self, path: &str, value: impl Into<String>) {
        let value = value.into();
        self.batch(|b| b.set(path, value));
    }

    /// Remove a single leaf (one batch).
    pub fn remove(&self, path: &str) {
        self.batch(|b| b.remove(path));
    }

    /// Apply several edits and notify once.
    ///
    /// Watchers are only notified when the batch actually changed something.
    pub fn batch<F>(&self, edit: F)
    where
        F: FnOnce(&mut ConfigBatch<'_>),
    {
        let changed = {
            let mut entries = self.inner.entries.write();
            let mut batch = ConfigBatch {
                entries: &mut *entries,
                changed: false,
            };
            edit(&mut batch);
            batch.changed
        };
        if changed {
            self.bump();
        }
    }

    /// Replace the whole contents (e.g. after re-reading a file).
    ///
    /// Returns whether anything changed; watchers fire only in that case.
    pub fn replace_all<I, K, V>(&self, entries: I) -> bool
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut next = BTreeMap::new();
        for (key, value) in entries {
            insert(&mut next, key.into(), value.into());
        }
        let changed = {
            let mut current = self.inner.entries.write();
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        };
        if changed {
            self.bump();
        }
        changed
    }

    fn bump(&self) {
        self.inner.generation.send_modify(|g| *g += 1);
        debug!(generation = self.generation(), "configuration changed");
    }
}

impl Default for ConfigTree {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ConfigTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigTree")
            .field("leaves", &self.len())
            .field("generation", &self.generation())
            .finish()
    }
}

fn insert(map: &mut BTreeMap<String, Entry>, path: String, value: String) -> bool {
    let key = fold(&path);
    let entry = Entry { path, value };
    match map.get(&key) {
        Some(existing) if existing.value == entry.value => false,
        _ => {
            map.insert(key, entry);
            true
        }
    }
}

// ─────────────────────────────────────────────
// ConfigBatch
// ─────────────────────────────────────────────

/// Edits applied inside [`ConfigTree::batch`].
pub struct ConfigBatch<'a> {
    entries: &'a mut BTreeMap<String, Entry>,
    changed: bool,
}

impl ConfigBatch<'_> {
    /// Set a leaf value.
    pub fn set(&mut self, path: &str, value: impl Into<String>) {
        if insert(self.entries, path.to_string(), value.into()) {
            self.changed = true;
        }
    }

    /// Remove a leaf.
    pub fn remove(&mut self, path: &str) {
        if self.entries.remove(&fold(path)).is_some() {
            self.changed = true;
        }
    }

    /// Remove a leaf and everything below it.
    pub fn remove_section(&mut self, path: &str) {
        let folded = fold(path);
        let below = format!("{folded}{KEY_DELIMITER}");
        let before = self.entries.len();
        self.entries
            .retain(|key, _| key != &folded && !key.starts_with(&below));
        if self.entries.len() != before {
            self.changed = true;
        }
    }
}
