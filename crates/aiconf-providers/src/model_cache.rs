//! Model cache: lazily created, model-bound sub-clients.
//!
//! A vendor adapter builds its expensive transport once and binds it to a
//! model per request. The cache memoizes those bindings by model id so a
//! request naming a model reuses the binding created for the first request
//! that named it. Entries are never evicted; the cache lives exactly as long
//! as the client that owns it and is dropped with it on reload.

use std::sync::Arc;

use dashmap::DashMap;

/// Concurrent model id → sub-client map.
#[derive(Debug)]
pub struct ModelCache<T> {
    entries: DashMap<String, Arc<T>>,
}

impl<T> ModelCache<T> {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Return the entry for `model_id`, creating it with `create` on first use.
    ///
    /// Concurrent first requests for the same model create it once.
    pub fn get_or_create<F>(&self, model_id: &str, create: F) -> Arc<T>
    where
        F: FnOnce(&str) -> T,
    {
        if let Some(existing) = self.entries.get(model_id) {
            return Arc::clone(existing.value());
        }
        self.entries
            .entry(model_id.to_string())
            .or_insert_with(|| Arc::new(create(model_id)))
            .value()
            .clone()
    }

    pub fn contains(&self, model_id: &str) -> bool {
        self.entries.contains_key(model_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T> Default for ModelCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
