//! Base prefab lookup
//!
//! Reconciliation compares live instances against the decoded base prefab.
//! The pipeline fills a [`PrefabCache`] as each prefab finishes importing and
//! hands it to the engine as an explicit context object.

use forge_table::{AssetId, ObjectTable};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

/// Source of base prefab tables
///
/// A missing resource is `None`, never an error; the engine disconnects the
/// instances that needed it.
pub trait BasePrefabResolver: Send + Sync + Debug {
    /// Look up the decoded base prefab `id`
    fn resolve_base_prefab(&self, id: &AssetId) -> Option<Arc<ObjectTable>>;
}

impl<T: BasePrefabResolver + ?Sized> BasePrefabResolver for Arc<T> {
    fn resolve_base_prefab(&self, id: &AssetId) -> Option<Arc<ObjectTable>> {
        (**self).resolve_base_prefab(id)
    }
}

/// Shared cache of imported base prefabs
///
/// Cloning shares the underlying map. Tables are immutable once inserted.
#[derive(Debug, Clone, Default)]
pub struct PrefabCache {
    inner: Arc<RwLock<HashMap<AssetId, Arc<ObjectTable>>>>,
}

impl PrefabCache {
    /// Create an empty cache
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the table of `id`
    pub fn insert(&self, id: AssetId, table: ObjectTable) -> Arc<ObjectTable> {
        let table = Arc::new(table);
        self.inner.write().insert(id, Arc::clone(&table));
        table
    }

    /// Cached table of `id`
    #[must_use]
    pub fn get(&self, id: &AssetId) -> Option<Arc<ObjectTable>> {
        self.inner.read().get(id).cloned()
    }

    /// Drop `id`; returns whether it was cached
    pub fn evict(&self, id: &AssetId) -> bool {
        self.inner.write().remove(id).is_some()
    }

    /// Is `id` cached?
    #[must_use]
    pub fn contains(&self, id: &AssetId) -> bool {
        self.inner.read().contains_key(id)
    }

    /// Number of cached prefabs
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    /// Is the cache empty?
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// Drop everything (end of a batch)
    pub fn clear(&self) {
        self.inner.write().clear();
    }
}

impl BasePrefabResolver for PrefabCache {
    fn resolve_base_prefab(&self, id: &AssetId) -> Option<Arc<ObjectTable>> {
        self.get(id)
    }
}
