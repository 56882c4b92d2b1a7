//! Swap space
//!
//! The working copy of an asset while it is being imported. Every migration
//! and reconciliation goes through the handle's table; nothing reaches the
//! store until [`SwapSpace::commit`], and only when a migration ran.
//!
//! # Invariants
//!
//! - At most one [`SwapHandle`] per asset exists at a time
//! - Dropping a handle releases the asset, so a cancelled import never
//!   leaves it locked

use crate::error::SwapError;
use crate::store::AssetStore;
use forge_table::{AssetId, ContentHash, ObjectTable};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;

type OpenSet = Arc<Mutex<HashSet<AssetId>>>;

/// Exclusive working copies of assets under import
#[derive(Debug, Clone)]
pub struct SwapSpace {
    store: Arc<dyn AssetStore>,
    open: OpenSet,
}

impl SwapSpace {
    /// Swap space over `store`
    #[must_use]
    pub fn new(store: Arc<dyn AssetStore>) -> Self {
        Self {
            store,
            open: Arc::default(),
        }
    }

    /// Is a handle for `asset` outstanding?
    #[must_use]
    pub fn is_open(&self, asset: &AssetId) -> bool {
        self.open.lock().contains(asset)
    }

    /// Number of outstanding handles
    #[must_use]
    pub fn open_count(&self) -> usize {
        self.open.lock().len()
    }

    /// Read and decode the source of `asset`
    ///
    /// # Errors
    /// - [`SwapError::AlreadyOpen`] if a handle is outstanding; never queued
    /// - [`SwapError::Store`] if the source cannot be read
    /// - [`SwapError::Table`] if it does not decode
    pub async fn open(&self, asset: &AssetId) -> Result<SwapHandle, SwapError> {
        if !self.open.lock().insert(asset.clone()) {
            tracing::error!(%asset, "asset is already open in swap space");
            return Err(SwapError::AlreadyOpen(asset.clone()));
        }
        // Claimed; from here on the guard releases the slot on every exit
        let guard = Release {
            asset: asset.clone(),
            open: Arc::clone(&self.open),
        };

        let bytes = self.store.read_source(asset).await?;
        let source_hash = ContentHash::compute(&bytes);
        let table = ObjectTable::decode(&bytes).map_err(|source| SwapError::Table {
            asset: asset.clone(),
            source,
        })?;
        tracing::debug!(%asset, records = table.len(), hash = %source_hash.short(), "opened in swap space");
        Ok(SwapHandle {
            table,
            migrated: false,
            source_hash,
            guard,
        })
    }

    /// Write the table back to the store if a migration ran
    ///
    /// Returns whether anything was written. The handle stays open.
    ///
    /// # Errors
    /// Returns error if the table does not encode or the store write fails
    pub async fn commit(&self, handle: &mut SwapHandle) -> Result<bool, SwapError> {
        if !handle.migrated {
            return Ok(false);
        }
        let asset = handle.asset().clone();
        let bytes = handle.table.encode().map_err(|source| SwapError::Table {
            asset: asset.clone(),
            source,
        })?;
        self.store.write_source(&asset, &bytes).await?;
        handle.source_hash = ContentHash::compute(&bytes);
        handle.migrated = false;
        tracing::debug!(%asset, bytes = bytes.len(), "committed migrated source");
        Ok(true)
    }

    /// Discard the working copy and release the asset
    pub fn close(&self, handle: SwapHandle) {
        tracing::debug!(asset = %handle.asset(), "closed swap handle");
        drop(handle);
    }
}

/// Removes the asset from the open set when dropped
#[derive(Debug)]
struct Release {
    asset: AssetId,
    open: OpenSet,
}

impl Drop for Release {
    fn drop(&mut self) {
        self.open.lock().remove(&self.asset);
    }
}

/// Exclusive working copy of one asset
#[derive(Debug)]
pub struct SwapHandle {
    table: ObjectTable,
    migrated: bool,
    source_hash: ContentHash,
    guard: Release,
}

impl SwapHandle {
    /// Asset this handle holds
    #[inline]
    #[must_use]
    pub fn asset(&self) -> &AssetId {
        &self.guard.asset
    }

    /// Working table
    #[inline]
    #[must_use]
    pub fn table(&self) -> &ObjectTable {
        &self.table
    }

    /// Working table, for migrations and reconciliation
    #[inline]
    pub fn table_mut(&mut self) -> &mut ObjectTable {
        &mut self.table
    }

    /// Record that a migration changed the table
    #[inline]
    pub fn mark_migrated(&mut self) {
        self.migrated = true;
    }

    /// Has a migration run since open (or the last commit)?
    #[inline]
    #[must_use]
    pub fn is_migrated(&self) -> bool {
        self.migrated
    }

    /// Hash of the source as read, or as last committed
    #[inline]
    #[must_use]
    pub fn source_hash(&self) -> ContentHash {
        self.source_hash
    }
}
