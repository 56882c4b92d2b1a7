//! Asset storage
//!
//! Where sources are read from and artifacts and metadata are written to.
//! [`MemoryStore`] backs tests; [`FsStore`] lays assets out on disk:
//!
//! ```text
//! <root>/<id>.json                 source
//! <root>/<library>/<id>.json       artifact
//! <root>/<library>/<id>.meta.json  metadata
//! ```

use crate::error::StoreError;
use crate::meta::AssetMeta;
use async_trait::async_trait;
use forge_table::AssetId;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::fmt::Debug;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Storage backend for the import pipeline
#[async_trait]
pub trait AssetStore: Send + Sync + Debug {
    /// Source bytes of `id`
    async fn read_source(&self, id: &AssetId) -> Result<Vec<u8>, StoreError>;

    /// Replace the source of `id`
    async fn write_source(&self, id: &AssetId, bytes: &[u8]) -> Result<(), StoreError>;

    /// Does `id` have a source?
    async fn has_source(&self, id: &AssetId) -> Result<bool, StoreError>;

    /// Imported artifact of `id`
    async fn read_artifact(&self, id: &AssetId) -> Result<Vec<u8>, StoreError>;

    /// Replace the imported artifact of `id`
    async fn write_artifact(&self, id: &AssetId, bytes: &[u8]) -> Result<(), StoreError>;

    /// Metadata of `id`, if it was ever imported
    async fn read_meta(&self, id: &AssetId) -> Result<Option<AssetMeta>, StoreError>;

    /// Replace the metadata of `id`
    async fn write_meta(&self, id: &AssetId, meta: &AssetMeta) -> Result<(), StoreError>;

    /// Every asset with a source, sorted
    async fn list(&self) -> Result<Vec<AssetId>, StoreError>;
}

#[derive(Debug, Default)]
struct MemoryInner {
    sources: BTreeMap<AssetId, Vec<u8>>,
    artifacts: HashMap<AssetId, Vec<u8>>,
    metas: HashMap<AssetId, AssetMeta>,
}

/// In-memory store
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<MemoryInner>>,
}

impl MemoryStore {
    /// Empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a source
    pub fn insert_source(&self, id: impl Into<AssetId>, bytes: impl Into<Vec<u8>>) {
        self.inner.write().sources.insert(id.into(), bytes.into());
    }

    /// Current source of `id`
    #[must_use]
    pub fn source(&self, id: &AssetId) -> Option<Vec<u8>> {
        self.inner.read().sources.get(id).cloned()
    }

    /// Current artifact of `id`
    #[must_use]
    pub fn artifact(&self, id: &AssetId) -> Option<Vec<u8>> {
        self.inner.read().artifacts.get(id).cloned()
    }

    /// Current metadata of `id`
    #[must_use]
    pub fn meta(&self, id: &AssetId) -> Option<AssetMeta> {
        self.inner.read().metas.get(id).cloned()
    }

    /// Remove the source of `id`
    pub fn remove_source(&self, id: &AssetId) -> bool {
        self.inner.write().sources.remove(id).is_some()
    }
}

#[async_trait]
impl AssetStore for MemoryStore {
    async fn read_source(&self, id: &AssetId) -> Result<Vec<u8>, StoreError> {
        self.source(id).ok_or_else(|| StoreError::NotFound(id.clone()))
    }

    async fn write_source(&self, id: &AssetId, bytes: &[u8]) -> Result<(), StoreError> {
        self.inner.write().sources.insert(id.clone(), bytes.to_vec());
        Ok(())
    }

    async fn has_source(&self, id: &AssetId) -> Result<bool, StoreError> {
        Ok(self.inner.read().sources.contains_key(id))
    }

    async fn read_artifact(&self, id: &AssetId) -> Result<Vec<u8>, StoreError> {
        self.artifact(id).ok_or_else(|| StoreError::NotFound(id.clone()))
    }

    async fn write_artifact(&self, id: &AssetId, bytes: &[u8]) -> Result<(), StoreError> {
        self.inner.write().artifacts.insert(id.clone(), bytes.to_vec());
        Ok(())
    }

    async fn read_meta(&self, id: &AssetId) -> Result<Option<AssetMeta>, StoreError> {
        Ok(self.meta(id))
    }

    async fn write_meta(&self, id: &AssetId, meta: &AssetMeta) -> Result<(), StoreError> {
        self.inner.write().metas.insert(id.clone(), meta.clone());
        Ok(())
    }

    async fn list(&self) -> Result<Vec<AssetId>, StoreError> {
        Ok(self.inner.read().sources.keys().cloned().collect())
    }
}

const SOURCE_EXT: &str = "json";
const META_SUFFIX: &str = ".meta.json";

/// Directory-backed store
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
    library: PathBuf,
}

impl FsStore {
    /// Store rooted at `root`, writing imports under `root/library_dir`
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, library_dir: impl AsRef<Path>) -> Self {
        let root = root.into();
        let library = root.join(library_dir);
        Self { root, library }
    }

    /// Asset root
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Library directory
    #[must_use]
    pub fn library(&self) -> &Path {
        &self.library
    }

    fn key(id: &AssetId) -> Result<&str, StoreError> {
        let key = id.as_str();
        let valid = !key.is_empty()
            && key != "."
            && key != ".."
            && !key.contains(['/', '\\', '\0']);
        if valid {
            Ok(key)
        } else {
            Err(StoreError::InvalidId(key.to_string()))
        }
    }

    fn source_path(&self, id: &AssetId) -> Result<PathBuf, StoreError> {
        Ok(self.root.join(format!("{}.{SOURCE_EXT}", Self::key(id)?)))
    }

    fn artifact_path(&self, id: &AssetId) -> Result<PathBuf, StoreError> {
        Ok(self.library.join(format!("{}.{SOURCE_EXT}", Self::key(id)?)))
    }

    fn meta_path(&self, id: &AssetId) -> Result<PathBuf, StoreError> {
        Ok(self.library.join(format!("{}{META_SUFFIX}", Self::key(id)?)))
    }

    async fn read(path: &Path, id: &AssetId) -> Result<Vec<u8>, StoreError> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StoreError::NotFound(id.clone())),
            Err(e) => Err(StoreError::io(path, e)),
        }
    }

    /// Write through a temporary file so readers never see a partial file
    async fn write(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| StoreError::io(dir, e))?;
        }
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, bytes)
            .await
            .map_err(|e| StoreError::io(&tmp, e))?;
        tokio::fs::rename(&tmp, path)
            .await
            .map_err(|e| StoreError::io(path, e))
    }
}

#[async_trait]
impl AssetStore for FsStore {
    async fn read_source(&self, id: &AssetId) -> Result<Vec<u8>, StoreError> {
        Self::read(&self.source_path(id)?, id).await
    }

    async fn write_source(&self, id: &AssetId, bytes: &[u8]) -> Result<(), StoreError> {
        Self::write(&self.source_path(id)?, bytes).await
    }

    async fn has_source(&self, id: &AssetId) -> Result<bool, StoreError> {
        let path = self.source_path(id)?;
        tokio::fs::try_exists(&path)
            .await
            .map_err(|e| StoreError::io(path, e))
    }

    async fn read_artifact(&self, id: &AssetId) -> Result<Vec<u8>, StoreError> {
        Self::read(&self.artifact_path(id)?, id).await
    }

    async fn write_artifact(&self, id: &AssetId, bytes: &[u8]) -> Result<(), StoreError> {
        Self::write(&self.artifact_path(id)?, bytes).await
    }

    async fn read_meta(&self, id: &AssetId) -> Result<Option<AssetMeta>, StoreError> {
        let bytes = match Self::read(&self.meta_path(id)?, id).await {
            Ok(bytes) => bytes,
            Err(StoreError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|source| StoreError::Meta {
                asset: id.clone(),
                source,
            })
    }

    async fn write_meta(&self, id: &AssetId, meta: &AssetMeta) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(meta).map_err(|source| StoreError::Meta {
            asset: id.clone(),
            source,
        })?;
        Self::write(&self.meta_path(id)?, &bytes).await
    }

    async fn list(&self) -> Result<Vec<AssetId>, StoreError> {
        let mut entries = tokio::fs::read_dir(&self.root)
            .await
            .map_err(|e| StoreError::io(&self.root, e))?;
        let mut ids = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StoreError::io(&self.root, e))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(SOURCE_EXT) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                ids.push(AssetId::new(stem));
            }
        }
        ids.sort();
        Ok(ids)
    }
}
