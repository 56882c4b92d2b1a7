//! The import pipeline
//!
//! One import per asset, serialized per asset by the scheduler:
//!
//! 1. open the source in swap space; skip it if source and importer are unchanged
//! 2. run the importer's migration chain (failure marks the asset invalid)
//! 3. wait for every base prefab the document instantiates, importing missing
//!    ones on demand; a wait that would deadlock disconnects that prefab's
//!    instances instead
//! 4. reconcile prefab instances against the cached bases
//! 5. emit the artifact, cache base prefabs, commit migrated sources, write
//!    metadata
//!
//! # Example
//!
//! ```rust,ignore
//! let store = Arc::new(FsStore::new("assets", "library"));
//! let pipeline = Pipeline::new(store.clone(), PipelineConfig::default())?;
//! for (id, result) in pipeline.import_all(store.list().await?).await {
//!     println!("{id}: {:?}", result?);
//! }
//! ```

use crate::config::PipelineConfig;
use crate::error::{ImportError, ImportResult};
use crate::importer::{Importer, ImporterRegistry};
use crate::meta::AssetMeta;
use crate::store::AssetStore;
use crate::swap::{SwapHandle, SwapSpace};
use forge_migrate::{MigrationError, SchemaVersion};
use forge_prefab::{dependencies, FileIdGenerator, PrefabCache, Reconciler, UuidFileIds};
use forge_scheduler::{Scheduler, SchedulerError, TaskContext, TaskHandle};
use forge_table::AssetId;
use futures::future::{join_all, BoxFuture};
use std::collections::BTreeSet;
use std::fmt::{self, Debug, Formatter};
use std::sync::Arc;

/// Reconciliation counts for one imported document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    /// Instance roots processed
    pub roots: usize,
    /// Roots that were disconnected
    pub disconnected: usize,
    /// Target overrides stored
    pub target_overrides: usize,
    /// Prefabs whose instances were disconnected to break a cycle
    pub forced: Vec<AssetId>,
}

/// What one import did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportSummary {
    /// Importer used
    pub importer: String,
    /// Migration steps applied, ascending
    pub migrated: Vec<SchemaVersion>,
    /// Schema version recorded for the source
    ///
    /// The migration stamp when steps ran, else the version already on
    /// record, else the importer's version for a first import.
    pub version: SchemaVersion,
    /// The migrated source was written back
    pub committed: bool,
    /// Base prefabs the document depends on
    pub dependencies: Vec<AssetId>,
    /// Reconciliation counts, for importers that hold prefab instances
    pub reconcile: Option<ReconcileSummary>,
}

/// Outcome of a successful import
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportOutcome {
    /// The asset was (re)imported
    Imported(ImportSummary),
    /// Source and importer were unchanged; nothing ran
    UpToDate,
}

impl ImportOutcome {
    /// Summary, if the asset was imported
    #[must_use]
    pub fn summary(&self) -> Option<&ImportSummary> {
        match self {
            Self::Imported(summary) => Some(summary),
            Self::UpToDate => None,
        }
    }
}

/// Imports assets from a store
#[derive(Clone)]
pub struct Pipeline {
    store: Arc<dyn AssetStore>,
    swap: SwapSpace,
    scheduler: Scheduler<AssetId>,
    cache: PrefabCache,
    importers: Arc<ImporterRegistry>,
    ids: Arc<dyn FileIdGenerator>,
    config: Arc<PipelineConfig>,
}

impl Debug for Pipeline {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("store", &self.store)
            .field("cached", &self.cache.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Pipeline with the built-in importers and uuid file ids
    ///
    /// # Errors
    /// Returns error if a built-in importer is misdeclared
    pub fn new(store: Arc<dyn AssetStore>, config: PipelineConfig) -> Result<Self, MigrationError> {
        Ok(Self {
            swap: SwapSpace::new(Arc::clone(&store)),
            store,
            scheduler: Scheduler::new(),
            cache: PrefabCache::new(),
            importers: Arc::new(ImporterRegistry::builtin()?),
            ids: Arc::new(UuidFileIds),
            config: Arc::new(config),
        })
    }

    /// With importers
    #[must_use]
    pub fn with_importers(mut self, importers: ImporterRegistry) -> Self {
        self.importers = Arc::new(importers);
        self
    }

    /// With file id generator
    #[must_use]
    pub fn with_file_ids(mut self, ids: Arc<dyn FileIdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    /// With a shared base prefab cache
    #[must_use]
    pub fn with_cache(mut self, cache: PrefabCache) -> Self {
        self.cache = cache;
        self
    }

    /// Base prefab cache
    #[must_use]
    pub fn cache(&self) -> &PrefabCache {
        &self.cache
    }

    /// Swap space
    #[must_use]
    pub fn swap(&self) -> &SwapSpace {
        &self.swap
    }

    /// Scheduler the imports run on
    #[must_use]
    pub fn scheduler(&self) -> &Scheduler<AssetId> {
        &self.scheduler
    }

    /// Configuration
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Queue an import of `id` behind any earlier work on it
    pub fn enqueue(&self, id: AssetId) -> TaskHandle<ImportOutcome> {
        let this = self.clone();
        self.scheduler.enqueue(
            id.clone(),
            move |ctx| -> BoxFuture<'static, anyhow::Result<ImportOutcome>> {
                Box::pin(async move { Ok(this.import_asset(&ctx, &id).await?) })
            },
        )
    }

    /// Import `id` and wait for the outcome
    ///
    /// # Errors
    /// Returns the import's error, or [`ImportError::Scheduler`] if it was cancelled
    pub async fn import(&self, id: AssetId) -> ImportResult<ImportOutcome> {
        self.enqueue(id).join().await.map_err(ImportError::from_task)
    }

    /// Import every asset in `ids` concurrently
    ///
    /// Results are returned in the order of `ids`.
    pub async fn import_all(
        &self,
        ids: impl IntoIterator<Item = AssetId>,
    ) -> Vec<(AssetId, ImportResult<ImportOutcome>)> {
        let (ids, handles): (Vec<AssetId>, Vec<TaskHandle<ImportOutcome>>) = ids
            .into_iter()
            .map(|id| (id.clone(), self.enqueue(id)))
            .unzip();
        let results = join_all(handles.into_iter().map(TaskHandle::join)).await;
        ids.into_iter()
            .zip(results)
            .map(|(id, r)| (id, r.map_err(ImportError::from_task)))
            .collect()
    }

    /// Abandon queued and paused imports of `id`
    pub fn cancel(&self, id: &AssetId) -> usize {
        self.scheduler.cancel(id)
    }

    /// Wait for every queued import to finish
    pub async fn drain(&self) {
        self.scheduler.drain().await;
    }

    fn importer_for(
        &self,
        id: &AssetId,
        meta: Option<&AssetMeta>,
        handle: &SwapHandle,
    ) -> ImportResult<Arc<dyn Importer>> {
        if let Some(meta) = meta {
            return self
                .importers
                .get(&meta.importer)
                .ok_or_else(|| ImportError::UnknownImporter {
                    asset: id.clone(),
                    importer: meta.importer.clone(),
                });
        }
        let document = handle.table().document().map_err(|source| ImportError::Table {
            asset: id.clone(),
            source,
        })?;
        self.importers
            .for_document(document)
            .ok_or_else(|| ImportError::NoImporter(id.clone()))
    }

    async fn import_asset(&self, ctx: &TaskContext<AssetId>, id: &AssetId) -> ImportResult<ImportOutcome> {
        let meta = self.store.read_meta(id).await?;
        let mut handle = self.swap.open(id).await?;
        let importer = self.importer_for(id, meta.as_ref(), &handle)?;

        if meta
            .as_ref()
            .is_some_and(|m| m.is_up_to_date(importer.name(), importer.migrations(), &handle.source_hash()))
        {
            if importer.outputs_base_prefab() && !self.cache.contains(id) {
                self.load_cached_base(id, importer.as_ref()).await?;
            }
            self.swap.close(handle);
            tracing::debug!(asset = %id, "up to date");
            return Ok(ImportOutcome::UpToDate);
        }

        let recorded = meta.as_ref().and_then(|m| m.version.clone());
        match self
            .run_import(ctx, id, importer.as_ref(), recorded.as_ref(), &mut handle)
            .await
        {
            Ok(summary) => {
                let meta = AssetMeta::new(importer.name())
                    .with_version(summary.version.clone())
                    .with_source_hash(handle.source_hash())
                    .with_dependencies(summary.dependencies.clone());
                self.store.write_meta(id, &meta).await?;
                self.swap.close(handle);
                tracing::info!(
                    asset = %id,
                    importer = importer.name(),
                    migrated = summary.migrated.len(),
                    committed = summary.committed,
                    "imported asset"
                );
                Ok(ImportOutcome::Imported(summary))
            }
            Err(err) => {
                self.swap.close(handle);
                if err.is_asset_fatal() {
                    tracing::error!(asset = %id, error = %err, "import failed; marking asset invalid");
                    let mut invalid = meta.unwrap_or_else(|| AssetMeta::new(importer.name()));
                    invalid.invalidate(err.to_string());
                    self.store.write_meta(id, &invalid).await?;
                }
                Err(err)
            }
        }
    }

    async fn run_import(
        &self,
        ctx: &TaskContext<AssetId>,
        id: &AssetId,
        importer: &dyn Importer,
        recorded: Option<&SchemaVersion>,
        handle: &mut SwapHandle,
    ) -> ImportResult<ImportSummary> {
        let report = importer
            .migrations()
            .run(handle.table_mut(), recorded, importer.version())
            .await
            .map_err(|source| ImportError::Migration {
                asset: id.clone(),
                source,
            })?;
        if report.migrated() {
            handle.mark_migrated();
        }

        let mut deps = Vec::new();
        let reconcile = if importer.holds_prefab_instances() {
            deps = dependencies(handle.table()).map_err(|source| ImportError::Reconcile {
                asset: id.clone(),
                source,
            })?;
            let forced = self.await_dependencies(ctx, id, &deps).await?;
            Some(self.reconcile(id, handle, forced)?)
        } else {
            None
        };

        let artifact = importer.emit(handle.table()).map_err(|source| ImportError::Table {
            asset: id.clone(),
            source,
        })?;
        self.store.write_artifact(id, &artifact).await?;
        if importer.outputs_base_prefab() {
            self.cache.insert(id.clone(), handle.table().clone());
        }
        let committed = self.swap.commit(handle).await?;

        let version = report
            .stamp
            .or_else(|| recorded.cloned())
            .unwrap_or_else(|| importer.version().clone());
        Ok(ImportSummary {
            importer: importer.name().to_string(),
            migrated: report.applied,
            version,
            committed,
            dependencies: deps,
            reconcile,
        })
    }

    /// Make every dependency available in the cache, or report it as forced
    ///
    /// Dependencies that are neither cached nor being imported are imported
    /// on demand if they have a source.
    async fn await_dependencies(
        &self,
        ctx: &TaskContext<AssetId>,
        id: &AssetId,
        deps: &[AssetId],
    ) -> ImportResult<BTreeSet<AssetId>> {
        let mut forced = BTreeSet::new();
        for dep in deps {
            if dep == id {
                tracing::warn!(asset = %id, "prefab instantiates itself; disconnecting");
                forced.insert(dep.clone());
                continue;
            }
            let busy = self.scheduler.is_busy(dep);
            if !busy && self.cache.contains(dep) {
                continue;
            }
            if !busy && self.store.has_source(dep).await? {
                tracing::debug!(asset = %id, %dep, "importing dependency on demand");
                drop(self.enqueue(dep.clone()));
            }
            match ctx.wait_for(dep).await {
                Ok(()) => {}
                Err(err @ SchedulerError::DependencyCycle { .. }) => {
                    tracing::warn!(asset = %id, %dep, error = %err, "breaking dependency cycle by disconnection");
                    forced.insert(dep.clone());
                }
                Err(err) => return Err(err.into()),
            }
        }
        Ok(forced)
    }

    fn reconcile(
        &self,
        id: &AssetId,
        handle: &mut SwapHandle,
        forced: BTreeSet<AssetId>,
    ) -> ImportResult<ReconcileSummary> {
        let mut options = self.config.to_reconcile_options();
        options.force_disconnect.clone_from(&forced);
        let report = Reconciler::new(&self.cache, self.ids.as_ref())
            .with_options(options)
            .reconcile_document(handle.table_mut())
            .map_err(|source| ImportError::Reconcile {
                asset: id.clone(),
                source,
            })?;
        Ok(ReconcileSummary {
            roots: report.roots.len(),
            disconnected: report.disconnected().count(),
            target_overrides: report.target_overrides,
            forced: forced.into_iter().collect(),
        })
    }

    async fn load_cached_base(&self, id: &AssetId, importer: &dyn Importer) -> ImportResult<()> {
        let artifact = self.store.read_artifact(id).await?;
        let table = importer.load_base(&artifact).map_err(|source| ImportError::Table {
            asset: id.clone(),
            source,
        })?;
        self.cache.insert(id.clone(), table);
        Ok(())
    }
}
