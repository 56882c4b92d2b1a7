//! Error types for the import pipeline
//!
//! Per-layer enums, from the asset store up to [`ForgeError`] at the top.
//! `ImportError` is what one asset's import reports; the classification
//! helpers decide whether the asset is marked invalid.

use forge_migrate::MigrationError;
use forge_prefab::ReconcileError;
use forge_scheduler::SchedulerError;
use forge_table::{AssetId, TableError};
use std::path::PathBuf;

/// Asset store failures
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No source for the asset
    #[error("asset {0} not found")]
    NotFound(AssetId),

    /// Asset id cannot be used as a storage key
    #[error("invalid asset id {0:?}")]
    InvalidId(String),

    /// Filesystem failure
    #[error("io error at {}: {source}", .path.display())]
    Io {
        /// Path being accessed
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Metadata did not (de)serialize
    #[error("metadata for {asset} is malformed: {source}")]
    Meta {
        /// Asset the metadata belongs to
        asset: AssetId,
        /// Underlying error
        #[source]
        source: serde_json::Error,
    },
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Swap space failures
#[derive(Debug, thiserror::Error)]
pub enum SwapError {
    /// A handle for this asset is already outstanding
    #[error("asset {0} is already open in swap space")]
    AlreadyOpen(AssetId),

    /// Reading or writing the source failed
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Source did not decode, or the table did not encode
    #[error("asset {asset}: {source}")]
    Table {
        /// Asset being opened or committed
        asset: AssetId,
        /// Underlying error
        #[source]
        source: TableError,
    },
}

impl SwapError {
    /// Is this a misuse of the swap space API?
    #[inline]
    #[must_use]
    pub fn is_contract_violation(&self) -> bool {
        matches!(self, Self::AlreadyOpen(_))
    }
}

/// Failure importing one asset
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    /// No registered importer accepts the document
    #[error("no importer for asset {0}")]
    NoImporter(AssetId),

    /// Metadata names an importer that is not registered
    #[error("asset {asset} was imported by unknown importer {importer:?}")]
    UnknownImporter {
        /// Asset
        asset: AssetId,
        /// Recorded importer name
        importer: String,
    },

    /// Swap space failure
    #[error(transparent)]
    Swap(#[from] SwapError),

    /// Store failure
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Object table failure
    #[error("asset {asset}: {source}")]
    Table {
        /// Asset being imported
        asset: AssetId,
        /// Underlying error
        #[source]
        source: TableError,
    },

    /// Migration chain failed; the asset is marked invalid
    #[error("asset {asset}: {source}")]
    Migration {
        /// Asset being imported
        asset: AssetId,
        /// Underlying error
        #[source]
        source: MigrationError,
    },

    /// Document-level reconciliation failure
    #[error("asset {asset}: {source}")]
    Reconcile {
        /// Asset being imported
        asset: AssetId,
        /// Underlying error
        #[source]
        source: ReconcileError,
    },

    /// Scheduler contract failure, or the import task was cancelled
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
}

impl ImportError {
    /// Does this error invalidate the asset (recorded in its metadata)?
    #[inline]
    #[must_use]
    pub fn is_asset_fatal(&self) -> bool {
        match self {
            Self::Migration { source, .. } => source.is_asset_fatal(),
            Self::Reconcile { .. } | Self::Table { .. } => true,
            _ => false,
        }
    }

    /// Was the import abandoned rather than failed?
    #[inline]
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Scheduler(SchedulerError::Cancelled))
    }

    /// Recover the typed error from a failed scheduler task
    pub(crate) fn from_task(err: SchedulerError) -> Self {
        match err {
            SchedulerError::TaskFailed(inner) => match inner.downcast::<Self>() {
                Ok(err) => err,
                Err(other) => Self::Scheduler(SchedulerError::TaskFailed(other)),
            },
            other => Self::Scheduler(other),
        }
    }
}

/// Configuration loading failures
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("cannot read config {}: {source}", .path.display())]
    Io {
        /// Config path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Config did not parse
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Top-level error
#[derive(Debug, thiserror::Error)]
pub enum ForgeError {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// An asset failed to import
    #[error("import failed: {0}")]
    Import(#[from] ImportError),

    /// Store error outside any single import
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Importer declaration error
    #[error("importer declaration error: {0}")]
    Declaration(#[from] MigrationError),

    /// Object table error
    #[error("table error: {0}")]
    Table(#[from] TableError),
}

/// Result alias for imports
pub type ImportResult<T> = Result<T, ImportError>;
