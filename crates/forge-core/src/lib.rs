//! Forge Core - the asset import pipeline
//!
//! Ties the workspace together:
//! - Reads sources from an [`AssetStore`] into exclusive [`SwapSpace`] handles
//! - Brings them up to date with each [`Importer`]'s migration chain
//! - Reconciles prefab instances against cached base prefabs
//! - Orders imports per asset and across dependencies on the scheduler
//!
//! # Example
//!
//! ```rust,ignore
//! use forge_core::{MemoryStore, Pipeline, PipelineConfig};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = MemoryStore::new();
//! store.insert_source("hero", hero_json);
//! let pipeline = Pipeline::new(Arc::new(store), PipelineConfig::default())?;
//! let outcome = pipeline.import("hero".into()).await?;
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]

pub mod config;
pub mod error;
pub mod importer;
pub mod meta;
pub mod pipeline;
pub mod store;
pub mod swap;

pub use config::PipelineConfig;
pub use error::{ConfigError, ForgeError, ImportError, ImportResult, StoreError, SwapError};
pub use importer::{builtin_chain, DocumentImporter, Importer, ImporterRegistry, DOCUMENT_VERSION};
pub use meta::AssetMeta;
pub use pipeline::{ImportOutcome, ImportSummary, Pipeline, ReconcileSummary};
pub use store::{AssetStore, FsStore, MemoryStore};
pub use swap::{SwapHandle, SwapSpace};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
