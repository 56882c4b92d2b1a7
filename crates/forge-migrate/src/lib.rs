//! Forge migrations
//!
//! Version-gated schema migrations for object tables.
//!
//! An importer declares an ascending [`MigrationChain`]. When an asset that
//! was last imported at version `r` is imported again, every step newer than
//! `r` runs once, in order, and the asset is stamped with the importer's
//! current version. Assets that were never imported skip the chain entirely.
//!
//! # Example
//!
//! ```rust,ignore
//! let chain = MigrationChain::new()
//!     .step("1.0.1", rename_transform_fields)?
//!     .step_async("1.0.3", SplitLegacyTrs)?;
//!
//! let report = chain.run(&mut table, recorded.as_ref(), &"1.1.0".parse()?).await?;
//! if report.migrated() {
//!     swap.mark_migrated();
//! }
//! ```

mod chain;
mod error;
mod version;

pub use chain::{Migrate, MigrationChain, MigrationReport};
pub use error::MigrationError;
pub use version::{SchemaVersion, VersionError};
