//! Migration errors

use crate::version::{SchemaVersion, VersionError};

/// Errors declaring or running a migration chain
#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    /// A declared version does not parse
    #[error("invalid migration version: {0}")]
    Version(#[from] VersionError),

    /// Steps must be strictly ascending
    #[error("migration {version} declared after {previous}")]
    NotAscending {
        /// Last accepted step
        previous: SchemaVersion,
        /// Rejected step
        version: SchemaVersion,
    },

    /// The importer's current version is older than its own last migration
    #[error("importer version {current} is behind its last migration {latest}")]
    ImporterBehindChain {
        /// Importer's declared version
        current: SchemaVersion,
        /// Last step of the chain
        latest: SchemaVersion,
    },

    /// A step failed; the asset must not be committed
    #[error("migration {version} failed: {source}")]
    StepFailed {
        /// Failing step
        version: SchemaVersion,
        /// Underlying failure
        #[source]
        source: anyhow::Error,
    },
}

impl MigrationError {
    /// Does this error invalidate the asset being imported?
    #[inline]
    #[must_use]
    pub fn is_asset_fatal(&self) -> bool {
        matches!(self, Self::StepFailed { .. })
    }

    /// Is this a mistake in an importer's declaration rather than in an asset?
    #[inline]
    #[must_use]
    pub fn is_declaration_error(&self) -> bool {
        !self.is_asset_fatal()
    }
}
