//! Pipeline configuration

use crate::error::ConfigError;
use forge_prefab::ReconcileOptions;
use forge_table::tags;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Import pipeline settings
///
/// Loaded from TOML; every key is optional.
///
/// ```toml
/// library_dir = "library"
/// compact_after_reconcile = true
/// prefab_link_marker = "cc.PrefabLink"
/// verify_integrity = true
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Where artifacts and metadata are written, relative to the asset root
    pub library_dir: PathBuf,
    /// Compact tables after reconciliation
    pub compact_after_reconcile: bool,
    /// Marker component left on disconnected instances; omit to leave none
    pub prefab_link_marker: Option<String>,
    /// Verify reference integrity after reconciliation
    pub verify_integrity: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            library_dir: PathBuf::from("library"),
            compact_after_reconcile: true,
            prefab_link_marker: Some(tags::PREFAB_LINK.to_string()),
            verify_integrity: true,
        }
    }
}

impl PipelineConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With library directory
    #[inline]
    #[must_use]
    pub fn with_library_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.library_dir = dir.into();
        self
    }

    /// With compaction after reconciliation
    #[inline]
    #[must_use]
    pub fn with_compaction(mut self, compact: bool) -> Self {
        self.compact_after_reconcile = compact;
        self
    }

    /// With disconnection marker
    #[inline]
    #[must_use]
    pub fn with_prefab_link_marker(mut self, marker: Option<String>) -> Self {
        self.prefab_link_marker = marker;
        self
    }

    /// With integrity verification
    #[inline]
    #[must_use]
    pub fn with_verification(mut self, verify: bool) -> Self {
        self.verify_integrity = verify;
        self
    }

    /// Parse TOML
    ///
    /// # Errors
    /// Returns [`ConfigError::Parse`] on malformed TOML or unknown value types
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    /// Read and parse a TOML file
    ///
    /// # Errors
    /// Returns error if the file cannot be read or does not parse
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Reconciliation switches for this configuration
    #[must_use]
    pub fn to_reconcile_options(&self) -> ReconcileOptions {
        ReconcileOptions::default()
            .with_compact(self.compact_after_reconcile)
            .with_verify(self.verify_integrity)
            .with_marker(self.prefab_link_marker.clone())
    }
}
