//! Per-asset import metadata

use forge_migrate::{MigrationChain, SchemaVersion};
use forge_table::{AssetId, ContentHash};
use serde::{Deserialize, Serialize};

/// What the pipeline remembers about an asset between imports
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetMeta {
    /// Importer that last handled the asset
    pub importer: String,
    /// Schema version the stored source is at; `None` before the first import
    #[serde(default)]
    pub version: Option<SchemaVersion>,
    /// Hash of the source as last committed
    #[serde(default)]
    pub source_hash: Option<ContentHash>,
    /// The last import failed
    #[serde(default)]
    pub invalid: bool,
    /// Failure message of the last import
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Base prefabs the asset's instances depend on
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<AssetId>,
}

impl AssetMeta {
    /// Metadata for a fresh import by `importer`
    #[must_use]
    pub fn new(importer: impl Into<String>) -> Self {
        Self {
            importer: importer.into(),
            version: None,
            source_hash: None,
            invalid: false,
            error: None,
            dependencies: Vec::new(),
        }
    }

    /// With recorded version
    #[must_use]
    pub fn with_version(mut self, version: SchemaVersion) -> Self {
        self.version = Some(version);
        self
    }

    /// With source hash
    #[must_use]
    pub fn with_source_hash(mut self, hash: ContentHash) -> Self {
        self.source_hash = Some(hash);
        self
    }

    /// With dependencies
    #[must_use]
    pub fn with_dependencies(mut self, dependencies: Vec<AssetId>) -> Self {
        self.dependencies = dependencies;
        self
    }

    /// Mark the last import as failed, keeping the recorded version
    pub fn invalidate(&mut self, error: impl Into<String>) {
        self.invalid = true;
        self.error = Some(error.into());
    }

    /// Can an import by `importer` of a source hashing to `hash` be skipped?
    ///
    /// The recorded version must leave no step of `migrations` pending.
    #[must_use]
    pub fn is_up_to_date(&self, importer: &str, migrations: &MigrationChain, hash: &ContentHash) -> bool {
        !self.invalid
            && self.importer == importer
            && self
                .version
                .as_ref()
                .is_some_and(|v| migrations.pending(Some(v)).is_empty())
            && self.source_hash.as_ref() == Some(hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn up_to_date_needs_no_pending_steps_and_matching_hash() {
        let hash = ContentHash::compute(b"source");
        let chain = MigrationChain::new().step("1.0.1", |_| Ok(())).unwrap();
        let v = SchemaVersion::new(&[1, 0, 1]);
        let mut meta = AssetMeta::new("prefab")
            .with_version(v.clone())
            .with_source_hash(hash);
        assert!(meta.is_up_to_date("prefab", &chain, &hash));
        assert!(!meta.is_up_to_date("scene", &chain, &hash));
        assert!(!meta.is_up_to_date("prefab", &chain, &ContentHash::compute(b"edited")));

        let stale = meta.clone().with_version(SchemaVersion::new(&[1, 0, 0]));
        assert!(!stale.is_up_to_date("prefab", &chain, &hash));
        let unversioned = AssetMeta::new("prefab").with_source_hash(hash);
        assert!(!unversioned.is_up_to_date("prefab", &chain, &hash));

        meta.invalidate("migration 1.0.1 failed");
        assert!(!meta.is_up_to_date("prefab", &chain, &hash));
        assert_eq!(meta.version, Some(v));
    }

    #[test]
    fn serializes_as_json() {
        let meta = AssetMeta::new("scene").with_dependencies(vec![AssetId::new("p")]);
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["dependencies"], serde_json::json!(["p"]));
        assert!(json.get("error").is_none());
        let back: AssetMeta = serde_json::from_value(json).unwrap();
        assert_eq!(back, meta);
    }
}
