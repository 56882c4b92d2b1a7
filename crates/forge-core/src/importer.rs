//! Importers
//!
//! An [`Importer`] defines one asset type: its current schema version, the
//! migration chain that brings older sources up to it, and how the finished
//! table is serialized. The built-in [`DocumentImporter`]s handle prefab and
//! scene documents.

use forge_migrate::{MigrationChain, MigrationError, SchemaVersion};
use forge_table::{Document, Fields, NodeRef, ObjectTable, TableResult, Value, TYPE_KEY};
use std::fmt::Debug;
use std::sync::Arc;

/// Current schema version of the built-in document importers
pub const DOCUMENT_VERSION: &str = "1.1.0";

/// Asset type definition
pub trait Importer: Send + Sync + Debug {
    /// Unique importer name, recorded in asset metadata
    fn name(&self) -> &str;

    /// Schema version a fresh import is stamped with
    fn version(&self) -> &SchemaVersion;

    /// Steps from older schemas to [`version`](Self::version)
    fn migrations(&self) -> &MigrationChain;

    /// Does this importer handle `document`?
    fn accepts(&self, document: &Document) -> bool;

    /// Can the document contain prefab instances to reconcile?
    fn holds_prefab_instances(&self) -> bool {
        true
    }

    /// Is the imported table a base prefab other documents instantiate?
    fn outputs_base_prefab(&self) -> bool {
        false
    }

    /// Serialize the finished table into the artifact
    ///
    /// # Errors
    /// Returns error if the table does not encode
    fn emit(&self, table: &ObjectTable) -> TableResult<Vec<u8>> {
        table.encode()
    }

    /// Rebuild a base prefab table from a previously emitted artifact
    ///
    /// # Errors
    /// Returns error if the artifact does not decode
    fn load_base(&self, artifact: &[u8]) -> TableResult<ObjectTable> {
        ObjectTable::decode(artifact)
    }
}

/// Importer for `cc.Prefab` or `cc.SceneAsset` documents
#[derive(Debug, Clone)]
pub struct DocumentImporter {
    name: String,
    version: SchemaVersion,
    chain: MigrationChain,
    prefab: bool,
}

impl DocumentImporter {
    /// Importer with an explicit chain
    #[must_use]
    pub fn new(name: impl Into<String>, version: SchemaVersion, chain: MigrationChain, prefab: bool) -> Self {
        Self {
            name: name.into(),
            version,
            chain,
            prefab,
        }
    }

    /// Built-in prefab importer
    ///
    /// # Errors
    /// Returns error if the built-in chain is misdeclared
    pub fn prefab() -> Result<Self, MigrationError> {
        Ok(Self::new("prefab", DOCUMENT_VERSION.parse()?, builtin_chain()?, true))
    }

    /// Built-in scene importer
    ///
    /// # Errors
    /// Returns error if the built-in chain is misdeclared
    pub fn scene() -> Result<Self, MigrationError> {
        Ok(Self::new("scene", DOCUMENT_VERSION.parse()?, builtin_chain()?, false))
    }
}

impl Importer for DocumentImporter {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> &SchemaVersion {
        &self.version
    }

    fn migrations(&self) -> &MigrationChain {
        &self.chain
    }

    fn accepts(&self, document: &Document) -> bool {
        document.is_prefab() == self.prefab
    }

    fn outputs_base_prefab(&self) -> bool {
        self.prefab
    }
}

/// Registered importers, looked up by name or by document type
#[derive(Debug, Clone, Default)]
pub struct ImporterRegistry {
    importers: Vec<Arc<dyn Importer>>,
}

impl ImporterRegistry {
    /// Empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the prefab and scene importers
    ///
    /// # Errors
    /// Returns error if a built-in chain is misdeclared
    pub fn builtin() -> Result<Self, MigrationError> {
        Ok(Self::new()
            .with(Arc::new(DocumentImporter::prefab()?))
            .with(Arc::new(DocumentImporter::scene()?)))
    }

    /// Add `importer`, replacing any importer with the same name
    pub fn register(&mut self, importer: Arc<dyn Importer>) {
        self.importers.retain(|i| i.name() != importer.name());
        self.importers.push(importer);
    }

    /// Builder form of [`register`](Self::register)
    #[must_use]
    pub fn with(mut self, importer: Arc<dyn Importer>) -> Self {
        self.register(importer);
        self
    }

    /// Importer called `name`
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn Importer>> {
        self.importers.iter().find(|i| i.name() == name).cloned()
    }

    /// First importer accepting `document`
    #[must_use]
    pub fn for_document(&self, document: &Document) -> Option<Arc<dyn Importer>> {
        self.importers.iter().find(|i| i.accepts(document)).cloned()
    }

    /// Registered importers, in registration order
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Importer>> {
        self.importers.iter()
    }
}

/// Migrations shared by the document importers
///
/// # Errors
/// Returns error if a step is misdeclared
pub fn builtin_chain() -> Result<MigrationChain, MigrationError> {
    MigrationChain::new()
        .step("1.0.1", rename_transform_props)?
        .step("1.0.3", split_trs)
}

const RENAMES: [(&str, &str); 3] = [("_position", "_lpos"), ("_quat", "_lrot"), ("_scale", "_lscale")];

fn node_refs(table: &ObjectTable) -> Vec<NodeRef> {
    table.nodes().map(|(slot, _)| slot).collect()
}

/// 1.0.1: `_position`/`_quat`/`_scale` became `_lpos`/`_lrot`/`_lscale`
fn rename_transform_props(table: &mut ObjectTable) -> anyhow::Result<()> {
    for slot in node_refs(table) {
        let node = table.resolve_mut(slot)?;
        for (old, new) in RENAMES {
            let Some(value) = node.props.shift_remove(old) else {
                continue;
            };
            // An already-migrated value wins
            node.props.entry(new.to_string()).or_insert(value);
        }
    }
    Ok(())
}

/// 1.0.3: the packed `_trs` array was split into `_lpos`, `_lrot` and `_lscale`
fn split_trs(table: &mut ObjectTable) -> anyhow::Result<()> {
    for slot in node_refs(table) {
        let node = table.resolve_mut(slot)?;
        let Some(trs) = node.props.shift_remove("_trs") else {
            continue;
        };
        let [px, py, pz, qx, qy, qz, qw, sx, sy, sz] = trs_components(&trs)
            .ok_or_else(|| anyhow::anyhow!("node {slot} has a malformed _trs"))?;
        node.props.insert("_lpos".into(), Value::vec3(px, py, pz));
        node.props.insert("_lrot".into(), quat(qx, qy, qz, qw));
        node.props.insert("_lscale".into(), Value::vec3(sx, sy, sz));
    }
    Ok(())
}

/// Ten numbers, either a plain array or a `TypedArray` record
fn trs_components(trs: &Value) -> Option<[f64; 10]> {
    let items = match trs {
        Value::Array(items) => items,
        Value::Object(fields) => match fields.get("array")? {
            Value::Array(items) => items,
            _ => return None,
        },
        _ => return None,
    };
    let numbers: Vec<f64> = items
        .iter()
        .map(|v| match v {
            Value::Number(n) => n.as_f64(),
            _ => None,
        })
        .collect::<Option<_>>()?;
    numbers.try_into().ok()
}

fn quat(x: f64, y: f64, z: f64, w: f64) -> Value {
    let mut fields = Fields::new();
    fields.insert(TYPE_KEY.to_string(), Value::from("cc.Quat"));
    fields.insert("x".into(), Value::float(x));
    fields.insert("y".into(), Value::float(y));
    fields.insert("z".into(), Value::float(z));
    fields.insert("w".into(), Value::float(w));
    Value::Object(fields)
}
