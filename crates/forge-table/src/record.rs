//! Record kinds
//!
//! The table is a closed sum of the record kinds the pipeline understands
//! plus [`Opaque`] for everything else, so any tag written by an older schema
//! still decodes and round-trips.

use crate::local_id::LocalIdPath;
use crate::slot::{Slot, SlotKind, SlotRef};
use crate::value::{AssetRef, Fields, Value};

/// Wire type tags
pub mod tags {
    /// Prefab document wrapper
    pub const PREFAB: &str = "cc.Prefab";
    /// Scene document wrapper
    pub const SCENE_ASSET: &str = "cc.SceneAsset";
    /// Plain node
    pub const NODE: &str = "cc.Node";
    /// Scene root node
    pub const SCENE: &str = "cc.Scene";
    /// Node prefab link
    pub const PREFAB_INFO: &str = "cc.PrefabInfo";
    /// Component prefab link
    pub const COMP_PREFAB_INFO: &str = "cc.CompPrefabInfo";
    /// Override storage of one instance
    pub const PREFAB_INSTANCE: &str = "cc.PrefabInstance";
    /// Value-level override
    pub const PROPERTY_OVERRIDE: &str = "CCPropertyOverrideInfo";
    /// Local-id path holder
    pub const TARGET_INFO: &str = "cc.TargetInfo";
    /// Cross-instance reference override
    pub const TARGET_OVERRIDE: &str = "cc.TargetOverrideInfo";
    /// Extra children of an instance
    pub const MOUNTED_CHILDREN: &str = "cc.MountedChildrenInfo";
    /// Extra components of an instance
    pub const MOUNTED_COMPONENTS: &str = "cc.MountedComponentsInfo";
    /// Provenance marker left on disconnected instances
    pub const PREFAB_LINK: &str = "cc.PrefabLink";
}

/// One entry of an object table
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    /// Document wrapper (slot 0)
    Document(Document),
    /// Scene-graph node
    Node(Node),
    /// Component attached to a node
    Component(Component),
    /// Node prefab link
    PrefabInfo(PrefabInfo),
    /// Component prefab link
    CompPrefabInfo(CompPrefabInfo),
    /// Override storage of one prefab instance
    PrefabInstance(PrefabInstance),
    /// Value-level override
    PropertyOverride(PropertyOverrideInfo),
    /// Local-id path holder
    TargetInfo(TargetInfo),
    /// Cross-instance reference override
    TargetOverride(TargetOverrideInfo),
    /// Extra children grouped by attachment point
    MountedChildren(MountedChildrenInfo),
    /// Extra components grouped by owning node
    MountedComponents(MountedComponentsInfo),
    /// Anything the pipeline does not model
    Opaque(Opaque),
}

impl Record {
    /// Wire type tag
    #[must_use]
    pub fn tag(&self) -> &str {
        match self {
            Self::Document(d) => &d.tag,
            Self::Node(n) => &n.tag,
            Self::Component(c) => &c.tag,
            Self::PrefabInfo(_) => tags::PREFAB_INFO,
            Self::CompPrefabInfo(_) => tags::COMP_PREFAB_INFO,
            Self::PrefabInstance(_) => tags::PREFAB_INSTANCE,
            Self::PropertyOverride(_) => tags::PROPERTY_OVERRIDE,
            Self::TargetInfo(_) => tags::TARGET_INFO,
            Self::TargetOverride(_) => tags::TARGET_OVERRIDE,
            Self::MountedChildren(_) => tags::MOUNTED_CHILDREN,
            Self::MountedComponents(_) => tags::MOUNTED_COMPONENTS,
            Self::Opaque(o) => o.tag.as_deref().unwrap_or(""),
        }
    }

    /// Kind name used in diagnostics
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Document(_) => DocumentKind::NAME,
            Self::Node(_) => NodeKind::NAME,
            Self::Component(_) => ComponentKind::NAME,
            Self::PrefabInfo(_) => PrefabInfoKind::NAME,
            Self::CompPrefabInfo(_) => CompPrefabInfoKind::NAME,
            Self::PrefabInstance(_) => InstanceKind::NAME,
            Self::PropertyOverride(_) => PropertyOverrideKind::NAME,
            Self::TargetInfo(_) => TargetInfoKind::NAME,
            Self::TargetOverride(_) => TargetOverrideKind::NAME,
            Self::MountedChildren(_) => MountedChildrenKind::NAME,
            Self::MountedComponents(_) => MountedComponentsKind::NAME,
            Self::Opaque(_) => "opaque",
        }
    }

    /// Visit every outgoing slot reference
    pub fn visit_refs(&self, f: &mut dyn FnMut(SlotRef)) {
        fn opt<K>(slot: Option<Slot<K>>, f: &mut dyn FnMut(SlotRef)) {
            if let Some(slot) = slot {
                f(slot.erase());
            }
        }
        fn all<K>(slots: &[Slot<K>], f: &mut dyn FnMut(SlotRef)) {
            slots.iter().for_each(|s| f(s.erase()));
        }
        fn fields(fields: &Fields, f: &mut dyn FnMut(SlotRef)) {
            fields.values().for_each(|v| v.visit_refs(f));
        }

        match self {
            Self::Document(d) => {
                opt(d.data, f);
                fields(&d.extra, f);
            }
            Self::Node(n) => {
                opt(n.parent, f);
                all(&n.children, f);
                all(&n.components, f);
                opt(n.prefab, f);
                fields(&n.props, f);
            }
            Self::Component(c) => {
                opt(c.node, f);
                opt(c.prefab, f);
                fields(&c.fields, f);
            }
            Self::PrefabInfo(p) => {
                opt(p.root, f);
                if let Some(AssetLink::Own(slot)) = &p.asset {
                    f(*slot);
                }
                opt(p.instance, f);
                all(&p.nested_instance_roots, f);
                all(&p.target_overrides, f);
                fields(&p.extra, f);
            }
            Self::CompPrefabInfo(c) => fields(&c.extra, f),
            Self::PrefabInstance(i) => {
                opt(i.prefab_root_node, f);
                all(&i.property_overrides, f);
                all(&i.mounted_children, f);
                all(&i.mounted_components, f);
                all(&i.removed_components, f);
                fields(&i.extra, f);
            }
            Self::PropertyOverride(p) => {
                opt(p.target_info, f);
                p.value.visit_refs(f);
                fields(&p.extra, f);
            }
            Self::TargetInfo(t) => fields(&t.extra, f),
            Self::TargetOverride(t) => {
                if let Some(source) = t.source {
                    f(source);
                }
                opt(t.source_info, f);
                opt(t.target, f);
                opt(t.target_info, f);
                fields(&t.extra, f);
            }
            Self::MountedChildren(m) => {
                opt(m.target_info, f);
                all(&m.nodes, f);
                fields(&m.extra, f);
            }
            Self::MountedComponents(m) => {
                opt(m.target_info, f);
                all(&m.components, f);
                fields(&m.extra, f);
            }
            Self::Opaque(o) => fields(&o.fields, f),
        }
    }

    /// Visit every outgoing slot reference mutably
    pub fn visit_refs_mut(&mut self, f: &mut dyn FnMut(&mut SlotRef)) {
        fn opt<K>(slot: &mut Option<Slot<K>>, f: &mut dyn FnMut(&mut SlotRef)) {
            if let Some(slot) = slot {
                f(slot.raw_mut());
            }
        }
        fn all<K>(slots: &mut [Slot<K>], f: &mut dyn FnMut(&mut SlotRef)) {
            slots.iter_mut().for_each(|s| f(s.raw_mut()));
        }
        fn fields(fields: &mut Fields, f: &mut dyn FnMut(&mut SlotRef)) {
            fields.values_mut().for_each(|v| v.visit_refs_mut(f));
        }

        match self {
            Self::Document(d) => {
                opt(&mut d.data, f);
                fields(&mut d.extra, f);
            }
            Self::Node(n) => {
                opt(&mut n.parent, f);
                all(&mut n.children, f);
                all(&mut n.components, f);
                opt(&mut n.prefab, f);
                fields(&mut n.props, f);
            }
            Self::Component(c) => {
                opt(&mut c.node, f);
                opt(&mut c.prefab, f);
                fields(&mut c.fields, f);
            }
            Self::PrefabInfo(p) => {
                opt(&mut p.root, f);
                if let Some(AssetLink::Own(slot)) = &mut p.asset {
                    f(slot);
                }
                opt(&mut p.instance, f);
                all(&mut p.nested_instance_roots, f);
                all(&mut p.target_overrides, f);
                fields(&mut p.extra, f);
            }
            Self::CompPrefabInfo(c) => fields(&mut c.extra, f),
            Self::PrefabInstance(i) => {
                opt(&mut i.prefab_root_node, f);
                all(&mut i.property_overrides, f);
                all(&mut i.mounted_children, f);
                all(&mut i.mounted_components, f);
                all(&mut i.removed_components, f);
                fields(&mut i.extra, f);
            }
            Self::PropertyOverride(p) => {
                opt(&mut p.target_info, f);
                p.value.visit_refs_mut(f);
                fields(&mut p.extra, f);
            }
            Self::TargetInfo(t) => fields(&mut t.extra, f),
            Self::TargetOverride(t) => {
                if let Some(source) = &mut t.source {
                    f(source);
                }
                opt(&mut t.source_info, f);
                opt(&mut t.target, f);
                opt(&mut t.target_info, f);
                fields(&mut t.extra, f);
            }
            Self::MountedChildren(m) => {
                opt(&mut m.target_info, f);
                all(&mut m.nodes, f);
                fields(&mut m.extra, f);
            }
            Self::MountedComponents(m) => {
                opt(&mut m.target_info, f);
                all(&mut m.components, f);
                fields(&mut m.extra, f);
            }
            Self::Opaque(o) => fields(&mut o.fields, f),
        }
    }
}

/// Document wrapper
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// `cc.Prefab` or `cc.SceneAsset`
    pub tag: String,
    /// The node this document represents
    pub data: Option<NodeRef>,
    /// Unmodelled fields
    pub extra: Fields,
}

impl Document {
    /// Prefab document wrapper
    #[must_use]
    pub fn prefab(name: &str) -> Self {
        Self::with_tag(tags::PREFAB, name)
    }

    /// Scene document wrapper
    #[must_use]
    pub fn scene(name: &str) -> Self {
        Self::with_tag(tags::SCENE_ASSET, name)
    }

    fn with_tag(tag: &str, name: &str) -> Self {
        let mut extra = Fields::new();
        extra.insert("_name".to_string(), Value::from(name));
        Self {
            tag: tag.to_string(),
            data: None,
            extra,
        }
    }

    /// Is this a prefab document?
    #[must_use]
    pub fn is_prefab(&self) -> bool {
        self.tag == tags::PREFAB
    }
}

/// Scene-graph node
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    /// `cc.Node` or `cc.Scene`
    pub tag: String,
    /// `_name`
    pub name: String,
    /// `_active`
    pub active: bool,
    /// `_parent`
    pub parent: Option<NodeRef>,
    /// `_children`, in order
    pub children: Vec<NodeRef>,
    /// `_components`, in order
    pub components: Vec<ComponentRef>,
    /// `_prefab`
    pub prefab: Option<PrefabInfoRef>,
    /// `_id`
    pub id: String,
    /// Remaining properties (transform, layer, flags, ...)
    pub props: Fields,
}

impl Node {
    /// Fresh active node
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            tag: tags::NODE.to_string(),
            name: name.into(),
            active: true,
            parent: None,
            children: Vec::new(),
            components: Vec::new(),
            prefab: None,
            id: String::new(),
            props: Fields::new(),
        }
    }

    /// Read a property by wire key, including the modelled `_name`/`_active`
    #[must_use]
    pub fn prop(&self, key: &str) -> Option<Value> {
        match key {
            "_name" => Some(Value::String(self.name.clone())),
            "_active" => Some(Value::Bool(self.active)),
            _ => self.props.get(key).cloned(),
        }
    }

    /// Write a property by wire key; returns false if the value does not fit
    pub fn set_prop(&mut self, key: &str, value: Value) -> bool {
        match (key, value) {
            ("_name", Value::String(name)) => {
                self.name = name;
                true
            }
            ("_active", Value::Bool(active)) => {
                self.active = active;
                true
            }
            ("_name" | "_active", _) => false,
            (key, value) => {
                self.props.insert(key.to_string(), value);
                true
            }
        }
    }
}

/// Component attached to a node
#[derive(Debug, Clone, PartialEq)]
pub struct Component {
    /// Component type tag (`cc.Sprite`, ...)
    pub tag: String,
    /// Owning node
    pub node: Option<NodeRef>,
    /// `__prefab` link
    pub prefab: Option<CompPrefabInfoRef>,
    /// `_id`
    pub id: String,
    /// Remaining fields
    pub fields: Fields,
}

impl Component {
    /// Fresh component on `node`
    #[must_use]
    pub fn new(tag: impl Into<String>, node: NodeRef) -> Self {
        let mut fields = Fields::new();
        fields.insert("_name".to_string(), Value::from(""));
        fields.insert("_objFlags".to_string(), Value::int(0));
        fields.insert("_enabled".to_string(), Value::Bool(true));
        Self {
            tag: tag.into(),
            node: Some(node),
            prefab: None,
            id: String::new(),
            fields,
        }
    }

    /// Builder-style field insertion
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.fields.insert(key.into(), value);
        self
    }
}

/// Where a prefab link points
#[derive(Debug, Clone, PartialEq)]
pub enum AssetLink {
    /// This document is the base prefab (a reference to the document slot)
    Own(SlotRef),
    /// Another prefab asset
    External(AssetRef),
}

impl AssetLink {
    /// External asset reference, if any
    #[must_use]
    pub fn external(&self) -> Option<&AssetRef> {
        match self {
            Self::External(asset) => Some(asset),
            Self::Own(_) => None,
        }
    }
}

/// Node prefab link
#[derive(Debug, Clone, PartialEq)]
pub struct PrefabInfo {
    /// Root node of the prefab occurrence this node belongs to
    pub root: Option<NodeRef>,
    /// Base prefab
    pub asset: Option<AssetLink>,
    /// Stable id within the base prefab
    pub file_id: String,
    /// Override storage (only on instance roots that need reconciliation)
    pub instance: Option<InstanceRef>,
    /// Auto-synced mirror of the base prefab
    pub sync: bool,
    /// Instance roots nested in this document (document root only)
    pub nested_instance_roots: Vec<NodeRef>,
    /// Cross-instance reference overrides (document root only)
    pub target_overrides: Vec<TargetOverrideRef>,
    /// Unmodelled fields
    pub extra: Fields,
}

impl PrefabInfo {
    /// Link with no instance data
    #[must_use]
    pub fn new(root: NodeRef, asset: AssetLink, file_id: impl Into<String>) -> Self {
        Self {
            root: Some(root),
            asset: Some(asset),
            file_id: file_id.into(),
            instance: None,
            sync: false,
            nested_instance_roots: Vec::new(),
            target_overrides: Vec::new(),
            extra: Fields::new(),
        }
    }
}

/// Component prefab link
#[derive(Debug, Clone, PartialEq)]
pub struct CompPrefabInfo {
    /// Stable id within the defining prefab
    pub file_id: String,
    /// Unmodelled fields
    pub extra: Fields,
}

impl CompPrefabInfo {
    /// New link
    #[must_use]
    pub fn new(file_id: impl Into<String>) -> Self {
        Self {
            file_id: file_id.into(),
            extra: Fields::new(),
        }
    }
}

/// Override storage of one prefab instance
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PrefabInstance {
    /// Locally-unique id of this instance
    pub file_id: String,
    /// The instance root node
    pub prefab_root_node: Option<NodeRef>,
    /// Value-level overrides
    pub property_overrides: Vec<PropertyOverrideRef>,
    /// Extra children grouped by attachment point
    pub mounted_children: Vec<MountedChildrenRef>,
    /// Extra components grouped by owning node
    pub mounted_components: Vec<MountedComponentsRef>,
    /// Base components deleted on this instance
    pub removed_components: Vec<TargetInfoRef>,
    /// Unmodelled fields
    pub extra: Fields,
}

/// Value-level override
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyOverrideInfo {
    /// Overridden element
    pub target_info: Option<TargetInfoRef>,
    /// Field (and index) being overridden
    pub property_path: Vec<String>,
    /// Override value
    pub value: Value,
    /// Unmodelled fields
    pub extra: Fields,
}

/// Local-id path holder
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TargetInfo {
    /// `localID`
    pub local_id: LocalIdPath,
    /// Unmodelled fields
    pub extra: Fields,
}

impl TargetInfo {
    /// New holder
    #[must_use]
    pub fn new(local_id: LocalIdPath) -> Self {
        Self {
            local_id,
            extra: Fields::new(),
        }
    }
}

/// Cross-instance reference override
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TargetOverrideInfo {
    /// Source component, or the instance root enclosing it
    pub source: Option<SlotRef>,
    /// Path of the source component below `source` when it is an instance root
    pub source_info: Option<TargetInfoRef>,
    /// Field (and index) on the source component
    pub property_path: Vec<String>,
    /// Root of the instance holding the referenced element
    pub target: Option<NodeRef>,
    /// Path of the referenced element below `target`
    pub target_info: Option<TargetInfoRef>,
    /// Unmodelled fields
    pub extra: Fields,
}

/// Extra children grouped by attachment point
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MountedChildrenInfo {
    /// Attachment node
    pub target_info: Option<TargetInfoRef>,
    /// Mounted nodes
    pub nodes: Vec<NodeRef>,
    /// Unmodelled fields
    pub extra: Fields,
}

/// Extra components grouped by owning node
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MountedComponentsInfo {
    /// Owning node
    pub target_info: Option<TargetInfoRef>,
    /// Mounted components
    pub components: Vec<ComponentRef>,
    /// Unmodelled fields
    pub extra: Fields,
}

/// Record the pipeline does not model
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Opaque {
    /// `__type__`, if present
    pub tag: Option<String>,
    /// All other fields
    pub fields: Fields,
}

macro_rules! slot_kinds {
    ($($(#[$doc:meta])* $kind:ident => $variant:ident($target:ty), $name:literal;)*) => {$(
        $(#[$doc])*
        #[derive(Debug)]
        pub enum $kind {}

        impl SlotKind for $kind {
            type Target = $target;
            const NAME: &'static str = $name;

            #[inline]
            fn project(record: &Record) -> Option<&$target> {
                match record {
                    Record::$variant(target) => Some(target),
                    _ => None,
                }
            }

            #[inline]
            fn project_mut(record: &mut Record) -> Option<&mut $target> {
                match record {
                    Record::$variant(target) => Some(target),
                    _ => None,
                }
            }

            #[inline]
            fn wrap(target: $target) -> Record {
                Record::$variant(target)
            }
        }
    )*};
}

slot_kinds! {
    /// Document wrapper kind
    DocumentKind => Document(Document), "document";
    /// Node kind
    NodeKind => Node(Node), "node";
    /// Component kind
    ComponentKind => Component(Component), "component";
    /// Node prefab link kind
    PrefabInfoKind => PrefabInfo(PrefabInfo), "prefab-info";
    /// Component prefab link kind
    CompPrefabInfoKind => CompPrefabInfo(CompPrefabInfo), "comp-prefab-info";
    /// Prefab instance kind
    InstanceKind => PrefabInstance(PrefabInstance), "prefab-instance";
    /// Property override kind
    PropertyOverrideKind => PropertyOverride(PropertyOverrideInfo), "property-override";
    /// Target info kind
    TargetInfoKind => TargetInfo(TargetInfo), "target-info";
    /// Target override kind
    TargetOverrideKind => TargetOverride(TargetOverrideInfo), "target-override";
    /// Mounted children kind
    MountedChildrenKind => MountedChildren(MountedChildrenInfo), "mounted-children";
    /// Mounted components kind
    MountedComponentsKind => MountedComponents(MountedComponentsInfo), "mounted-components";
}

/// Reference to the document wrapper
pub type DocumentRef = Slot<DocumentKind>;
/// Reference to a node
pub type NodeRef = Slot<NodeKind>;
/// Reference to a component
pub type ComponentRef = Slot<ComponentKind>;
/// Reference to a node prefab link
pub type PrefabInfoRef = Slot<PrefabInfoKind>;
/// Reference to a component prefab link
pub type CompPrefabInfoRef = Slot<CompPrefabInfoKind>;
/// Reference to a prefab instance
pub type InstanceRef = Slot<InstanceKind>;
/// Reference to a property override
pub type PropertyOverrideRef = Slot<PropertyOverrideKind>;
/// Reference to a target info
pub type TargetInfoRef = Slot<TargetInfoKind>;
/// Reference to a target override
pub type TargetOverrideRef = Slot<TargetOverrideKind>;
/// Reference to a mounted-children group
pub type MountedChildrenRef = Slot<MountedChildrenKind>;
/// Reference to a mounted-components group
pub type MountedComponentsRef = Slot<MountedComponentsKind>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_prop_covers_modelled_fields() {
        let mut node = Node::new("a");
        assert_eq!(node.prop("_name"), Some(Value::from("a")));
        assert!(node.set_prop("_active", Value::Bool(false)));
        assert!(!node.active);
        assert!(!node.set_prop("_name", Value::int(3)));
        assert!(node.set_prop("_lpos", Value::vec3(1.0, 0.0, 0.0)));
        assert_eq!(node.prop("_lpos"), Some(Value::vec3(1.0, 0.0, 0.0)));
    }

    #[test]
    fn visits_typed_and_embedded_refs() {
        let mut node = Node::new("n");
        node.parent = Some(NodeRef::new(1));
        node.children = vec![NodeRef::new(2), NodeRef::new(3)];
        node.props.insert("_target".into(), Value::Ref(SlotRef::new(4)));
        let record = Record::Node(node);

        let mut seen = Vec::new();
        record.visit_refs(&mut |s| seen.push(s.raw()));
        seen.sort_unstable();
        assert_eq!(seen, vec![1, 2, 3, 4]);
    }

    #[test]
    fn own_asset_link_is_a_reference() {
        let info = PrefabInfo::new(NodeRef::new(1), AssetLink::Own(SlotRef::DOCUMENT), "root");
        let mut seen = Vec::new();
        Record::PrefabInfo(info).visit_refs(&mut |s| seen.push(s.raw()));
        assert_eq!(seen, vec![1, 0]);
    }

    #[test]
    fn kinds_project() {
        let record = NodeKind::wrap(Node::new("x"));
        assert!(NodeKind::project(&record).is_some());
        assert!(ComponentKind::project(&record).is_none());
        assert_eq!(record.kind_name(), "node");
    }
}
