//! Wire codec
//!
//! Decodes the JSON array form into [`Record`]s and back. Unknown tags decode
//! to [`Record::Opaque`]; unknown fields on known kinds are kept in order.

use crate::error::{TableError, TableResult};
use crate::local_id::LocalIdPath;
use crate::record::{
    tags, AssetLink, CompPrefabInfo, Component, Document, MountedChildrenInfo,
    MountedComponentsInfo, Node, Opaque, PrefabInfo, PrefabInstance, PropertyOverrideInfo,
    Record, TargetInfo, TargetOverrideInfo,
};
use crate::slot::{Slot, SlotKind, SlotRef};
use crate::value::{fields_json, slot_json, Fields, Value, TYPE_KEY};
use serde_json::Map;

/// Decode one wire entry at `slot`
///
/// # Errors
/// Returns [`TableError::Malformed`] if a known kind has a field of the wrong shape
pub fn decode_record(slot: SlotRef, json: serde_json::Value) -> TableResult<Record> {
    let serde_json::Value::Object(map) = json else {
        return Err(TableError::Malformed {
            slot,
            kind: "record",
            field: TYPE_KEY,
            problem: "entry is not an object",
        });
    };
    let mut fields: Fields = map
        .into_iter()
        .map(|(k, v)| (k, Value::from_json(v)))
        .collect();
    let tag = match fields.shift_remove(TYPE_KEY) {
        Some(Value::String(tag)) => Some(tag),
        None => None,
        Some(_) => {
            return Err(TableError::Malformed {
                slot,
                kind: "record",
                field: TYPE_KEY,
                problem: "is not a string",
            })
        }
    };
    let Some(tag) = tag else {
        return Ok(Record::Opaque(Opaque { tag: None, fields }));
    };

    let mut r = Reader {
        slot,
        kind: "record",
        fields,
    };
    let record = match tag.as_str() {
        tags::PREFAB | tags::SCENE_ASSET => {
            r.kind = "document";
            Record::Document(Document {
                data: r.opt_slot("data")?,
                extra: r.rest(),
                tag,
            })
        }
        tags::NODE | tags::SCENE => {
            r.kind = "node";
            Record::Node(Node {
                name: r.string("_name")?.unwrap_or_default(),
                active: r.bool("_active")?.unwrap_or(true),
                parent: r.opt_slot("_parent")?,
                children: r.slots("_children")?,
                components: r.slots("_components")?,
                prefab: r.opt_slot("_prefab")?,
                id: r.string("_id")?.unwrap_or_default(),
                props: r.rest(),
                tag,
            })
        }
        tags::PREFAB_INFO => {
            r.kind = "prefab-info";
            Record::PrefabInfo(PrefabInfo {
                root: r.opt_slot("root")?,
                asset: r.asset_link("asset")?,
                file_id: r.string("fileId")?.unwrap_or_default(),
                instance: r.opt_slot("instance")?,
                sync: r.bool("sync")?.unwrap_or(false),
                nested_instance_roots: r.slots("nestedPrefabInstanceRoots")?,
                target_overrides: r.slots("targetOverrides")?,
                extra: r.rest(),
            })
        }
        tags::COMP_PREFAB_INFO => {
            r.kind = "comp-prefab-info";
            Record::CompPrefabInfo(CompPrefabInfo {
                file_id: r.string("fileId")?.unwrap_or_default(),
                extra: r.rest(),
            })
        }
        tags::PREFAB_INSTANCE => {
            r.kind = "prefab-instance";
            Record::PrefabInstance(PrefabInstance {
                file_id: r.string("fileId")?.unwrap_or_default(),
                prefab_root_node: r.opt_slot("prefabRootNode")?,
                property_overrides: r.slots("propertyOverrides")?,
                mounted_children: r.slots("mountedChildren")?,
                mounted_components: r.slots("mountedComponents")?,
                removed_components: r.slots("removedComponents")?,
                extra: r.rest(),
            })
        }
        tags::PROPERTY_OVERRIDE => {
            r.kind = "property-override";
            Record::PropertyOverride(PropertyOverrideInfo {
                target_info: r.opt_slot("targetInfo")?,
                property_path: r.strings("propertyPath")?,
                value: r.value("value"),
                extra: r.rest(),
            })
        }
        tags::TARGET_INFO => {
            r.kind = "target-info";
            Record::TargetInfo(TargetInfo {
                local_id: r.local_id("localID")?,
                extra: r.rest(),
            })
        }
        tags::TARGET_OVERRIDE => {
            r.kind = "target-override";
            Record::TargetOverride(TargetOverrideInfo {
                source: r.opt_ref("source")?,
                source_info: r.opt_slot("sourceInfo")?,
                property_path: r.strings("propertyPath")?,
                target: r.opt_slot("target")?,
                target_info: r.opt_slot("targetInfo")?,
                extra: r.rest(),
            })
        }
        tags::MOUNTED_CHILDREN => {
            r.kind = "mounted-children";
            Record::MountedChildren(MountedChildrenInfo {
                target_info: r.opt_slot("targetInfo")?,
                nodes: r.slots("nodes")?,
                extra: r.rest(),
            })
        }
        tags::MOUNTED_COMPONENTS => {
            r.kind = "mounted-components";
            Record::MountedComponents(MountedComponentsInfo {
                target_info: r.opt_slot("targetInfo")?,
                components: r.slots("components")?,
                extra: r.rest(),
            })
        }
        _ if is_component_shape(&r.fields) => {
            r.kind = "component";
            Record::Component(Component {
                node: r.opt_slot("node")?,
                prefab: r.opt_slot("__prefab")?,
                id: r.string("_id")?.unwrap_or_default(),
                fields: r.rest(),
                tag,
            })
        }
        _ => Record::Opaque(Opaque {
            tag: Some(tag),
            fields: r.rest(),
        }),
    };
    Ok(record)
}

/// Components are recognised by shape: a `node` back-reference or a prefab link
fn is_component_shape(fields: &Fields) -> bool {
    matches!(fields.get("node"), Some(Value::Ref(_))) || fields.contains_key("__prefab")
}

/// Encode one record
#[must_use]
pub fn encode_record(record: &Record) -> serde_json::Value {
    let mut w = Writer::default();
    match record {
        Record::Document(d) => {
            w.str(TYPE_KEY, &d.tag);
            w.opt_slot("data", d.data);
            w.rest(&d.extra);
        }
        Record::Node(n) => {
            w.str(TYPE_KEY, &n.tag);
            w.str("_name", &n.name);
            w.opt_slot("_parent", n.parent);
            w.slots("_children", &n.children);
            w.put("_active", serde_json::Value::Bool(n.active));
            w.slots("_components", &n.components);
            w.opt_slot("_prefab", n.prefab);
            w.rest(&n.props);
            w.str("_id", &n.id);
        }
        Record::Component(c) => {
            w.str(TYPE_KEY, &c.tag);
            w.opt_slot("node", c.node);
            w.opt_slot("__prefab", c.prefab);
            w.rest(&c.fields);
            w.str("_id", &c.id);
        }
        Record::PrefabInfo(p) => {
            w.str(TYPE_KEY, tags::PREFAB_INFO);
            w.opt_slot("root", p.root);
            let asset = match &p.asset {
                Some(AssetLink::Own(slot)) => slot_json(*slot),
                Some(AssetLink::External(asset)) => Value::Asset(asset.clone()).to_json(),
                None => serde_json::Value::Null,
            };
            w.put("asset", asset);
            w.str("fileId", &p.file_id);
            w.opt_slot("instance", p.instance);
            w.slots("targetOverrides", &p.target_overrides);
            w.slots("nestedPrefabInstanceRoots", &p.nested_instance_roots);
            if p.sync {
                w.put("sync", serde_json::Value::Bool(true));
            }
            w.rest(&p.extra);
        }
        Record::CompPrefabInfo(c) => {
            w.str(TYPE_KEY, tags::COMP_PREFAB_INFO);
            w.str("fileId", &c.file_id);
            w.rest(&c.extra);
        }
        Record::PrefabInstance(i) => {
            w.str(TYPE_KEY, tags::PREFAB_INSTANCE);
            w.str("fileId", &i.file_id);
            w.opt_slot("prefabRootNode", i.prefab_root_node);
            w.slots("mountedChildren", &i.mounted_children);
            w.slots("mountedComponents", &i.mounted_components);
            w.slots("propertyOverrides", &i.property_overrides);
            w.slots("removedComponents", &i.removed_components);
            w.rest(&i.extra);
        }
        Record::PropertyOverride(p) => {
            w.str(TYPE_KEY, tags::PROPERTY_OVERRIDE);
            w.opt_slot("targetInfo", p.target_info);
            w.strings("propertyPath", &p.property_path);
            w.put("value", p.value.to_json());
            w.rest(&p.extra);
        }
        Record::TargetInfo(t) => {
            w.str(TYPE_KEY, tags::TARGET_INFO);
            w.put("localID", t.local_id.to_value().to_json());
            w.rest(&t.extra);
        }
        Record::TargetOverride(t) => {
            w.str(TYPE_KEY, tags::TARGET_OVERRIDE);
            w.put("source", t.source.map_or(serde_json::Value::Null, slot_json));
            w.opt_slot("sourceInfo", t.source_info);
            w.strings("propertyPath", &t.property_path);
            w.opt_slot("target", t.target);
            w.opt_slot("targetInfo", t.target_info);
            w.rest(&t.extra);
        }
        Record::MountedChildren(m) => {
            w.str(TYPE_KEY, tags::MOUNTED_CHILDREN);
            w.opt_slot("targetInfo", m.target_info);
            w.slots("nodes", &m.nodes);
            w.rest(&m.extra);
        }
        Record::MountedComponents(m) => {
            w.str(TYPE_KEY, tags::MOUNTED_COMPONENTS);
            w.opt_slot("targetInfo", m.target_info);
            w.slots("components", &m.components);
            w.rest(&m.extra);
        }
        Record::Opaque(o) => {
            if let Some(tag) = &o.tag {
                w.str(TYPE_KEY, tag);
            }
            w.rest(&o.fields);
        }
    }
    serde_json::Value::Object(w.map)
}

struct Reader {
    slot: SlotRef,
    kind: &'static str,
    fields: Fields,
}

impl Reader {
    fn malformed(&self, field: &'static str, problem: &'static str) -> TableError {
        TableError::Malformed {
            slot: self.slot,
            kind: self.kind,
            field,
            problem,
        }
    }

    fn take(&mut self, key: &str) -> Option<Value> {
        self.fields.shift_remove(key)
    }

    fn opt_ref(&mut self, key: &'static str) -> TableResult<Option<SlotRef>> {
        match self.take(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Ref(slot)) => Ok(Some(slot)),
            Some(_) => Err(self.malformed(key, "is not a slot reference")),
        }
    }

    fn opt_slot<K: SlotKind>(&mut self, key: &'static str) -> TableResult<Option<Slot<K>>> {
        Ok(self.opt_ref(key)?.map(SlotRef::typed))
    }

    fn slots<K: SlotKind>(&mut self, key: &'static str) -> TableResult<Vec<Slot<K>>> {
        match self.take(key) {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| {
                    item.as_ref_slot()
                        .map(SlotRef::typed)
                        .ok_or_else(|| self.malformed(key, "contains a non-reference"))
                })
                .collect(),
            Some(_) => Err(self.malformed(key, "is not an array")),
        }
    }

    fn string(&mut self, key: &'static str) -> TableResult<Option<String>> {
        match self.take(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(s)),
            Some(_) => Err(self.malformed(key, "is not a string")),
        }
    }

    fn strings(&mut self, key: &'static str) -> TableResult<Vec<String>> {
        match self.take(key) {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(Value::Array(items)) => items
                .into_iter()
                .map(|item| match item {
                    Value::String(s) => Ok(s),
                    Value::Number(n) => Ok(n.to_string()),
                    _ => Err(self.malformed(key, "contains a non-string")),
                })
                .collect(),
            Some(_) => Err(self.malformed(key, "is not an array")),
        }
    }

    fn bool(&mut self, key: &'static str) -> TableResult<Option<bool>> {
        match self.take(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Bool(b)) => Ok(Some(b)),
            Some(_) => Err(self.malformed(key, "is not a boolean")),
        }
    }

    fn value(&mut self, key: &str) -> Value {
        self.take(key).unwrap_or(Value::Null)
    }

    fn local_id(&mut self, key: &'static str) -> TableResult<LocalIdPath> {
        let value = self.value(key);
        LocalIdPath::from_value(&value).ok_or_else(|| self.malformed(key, "is not a local-id path"))
    }

    fn asset_link(&mut self, key: &'static str) -> TableResult<Option<AssetLink>> {
        match self.take(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Ref(slot)) => Ok(Some(AssetLink::Own(slot))),
            Some(Value::Asset(asset)) => Ok(Some(AssetLink::External(asset))),
            Some(_) => Err(self.malformed(key, "is not an asset or slot reference")),
        }
    }

    fn rest(&mut self) -> Fields {
        std::mem::take(&mut self.fields)
    }
}

#[derive(Default)]
struct Writer {
    map: Map<String, serde_json::Value>,
}

impl Writer {
    fn put(&mut self, key: &str, value: serde_json::Value) {
        self.map.insert(key.to_string(), value);
    }

    fn str(&mut self, key: &str, value: &str) {
        self.put(key, serde_json::Value::String(value.to_string()));
    }

    fn strings(&mut self, key: &str, values: &[String]) {
        self.put(
            key,
            serde_json::Value::Array(
                values
                    .iter()
                    .cloned()
                    .map(serde_json::Value::String)
                    .collect(),
            ),
        );
    }

    fn opt_slot<K>(&mut self, key: &str, slot: Option<Slot<K>>) {
        let json = slot.map_or(serde_json::Value::Null, |s| slot_json(s.erase()));
        self.put(key, json);
    }

    fn slots<K>(&mut self, key: &str, slots: &[Slot<K>]) {
        self.put(
            key,
            serde_json::Value::Array(slots.iter().map(|s| slot_json(s.erase())).collect()),
        );
    }

    fn rest(&mut self, fields: &Fields) {
        if let serde_json::Value::Object(map) = fields_json(fields) {
            self.map.extend(map);
        }
    }
}
