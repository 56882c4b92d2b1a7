//! Field values
//!
//! Every field of a record is a [`Value`]: a JSON primitive, an embedded
//! record, an asset reference, or a [`SlotRef`] into the same table.

use crate::slot::SlotRef;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number};
use std::fmt::{self, Display, Formatter};

/// Wire key of a slot reference
pub const REF_KEY: &str = "__id__";
/// Wire key of an asset reference
pub const UUID_KEY: &str = "__uuid__";
/// Wire key of an asset reference's expected type
pub const EXPECTED_TYPE_KEY: &str = "__expectedType__";
/// Wire key of a record's type tag
pub const TYPE_KEY: &str = "__type__";

/// Ordered field map; declaration order is preserved through decode/encode
pub type Fields = IndexMap<String, Value>;

/// Stable identity of an asset (its uuid)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetId(String);

impl AssetId {
    /// Wrap a uuid string
    #[inline]
    #[must_use]
    pub fn new(uuid: impl Into<String>) -> Self {
        Self(uuid.into())
    }

    /// The uuid string
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for AssetId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AssetId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for AssetId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Reference to another asset (`{"__uuid__": ..., "__expectedType__": ...}`)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AssetRef {
    /// Referenced asset
    pub uuid: AssetId,
    /// Declared type of the referenced asset, if recorded
    pub expected_type: Option<String>,
}

impl AssetRef {
    /// Reference to a prefab asset
    #[must_use]
    pub fn prefab(uuid: impl Into<AssetId>) -> Self {
        Self {
            uuid: uuid.into(),
            expected_type: Some("cc.Prefab".to_string()),
        }
    }
}

/// A field value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// JSON null
    Null,
    /// Boolean
    Bool(bool),
    /// Number, kept in its original JSON form
    Number(Number),
    /// String
    String(String),
    /// Array of values
    Array(Vec<Value>),
    /// Slot reference into the same table
    Ref(SlotRef),
    /// Reference to another asset
    Asset(AssetRef),
    /// Embedded nested record (its `__type__`, if any, stays in the map)
    Object(Fields),
}

impl Value {
    /// Decode from JSON
    #[must_use]
    pub fn from_json(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => Self::Number(n),
            serde_json::Value::String(s) => Self::String(s),
            serde_json::Value::Array(items) => {
                Self::Array(items.into_iter().map(Self::from_json).collect())
            }
            serde_json::Value::Object(map) => Self::from_json_object(map),
        }
    }

    fn from_json_object(map: Map<String, serde_json::Value>) -> Self {
        if map.len() == 1 {
            if let Some(index) = map.get(REF_KEY).and_then(serde_json::Value::as_u64) {
                if let Ok(index) = u32::try_from(index) {
                    return Self::Ref(SlotRef::new(index));
                }
            }
        }
        if let Some(uuid) = map.get(UUID_KEY).and_then(serde_json::Value::as_str) {
            let only_asset_keys = map
                .keys()
                .all(|k| k == UUID_KEY || k == EXPECTED_TYPE_KEY);
            if only_asset_keys {
                return Self::Asset(AssetRef {
                    uuid: AssetId::new(uuid),
                    expected_type: map
                        .get(EXPECTED_TYPE_KEY)
                        .and_then(serde_json::Value::as_str)
                        .map(str::to_string),
                });
            }
        }
        Self::Object(
            map.into_iter()
                .map(|(k, v)| (k, Self::from_json(v)))
                .collect(),
        )
    }

    /// Encode to JSON
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Number(n) => serde_json::Value::Number(n.clone()),
            Self::String(s) => serde_json::Value::String(s.clone()),
            Self::Array(items) => {
                serde_json::Value::Array(items.iter().map(Self::to_json).collect())
            }
            Self::Ref(slot) => slot_json(*slot),
            Self::Asset(asset) => {
                let mut map = Map::new();
                map.insert(
                    UUID_KEY.to_string(),
                    serde_json::Value::String(asset.uuid.as_str().to_string()),
                );
                if let Some(expected) = &asset.expected_type {
                    map.insert(
                        EXPECTED_TYPE_KEY.to_string(),
                        serde_json::Value::String(expected.clone()),
                    );
                }
                serde_json::Value::Object(map)
            }
            Self::Object(fields) => fields_json(fields),
        }
    }

    /// Integer shorthand
    #[must_use]
    pub fn int(n: i64) -> Self {
        Self::Number(Number::from(n))
    }

    /// Float shorthand; non-finite values become null
    #[must_use]
    pub fn float(n: f64) -> Self {
        Number::from_f64(n).map_or(Self::Null, Self::Number)
    }

    /// `{"__type__": "cc.Vec3", "x": .., "y": .., "z": ..}`
    #[must_use]
    pub fn vec3(x: f64, y: f64, z: f64) -> Self {
        let mut fields = Fields::new();
        fields.insert(TYPE_KEY.to_string(), Self::String("cc.Vec3".to_string()));
        fields.insert("x".to_string(), Self::float(x));
        fields.insert("y".to_string(), Self::float(y));
        fields.insert("z".to_string(), Self::float(z));
        Self::Object(fields)
    }

    /// Is this the JSON null?
    #[inline]
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Slot reference, if this is one
    #[inline]
    #[must_use]
    pub fn as_ref_slot(&self) -> Option<SlotRef> {
        match self {
            Self::Ref(slot) => Some(*slot),
            _ => None,
        }
    }

    /// String payload, if this is one
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Boolean payload, if this is one
    #[inline]
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Does this value (recursively) contain any slot reference?
    #[must_use]
    pub fn contains_ref(&self) -> bool {
        match self {
            Self::Ref(_) => true,
            Self::Array(items) => items.iter().any(Self::contains_ref),
            Self::Object(fields) => fields.values().any(Self::contains_ref),
            _ => false,
        }
    }

    /// Visit every slot reference
    pub fn visit_refs(&self, f: &mut dyn FnMut(SlotRef)) {
        match self {
            Self::Ref(slot) => f(*slot),
            Self::Array(items) => items.iter().for_each(|v| v.visit_refs(f)),
            Self::Object(fields) => fields.values().for_each(|v| v.visit_refs(f)),
            _ => {}
        }
    }

    /// Visit every slot reference mutably
    pub fn visit_refs_mut(&mut self, f: &mut dyn FnMut(&mut SlotRef)) {
        match self {
            Self::Ref(slot) => f(slot),
            Self::Array(items) => items.iter_mut().for_each(|v| v.visit_refs_mut(f)),
            Self::Object(fields) => fields.values_mut().for_each(|v| v.visit_refs_mut(f)),
            _ => {}
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<SlotRef> for Value {
    fn from(value: SlotRef) -> Self {
        Self::Ref(value)
    }
}

impl From<AssetRef> for Value {
    fn from(value: AssetRef) -> Self {
        Self::Asset(value)
    }
}

/// `{"__id__": n}`
#[must_use]
pub(crate) fn slot_json(slot: SlotRef) -> serde_json::Value {
    let mut map = Map::new();
    map.insert(REF_KEY.to_string(), serde_json::Value::from(slot.raw()));
    serde_json::Value::Object(map)
}

/// Encode a field map
#[must_use]
pub(crate) fn fields_json(fields: &Fields) -> serde_json::Value {
    serde_json::Value::Object(
        fields
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_slot_reference() {
        let value = Value::from_json(json!({"__id__": 4}));
        assert_eq!(value, Value::Ref(SlotRef::new(4)));
    }

    #[test]
    fn object_with_extra_keys_is_not_a_reference() {
        let value = Value::from_json(json!({"__id__": 4, "note": "x"}));
        assert!(matches!(value, Value::Object(_)));
    }

    #[test]
    fn decodes_asset_reference() {
        let value = Value::from_json(json!({"__uuid__": "abc", "__expectedType__": "cc.Prefab"}));
        assert_eq!(value, Value::Asset(AssetRef::prefab("abc")));
        assert_eq!(
            value.to_json(),
            json!({"__uuid__": "abc", "__expectedType__": "cc.Prefab"})
        );
    }

    #[test]
    fn nested_refs_are_visited() {
        let mut value = Value::from_json(json!([{"__id__": 1}, {"inner": [{"__id__": 2}]}, 3]));
        let mut seen = Vec::new();
        value.visit_refs(&mut |s| seen.push(s.raw()));
        assert_eq!(seen, vec![1, 2]);

        value.visit_refs_mut(&mut |s| *s = SlotRef::new(s.raw() + 10));
        assert_eq!(value.to_json(), json!([{"__id__": 11}, {"inner": [{"__id__": 12}]}, 3]));
    }

    #[test]
    fn field_maps_encode_slots_as_id_objects() {
        assert_eq!(slot_json(SlotRef::new(7)), json!({"__id__": 7}));
        let mut fields = Fields::new();
        fields.insert("target".to_string(), Value::Ref(SlotRef::new(3)));
        fields.insert("speed".to_string(), Value::from_json(json!(2.5)));
        assert_eq!(fields_json(&fields), json!({"target": {"__id__": 3}, "speed": 2.5}));
    }

    #[test]
    fn embedded_record_preserves_key_order() {
        let raw = json!({"__type__": "cc.Vec3", "x": 1, "y": 2, "z": 3});
        let value = Value::from_json(raw.clone());
        assert_eq!(serde_json::to_string(&value.to_json()).unwrap(), serde_json::to_string(&raw).unwrap());
    }
}
