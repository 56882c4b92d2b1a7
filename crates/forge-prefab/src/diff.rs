//! Property diffing between a live instance and its base
//!
//! Values are compared in a canonical JSON form: numbers compare by value and
//! slot references compare by the local-id path of their target, so slot
//! renumbering never produces an override.

use crate::locate::PathIndex;
use forge_table::{Component, Node, Value};
use serde_json::{json, Map, Number};

/// Node properties that instances may override
pub const BASE_PROPS: [&str; 7] = [
    "_name", "_active", "_lpos", "_lrot", "_lscale", "_euler", "_layer",
];

/// Component fields never turned into overrides
pub const IGNORED_COMPONENT_FIELDS: [&str; 5] = ["_name", "_objFlags", "node", "__prefab", "_id"];

/// Is `field` excluded from component diffing?
#[must_use]
pub(crate) fn is_ignored_field(field: &str) -> bool {
    IGNORED_COMPONENT_FIELDS.contains(&field)
}

/// Canonical comparison form of `value`
///
/// References to indexed elements become `{"$local": path}`, anything else
/// `{"$slot": n}`.
#[must_use]
pub fn canonical(value: &Value, index: &PathIndex) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Number(n) => n
            .as_f64()
            .and_then(Number::from_f64)
            .map_or_else(|| serde_json::Value::Number(n.clone()), serde_json::Value::Number),
        Value::String(s) => serde_json::Value::String(s.clone()),
        Value::Array(items) => {
            serde_json::Value::Array(items.iter().map(|v| canonical(v, index)).collect())
        }
        Value::Ref(slot) => match index.path(*slot) {
            Some(path) => json!({ "$local": path.to_string() }),
            None => json!({ "$slot": slot.raw() }),
        },
        Value::Asset(asset) => json!({ "$asset": asset.uuid.as_str() }),
        Value::Object(fields) => serde_json::Value::Object(
            fields
                .iter()
                .map(|(k, v)| (k.clone(), canonical(v, index)))
                .collect::<Map<_, _>>(),
        ),
    }
}

/// Do `live` and `base` mean the same thing?
#[must_use]
pub fn equivalent(live: &Value, live_index: &PathIndex, base: &Value, base_index: &PathIndex) -> bool {
    canonical(live, live_index) == canonical(base, base_index)
}

/// Overridable node properties whose live value differs from the base
///
/// Properties the live node does not carry are left alone.
#[must_use]
pub fn compare_base_props(
    live: &Node,
    base: &Node,
    live_index: &PathIndex,
    base_index: &PathIndex,
) -> Vec<(String, Value)> {
    BASE_PROPS
        .iter()
        .filter_map(|key| {
            let value = live.prop(key)?;
            let base_value = base.prop(key).unwrap_or(Value::Null);
            (!equivalent(&value, live_index, &base_value, base_index))
                .then(|| ((*key).to_string(), value))
        })
        .collect()
}

/// Component fields whose live value differs from the base
///
/// `covered` lists fields (with optional array index) owned by a target
/// override; a whole-field entry skips the field, indexed entries switch the
/// field to element-wise comparison that skips those elements.
#[must_use]
pub fn compare_component_props(
    live: &Component,
    base: &Component,
    covered: &[(String, Option<usize>)],
    live_index: &PathIndex,
    base_index: &PathIndex,
) -> Vec<(Vec<String>, Value)> {
    let mut out = Vec::new();
    for (key, value) in &live.fields {
        if is_ignored_field(key) || covered.iter().any(|(f, i)| f == key && i.is_none()) {
            continue;
        }
        let base_value = base.fields.get(key).cloned().unwrap_or(Value::Null);
        let skipped: Vec<usize> = covered
            .iter()
            .filter(|(f, _)| f == key)
            .filter_map(|(_, i)| *i)
            .collect();

        match value {
            Value::Array(items) if !skipped.is_empty() => {
                let base_items: &[Value] = match &base_value {
                    Value::Array(items) => items.as_slice(),
                    _ => &[],
                };
                for (i, item) in items.iter().enumerate() {
                    if skipped.contains(&i) {
                        continue;
                    }
                    let base_item = base_items.get(i).unwrap_or(&Value::Null);
                    if !equivalent(item, live_index, base_item, base_index) {
                        out.push((vec![key.clone(), i.to_string()], item.clone()));
                    }
                }
            }
            _ => {
                if !equivalent(value, live_index, &base_value, base_index) {
                    out.push((vec![key.clone()], value.clone()));
                }
            }
        }
    }
    out
}
