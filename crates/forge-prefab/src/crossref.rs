//! Cross-instance references
//!
//! A component field that points inside a different prefab instance cannot
//! be stored as a slot reference, because the referenced element belongs to
//! another prefab's definition. Such fields are nulled and described by a
//! `TargetOverrideInfo` on the document root, addressed by local-id paths on
//! both ends.

use crate::diff::is_ignored_field;
use crate::error::ReconcileResult;
use crate::locate::{prefab_info, PathIndex};
use forge_table::{
    ComponentKind, ComponentRef, Fields, LocalIdPath, NodeKind, NodeRef, ObjectTable, SlotRef,
    TargetOverrideInfo, Value,
};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Which connected instance every element belongs to
#[derive(Debug, Default)]
pub struct Membership {
    owner: HashMap<SlotRef, NodeRef>,
    indexes: HashMap<NodeRef, PathIndex>,
}

impl Membership {
    /// Map every node and component under the given instance roots
    ///
    /// A later root claims the elements it shares with an earlier one, so
    /// with outer roots listed first each element maps to its innermost
    /// instance.
    #[must_use]
    pub fn build(table: &ObjectTable, roots: &[NodeRef]) -> Self {
        let mut membership = Self::default();
        for root in roots {
            for node in table.subtree(*root) {
                membership.owner.insert(node.erase(), *root);
                if let Ok(n) = table.resolve(node) {
                    for comp in &n.components {
                        membership.owner.insert(comp.erase(), *root);
                    }
                }
            }
            membership
                .indexes
                .insert(*root, PathIndex::build(table, *root));
        }
        membership
    }

    /// Innermost connected instance holding `slot`
    #[must_use]
    pub fn root_of(&self, slot: SlotRef) -> Option<NodeRef> {
        self.owner.get(&slot).copied()
    }

    /// Path index of the instance at `root`
    #[must_use]
    pub fn index(&self, root: NodeRef) -> Option<&PathIndex> {
        self.indexes.get(&root)
    }

    fn path(&self, root: NodeRef, slot: SlotRef) -> Option<&LocalIdPath> {
        self.index(root)?.path(slot)
    }
}

/// One target override the pass should leave in the document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetOverridePlan {
    /// Component holding the field
    pub component: ComponentRef,
    /// Instance root enclosing the component, or the component itself
    pub source: SlotRef,
    /// Path of the component below `source` when `source` is an instance root
    pub source_info: Option<LocalIdPath>,
    /// Field name, plus the array index for element references
    pub property_path: Vec<String>,
    /// Root of the instance holding the referenced element
    pub target: NodeRef,
    /// Path of the referenced element below `target`
    pub target_info: LocalIdPath,
}

impl TargetOverridePlan {
    /// Identity used to match existing override records
    #[must_use]
    pub fn key(&self) -> (SlotRef, Option<&LocalIdPath>, &[String]) {
        (self.source, self.source_info.as_ref(), &self.property_path)
    }

    /// `(field, index)` this override covers on its component
    #[must_use]
    pub fn covered_field(&self) -> (String, Option<usize>) {
        let field = self.property_path.first().cloned().unwrap_or_default();
        let index = self.property_path.get(1).and_then(|i| i.parse().ok());
        (field, index)
    }
}

/// Find every component field referencing into a different connected instance
#[must_use]
pub fn plan_target_overrides(
    table: &ObjectTable,
    doc_root: NodeRef,
    membership: &Membership,
) -> Vec<TargetOverridePlan> {
    let mut plans = Vec::new();
    for node in table.subtree(doc_root) {
        let Ok(n) = table.resolve(node) else {
            continue;
        };
        for comp in &n.components {
            let Ok(c) = table.resolve(*comp) else {
                continue;
            };
            for (field, value) in &c.fields {
                if is_ignored_field(field) {
                    continue;
                }
                match value {
                    Value::Ref(target) => {
                        if let Some(plan) = plan_one(membership, *comp, vec![field.clone()], *target) {
                            plans.push(plan);
                        }
                    }
                    Value::Array(items) => {
                        for (i, item) in items.iter().enumerate() {
                            let Value::Ref(target) = item else {
                                continue;
                            };
                            let path = vec![field.clone(), i.to_string()];
                            if let Some(plan) = plan_one(membership, *comp, path, *target) {
                                plans.push(plan);
                            }
                        }
                    }
                    _ => {}
                }
            }
        }
    }
    plans
}

fn plan_one(
    membership: &Membership,
    component: ComponentRef,
    property_path: Vec<String>,
    target: SlotRef,
) -> Option<TargetOverridePlan> {
    let target_root = membership.root_of(target)?;
    let source_root = membership.root_of(component.erase());
    if source_root == Some(target_root) {
        return None;
    }
    let Some(target_info) = membership.path(target_root, target).cloned() else {
        debug!(%component, %target, "reference into an unaddressable element kept as-is");
        return None;
    };
    let (source, source_info) = match source_root
        .and_then(|root| membership.path(root, component.erase()).map(|p| (root, p)))
    {
        Some((root, path)) => (root.erase(), Some(path.clone())),
        None => (component.erase(), None),
    };
    Some(TargetOverridePlan {
        component,
        source,
        source_info,
        property_path,
        target: target_root,
        target_info,
    })
}

/// Group covered fields by component
#[must_use]
pub(crate) fn covered_fields(
    plans: &[TargetOverridePlan],
) -> HashMap<ComponentRef, Vec<(String, Option<usize>)>> {
    let mut covered: HashMap<ComponentRef, Vec<(String, Option<usize>)>> = HashMap::new();
    for plan in plans {
        covered
            .entry(plan.component)
            .or_default()
            .push(plan.covered_field());
    }
    covered
}

/// Field value at `path` (`[field]` or `[field, index]`)
#[must_use]
pub fn field_at<'a>(fields: &'a Fields, path: &[String]) -> Option<&'a Value> {
    match path {
        [field] => fields.get(field),
        [field, index] => match fields.get(field)? {
            Value::Array(items) => items.get(index.parse::<usize>().ok()?),
            _ => None,
        },
        _ => None,
    }
}

/// Write `value` at `path`, growing arrays as needed; false if the path does not fit
pub(crate) fn set_field(fields: &mut Fields, path: &[String], value: Value) -> bool {
    match path {
        [field] => {
            fields.insert(field.clone(), value);
            true
        }
        [field, index] => {
            let Ok(index) = index.parse::<usize>() else {
                return false;
            };
            let slot = fields
                .entry(field.clone())
                .or_insert_with(|| Value::Array(Vec::new()));
            if slot.is_null() {
                *slot = Value::Array(Vec::new());
            }
            let Value::Array(items) = slot else {
                return false;
            };
            if items.len() <= index {
                items.resize(index + 1, Value::Null);
            }
            items[index] = value;
            true
        }
        _ => false,
    }
}

/// Re-link every field nulled by a target override in this document
///
/// Returns the number of overrides resolved. Overrides whose source or
/// target no longer exists are skipped with a warning.
///
/// # Errors
/// Returns error if the document has no root node
pub fn resolve_target_overrides(table: &mut ObjectTable) -> ReconcileResult<usize> {
    let doc_root = table.root_node()?;
    let Some(info) = prefab_info(table, doc_root) else {
        return Ok(0);
    };
    let overrides = info.target_overrides.clone();
    let mut indexes: HashMap<NodeRef, PathIndex> = HashMap::new();
    let mut resolved = 0;

    for to_ref in overrides {
        let Ok(to) = table.resolve(to_ref).cloned() else {
            warn!(slot = %to_ref, "target override slot does not resolve");
            continue;
        };
        let Some(component) = locate_source(table, &to, &mut indexes) else {
            warn!(slot = %to_ref, "target override source is gone");
            continue;
        };
        let Some(target) = locate_target(table, &to, &mut indexes) else {
            warn!(slot = %to_ref, "target override target is gone");
            continue;
        };
        let comp = table.resolve_mut(component)?;
        if set_field(&mut comp.fields, &to.property_path, Value::Ref(target)) {
            resolved += 1;
        }
    }
    Ok(resolved)
}

fn lookup(
    table: &ObjectTable,
    indexes: &mut HashMap<NodeRef, PathIndex>,
    root: NodeRef,
    path: &LocalIdPath,
) -> Option<SlotRef> {
    indexes
        .entry(root)
        .or_insert_with(|| PathIndex::build(table, root))
        .slot(path)
}

fn locate_source(
    table: &ObjectTable,
    to: &TargetOverrideInfo,
    indexes: &mut HashMap<NodeRef, PathIndex>,
) -> Option<ComponentRef> {
    let source = to.source?;
    let slot = match to.source_info {
        Some(info) => {
            let path = &table.resolve(info).ok()?.local_id;
            let root = table.try_typed::<NodeKind>(source)?;
            lookup(table, indexes, root, path)?
        }
        None => source,
    };
    table.try_typed::<ComponentKind>(slot)
}

fn locate_target(
    table: &ObjectTable,
    to: &TargetOverrideInfo,
    indexes: &mut HashMap<NodeRef, PathIndex>,
) -> Option<SlotRef> {
    let root = to.target?;
    let path = &table.resolve(to.target_info?).ok()?.local_id;
    lookup(table, indexes, root, path)
}
