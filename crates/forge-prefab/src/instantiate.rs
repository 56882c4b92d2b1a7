//! Placing a base prefab into a document

use crate::crossref::resolve_target_overrides;
use crate::error::ReconcileResult;
use forge_table::{rewrite, AssetLink, AssetRef, NodeRef, ObjectTable, Record, SlotRef};
use std::collections::{BTreeSet, HashMap, VecDeque};
use tracing::debug;

/// Copy the base prefab's root subtree under `parent`
///
/// Every record reachable from the base root is appended once. Links to the
/// base document itself become links to `asset`, nested instances keep their
/// own ids, and the new root has no override storage until it is reconciled.
///
/// # Errors
/// Returns error if the base has no root node or `parent` is not a node
pub fn instantiate(
    table: &mut ObjectTable,
    parent: NodeRef,
    base: &ObjectTable,
    asset: &AssetRef,
) -> ReconcileResult<NodeRef> {
    table.resolve(parent)?;

    let mut base = base.clone();
    resolve_target_overrides(&mut base)?;
    let base_root = base.root_node()?;
    if let Some(link) = base.resolve(base_root)?.prefab {
        let info = base.resolve_mut(link)?;
        info.nested_instance_roots.clear();
        info.target_overrides.clear();
    }

    let reached = reachable_from(&base, base_root);
    let offset = table.len();
    let map: HashMap<SlotRef, SlotRef> = reached
        .iter()
        .enumerate()
        .filter_map(|(i, old)| {
            u32::try_from(offset + i)
                .ok()
                .map(|new| (*old, SlotRef::new(new)))
        })
        .collect();

    for old in &reached {
        let mut record = base.record(*old)?.clone();
        if let Record::PrefabInfo(info) = &mut record {
            if matches!(info.asset, Some(AssetLink::Own(_))) {
                info.asset = Some(AssetLink::External(asset.clone()));
            }
        }
        record.visit_refs_mut(&mut |slot| {
            if let Some(new) = map.get(slot) {
                *slot = *new;
            }
        });
        rewrite::append_record(table, record);
    }

    let root: NodeRef = map
        .get(&base_root.erase())
        .copied()
        .map(SlotRef::typed)
        .ok_or(forge_table::TableError::MissingRoot)?;
    table.resolve_mut(root)?.parent = Some(parent);
    table.resolve_mut(parent)?.children.push(root);
    debug!(asset = %asset.uuid, %root, records = reached.len(), "instantiated prefab");
    Ok(root)
}

/// Slots reachable from `root` without passing through the document wrapper
fn reachable_from(table: &ObjectTable, root: NodeRef) -> BTreeSet<SlotRef> {
    let mut seen = BTreeSet::from([root.erase()]);
    let mut queue = VecDeque::from([root.erase()]);
    while let Some(slot) = queue.pop_front() {
        let Some(record) = table.get(slot) else {
            continue;
        };
        record.visit_refs(&mut |to| {
            if to != SlotRef::DOCUMENT && to.index() < table.len() && seen.insert(to) {
                queue.push_back(to);
            }
        });
    }
    seen
}
