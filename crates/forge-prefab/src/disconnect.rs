//! Disconnection fallback
//!
//! An instance that cannot be reconciled is turned into plain nodes: every
//! prefab link under it is stripped, except inside nested instances that are
//! still auto-synced and inside mounted instances reconciled on their own.
//! The stripped link records become unreachable and are removed by the next
//! compaction.

use crate::error::ReconcileResult;
use crate::locate::prefab_info;
use forge_table::{AssetRef, Component, ComponentKind, NodeRef, Rewriter, Value};
use std::collections::BTreeSet;

/// Field of the marker component naming the former prefab
pub const MARKER_FIELD: &str = "prefab";

/// Strip prefab linkage under `root` and optionally mark it
///
/// Returns the number of links removed. With `marker` set, the root gets (or
/// keeps, updated) a component of that type whose [`MARKER_FIELD`] names the
/// prefab the root used to instantiate. Subtrees rooted at a node in `keep`
/// are left linked.
///
/// # Errors
/// Returns error if a node or component in the subtree does not resolve
pub fn restore_to_normal(
    rw: &mut Rewriter<'_>,
    root: NodeRef,
    marker: Option<&str>,
    keep: &BTreeSet<NodeRef>,
) -> ReconcileResult<usize> {
    let asset: Option<AssetRef> = prefab_info(rw.table(), root)
        .and_then(|info| info.asset.as_ref())
        .and_then(|a| a.external())
        .cloned();

    let mut stripped = 0;
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if node != root && (keep.contains(&node) || is_synced_occurrence(rw, node)) {
            continue;
        }
        let n = rw.table_mut().resolve_mut(node)?;
        if n.prefab.take().is_some() {
            stripped += 1;
        }
        let components = n.components.clone();
        stack.extend(n.children.iter().rev().copied());
        for comp in components {
            if rw.table_mut().resolve_mut(comp)?.prefab.take().is_some() {
                stripped += 1;
            }
        }
    }

    if let (Some(tag), Some(asset)) = (marker, asset) {
        mark(rw, root, tag, asset)?;
    }
    Ok(stripped)
}

fn is_synced_occurrence(rw: &Rewriter<'_>, node: NodeRef) -> bool {
    prefab_info(rw.table(), node).is_some_and(|info| info.sync && info.root == Some(node))
}

fn mark(rw: &mut Rewriter<'_>, root: NodeRef, tag: &str, asset: AssetRef) -> ReconcileResult<()> {
    let existing = rw
        .table()
        .resolve(root)?
        .components
        .iter()
        .copied()
        .find(|c| rw.table().resolve(*c).is_ok_and(|c| c.tag == tag));
    match existing {
        Some(comp) => {
            rw.edit(comp, |c| {
                c.fields.insert(MARKER_FIELD.to_string(), Value::Asset(asset));
            })?;
        }
        None => {
            let marker = Component::new(tag, root).with_field(MARKER_FIELD, Value::Asset(asset));
            let comp = rw.append::<ComponentKind>(marker);
            rw.link(root, comp, |n| &mut n.components)?;
        }
    }
    Ok(())
}
