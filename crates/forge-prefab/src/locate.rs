//! Local-id addressing
//!
//! Every node inside a prefab occurrence carries a `PrefabInfo` whose `root`
//! names the occurrence it belongs to. Walking from an element's occurrence
//! up to the instance boundary collects the nested instance ids that make up
//! its [`LocalIdPath`].

use crate::error::{ReconcileError, ReconcileResult};
use forge_table::{
    ComponentRef, LocalIdPath, NodeRef, ObjectTable, PrefabInfo, SlotRef,
};
use std::collections::HashMap;

/// Prefab link of `node`, if it has a resolvable one
#[must_use]
pub(crate) fn prefab_info(table: &ObjectTable, node: NodeRef) -> Option<&PrefabInfo> {
    let link = table.resolve(node).ok()?.prefab?;
    table.resolve(link).ok()
}

/// Root of the prefab occurrence `node` belongs to
#[must_use]
pub fn occurrence_root(table: &ObjectTable, node: NodeRef) -> Option<NodeRef> {
    prefab_info(table, node)?.root
}

/// Segment a nested occurrence contributes to paths below it
///
/// The `PrefabInstance.fileId` when the occurrence has override storage,
/// otherwise its own `PrefabInfo.fileId`.
#[must_use]
pub(crate) fn instance_segment(table: &ObjectTable, root: NodeRef) -> Option<String> {
    let info = prefab_info(table, root)?;
    let from_instance = info
        .instance
        .and_then(|i| table.resolve(i).ok())
        .map(|i| i.file_id.as_str())
        .filter(|id| !id.is_empty());
    from_instance
        .or_else(|| Some(info.file_id.as_str()).filter(|id| !id.is_empty()))
        .map(str::to_string)
}

fn unaddressable(slot: SlotRef, reason: &'static str) -> ReconcileError {
    ReconcileError::Unaddressable { slot, reason }
}

/// Nested instance segments from `boundary` (exclusive) down to `occurrence`
fn enclosing(
    table: &ObjectTable,
    boundary: NodeRef,
    occurrence: NodeRef,
    element: SlotRef,
) -> ReconcileResult<Vec<String>> {
    let mut segments = Vec::new();
    let mut current = occurrence;
    for _ in 0..=table.len() {
        if current == boundary {
            segments.reverse();
            return Ok(segments);
        }
        let segment = instance_segment(table, current)
            .ok_or_else(|| unaddressable(current.erase(), "nested instance has no file id"))?;
        segments.push(segment);
        let parent = table
            .resolve(current)?
            .parent
            .ok_or_else(|| unaddressable(element, "not inside the instance"))?;
        current = occurrence_root(table, parent)
            .ok_or_else(|| unaddressable(element, "ancestor has no prefab link"))?;
    }
    Err(unaddressable(element, "prefab links form a loop"))
}

/// Path of `node` relative to the instance rooted at `boundary`
///
/// # Errors
/// Returns [`ReconcileError::Unaddressable`] if the node or an enclosing
/// nested instance lacks a file id
pub fn node_path(
    table: &ObjectTable,
    boundary: NodeRef,
    node: NodeRef,
) -> ReconcileResult<LocalIdPath> {
    let info = prefab_info(table, node).ok_or_else(|| unaddressable(node.erase(), "no prefab link"))?;
    if info.file_id.is_empty() {
        return Err(unaddressable(node.erase(), "empty file id"));
    }
    let occurrence = info
        .root
        .ok_or_else(|| unaddressable(node.erase(), "prefab link has no root"))?;
    let mut segments = enclosing(table, boundary, occurrence, node.erase())?;
    segments.push(info.file_id.clone());
    Ok(LocalIdPath::new(segments))
}

/// Path of `component` relative to the instance rooted at `boundary`
///
/// # Errors
/// Returns [`ReconcileError::Unaddressable`] if the component or its owner
/// has no stable id
pub fn component_path(
    table: &ObjectTable,
    boundary: NodeRef,
    component: ComponentRef,
) -> ReconcileResult<LocalIdPath> {
    let comp = table.resolve(component)?;
    let link = comp
        .prefab
        .ok_or_else(|| unaddressable(component.erase(), "no prefab link"))?;
    let file_id = &table.resolve(link)?.file_id;
    if file_id.is_empty() {
        return Err(unaddressable(component.erase(), "empty file id"));
    }
    let owner = comp
        .node
        .ok_or_else(|| unaddressable(component.erase(), "detached component"))?;
    let occurrence = occurrence_root(table, owner)
        .ok_or_else(|| unaddressable(component.erase(), "owner has no prefab link"))?;
    let mut segments = enclosing(table, boundary, occurrence, component.erase())?;
    segments.push(file_id.clone());
    Ok(LocalIdPath::new(segments))
}

/// Bidirectional slot/path map of one instance subtree
#[derive(Debug, Clone, Default)]
pub struct PathIndex {
    by_slot: HashMap<SlotRef, LocalIdPath>,
    by_path: HashMap<LocalIdPath, SlotRef>,
}

impl PathIndex {
    /// Index every addressable node and component under `boundary`
    ///
    /// Elements without stable ids (mounted nodes, mounted components) are
    /// left out.
    #[must_use]
    pub fn build(table: &ObjectTable, boundary: NodeRef) -> Self {
        let mut index = Self::default();
        for node in table.subtree(boundary) {
            if let Ok(path) = node_path(table, boundary, node) {
                index.insert(node.erase(), path);
            }
            let Ok(n) = table.resolve(node) else {
                continue;
            };
            for comp in &n.components {
                if let Ok(path) = component_path(table, boundary, *comp) {
                    index.insert(comp.erase(), path);
                }
            }
        }
        index
    }

    /// Record `slot` at `path`; the first element claiming a path keeps it
    pub fn insert(&mut self, slot: SlotRef, path: LocalIdPath) {
        self.by_path.entry(path.clone()).or_insert(slot);
        self.by_slot.insert(slot, path);
    }

    /// Path of `slot`
    #[must_use]
    pub fn path(&self, slot: SlotRef) -> Option<&LocalIdPath> {
        self.by_slot.get(&slot)
    }

    /// Element at `path`
    #[must_use]
    pub fn slot(&self, path: &LocalIdPath) -> Option<SlotRef> {
        self.by_path.get(path).copied()
    }

    /// Number of indexed elements
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_slot.len()
    }

    /// Is the index empty?
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_slot.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forge_table::{
        rewrite, AssetLink, AssetRef, CompPrefabInfo, CompPrefabInfoKind, Component,
        ComponentKind, Document, DocumentKind, InstanceKind, Node, NodeKind, PrefabInfoKind,
        PrefabInstance,
    };

    fn linked_node(
        table: &mut ObjectTable,
        name: &str,
        parent: Option<NodeRef>,
        root: Option<NodeRef>,
        file_id: &str,
        asset: &str,
    ) -> NodeRef {
        let node = rewrite::append::<NodeKind>(table, Node::new(name));
        let info = PrefabInfo::new(
            root.unwrap_or(node),
            AssetLink::External(AssetRef::prefab(asset)),
            file_id,
        );
        let info = rewrite::append::<PrefabInfoKind>(table, info);
        let n = table.resolve_mut(node).unwrap();
        n.prefab = Some(info);
        n.parent = parent;
        if let Some(parent) = parent {
            table.resolve_mut(parent).unwrap().children.push(node);
        }
        node
    }

    #[test]
    fn nested_paths_include_instance_ids() {
        let mut table = ObjectTable::new();
        rewrite::append::<DocumentKind>(&mut table, Document::scene("s"));
        let outer = linked_node(&mut table, "outer", None, None, "o-root", "P");
        let child = linked_node(&mut table, "child", Some(outer), Some(outer), "o-child", "P");
        let nested = linked_node(&mut table, "nested", Some(child), None, "q-root", "Q");
        let pi = rewrite::append::<InstanceKind>(
            &mut table,
            PrefabInstance {
                file_id: "inst-q".into(),
                ..PrefabInstance::default()
            },
        );
        let info = table.resolve(nested).unwrap().prefab.unwrap();
        table.resolve_mut(info).unwrap().instance = Some(pi);
        let leaf = linked_node(&mut table, "leaf", Some(nested), Some(nested), "q-leaf", "Q");

        let comp_link = rewrite::append::<CompPrefabInfoKind>(&mut table, CompPrefabInfo::new("q-sprite"));
        let mut sprite = Component::new("cc.Sprite", leaf);
        sprite.prefab = Some(comp_link);
        let sprite = rewrite::append::<ComponentKind>(&mut table, sprite);
        table.resolve_mut(leaf).unwrap().components.push(sprite);

        let path = |segs: &[&str]| LocalIdPath::new(segs.iter().map(|s| (*s).to_string()).collect());
        assert_eq!(node_path(&table, outer, outer).unwrap(), path(&["o-root"]));
        assert_eq!(node_path(&table, outer, child).unwrap(), path(&["o-child"]));
        assert_eq!(node_path(&table, outer, nested).unwrap(), path(&["inst-q", "q-root"]));
        assert_eq!(node_path(&table, outer, leaf).unwrap(), path(&["inst-q", "q-leaf"]));
        assert_eq!(
            component_path(&table, outer, sprite).unwrap(),
            path(&["inst-q", "q-sprite"])
        );
        // Relative to the nested instance itself
        assert_eq!(node_path(&table, nested, leaf).unwrap(), path(&["q-leaf"]));

        let index = PathIndex::build(&table, outer);
        assert_eq!(index.len(), 5);
        assert_eq!(index.slot(&path(&["inst-q", "q-sprite"])), Some(sprite.erase()));
    }

    #[test]
    fn plain_nodes_are_not_addressable() {
        let mut table = ObjectTable::new();
        rewrite::append::<DocumentKind>(&mut table, Document::scene("s"));
        let outer = linked_node(&mut table, "outer", None, None, "o-root", "P");
        let mounted = rewrite::append::<NodeKind>(&mut table, Node::new("mounted"));
        table.resolve_mut(mounted).unwrap().parent = Some(outer);
        table.resolve_mut(outer).unwrap().children.push(mounted);

        assert!(matches!(
            node_path(&table, outer, mounted),
            Err(ReconcileError::Unaddressable { .. })
        ));
        assert_eq!(PathIndex::build(&table, outer).len(), 1);
    }
}
