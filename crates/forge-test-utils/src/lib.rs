//! Testing utilities for the forge workspace
//!
//! Document builders and fixture prefabs shared by the integration tests.

#![allow(missing_docs)]

use forge_table::{
    rewrite, AssetLink, AssetRef, CompPrefabInfo, CompPrefabInfoKind, Component, ComponentKind,
    ComponentRef, Document, DocumentKind, Node, NodeKind, NodeRef, ObjectTable, PrefabInfo,
    PrefabInfoKind, SlotRef, Value,
};

/// Builds prefab and scene documents record by record
///
/// In a prefab document every node and component added through the builder
/// is linked to the document's own prefab, with its name as file id.
#[derive(Debug, Clone)]
pub struct TableBuilder {
    table: ObjectTable,
    root: NodeRef,
    prefab: bool,
}

impl TableBuilder {
    pub fn prefab(name: &str) -> Self {
        let mut table = ObjectTable::new();
        let doc = rewrite::append::<DocumentKind>(&mut table, Document::prefab(name));
        let root = rewrite::append::<NodeKind>(&mut table, Node::new(name));
        table.resolve_mut(doc).unwrap().data = Some(root);
        let mut builder = Self {
            table,
            root,
            prefab: true,
        };
        builder.link(root, name);
        builder
    }

    pub fn scene(name: &str) -> Self {
        let mut table = ObjectTable::new();
        let doc = rewrite::append::<DocumentKind>(&mut table, Document::scene(name));
        let mut node = Node::new(name);
        node.tag = forge_table::tags::SCENE.to_string();
        let root = rewrite::append::<NodeKind>(&mut table, node);
        table.resolve_mut(doc).unwrap().data = Some(root);
        Self {
            table,
            root,
            prefab: false,
        }
    }

    pub fn root(&self) -> NodeRef {
        self.root
    }

    fn link(&mut self, node: NodeRef, file_id: &str) {
        let info = PrefabInfo::new(self.root, AssetLink::Own(SlotRef::DOCUMENT), file_id);
        let info = rewrite::append::<PrefabInfoKind>(&mut self.table, info);
        self.table.resolve_mut(node).unwrap().prefab = Some(info);
    }

    /// Child node; linked to the document's prefab in prefab documents
    pub fn node(&mut self, parent: NodeRef, name: &str) -> NodeRef {
        let node = self.plain_node(parent, name);
        if self.prefab {
            self.link(node, name);
        }
        node
    }

    /// Child node without any prefab link
    pub fn plain_node(&mut self, parent: NodeRef, name: &str) -> NodeRef {
        let mut n = Node::new(name);
        n.parent = Some(parent);
        let node = rewrite::append::<NodeKind>(&mut self.table, n);
        self.table.resolve_mut(parent).unwrap().children.push(node);
        node
    }

    /// Component with extra fields; file id `<node name>/<tag>` in prefab documents
    pub fn component(&mut self, node: NodeRef, tag: &str, fields: &[(&str, Value)]) -> ComponentRef {
        let mut comp = Component::new(tag, node);
        for (key, value) in fields {
            comp.fields.insert((*key).to_string(), value.clone());
        }
        if self.prefab {
            let owner = self.table.resolve(node).unwrap().name.clone();
            let link = rewrite::append::<CompPrefabInfoKind>(
                &mut self.table,
                CompPrefabInfo::new(format!("{owner}/{tag}")),
            );
            comp.prefab = Some(link);
        }
        let comp = rewrite::append::<ComponentKind>(&mut self.table, comp);
        self.table.resolve_mut(node).unwrap().components.push(comp);
        comp
    }

    pub fn set_prop(&mut self, node: NodeRef, key: &str, value: Value) -> &mut Self {
        self.table.resolve_mut(node).unwrap().set_prop(key, value);
        self
    }

    pub fn set_field(&mut self, comp: ComponentRef, key: &str, value: Value) -> &mut Self {
        self.table
            .resolve_mut(comp)
            .unwrap()
            .fields
            .insert(key.to_string(), value);
        self
    }

    pub fn table(&self) -> &ObjectTable {
        &self.table
    }

    pub fn table_mut(&mut self) -> &mut ObjectTable {
        &mut self.table
    }

    pub fn build(self) -> ObjectTable {
        self.table
    }
}

pub fn origin() -> Value {
    Value::vec3(0.0, 0.0, 0.0)
}

pub fn prefab_asset(uuid: &str) -> AssetRef {
    AssetRef::prefab(uuid)
}

/// Base prefab: `name` (with a transform) > `child` (with a sprite)
pub fn simple_prefab(name: &str) -> ObjectTable {
    let mut b = TableBuilder::prefab(name);
    let root = b.root();
    b.set_prop(root, "_lpos", origin());
    b.component(
        root,
        "cc.UITransform",
        &[("_contentSize", Value::from_json(serde_json::json!({"width": 100, "height": 100})))],
    );
    let child = b.node(root, "child");
    b.set_prop(child, "_lpos", origin());
    b.component(child, "cc.Sprite", &[("_color", Value::from("#ffffff")), ("target", Value::Null)]);
    b.build()
}

/// Prefab `name` nesting an instance of `inner` (already instantiated by the caller)
pub fn prefab_with_slot(name: &str) -> TableBuilder {
    let mut b = TableBuilder::prefab(name);
    let root = b.root();
    b.set_prop(root, "_lpos", origin());
    b.node(root, "slot");
    b
}

/// Child named `name` of `node`
pub fn child_named(table: &ObjectTable, node: NodeRef, name: &str) -> Option<NodeRef> {
    table
        .resolve(node)
        .ok()?
        .children
        .iter()
        .copied()
        .find(|c| table.resolve(*c).is_ok_and(|n| n.name == name))
}

/// First component of `node` with type `tag`
pub fn component_of(table: &ObjectTable, node: NodeRef, tag: &str) -> Option<ComponentRef> {
    table
        .resolve(node)
        .ok()?
        .components
        .iter()
        .copied()
        .find(|c| table.resolve(*c).is_ok_and(|comp| comp.tag == tag))
}
