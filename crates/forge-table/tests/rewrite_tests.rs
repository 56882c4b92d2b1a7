use forge_table::rewrite::{self, Rewriter};
use forge_table::{
    Document, DocumentKind, Node, NodeKind, NodeRef, ObjectTable, Record, SlotRef, TargetInfo,
    Value,
};
use pretty_assertions::assert_eq;
use proptest::prelude::*;

/// Document + root + `n` extra nodes; `edges` hang nodes under earlier ones,
/// `refs` add property references between arbitrary nodes.
fn random_table(n: usize, edges: &[(usize, usize)], refs: &[(usize, usize)]) -> ObjectTable {
    let mut table = ObjectTable::new();
    let doc = rewrite::append::<DocumentKind>(&mut table, Document::scene("s"));
    let root = rewrite::append::<NodeKind>(&mut table, Node::new("root"));
    table.resolve_mut(doc).unwrap().data = Some(root);

    let nodes: Vec<NodeRef> = (0..n)
        .map(|i| rewrite::append::<NodeKind>(&mut table, Node::new(format!("n{i}"))))
        .collect();
    for &(parent, child) in edges {
        if parent >= n || child >= n || child <= parent {
            continue;
        }
        let (parent, child) = (nodes[parent], nodes[child]);
        if table.resolve(child).unwrap().parent.is_some() {
            continue;
        }
        table.resolve_mut(parent).unwrap().children.push(child);
        table.resolve_mut(child).unwrap().parent = Some(parent);
    }
    // Everything without a parent hangs off the root half of the time
    for (i, node) in nodes.iter().enumerate() {
        if i % 2 == 0 && table.resolve(*node).unwrap().parent.is_none() {
            table.resolve_mut(root).unwrap().children.push(*node);
            table.resolve_mut(*node).unwrap().parent = Some(root);
        }
    }
    for &(from, to) in refs {
        if from < n && to < n {
            table
                .resolve_mut(nodes[from])
                .unwrap()
                .props
                .insert(format!("_ref{to}"), Value::Ref(nodes[to].erase()));
        }
    }
    table
}

fn names(table: &ObjectTable) -> Vec<String> {
    let root = table.root_node().unwrap();
    table
        .subtree(root)
        .into_iter()
        .map(|n| table.resolve(n).unwrap().name.clone())
        .collect()
}

proptest! {
    #[test]
    fn prop_compaction_preserves_reachable_graph(
        n in 0..24usize,
        edges in proptest::collection::vec((0..24usize, 0..24usize), 0..40),
        refs in proptest::collection::vec((0..24usize, 0..24usize), 0..20),
    ) {
        let mut table = random_table(n, &edges, &refs);
        let before = names(&table);
        let orphans = rewrite::orphans(&table).len();

        let remap = rewrite::compact(&mut table).unwrap();
        prop_assert_eq!(remap.removed(), orphans);
        prop_assert!(rewrite::verify_strict(&table).is_ok());
        prop_assert_eq!(names(&table), before);

        // A second compaction is a no-op
        prop_assert!(rewrite::compact(&mut table).unwrap().is_identity());
    }

    #[test]
    fn prop_encode_decode_keeps_integrity(
        n in 0..16usize,
        edges in proptest::collection::vec((0..16usize, 0..16usize), 0..30),
    ) {
        let table = random_table(n, &edges, &[]);
        let decoded = ObjectTable::decode(&table.encode().unwrap()).unwrap();
        prop_assert_eq!(&decoded, &table);
        prop_assert!(rewrite::verify(&decoded).is_ok());
    }
}

#[test]
fn rewriter_session_links_everything_it_appends() {
    let mut table = random_table(1, &[], &[]);
    let root = table.root_node().unwrap();
    let mut rw = Rewriter::new(&mut table);
    let mounted = rw.append::<NodeKind>(Node::new("mounted"));
    rw.edit(mounted, |n| n.parent = Some(root)).unwrap();
    assert_eq!(rw.pending(), vec![mounted.erase()]);
    rw.link(root, mounted, |n| &mut n.children).unwrap();
    rw.finish().unwrap();
    rewrite::verify_strict(&table).unwrap();
}

#[test]
fn orphaned_override_records_are_swept() {
    let mut table = random_table(1, &[], &[]);
    let before = table.len();
    rewrite::append_record(&mut table, Record::TargetInfo(TargetInfo::default()));
    assert_eq!(rewrite::orphans(&table), vec![SlotRef::new(u32::try_from(before).unwrap())]);
    rewrite::compact(&mut table).unwrap();
    assert!(rewrite::orphans(&table).is_empty());
}
