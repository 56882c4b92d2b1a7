//! Cross-reference rewriting
//!
//! Appends never reuse an index. A [`Rewriter`] tracks every record it
//! appended until something links to it, so a pass cannot leave an orphan
//! behind. Removal only happens through [`compact`], which renumbers the
//! whole table in one step.

use crate::error::{IntegrityError, TableResult};
use crate::record::Record;
use crate::slot::{Slot, SlotKind, SlotRef};
use crate::table::ObjectTable;
use std::collections::{BTreeSet, VecDeque};

/// Append a record at the end of the table and return its slot
pub fn append_record(table: &mut ObjectTable, record: Record) -> SlotRef {
    table.push(record)
}

/// Typed variant of [`append_record`]
pub fn append<K: SlotKind>(table: &mut ObjectTable, target: K::Target) -> Slot<K> {
    append_record(table, K::wrap(target)).typed()
}

/// Append-and-link session over one table
#[derive(Debug)]
pub struct Rewriter<'t> {
    table: &'t mut ObjectTable,
    unlinked: BTreeSet<SlotRef>,
}

impl<'t> Rewriter<'t> {
    /// Start a session
    pub fn new(table: &'t mut ObjectTable) -> Self {
        Self {
            table,
            unlinked: BTreeSet::new(),
        }
    }

    /// Read access to the table being rewritten
    #[inline]
    #[must_use]
    pub fn table(&self) -> &ObjectTable {
        self.table
    }

    /// Direct mutable access for edits that append nothing
    #[inline]
    pub fn table_mut(&mut self) -> &mut ObjectTable {
        self.table
    }

    /// Append a record; it stays pending until something references it
    pub fn append<K: SlotKind>(&mut self, target: K::Target) -> Slot<K> {
        let record = K::wrap(target);
        self.mark_referenced(&record);
        let slot = append_record(self.table, record);
        self.unlinked.insert(slot);
        slot.typed()
    }

    /// Edit a record in place; every slot it references afterwards counts as linked
    ///
    /// # Errors
    /// Returns error if `owner` is out of range or holds another kind
    pub fn edit<K: SlotKind, R>(
        &mut self,
        owner: Slot<K>,
        f: impl FnOnce(&mut K::Target) -> R,
    ) -> TableResult<R> {
        let out = f(self.table.resolve_mut(owner)?);
        if let Some(record) = self.table.get(owner.erase()) {
            let mut seen = Vec::new();
            record.visit_refs(&mut |s| seen.push(s));
            for slot in seen {
                self.unlinked.remove(&slot);
            }
        }
        Ok(out)
    }

    /// Push `item` into a collection field of `owner` unless already present
    ///
    /// # Errors
    /// Returns error if `owner` is out of range or holds another kind
    pub fn link<K: SlotKind, I>(
        &mut self,
        owner: Slot<K>,
        item: Slot<I>,
        field: impl FnOnce(&mut K::Target) -> &mut Vec<Slot<I>>,
    ) -> TableResult<()> {
        self.edit(owner, |target| {
            let list = field(target);
            if !list.contains(&item) {
                list.push(item);
            }
        })
    }

    /// Point an optional field of `owner` at `item`
    ///
    /// # Errors
    /// Returns error if `owner` is out of range or holds another kind
    pub fn link_one<K: SlotKind, I>(
        &mut self,
        owner: Slot<K>,
        item: Slot<I>,
        field: impl FnOnce(&mut K::Target) -> &mut Option<Slot<I>>,
    ) -> TableResult<()> {
        self.edit(owner, |target| *field(target) = Some(item))
    }

    /// Records appended but not yet linked
    #[must_use]
    pub fn pending(&self) -> Vec<SlotRef> {
        self.unlinked.iter().copied().collect()
    }

    /// End the session
    ///
    /// Appends linked through direct table edits or forward references are
    /// found by a final scan.
    ///
    /// # Errors
    /// Returns [`IntegrityError::Unlinked`] for the first appended record nothing references
    pub fn finish(mut self) -> Result<(), IntegrityError> {
        if !self.unlinked.is_empty() {
            let unlinked = &mut self.unlinked;
            for (from, record) in self.table.iter() {
                record.visit_refs(&mut |to| {
                    if to != from {
                        unlinked.remove(&to);
                    }
                });
            }
        }
        match self.unlinked.first() {
            Some(slot) => Err(IntegrityError::Unlinked(*slot)),
            None => Ok(()),
        }
    }

    fn mark_referenced(&mut self, record: &Record) {
        let unlinked = &mut self.unlinked;
        record.visit_refs(&mut |s| {
            unlinked.remove(&s);
        });
    }
}

/// Old-to-new slot mapping produced by [`compact`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Remap {
    map: Vec<Option<SlotRef>>,
}

impl Remap {
    /// New slot of `old`, or `None` if it was removed
    #[must_use]
    pub fn get(&self, old: SlotRef) -> Option<SlotRef> {
        self.map.get(old.index()).copied().flatten()
    }

    /// Typed variant of [`Remap::get`]
    #[must_use]
    pub fn get_typed<K: SlotKind>(&self, old: Slot<K>) -> Option<Slot<K>> {
        self.get(old.erase()).map(SlotRef::typed)
    }

    /// Number of removed records
    #[must_use]
    pub fn removed(&self) -> usize {
        self.map.iter().filter(|m| m.is_none()).count()
    }

    /// Did compaction change nothing?
    #[must_use]
    pub fn is_identity(&self) -> bool {
        self.map
            .iter()
            .enumerate()
            .all(|(i, m)| m.is_some_and(|s| s.index() == i))
    }
}

/// Remove every record unreachable from slot 0 and renumber the rest
///
/// Surviving records keep their relative order. All references are rewritten
/// in the same pass, so no intermediate state is observable.
///
/// # Errors
/// Returns [`IntegrityError::Dangling`] (and leaves the table untouched) if a
/// reachable record references a missing slot
pub fn compact(table: &mut ObjectTable) -> Result<Remap, IntegrityError> {
    let reachable = mark(table)?;
    let mut map = vec![None; table.len()];
    let mut next = 0u32;
    for (i, keep) in reachable.iter().enumerate() {
        if *keep {
            map[i] = Some(SlotRef::new(next));
            next += 1;
        }
    }

    let records = std::mem::take(table.records_mut());
    let mut kept = Vec::with_capacity(next as usize);
    for (i, mut record) in records.into_iter().enumerate() {
        if !reachable[i] {
            continue;
        }
        record.visit_refs_mut(&mut |s| {
            if let Some(new) = map.get(s.index()).copied().flatten() {
                *s = new;
            }
        });
        kept.push(record);
    }
    *table.records_mut() = kept;
    Ok(Remap { map })
}

/// Every reference that does not resolve
#[must_use]
pub fn dangling(table: &ObjectTable) -> Vec<IntegrityError> {
    let len = table.len();
    let mut errors = Vec::new();
    for (from, record) in table.iter() {
        record.visit_refs(&mut |to| {
            if to.index() >= len {
                errors.push(IntegrityError::Dangling { from, to });
            }
        });
    }
    errors
}

/// Records not reachable from slot 0
#[must_use]
pub fn orphans(table: &ObjectTable) -> Vec<SlotRef> {
    let reachable = reach(table);
    reachable
        .iter()
        .enumerate()
        .filter(|(_, r)| !**r)
        .filter_map(|(i, _)| u32::try_from(i).ok().map(SlotRef::new))
        .collect()
}

/// Check that every reference resolves
///
/// # Errors
/// Returns every dangling reference found
pub fn verify(table: &ObjectTable) -> Result<(), Vec<IntegrityError>> {
    let errors = dangling(table);
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Check that every reference resolves and nothing is orphaned
///
/// # Errors
/// Returns every dangling reference and orphaned record found
pub fn verify_strict(table: &ObjectTable) -> Result<(), Vec<IntegrityError>> {
    let mut errors = dangling(table);
    errors.extend(orphans(table).into_iter().map(IntegrityError::Orphaned));
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn mark(table: &ObjectTable) -> Result<Vec<bool>, IntegrityError> {
    let len = table.len();
    let mut first_dangling = None;
    let reachable = walk(table, |from, to| {
        if to.index() >= len && first_dangling.is_none() {
            first_dangling = Some(IntegrityError::Dangling { from, to });
        }
    });
    match first_dangling {
        Some(err) => Err(err),
        None => Ok(reachable),
    }
}

fn reach(table: &ObjectTable) -> Vec<bool> {
    walk(table, |_, _| {})
}

fn walk(table: &ObjectTable, mut on_dangling: impl FnMut(SlotRef, SlotRef)) -> Vec<bool> {
    let len = table.len();
    let mut reachable = vec![false; len];
    if len == 0 {
        return reachable;
    }
    let mut queue = VecDeque::from([SlotRef::DOCUMENT]);
    reachable[0] = true;
    while let Some(slot) = queue.pop_front() {
        let Some(record) = table.get(slot) else {
            continue;
        };
        record.visit_refs(&mut |to| {
            if to.index() >= len {
                on_dangling(slot, to);
            } else if !reachable[to.index()] {
                reachable[to.index()] = true;
                queue.push_back(to);
            }
        });
    }
    reachable
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Document, DocumentKind, Node, NodeKind, NodeRef, TargetInfo, TargetInfoKind};
    use crate::local_id::LocalIdPath;
    use crate::value::Value;

    fn doc_with_root() -> (ObjectTable, NodeRef) {
        let mut table = ObjectTable::new();
        let doc = append::<DocumentKind>(&mut table, Document::prefab("p"));
        let root = append::<NodeKind>(&mut table, Node::new("root"));
        table.resolve_mut(doc).unwrap().data = Some(root);
        (table, root)
    }

    #[test]
    fn append_never_reuses() {
        let (mut table, _) = doc_with_root();
        let a = append_record(&mut table, Record::TargetInfo(TargetInfo::default()));
        let b = append_record(&mut table, Record::TargetInfo(TargetInfo::default()));
        assert_eq!(a.raw() + 1, b.raw());
        assert_eq!(table.len(), 4);
    }

    #[test]
    fn unlinked_append_fails_finish() {
        let (mut table, _) = doc_with_root();
        let mut rw = Rewriter::new(&mut table);
        let info = rw.append::<TargetInfoKind>(TargetInfo::new(LocalIdPath::single("a")));
        assert_eq!(rw.pending(), vec![info.erase()]);
        assert_eq!(rw.finish(), Err(IntegrityError::Unlinked(info.erase())));
    }

    #[test]
    fn linking_clears_pending() {
        let (mut table, root) = doc_with_root();
        let mut rw = Rewriter::new(&mut table);
        let child = rw.append::<NodeKind>(Node::new("child"));
        rw.link(root, child, |n| &mut n.children).unwrap();
        rw.link(root, child, |n| &mut n.children).unwrap();
        rw.finish().unwrap();
        assert_eq!(table.resolve(root).unwrap().children, vec![child]);
    }

    #[test]
    fn compact_drops_orphans_and_remaps() {
        let (mut table, root) = doc_with_root();
        append_record(&mut table, Record::TargetInfo(TargetInfo::default()));
        let kept = append::<NodeKind>(&mut table, Node::new("kept"));
        table.resolve_mut(root).unwrap().children.push(kept);
        table
            .resolve_mut(root)
            .unwrap()
            .props
            .insert("_ref".into(), Value::Ref(kept.erase()));

        assert_eq!(orphans(&table), vec![SlotRef::new(2)]);
        let remap = compact(&mut table).unwrap();
        assert_eq!(remap.removed(), 1);
        assert_eq!(remap.get(SlotRef::new(3)), Some(SlotRef::new(2)));
        assert_eq!(table.len(), 3);
        let root = table.resolve(root).unwrap();
        assert_eq!(root.children, vec![NodeRef::new(2)]);
        assert_eq!(root.props["_ref"], Value::Ref(SlotRef::new(2)));
        verify_strict(&table).unwrap();
    }

    #[test]
    fn compact_refuses_dangling() {
        let (mut table, root) = doc_with_root();
        table.resolve_mut(root).unwrap().children.push(NodeRef::new(42));
        let before = table.clone();
        assert!(matches!(
            compact(&mut table),
            Err(IntegrityError::Dangling { .. })
        ));
        assert_eq!(table, before);
        assert_eq!(verify(&table).unwrap_err().len(), 1);
    }

    #[test]
    fn compact_of_clean_table_is_identity() {
        let (mut table, _) = doc_with_root();
        assert!(compact(&mut table).unwrap().is_identity());
    }
}
