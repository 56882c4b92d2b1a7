//! The object table arena

use crate::codec::{decode_record, encode_record};
use crate::error::{TableError, TableResult};
use crate::record::{Document, DocumentKind, Node, NodeKind, NodeRef, Record};
use crate::slot::{Slot, SlotKind, SlotRef};
use std::collections::HashSet;

/// Flattened, slot-indexed object graph
///
/// Slot 0 holds the [`Document`] wrapper; every other record is addressed by
/// its index. Records are only ever appended through the
/// [`rewrite`](crate::rewrite) module, and removed only by whole-table
/// compaction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectTable {
    records: Vec<Record>,
}

impl ObjectTable {
    /// Empty table
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap records in wire order
    #[must_use]
    pub fn from_records(records: Vec<Record>) -> Self {
        Self { records }
    }

    /// Decode the JSON array form
    ///
    /// # Errors
    /// Returns error on invalid JSON, a non-array top level or a malformed record
    pub fn decode(bytes: &[u8]) -> TableResult<Self> {
        let json: serde_json::Value = serde_json::from_slice(bytes)?;
        Self::from_json(json)
    }

    /// Decode an already-parsed JSON value
    ///
    /// # Errors
    /// Returns error on a non-array top level or a malformed record
    pub fn from_json(json: serde_json::Value) -> TableResult<Self> {
        let serde_json::Value::Array(entries) = json else {
            return Err(TableError::NotAnArray);
        };
        let records = entries
            .into_iter()
            .enumerate()
            .map(|(i, entry)| decode_record(slot_at(i), entry))
            .collect::<TableResult<Vec<_>>>()?;
        Ok(Self { records })
    }

    /// Encode to the JSON array form
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Array(self.records.iter().map(encode_record).collect())
    }

    /// Encode to pretty-printed bytes
    ///
    /// # Errors
    /// Returns error if serialization fails
    pub fn encode(&self) -> TableResult<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(&self.to_json())?)
    }

    /// Number of records
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// No records at all
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// All records in slot order
    #[inline]
    #[must_use]
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Record at `slot`, if in range
    #[inline]
    #[must_use]
    pub fn get(&self, slot: SlotRef) -> Option<&Record> {
        self.records.get(slot.index())
    }

    /// Mutable record at `slot`, if in range
    #[inline]
    pub fn get_mut(&mut self, slot: SlotRef) -> Option<&mut Record> {
        self.records.get_mut(slot.index())
    }

    /// Record at `slot`
    ///
    /// # Errors
    /// Returns [`TableError::OutOfRange`] if the slot does not exist
    pub fn record(&self, slot: SlotRef) -> TableResult<&Record> {
        let len = self.len();
        self.get(slot).ok_or(TableError::OutOfRange { slot, len })
    }

    /// Resolve a typed slot
    ///
    /// # Errors
    /// Returns error if the slot is out of range or holds another kind
    pub fn resolve<K: SlotKind>(&self, slot: Slot<K>) -> TableResult<&K::Target> {
        let record = self.record(slot.erase())?;
        K::project(record).ok_or_else(|| TableError::KindMismatch {
            slot: slot.erase(),
            expected: K::NAME,
            found: record.kind_name(),
        })
    }

    /// Resolve a typed slot mutably
    ///
    /// # Errors
    /// Returns error if the slot is out of range or holds another kind
    pub fn resolve_mut<K: SlotKind>(&mut self, slot: Slot<K>) -> TableResult<&mut K::Target> {
        let len = self.len();
        let record = self
            .records
            .get_mut(slot.index())
            .ok_or(TableError::OutOfRange {
                slot: slot.erase(),
                len,
            })?;
        let found = record.kind_name();
        K::project_mut(record).ok_or(TableError::KindMismatch {
            slot: slot.erase(),
            expected: K::NAME,
            found,
        })
    }

    /// Check the kind of an untyped slot
    #[must_use]
    pub fn try_typed<K: SlotKind>(&self, slot: SlotRef) -> Option<Slot<K>> {
        self.get(slot)
            .and_then(K::project)
            .map(|_| slot.typed())
    }

    /// The document wrapper
    ///
    /// # Errors
    /// Returns [`TableError::MissingRoot`] if slot 0 is not a document
    pub fn document(&self) -> TableResult<&Document> {
        self.resolve(Slot::<DocumentKind>::new(0))
            .map_err(|_| TableError::MissingRoot)
    }

    /// The node the document represents
    ///
    /// # Errors
    /// Returns [`TableError::MissingRoot`] if there is none
    pub fn root_node(&self) -> TableResult<NodeRef> {
        let root = self.document()?.data.ok_or(TableError::MissingRoot)?;
        self.resolve(root).map_err(|_| TableError::MissingRoot)?;
        Ok(root)
    }

    /// Iterate records with their slots
    pub fn iter(&self) -> impl Iterator<Item = (SlotRef, &Record)> {
        self.records
            .iter()
            .enumerate()
            .map(|(i, r)| (slot_at(i), r))
    }

    /// Iterate nodes with their slots
    pub fn nodes(&self) -> impl Iterator<Item = (NodeRef, &Node)> {
        self.iter()
            .filter_map(|(slot, r)| NodeKind::project(r).map(|n| (slot.typed(), n)))
    }

    /// Depth-first pre-order walk of the node subtree under `root`
    ///
    /// Missing or mistyped children are skipped, and a node reachable twice
    /// is visited once.
    #[must_use]
    pub fn subtree(&self, root: NodeRef) -> Vec<NodeRef> {
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            let Ok(n) = self.resolve(node) else {
                continue;
            };
            if !seen.insert(node) {
                continue;
            }
            out.push(node);
            stack.extend(n.children.iter().rev().copied());
        }
        out
    }

    pub(crate) fn push(&mut self, record: Record) -> SlotRef {
        let slot = slot_at(self.records.len());
        self.records.push(record);
        slot
    }

    pub(crate) fn records_mut(&mut self) -> &mut Vec<Record> {
        &mut self.records
    }
}

#[allow(clippy::cast_possible_truncation)]
fn slot_at(index: usize) -> SlotRef {
    SlotRef::new(index as u32)
}
