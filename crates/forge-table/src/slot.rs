//! Slot references
//!
//! A slot is the index of a record inside an [`ObjectTable`](crate::ObjectTable).
//! [`SlotRef`] is the untyped form stored inside generic field values;
//! [`Slot<K>`] carries the record kind it points at so node, component and
//! override references cannot be mixed up.

use crate::record::Record;
use std::cmp::Ordering;
use std::fmt::{self, Debug, Display, Formatter};
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

/// Untyped slot reference (`{"__id__": n}` on the wire)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SlotRef(u32);

impl SlotRef {
    /// The document wrapper always lives in slot 0
    pub const DOCUMENT: Self = Self(0);

    /// Create from a raw index
    #[inline]
    #[must_use]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Index into the table
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Raw index as stored on the wire
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Attach a record kind
    #[inline]
    #[must_use]
    pub const fn typed<K: SlotKind>(self) -> Slot<K> {
        Slot {
            raw: self,
            _kind: PhantomData,
        }
    }
}

impl Display for SlotRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<u32> for SlotRef {
    fn from(index: u32) -> Self {
        Self(index)
    }
}

/// Record kind marker
///
/// Implemented by uninhabited marker types; `Target` is the record payload a
/// slot of this kind resolves to.
pub trait SlotKind: 'static {
    /// Payload type stored in the table
    type Target;

    /// Human-readable kind name used in errors
    const NAME: &'static str;

    /// Borrow the payload if `record` is of this kind
    fn project(record: &Record) -> Option<&Self::Target>;

    /// Mutably borrow the payload if `record` is of this kind
    fn project_mut(record: &mut Record) -> Option<&mut Self::Target>;

    /// Wrap a payload into a record
    fn wrap(target: Self::Target) -> Record;
}

/// Typed slot reference
#[repr(transparent)]
pub struct Slot<K> {
    raw: SlotRef,
    _kind: PhantomData<fn() -> K>,
}

impl<K: SlotKind> Slot<K> {
    /// Create from a raw index
    #[inline]
    #[must_use]
    pub const fn new(index: u32) -> Self {
        SlotRef::new(index).typed()
    }
}

impl<K> Slot<K> {
    /// Drop the kind
    #[inline]
    #[must_use]
    pub const fn erase(self) -> SlotRef {
        self.raw
    }

    /// Index into the table
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.raw.index()
    }

    /// Mutable access to the untyped slot, used by whole-table remaps
    #[inline]
    pub fn raw_mut(&mut self) -> &mut SlotRef {
        &mut self.raw
    }
}

impl<K> Clone for Slot<K> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K> Copy for Slot<K> {}

impl<K> PartialEq for Slot<K> {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl<K> Eq for Slot<K> {}

impl<K> PartialOrd for Slot<K> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<K> Ord for Slot<K> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.raw.cmp(&other.raw)
    }
}

impl<K> Hash for Slot<K> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.raw.hash(state);
    }
}

impl<K: SlotKind> Debug for Slot<K> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", K::NAME, self.raw)
    }
}

impl<K> Display for Slot<K> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.raw, f)
    }
}

impl<K> From<Slot<K>> for SlotRef {
    fn from(slot: Slot<K>) -> Self {
        slot.raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{ComponentKind, NodeKind};

    #[test]
    fn typed_slot_keeps_index() {
        let raw = SlotRef::new(7);
        let node = raw.typed::<NodeKind>();
        assert_eq!(node.index(), 7);
        assert_eq!(node.erase(), raw);
    }

    #[test]
    fn typed_slot_debug_names_kind() {
        let node = Slot::<NodeKind>::new(3);
        let comp = Slot::<ComponentKind>::new(3);
        assert_eq!(format!("{node:?}"), "node#3");
        assert_eq!(format!("{comp:?}"), "component#3");
        assert_eq!(node.erase(), comp.erase());
    }

    #[test]
    fn raw_mut_remaps_in_place() {
        let mut node = Slot::<NodeKind>::new(1);
        *node.raw_mut() = SlotRef::new(9);
        assert_eq!(node.index(), 9);
    }
}
