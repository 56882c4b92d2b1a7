//! Forge object tables
//!
//! The shared data representation of the asset pipeline: a flattened,
//! slot-indexed object graph decoded from the JSON array wire format.
//!
//! # Core Concepts
//!
//! - [`ObjectTable`]: arena of [`Record`]s; slot 0 is the document wrapper
//! - [`Slot<K>`]: typed slot reference (`NodeRef`, `ComponentRef`, ...)
//! - [`LocalIdPath`]: slot-independent address inside a prefab instance
//! - [`rewrite`]: append-only rewriting, compaction and integrity checks
//!
//! # Example
//!
//! ```rust,ignore
//! use forge_table::{ObjectTable, rewrite};
//!
//! let mut table = ObjectTable::decode(&bytes)?;
//! let remap = rewrite::compact(&mut table)?;
//! rewrite::verify(&table).map_err(|errors| errors[0].clone())?;
//! ```

mod codec;
mod error;
mod hash;
mod local_id;
mod record;
mod slot;
mod table;
mod value;

pub mod rewrite;

pub use codec::{decode_record, encode_record};
pub use error::{IntegrityError, TableError, TableResult};
pub use hash::{ContentHash, HashError};
pub use local_id::{LocalIdError, LocalIdPath};
pub use record::{
    tags, AssetLink, CompPrefabInfo, CompPrefabInfoKind, CompPrefabInfoRef, Component,
    ComponentKind, ComponentRef, Document, DocumentKind, DocumentRef, InstanceKind, InstanceRef,
    MountedChildrenInfo, MountedChildrenKind, MountedChildrenRef, MountedComponentsInfo,
    MountedComponentsKind, MountedComponentsRef, Node, NodeKind, NodeRef, Opaque, PrefabInfo,
    PrefabInfoKind, PrefabInfoRef, PrefabInstance, PropertyOverrideInfo, PropertyOverrideKind,
    PropertyOverrideRef, Record, TargetInfo, TargetInfoKind, TargetInfoRef, TargetOverrideInfo,
    TargetOverrideKind, TargetOverrideRef,
};
pub use rewrite::{Remap, Rewriter};
pub use slot::{Slot, SlotKind, SlotRef};
pub use table::ObjectTable;
pub use value::{AssetId, AssetRef, Fields, Value, EXPECTED_TYPE_KEY, REF_KEY, TYPE_KEY, UUID_KEY};
