//! Error types for object tables

use crate::slot::SlotRef;

/// Errors decoding, encoding or addressing an object table
#[derive(Debug, thiserror::Error)]
pub enum TableError {
    /// Input is not valid JSON
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Top-level value is not an array
    #[error("object table must be a JSON array")]
    NotAnArray,

    /// A known record kind has a field of the wrong shape
    #[error("malformed {kind} at {slot}: field `{field}` {problem}")]
    Malformed {
        /// Slot of the offending record
        slot: SlotRef,
        /// Record kind
        kind: &'static str,
        /// Field name
        field: &'static str,
        /// What was wrong
        problem: &'static str,
    },

    /// Slot index past the end of the table
    #[error("slot {slot} out of range (table has {len} records)")]
    OutOfRange {
        /// Requested slot
        slot: SlotRef,
        /// Table length
        len: usize,
    },

    /// Slot holds a different record kind than expected
    #[error("slot {slot} holds {found}, expected {expected}")]
    KindMismatch {
        /// Requested slot
        slot: SlotRef,
        /// Expected kind
        expected: &'static str,
        /// Actual kind
        found: &'static str,
    },

    /// Slot 0 is missing or does not point at a root node
    #[error("document has no root node")]
    MissingRoot,
}

/// Integrity violations found by [`verify`](crate::rewrite::verify)
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IntegrityError {
    /// Reference to a slot past the end of the table
    #[error("{from} references missing slot {to}")]
    Dangling {
        /// Referencing record
        from: SlotRef,
        /// Referenced slot
        to: SlotRef,
    },

    /// Record appended during a rewrite but never linked
    #[error("slot {0} was appended but never linked")]
    Unlinked(SlotRef),

    /// Record not reachable from the document wrapper
    #[error("slot {0} is unreachable from the document")]
    Orphaned(SlotRef),
}

/// Result type for table operations
pub type TableResult<T> = Result<T, TableError>;
