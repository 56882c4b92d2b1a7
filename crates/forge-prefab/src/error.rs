//! Reconciliation errors

use forge_table::{IntegrityError, SlotRef, TableError};
use thiserror::Error;

/// Failure while planning or applying reconciliation
///
/// Errors raised while planning one instance root are scoped: the engine
/// demotes that root to disconnected and keeps going. Errors raised while
/// applying the final plan abort the pass.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// The table is malformed
    #[error("table error: {0}")]
    Table(#[from] TableError),

    /// An element has no stable local id
    #[error("{slot} is not addressable: {reason}")]
    Unaddressable {
        /// Element slot
        slot: SlotRef,
        /// What is missing
        reason: &'static str,
    },

    /// A node was expected to be an instance root
    #[error("{0} is not a prefab instance root")]
    NotAnInstanceRoot(SlotRef),

    /// The rewrite session left something unlinked
    #[error("rewrite left the table inconsistent: {0}")]
    Rewrite(#[from] IntegrityError),

    /// Post-pass verification found problems
    #[error("verification found {} integrity error(s), first: {}", .0.len(), first(.0))]
    Verify(Vec<IntegrityError>),
}

fn first(errors: &[IntegrityError]) -> String {
    errors
        .first()
        .map_or_else(String::new, ToString::to_string)
}

impl ReconcileError {
    /// Is this confined to the instance being planned?
    #[must_use]
    pub fn is_scoped(&self) -> bool {
        matches!(
            self,
            Self::Table(_) | Self::Unaddressable { .. } | Self::NotAnInstanceRoot(_)
        )
    }
}

/// Result type for reconciliation
pub type ReconcileResult<T> = Result<T, ReconcileError>;
