//! File id generation for new instances

use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

/// Produces locally-unique `fileId` strings
pub trait FileIdGenerator: Send + Sync + Debug {
    /// Next id
    fn next_file_id(&self) -> String;
}

/// Random v4 uuids in simple (unhyphenated) form
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidFileIds;

impl FileIdGenerator for UuidFileIds {
    fn next_file_id(&self) -> String {
        Uuid::new_v4().simple().to_string()
    }
}

/// `prefix0`, `prefix1`, ... for deterministic output
#[derive(Debug)]
pub struct SequentialFileIds {
    prefix: String,
    next: AtomicU64,
}

impl SequentialFileIds {
    /// Start counting at zero
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: AtomicU64::new(0),
        }
    }
}

impl FileIdGenerator for SequentialFileIds {
    fn next_file_id(&self) -> String {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        format!("{}{n}", self.prefix)
    }
}
