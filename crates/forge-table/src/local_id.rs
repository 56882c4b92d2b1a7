//! Local-id paths
//!
//! A [`LocalIdPath`] addresses a node or component inside a prefab instance
//! without depending on slot numbering: the `fileId` of every nested prefab
//! instance between the outermost instance boundary and the target, followed
//! by the target's own `fileId`.

use crate::value::Value;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// Slot-independent address of an element inside a prefab instance
///
/// # Examples
/// - `["b7f1"]` → an element defined directly by the instance's prefab
/// - `["9c2a", "b7f1"]` → element `b7f1` inside nested instance `9c2a`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct LocalIdPath(Vec<String>);

impl LocalIdPath {
    /// Create from segments
    #[inline]
    #[must_use]
    pub fn new(segments: Vec<String>) -> Self {
        Self(segments)
    }

    /// Path with a single segment
    #[inline]
    #[must_use]
    pub fn single(file_id: impl Into<String>) -> Self {
        Self(vec![file_id.into()])
    }

    /// Segments from outermost to the target
    #[inline]
    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Number of segments
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Empty path
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The target's own id
    #[inline]
    #[must_use]
    pub fn last(&self) -> Option<&str> {
        self.0.last().map(String::as_str)
    }

    /// Append a segment, returning the new path
    #[inline]
    #[must_use]
    pub fn child(&self, file_id: impl Into<String>) -> Self {
        let mut new = self.clone();
        new.0.push(file_id.into());
        new
    }

    /// Path without the last segment (the enclosing nested-instance chain)
    #[inline]
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        if self.0.is_empty() {
            None
        } else {
            Some(Self(self.0[..self.0.len() - 1].to_vec()))
        }
    }

    /// Wire form: array of strings
    #[must_use]
    pub fn to_value(&self) -> Value {
        Value::Array(self.0.iter().cloned().map(Value::String).collect())
    }

    /// Decode the wire form; `None` if any element is not a string
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Array(items) => items
                .iter()
                .map(|v| v.as_str().map(str::to_string))
                .collect::<Option<Vec<_>>>()
                .map(Self),
            Value::Null => Some(Self::default()),
            _ => None,
        }
    }
}

impl Display for LocalIdPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("/"))
    }
}

impl FromStr for LocalIdPath {
    type Err = LocalIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Ok(Self::default());
        }
        let segments = s
            .split('/')
            .map(|seg| {
                if seg.is_empty() {
                    Err(LocalIdError::EmptySegment)
                } else {
                    Ok(seg.to_string())
                }
            })
            .collect::<Result<_, _>>()?;
        Ok(Self(segments))
    }
}

impl From<Vec<String>> for LocalIdPath {
    fn from(segments: Vec<String>) -> Self {
        Self(segments)
    }
}

/// Errors parsing a local-id path
#[derive(Debug, thiserror::Error)]
pub enum LocalIdError {
    /// Empty segment in path
    #[error("local-id path contains empty segment")]
    EmptySegment,
}
