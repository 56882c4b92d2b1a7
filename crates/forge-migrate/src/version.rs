//! Dotted numeric schema versions

use std::cmp::Ordering;
use std::fmt::{self, Display, Formatter};
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// Schema version such as `1.0.10`
///
/// Components compare numerically; missing trailing components count as
/// zero, so `1.2 == 1.2.0` and `1.0.10 > 1.0.9`.
#[derive(Debug, Clone)]
pub struct SchemaVersion(Vec<u64>);

impl SchemaVersion {
    /// Build from components; an empty slice yields version `0`
    #[must_use]
    pub fn new(parts: &[u64]) -> Self {
        if parts.is_empty() {
            Self(vec![0])
        } else {
            Self(parts.to_vec())
        }
    }

    /// Numeric components
    #[inline]
    #[must_use]
    pub fn parts(&self) -> &[u64] {
        &self.0
    }

    fn significant(&self) -> &[u64] {
        let len = self.0.iter().rposition(|p| *p != 0).map_or(0, |i| i + 1);
        &self.0[..len]
    }
}

impl PartialEq for SchemaVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SchemaVersion {}

impl PartialOrd for SchemaVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SchemaVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.0.len().max(other.0.len());
        (0..len)
            .map(|i| {
                let a = self.0.get(i).copied().unwrap_or(0);
                let b = other.0.get(i).copied().unwrap_or(0);
                a.cmp(&b)
            })
            .find(|o| o.is_ne())
            .unwrap_or(Ordering::Equal)
    }
}

impl Hash for SchemaVersion {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.significant().hash(state);
    }
}

impl Display for SchemaVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for part in &self.0 {
            if !first {
                f.write_str(".")?;
            }
            write!(f, "{part}")?;
            first = false;
        }
        Ok(())
    }
}

impl FromStr for SchemaVersion {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(VersionError::Empty);
        }
        s.split('.')
            .map(|part| {
                part.parse::<u64>().map_err(|_| VersionError::InvalidComponent {
                    version: s.to_string(),
                    component: part.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Self)
    }
}

impl TryFrom<&str> for SchemaVersion {
    type Error = VersionError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl serde::Serialize for SchemaVersion {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for SchemaVersion {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = <std::borrow::Cow<'de, str>>::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Errors parsing a schema version
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VersionError {
    /// Empty string
    #[error("empty version string")]
    Empty,

    /// A component is not a non-negative integer
    #[error("invalid component `{component}` in version `{version}`")]
    InvalidComponent {
        /// Whole input
        version: String,
        /// Offending component
        component: String,
    },
}
