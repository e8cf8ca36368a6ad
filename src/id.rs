//! Vector identifiers.
//!
//! A [`VectorId`] is a disjoint union of an unsigned integer or a non-empty
//! string. Integer ids are allocated by the store's monotonic counter;
//! string ids are supplied by the caller. Ordering puts numeric ids before
//! string ids, then compares within a variant — this is the tie-break rule
//! HNSW search results use when distances are equal.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for a vector within a partition.
///
/// Uniqueness is required within a partition; global uniqueness across
/// partitions is a convention, not an enforced invariant.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VectorId {
    /// An auto-allocated or caller-supplied integer id.
    Int(u64),
    /// A caller-supplied string id. Always non-empty.
    Str(String),
}

impl VectorId {
    /// Builds a string id, rejecting empty strings per the data model.
    pub fn string(s: impl Into<String>) -> Option<Self> {
        let s = s.into();
        if s.is_empty() {
            None
        } else {
            Some(VectorId::Str(s))
        }
    }

    /// Returns the integer value if this is an `Int` id.
    #[must_use]
    pub fn as_int(&self) -> Option<u64> {
        match self {
            VectorId::Int(n) => Some(*n),
            VectorId::Str(_) => None,
        }
    }
}

impl fmt::Display for VectorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VectorId::Int(n) => write!(f, "{n}"),
            VectorId::Str(s) => write!(f, "{s}"),
        }
    }
}

impl From<u64> for VectorId {
    fn from(n: u64) -> Self {
        VectorId::Int(n)
    }
}

/// Numeric ids sort before string ids; within a variant, natural order applies.
impl PartialOrd for VectorId {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for VectorId {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        use std::cmp::Ordering;
        match (self, other) {
            (VectorId::Int(a), VectorId::Int(b)) => a.cmp(b),
            (VectorId::Str(a), VectorId::Str(b)) => a.cmp(b),
            (VectorId::Int(_), VectorId::Str(_)) => Ordering::Less,
            (VectorId::Str(_), VectorId::Int(_)) => Ordering::Greater,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_string_id_rejected() {
        assert!(VectorId::string("").is_none());
        assert!(VectorId::string("ok").is_some());
    }

    #[test]
    fn int_sorts_before_str() {
        let mut ids = vec![
            VectorId::Str("b".into()),
            VectorId::Int(5),
            VectorId::Str("a".into()),
            VectorId::Int(1),
        ];
        ids.sort();
        assert_eq!(
            ids,
            vec![
                VectorId::Int(1),
                VectorId::Int(5),
                VectorId::Str("a".into()),
                VectorId::Str("b".into()),
            ]
        );
    }

    #[test]
    fn display_roundtrip() {
        assert_eq!(VectorId::Int(42).to_string(), "42");
        assert_eq!(VectorId::Str("foo".into()).to_string(), "foo");
    }
}
