//! Metadata value types.
//!
//! [`MetadataValue`] represents the JSON-like scalar/array/object value
//! attached to a vector, with `Array`/`Object` variants recursing into
//! `MetadataValue` itself so arbitrary JSON shapes round-trip.
//!
//! # Serialization
//!
//! Values serialize directly to their natural JSON shape (untagged) so
//! metadata round-trips through `data/meta.json` as plain JSON objects a
//! host application can hand-author.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single metadata value: string, number, bool, null, array, or object.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    /// Absence of a value.
    Null,
    /// Boolean flag.
    Bool(bool),
    /// Numeric value (integers and floats are both represented as f64).
    Number(f64),
    /// Text value.
    String(String),
    /// Ordered sequence of values.
    Array(Vec<MetadataValue>),
    /// String-keyed map of values. `BTreeMap` keeps serialized key order
    /// deterministic, so saving and reloading produces byte-identical
    /// output.
    Object(BTreeMap<String, MetadataValue>),
}

impl MetadataValue {
    /// Returns the string slice if this is a `String`.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetadataValue::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Returns the numeric value if this is a `Number`.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetadataValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the boolean value if this is a `Bool`.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            MetadataValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// `true` for `Null`.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, MetadataValue::Null)
    }
}

impl From<&str> for MetadataValue {
    fn from(s: &str) -> Self {
        MetadataValue::String(s.to_owned())
    }
}

impl From<String> for MetadataValue {
    fn from(s: String) -> Self {
        MetadataValue::String(s)
    }
}

impl From<bool> for MetadataValue {
    fn from(b: bool) -> Self {
        MetadataValue::Bool(b)
    }
}

impl From<i64> for MetadataValue {
    fn from(n: i64) -> Self {
        #[allow(clippy::cast_precision_loss)]
        MetadataValue::Number(n as f64)
    }
}

impl From<f64> for MetadataValue {
    fn from(n: f64) -> Self {
        MetadataValue::Number(n)
    }
}

/// A vector's attached metadata: a string-keyed map of [`MetadataValue`].
pub type Metadata = BTreeMap<String, MetadataValue>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_through_json() {
        let mut m: Metadata = BTreeMap::new();
        m.insert("title".into(), "hello".into());
        m.insert("count".into(), 42i64.into());
        m.insert("score".into(), 0.95.into());
        m.insert("active".into(), true.into());
        m.insert(
            "tags".into(),
            MetadataValue::Array(vec!["a".into(), "b".into()]),
        );
        m.insert("missing".into(), MetadataValue::Null);

        let json = serde_json::to_string(&m).unwrap();
        let parsed: Metadata = serde_json::from_str(&json).unwrap();
        assert_eq!(m, parsed);
    }

    #[test]
    fn accessors() {
        let v = MetadataValue::from("hi");
        assert_eq!(v.as_str(), Some("hi"));
        assert_eq!(MetadataValue::Number(1.0).as_f64(), Some(1.0));
        assert!(MetadataValue::Null.is_null());
    }
}
