//! Metadata storage and field-criteria matching.
//!
//! Metadata is an opaque `string -> `[`MetadataValue`] map attached to one
//! [`crate::id::VectorId`]. This module defines the value type and the
//! conjunctive field-existence/equality predicate used by
//! `VectorStore::metadata_with_field`.

mod types;

pub use types::{Metadata, MetadataValue};

/// A single field criterion: the field must exist, and if `value` is
/// `Some`, must equal it.
#[derive(Clone, Debug)]
pub struct FieldCriterion {
    /// Metadata key to inspect.
    pub field: String,
    /// Required value, or `None` to only require the field's presence.
    pub value: Option<MetadataValue>,
}

/// Evaluates a conjunctive list of field criteria against one metadata map.
///
/// All criteria must hold (field present, and equal to `value` when given)
/// for the map to match.
#[must_use]
pub fn matches_criteria(metadata: &Metadata, criteria: &[FieldCriterion]) -> bool {
    criteria.iter().all(|c| match metadata.get(&c.field) {
        None => false,
        Some(actual) => match &c.value {
            None => true,
            Some(expected) => actual == expected,
        },
    })
}

/// Predicate passed to `find_nearest` calls: given a candidate id and its
/// metadata, decide whether it should be considered at all. Short-circuits
/// before distance computation.
pub type FilterFn<'a> = dyn Fn(&crate::id::VectorId, Option<&Metadata>) -> bool + Send + Sync + 'a;
