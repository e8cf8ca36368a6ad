//! Distance kernels and dimension policy.
//!
//! One file per metric, a scalar-only implementation.
//!
//! # Dimension policy
//!
//! Cosine requires equal dimension; on mismatch it returns the maximum
//! distance (`1.0`). Every other metric operates on the common prefix
//! `min(|a|, |b|)`; Euclidean additionally applies a small penalty
//! proportional to the dimension difference.

mod chebyshev;
mod cosine;
mod dot;
mod euclidean;
mod hamming;
mod manhattan;

pub use chebyshev::chebyshev;
pub use cosine::cosine;
pub use dot::{dot_product, inner_product};
pub use euclidean::{euclidean, squared_euclidean, DIM_MISMATCH_PENALTY};
pub use hamming::hamming;
pub use manhattan::manhattan;

use serde::{Deserialize, Serialize};

/// Identifies which kernel to use, so configuration and on-disk records can
/// name a metric without embedding a function pointer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    /// Euclidean (L2) distance, with a dimension-mismatch penalty.
    #[default]
    Euclidean,
    /// Squared Euclidean distance (cheaper, same ordering as Euclidean).
    SquaredEuclidean,
    /// Manhattan (L1) distance.
    Manhattan,
    /// Chebyshev (L-infinity) distance.
    Chebyshev,
    /// Cosine distance (`1 - cosine similarity`).
    Cosine,
    /// Negative dot product (smaller is closer, matching other metrics).
    InnerProduct,
    /// Hamming distance over quantized/binary-coded values, rounded to f32.
    Hamming,
}

impl DistanceMetric {
    /// Computes the configured distance between two vectors.
    #[must_use]
    pub fn distance(self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            DistanceMetric::Euclidean => euclidean(a, b),
            DistanceMetric::SquaredEuclidean => squared_euclidean(a, b),
            DistanceMetric::Manhattan => manhattan(a, b),
            DistanceMetric::Chebyshev => chebyshev(a, b),
            DistanceMetric::Cosine => cosine(a, b),
            DistanceMetric::InnerProduct => inner_product(a, b),
            DistanceMetric::Hamming => hamming(a, b),
        }
    }

    /// `true` if this metric requires matching dimensions (cosine only);
    /// other metrics tolerate mismatched dimensions via the common-prefix
    /// policy and the Clustered Store skips incompatible centroids only
    /// for metrics where this is `true`.
    #[must_use]
    pub fn requires_equal_dimension(self) -> bool {
        matches!(self, DistanceMetric::Cosine)
    }
}
