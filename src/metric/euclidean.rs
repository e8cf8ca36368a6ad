//! Euclidean (L2) and squared-Euclidean distance.

/// Penalty applied per dimension of mismatch between two vectors, added to
/// the common-prefix Euclidean distance so shorter/longer candidates are
/// not scored identically to an exact-dimension match.
pub const DIM_MISMATCH_PENALTY: f32 = 0.01;

/// Squared Euclidean distance over the common-length prefix of `a` and `b`.
///
/// Does not take the square root: ordering is preserved and it is cheaper
/// to compute, useful when only relative ranking matters.
#[must_use]
pub fn squared_euclidean(a: &[f32], b: &[f32]) -> f32 {
    let n = a.len().min(b.len());
    let mut sum = 0.0f32;
    for i in 0..n {
        let diff = a[i] - b[i];
        sum += diff * diff;
    }
    sum
}

/// Euclidean distance over the common-length prefix, plus a small penalty
/// proportional to the absolute dimension difference.
#[must_use]
pub fn euclidean(a: &[f32], b: &[f32]) -> f32 {
    let base = squared_euclidean(a, b).sqrt();
    let dim_diff = a.len().abs_diff(b.len());
    #[allow(clippy::cast_precision_loss)]
    let penalty = dim_diff as f32 * DIM_MISMATCH_PENALTY;
    base + penalty
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_match_has_zero_distance() {
        let a = [1.0, 2.0, 3.0];
        assert_eq!(euclidean(&a, &a), 0.0);
    }

    #[test]
    fn known_distance() {
        let a = [0.0, 0.0];
        let b = [3.0, 4.0];
        assert!((euclidean(&a, &b) - 5.0).abs() < 1e-6);
        assert!((squared_euclidean(&a, &b) - 25.0).abs() < 1e-6);
    }

    #[test]
    fn mismatched_dimension_uses_common_prefix_plus_penalty() {
        let a = [0.0, 0.0, 0.0];
        let b = [0.0, 0.0];
        let d = euclidean(&a, &b);
        assert!((d - DIM_MISMATCH_PENALTY).abs() < 1e-6);
    }
}
