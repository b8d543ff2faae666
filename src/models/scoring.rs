//! Max-probability anomaly scores

use crate::models::mixture::Posteriors;
use ndarray::ArrayView1;

/// Posterior probability vector of one record
pub type ProbabilityVector<'a> = ArrayView1<'a, f64>;

/// Largest entry of a probability vector: how confidently the record belongs
/// to any one component.
///
/// For a distribution over k entries this lies in `[1/k, 1]`.
pub fn max_probability(probabilities: ProbabilityVector<'_>) -> f64 {
    probabilities
        .iter()
        .copied()
        .fold(f64::NEG_INFINITY, f64::max)
}

/// Score every record
pub fn score_all(posteriors: &Posteriors) -> Vec<f64> {
    posteriors.rows().map(max_probability).collect()
}
