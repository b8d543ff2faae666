//! Anomaly threshold selection by approximate quantile.
//!
//! Scores are folded into a t-digest in fixed-size chunks, so memory stays
//! bounded by the digest size rather than the record count. The returned
//! threshold is an ε-approximate quantile: its rank among the scores is
//! within about `ε · n` of `q · n`, it is not the exact order statistic.
//! With `ε = 0` the exact quantile is computed by sorting instead.

use crate::config::DetectionConfig;
use crate::error::{PipelineError, Result};
use tdigest::TDigest;
use tracing::debug;

/// Scores merged into the digest per step
const CHUNK_SIZE: usize = 64 * 1024;

/// Smallest digest used for any error bound
const MIN_DIGEST_SIZE: usize = 100;

/// Picks the score below which records are anomalous
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdSelector {
    quantile: f64,
    relative_error: f64,
}

impl From<&DetectionConfig> for ThresholdSelector {
    fn from(config: &DetectionConfig) -> Self {
        Self {
            quantile: config.quantile,
            relative_error: config.relative_error,
        }
    }
}

impl ThresholdSelector {
    pub fn new(quantile: f64, relative_error: f64) -> Result<Self> {
        if !(0.0..=1.0).contains(&quantile) || !(0.0..=1.0).contains(&relative_error) {
            return Err(PipelineError::InvalidQuantile {
                quantile,
                relative_error,
            });
        }
        Ok(Self {
            quantile,
            relative_error,
        })
    }

    pub fn quantile(&self) -> f64 {
        self.quantile
    }

    pub fn relative_error(&self) -> f64 {
        self.relative_error
    }

    /// Digest centroid budget for the configured error bound
    fn digest_size(&self) -> usize {
        ((1.0 / self.relative_error).ceil() as usize).max(MIN_DIGEST_SIZE)
    }

    /// Threshold for a set of scores
    pub fn select(&self, scores: &[f64]) -> Result<f64> {
        if scores.is_empty() {
            return Err(PipelineError::EmptyScores);
        }
        if let Some(row) = scores.iter().position(|s| !s.is_finite()) {
            return Err(PipelineError::NonFiniteScore { row });
        }

        if self.relative_error == 0.0 {
            return Ok(exact_quantile(scores, self.quantile));
        }

        let digest = scores
            .chunks(CHUNK_SIZE)
            .fold(TDigest::new_with_size(self.digest_size()), |digest, chunk| {
                digest.merge_unsorted(chunk.to_vec())
            });

        let threshold = digest
            .estimate_quantile(self.quantile)
            .clamp(digest.min(), digest.max());

        debug!(
            quantile = self.quantile,
            relative_error = self.relative_error,
            digest_size = self.digest_size(),
            threshold,
            "Approximate quantile computed"
        );

        Ok(threshold)
    }
}

/// Exact order statistic at rank ⌈q·n⌉ (1-based)
fn exact_quantile(scores: &[f64], quantile: f64) -> f64 {
    let mut sorted = scores.to_vec();
    sorted.sort_by(f64::total_cmp);
    let rank = (quantile * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::seq::SliceRandom;
    use rand::SeedableRng;

    fn rank_of(sorted: &[f64], value: f64) -> usize {
        sorted.partition_point(|&s| s <= value)
    }

    #[test]
    fn test_empty_scores() {
        let selector = ThresholdSelector::new(0.035, 0.01).unwrap();
        assert!(matches!(selector.select(&[]), Err(PipelineError::EmptyScores)));
    }

    #[test]
    fn test_non_finite_score() {
        let selector = ThresholdSelector::new(0.5, 0.01).unwrap();
        assert!(matches!(
            selector.select(&[0.9, f64::NAN]),
            Err(PipelineError::NonFiniteScore { row: 1 })
        ));
    }

    #[test]
    fn test_rejects_out_of_range() {
        assert!(ThresholdSelector::new(1.2, 0.01).is_err());
        assert!(ThresholdSelector::new(0.5, -0.1).is_err());
    }

    #[test]
    fn test_approximate_quantile_within_error() {
        let mut scores: Vec<f64> = (1..=10_000).map(|i| i as f64 / 10_000.0).collect();
        scores.shuffle(&mut StdRng::seed_from_u64(5));
        let mut sorted = scores.clone();
        sorted.sort_by(f64::total_cmp);

        let selector = ThresholdSelector::new(0.035, 0.01).unwrap();
        let threshold = selector.select(&scores).unwrap();

        let n = scores.len() as f64;
        let rank = rank_of(&sorted, threshold) as f64;
        assert!(
            (rank - 0.035 * n).abs() <= 0.01 * n,
            "rank {} too far from {}",
            rank,
            0.035 * n
        );
    }

    #[test]
    fn test_skewed_scores_within_error() {
        // Most scores pile up near 1, like confident cluster members
        let mut rng = StdRng::seed_from_u64(9);
        let mut scores: Vec<f64> = (0..5_000)
            .map(|i| 1.0 - ((i as f64 + 1.0) / 5_000.0).powi(4))
            .collect();
        scores.shuffle(&mut rng);
        let mut sorted = scores.clone();
        sorted.sort_by(f64::total_cmp);

        let threshold = ThresholdSelector::new(0.035, 0.01)
            .unwrap()
            .select(&scores)
            .unwrap();

        let n = scores.len() as f64;
        let rank = rank_of(&sorted, threshold) as f64;
        assert!((rank - 0.035 * n).abs() <= 0.01 * n);
    }

    #[test]
    fn test_exact_when_no_error_allowed() {
        let scores = [0.9, 0.1, 0.5, 0.3, 0.7];
        let selector = ThresholdSelector::new(0.4, 0.0).unwrap();
        // ceil(0.4 * 5) = 2nd smallest
        assert_eq!(selector.select(&scores).unwrap(), 0.3);

        let selector = ThresholdSelector::new(0.0, 0.0).unwrap();
        assert_eq!(selector.select(&scores).unwrap(), 0.1);
    }

    #[test]
    fn test_single_score() {
        let selector = ThresholdSelector::new(0.035, 0.01).unwrap();
        assert_eq!(selector.select(&[0.8]).unwrap(), 0.8);
    }

    #[test]
    fn test_chunked_merge_matches_bound() {
        let n = CHUNK_SIZE * 2 + 17;
        let scores: Vec<f64> = (0..n).map(|i| ((i * 7919) % n) as f64 / n as f64).collect();
        let threshold = ThresholdSelector::new(0.5, 0.01)
            .unwrap()
            .select(&scores)
            .unwrap();
        assert!((threshold - 0.5).abs() <= 0.01);
    }
}
