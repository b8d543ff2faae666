//! Gaussian mixture fitting and posterior evaluation

use crate::config::ModelConfig;
use crate::error::{PipelineError, Result};
use crate::feature_extractor::FeatureMatrix;
use linfa::traits::Fit;
use linfa::DatasetBase;
use linfa_clustering::{GaussianMixtureModel, GmmError};
use linfa_linalg::cholesky::Cholesky;
use linfa_linalg::triangular::{SolveTriangular, UPLO};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256Plus;
use std::collections::HashSet;
use std::f64::consts::PI;
use tracing::{debug, info};

/// Parameters of one EM fit
#[derive(Debug, Clone, PartialEq)]
pub struct MixtureParams {
    /// Number of components (k)
    pub components: usize,
    pub seed: u64,
    pub tolerance: f64,
    pub max_iterations: u64,
    pub n_runs: u64,
    pub reg_covariance: f64,
}

impl From<&ModelConfig> for MixtureParams {
    fn from(config: &ModelConfig) -> Self {
        Self {
            components: config.components,
            seed: config.seed,
            tolerance: config.tolerance,
            max_iterations: config.max_iterations,
            n_runs: config.n_runs,
            reg_covariance: config.reg_covariance,
        }
    }
}

impl Default for MixtureParams {
    fn default() -> Self {
        Self::from(&ModelConfig::default())
    }
}

/// Fits a full-covariance Gaussian mixture by expectation-maximization
#[derive(Debug, Clone)]
pub struct MixtureFitter {
    params: MixtureParams,
}

impl MixtureFitter {
    pub fn new(params: MixtureParams) -> Self {
        Self { params }
    }

    /// Fit the mixture to the feature vectors.
    ///
    /// Identical inputs and seed give an identical model.
    pub fn fit(&self, features: &FeatureMatrix) -> Result<FittedMixture> {
        let k = self.params.components;
        let seed = self.params.seed;

        let distinct = count_distinct_rows(features.values(), k);
        if distinct < k {
            return Err(PipelineError::InsufficientData { k, distinct });
        }

        info!(
            k,
            seed,
            records = features.len(),
            dimension = features.dimension(),
            tolerance = self.params.tolerance,
            max_iterations = self.params.max_iterations,
            "Fitting Gaussian mixture"
        );

        let dataset = DatasetBase::from(features.values().to_owned());
        let rng = Xoshiro256Plus::seed_from_u64(seed);

        let model = GaussianMixtureModel::params(k)
            .n_runs(self.params.n_runs)
            .tolerance(self.params.tolerance)
            .max_n_iterations(self.params.max_iterations)
            .reg_covariance(self.params.reg_covariance)
            .with_rng(rng)
            .fit(&dataset)
            .map_err(|e| self.classify(e))?;

        let fitted = FittedMixture::new(
            model.weights().to_owned(),
            model.means().to_owned(),
            model
                .covariances()
                .axis_iter(Axis(0))
                .map(|c| c.to_owned())
                .collect(),
            seed,
        )?;

        debug!(k, seed, "EM converged");
        Ok(fitted)
    }

    fn classify(&self, err: GmmError) -> PipelineError {
        let k = self.params.components;
        let seed = self.params.seed;
        let reason = err.to_string();

        match err {
            GmmError::NotConverged(_) => PipelineError::NotConverged {
                k,
                seed,
                max_iterations: self.params.max_iterations,
                reason,
            },
            GmmError::LinalgError(_) | GmmError::EmptyCluster(_) | GmmError::LowerBoundError(_) => {
                PipelineError::NumericalInstability { k, seed, reason }
            }
            _ => PipelineError::Fit { k, seed, reason },
        }
    }
}

/// Count distinct feature vectors, stopping once `limit` is reached
fn count_distinct_rows(values: ArrayView2<'_, f64>, limit: usize) -> usize {
    let mut seen: HashSet<Vec<u64>> = HashSet::new();
    for row in values.rows() {
        // -0.0 and 0.0 are the same point
        seen.insert(row.iter().map(|v| (v + 0.0).to_bits()).collect());
        if seen.len() >= limit {
            break;
        }
    }
    seen.len()
}

/// Mixture model learned from the data: weight, mean and covariance per component
#[derive(Debug, Clone)]
pub struct FittedMixture {
    weights: Array1<f64>,
    means: Array2<f64>,
    /// Transposed inverse Cholesky factor of each covariance, so that
    /// `(x - μ) · P` has squared norm equal to the Mahalanobis distance
    precision_cholesky: Vec<Array2<f64>>,
    /// ln |Σ_j|
    log_dets: Vec<f64>,
    seed: u64,
}

impl FittedMixture {
    /// Build from component parameters; each covariance must be positive definite.
    pub fn new(
        weights: Array1<f64>,
        means: Array2<f64>,
        covariances: Vec<Array2<f64>>,
        seed: u64,
    ) -> Result<Self> {
        let k = weights.len();
        let d = means.ncols();
        let unstable = |reason: String| PipelineError::NumericalInstability { k, seed, reason };

        if means.nrows() != k || covariances.len() != k {
            return Err(unstable(format!(
                "{} weights, {} means and {} covariances",
                k,
                means.nrows(),
                covariances.len()
            )));
        }
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) || means.iter().any(|m| !m.is_finite()) {
            return Err(unstable("non-finite weights or means".to_string()));
        }

        let mut precision_cholesky = Vec::with_capacity(k);
        let mut log_dets = Vec::with_capacity(k);
        for (j, covariance) in covariances.iter().enumerate() {
            if covariance.dim() != (d, d) {
                return Err(unstable(format!(
                    "component {} covariance has shape {:?}, expected ({}, {})",
                    j,
                    covariance.dim(),
                    d,
                    d
                )));
            }
            if covariance.iter().any(|v| !v.is_finite()) {
                return Err(unstable(format!("covariance of component {} is not finite", j)));
            }

            let factor = covariance.cholesky().map_err(|e| {
                unstable(format!("covariance of component {} is singular: {}", j, e))
            })?;
            let inverse = factor
                .solve_triangular(&Array2::<f64>::eye(d), UPLO::Lower)
                .map_err(|e| unstable(format!("covariance of component {}: {}", j, e)))?;

            log_dets.push(2.0 * factor.diag().mapv(f64::ln).sum());
            precision_cholesky.push(inverse.reversed_axes());
        }

        Ok(Self {
            weights,
            means,
            precision_cholesky,
            log_dets,
            seed,
        })
    }

    /// Number of components (k)
    pub fn components(&self) -> usize {
        self.weights.len()
    }

    /// Feature vector length the model was fitted on
    pub fn dimension(&self) -> usize {
        self.means.ncols()
    }

    pub fn weights(&self) -> &Array1<f64> {
        &self.weights
    }

    pub fn means(&self) -> &Array2<f64> {
        &self.means
    }

    /// Posterior membership probabilities of every record (records x k).
    ///
    /// Fails rather than returning NaNs.
    pub fn posteriors(&self, features: &FeatureMatrix) -> Result<Posteriors> {
        let k = self.components();
        let d = self.dimension();
        if features.dimension() != d {
            return Err(PipelineError::InvalidConfig(format!(
                "model fitted on {} features, got {}",
                d,
                features.dimension()
            )));
        }

        let values = features.values();
        let mut probabilities = Array2::<f64>::zeros((features.len(), k));

        // ln w_j + ln N(x | μ_j, Σ_j), one column per component
        for j in 0..k {
            let z = (&values - &self.means.row(j)).dot(&self.precision_cholesky[j]);
            let mahalanobis = z.mapv(|v| v * v).sum_axis(Axis(1));
            let constant =
                self.weights[j].ln() - 0.5 * (d as f64 * (2.0 * PI).ln() + self.log_dets[j]);
            probabilities
                .column_mut(j)
                .assign(&mahalanobis.mapv(|m| constant - 0.5 * m));
        }

        for (i, mut row) in probabilities.rows_mut().into_iter().enumerate() {
            let max = row.fold(f64::NEG_INFINITY, |m, &v| m.max(v));
            if !max.is_finite() || row.iter().any(|v| v.is_nan()) {
                return Err(PipelineError::NumericalInstability {
                    k,
                    seed: self.seed,
                    reason: format!("record {} has no finite component likelihood", i),
                });
            }
            let norm = max + row.mapv(|v| (v - max).exp()).sum().ln();
            row.mapv_inplace(|v| (v - norm).exp());
        }

        Ok(Posteriors(probabilities))
    }
}

/// Per-record posterior probability vectors (records x k), each summing to 1
#[derive(Debug, Clone)]
pub struct Posteriors(Array2<f64>);

impl Posteriors {
    /// Number of records
    pub fn len(&self) -> usize {
        self.0.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.0.nrows() == 0
    }

    /// Number of components (k)
    pub fn components(&self) -> usize {
        self.0.ncols()
    }

    /// Probability vector of one record
    pub fn row(&self, index: usize) -> ArrayView1<'_, f64> {
        self.0.row(index)
    }

    pub fn rows(&self) -> impl Iterator<Item = ArrayView1<'_, f64>> {
        self.0.rows().into_iter()
    }

    /// Most likely component of every record
    pub fn assignments(&self) -> Vec<usize> {
        self.rows()
            .map(|p| {
                p.iter()
                    .enumerate()
                    .fold((0, f64::NEG_INFINITY), |best, (j, &v)| {
                        if v > best.1 {
                            (j, v)
                        } else {
                            best
                        }
                    })
                    .0
            })
            .collect()
    }
}
