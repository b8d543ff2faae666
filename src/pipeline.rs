//! Anomaly detection pipeline: Assemble → Fit → Score → Threshold → Filter.
//!
//! Each stage consumes the previous stage's output in full; nothing is
//! retried and any failure aborts the run.

use crate::config::AppConfig;
use crate::error::Result;
use crate::feature_extractor::{FeatureAssembler, SchemaDescriptor};
use crate::metrics::{RunMetrics, Stage};
use crate::models::mixture::{FittedMixture, MixtureFitter, MixtureParams, Posteriors};
use crate::models::scoring::score_all;
use crate::models::threshold::ThresholdSelector;
use crate::types::anomaly::{AnomalySet, LabelSummary};
use crate::types::record::RecordSet;
use tracing::info;

/// Everything one run produced
#[derive(Debug, Clone)]
pub struct Detection {
    /// Feature columns in vector order
    pub feature_columns: Vec<String>,
    pub model: FittedMixture,
    pub posteriors: Posteriors,
    /// Max-probability score per record
    pub scores: Vec<f64>,
    /// Most likely component per record
    pub assignments: Vec<usize>,
    pub threshold: f64,
    pub anomalies: AnomalySet,
    /// Present when the input carries a usable label column
    pub labels: Option<LabelSummary>,
}

/// The five-stage detection pipeline
#[derive(Debug, Clone)]
pub struct DetectionPipeline {
    assembler: FeatureAssembler,
    fitter: MixtureFitter,
    selector: ThresholdSelector,
}

impl DetectionPipeline {
    pub fn new(
        assembler: FeatureAssembler,
        fitter: MixtureFitter,
        selector: ThresholdSelector,
    ) -> Self {
        Self {
            assembler,
            fitter,
            selector,
        }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::new(
            FeatureAssembler::new(SchemaDescriptor::from(&config.schema)),
            MixtureFitter::new(MixtureParams::from(&config.model)),
            ThresholdSelector::new(config.detection.quantile, config.detection.relative_error)?,
        ))
    }

    pub fn run(&self, records: &RecordSet, metrics: &mut RunMetrics) -> Result<Detection> {
        let features = metrics.time(Stage::Assemble, || self.assembler.assemble(records))?;
        info!(
            records = features.len(),
            features = features.dimension(),
            "Feature vectors assembled"
        );

        let model = metrics.time(Stage::Fit, || self.fitter.fit(&features))?;
        info!(
            components = model.components(),
            weights = ?model.weights().iter().map(|w| format!("{:.4}", w)).collect::<Vec<_>>(),
            "Mixture model fitted"
        );

        let (posteriors, scores) = metrics.time(Stage::Score, || {
            model.posteriors(&features).map(|p| {
                let scores = score_all(&p);
                (p, scores)
            })
        })?;
        metrics.record_scores(&scores);
        let assignments = posteriors.assignments();

        let threshold = metrics.time(Stage::Threshold, || self.selector.select(&scores))?;
        info!(
            quantile = self.selector.quantile(),
            relative_error = self.selector.relative_error(),
            threshold,
            "Anomaly threshold selected"
        );

        let anomalies = metrics.time(Stage::Filter, || {
            AnomalySet::filter(&scores, &assignments, threshold)
        });
        metrics.record_anomalies(anomalies.len());
        info!(anomalies = anomalies.len(), "Anomalies filtered");

        let labels = self
            .assembler
            .schema()
            .label_values(records)
            .map(|labels| LabelSummary::from_labels(&labels, &anomalies));

        Ok(Detection {
            feature_columns: features.column_names().to_vec(),
            model,
            posteriors,
            scores,
            assignments,
            threshold,
            anomalies,
            labels,
        })
    }
}
