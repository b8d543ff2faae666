//! GMM Anomaly Detection Library
//!
//! Scores transaction records by how confidently a Gaussian mixture model
//! places them in any one cluster, and flags the records whose confidence
//! falls below a low quantile of all scores.

pub mod config;
pub mod error;
pub mod feature_extractor;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod report;
pub mod session;
pub mod synthetic;
pub mod types;

pub use config::AppConfig;
pub use error::{ErrorKind, PipelineError};
pub use feature_extractor::{FeatureAssembler, FeatureMatrix, SchemaDescriptor};
pub use models::mixture::{FittedMixture, MixtureFitter, MixtureParams, Posteriors};
pub use models::scoring::max_probability;
pub use models::threshold::ThresholdSelector;
pub use pipeline::{Detection, DetectionPipeline};
pub use report::Reporter;
pub use session::Session;
pub use types::{anomaly::AnomalySet, record::RecordSet};
