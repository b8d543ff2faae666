//! Configuration management for the anomaly detection pipeline

use crate::error::{PipelineError, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;

/// Report output format
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    /// Human readable table with a row limit
    #[default]
    Table,
    /// One JSON object per anomaly
    Json,
}

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub input: InputConfig,
    pub schema: SchemaConfig,
    pub model: ModelConfig,
    pub detection: DetectionConfig,
    pub report: ReportConfig,
    pub logging: LoggingConfig,
}

/// Input location configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// Local parquet path or `s3://bucket/key` URI
    pub path: String,
    /// S3 region override
    pub region: Option<String>,
    /// S3-compatible endpoint override
    pub endpoint_url: Option<String>,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            path: "s3://finalprojectbucket-1x1/data/train_cleaned.parquet".to_string(),
            region: None,
            endpoint_url: None,
        }
    }
}

/// Column roles in the input schema
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchemaConfig {
    /// Identifier column, never used as a feature
    pub id_column: String,
    /// Label column, never used as a feature. An empty name means the input has none.
    pub label_column: Option<String>,
    /// Ordered feature columns. Empty means every other column in schema order.
    pub feature_columns: Vec<String>,
}

impl SchemaConfig {
    /// Configured label column, if any
    pub fn label(&self) -> Option<&str> {
        self.label_column
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
    }
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            id_column: "TransactionID".to_string(),
            label_column: Some("isFraud".to_string()),
            feature_columns: Vec::new(),
        }
    }
}

/// Gaussian mixture configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Number of mixture components (k)
    pub components: usize,
    /// Seed for the EM initialisation
    pub seed: u64,
    /// Convergence tolerance on the EM lower bound
    pub tolerance: f64,
    /// EM iteration cap
    pub max_iterations: u64,
    /// Independent EM runs; the best lower bound wins
    pub n_runs: u64,
    /// Non-negative value added to covariance diagonals
    pub reg_covariance: f64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            components: 15,
            seed: 1,
            tolerance: 1e-3,
            max_iterations: 100,
            n_runs: 1,
            reg_covariance: 1e-6,
        }
    }
}

/// Anomaly threshold configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Quantile of the max-probability scores used as the threshold
    pub quantile: f64,
    /// Rank error bound of the approximate quantile (0 = exact)
    pub relative_error: f64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            quantile: 0.035,
            relative_error: 0.01,
        }
    }
}

/// Report configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Identifying columns shown for each anomaly
    pub columns: Vec<String>,
    /// Number of anomalies printed
    pub max_rows: usize,
    /// Output format
    pub format: ReportFormat,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            columns: vec!["TransactionID".to_string(), "TransactionAmt".to_string()],
            max_rows: 20,
            format: ReportFormat::Table,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (json, pretty)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a file, if present, then apply `ANOMALY__*` env overrides
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let invalid = |e: config::ConfigError| {
            PipelineError::InvalidConfig(format!("{}: {}", path.display(), e))
        };

        Config::builder()
            .add_source(File::from(path).required(false))
            .add_source(
                Environment::with_prefix("ANOMALY")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(invalid)?
            .try_deserialize()
            .map_err(invalid)
    }

    /// Reject parameter combinations the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(PipelineError::InvalidConfig(msg));

        if self.input.path.trim().is_empty() {
            return invalid("input.path must not be empty".to_string());
        }
        if self.schema.id_column.trim().is_empty() {
            return invalid("schema.id_column must not be empty".to_string());
        }

        let mut seen = HashSet::new();
        for column in &self.schema.feature_columns {
            if *column == self.schema.id_column || self.schema.label() == Some(column.as_str())
            {
                return invalid(format!(
                    "schema.feature_columns must not contain the identifier or label column '{}'",
                    column
                ));
            }
            if !seen.insert(column.as_str()) {
                return invalid(format!("schema.feature_columns lists '{}' twice", column));
            }
        }

        let model = &self.model;
        if model.components == 0 {
            return invalid("model.components must be at least 1".to_string());
        }
        if !(model.tolerance > 0.0) {
            return invalid(format!("model.tolerance must be positive, got {}", model.tolerance));
        }
        if model.max_iterations == 0 || model.n_runs == 0 {
            return invalid("model.max_iterations and model.n_runs must be at least 1".to_string());
        }
        if !(model.reg_covariance >= 0.0) {
            return invalid(format!(
                "model.reg_covariance must be non-negative, got {}",
                model.reg_covariance
            ));
        }

        let detection = &self.detection;
        if !(0.0..=1.0).contains(&detection.quantile) {
            return invalid(format!(
                "detection.quantile must lie in [0, 1], got {}",
                detection.quantile
            ));
        }
        if !(0.0..=1.0).contains(&detection.relative_error) {
            return invalid(format!(
                "detection.relative_error must lie in [0, 1], got {}",
                detection.relative_error
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use serial_test::serial;
    use std::io::Write;

    fn toml_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "{}", contents).unwrap();
        file
    }

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.schema.id_column, "TransactionID");
        assert_eq!(config.schema.label_column.as_deref(), Some("isFraud"));
        assert_eq!(config.model.components, 15);
        assert_eq!(config.model.seed, 1);
        assert_eq!(config.detection.quantile, 0.035);
        assert_eq!(config.detection.relative_error, 0.01);
        assert_eq!(config.report.max_rows, 20);
        assert_eq!(config.report.format, ReportFormat::Table);
        assert!(config.validate().is_ok());
    }

    #[test]
    #[serial]
    fn test_partial_file_keeps_defaults() {
        let file = toml_file(
            "[input]\npath = \"data/train.parquet\"\n\n[model]\ncomponents = 4\n\n[report]\nformat = \"json\"",
        );

        let config = AppConfig::load_from_path(file.path()).unwrap();
        assert_eq!(config.input.path, "data/train.parquet");
        assert_eq!(config.model.components, 4);
        assert_eq!(config.model.seed, 1);
        assert_eq!(config.report.format, ReportFormat::Json);
        assert_eq!(config.detection.quantile, 0.035);
    }

    #[test]
    fn test_validation_rejects_bad_parameters() {
        let mut config = AppConfig::default();
        config.model.components = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.detection.quantile = 1.5;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.schema.feature_columns = vec!["TransactionAmt".into(), "isFraud".into()];
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.schema.feature_columns = vec!["V1".into(), "V1".into()];
        assert!(config.validate().is_err());
    }

    #[test]
    #[serial]
    fn test_env_overrides_file() {
        let file = toml_file("[model]\ncomponents = 4\nseed = 9");

        std::env::set_var("ANOMALY__MODEL__COMPONENTS", "8");
        std::env::set_var("ANOMALY__DETECTION__QUANTILE", "0.05");
        let config = AppConfig::load_from_path(file.path());
        std::env::remove_var("ANOMALY__MODEL__COMPONENTS");
        std::env::remove_var("ANOMALY__DETECTION__QUANTILE");

        let config = config.unwrap();
        assert_eq!(config.model.components, 8);
        assert_eq!(config.model.seed, 9);
        assert_eq!(config.detection.quantile, 0.05);
    }

    #[test]
    #[serial]
    fn test_mistyped_file_is_configuration_error() {
        let file = toml_file("[model]\ncomponents = \"x\"");

        let err = AppConfig::load_from_path(file.path()).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidConfig(_)));
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert_eq!(err.kind().exit_code(), 2);

        let file = toml_file("[model\ncomponents = 4");
        assert!(matches!(
            AppConfig::load_from_path(file.path()),
            Err(PipelineError::InvalidConfig(_))
        ));
    }

    #[test]
    #[serial]
    fn test_empty_label_column_disables_label() {
        let file = toml_file("[schema]\nlabel_column = \"\"");

        let config = AppConfig::load_from_path(file.path()).unwrap();
        assert_eq!(config.schema.label(), None);
        assert_eq!(AppConfig::default().schema.label(), Some("isFraud"));
    }
}
