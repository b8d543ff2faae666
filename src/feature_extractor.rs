//! Feature assembly for mixture model fitting.
//!
//! Turns the numeric columns of a record set into one dense feature matrix,
//! one row per record, columns in a fixed order decided by the
//! [`SchemaDescriptor`].

use crate::config::SchemaConfig;
use crate::error::{PipelineError, Result};
use crate::types::record::RecordSet;
use arrow::array::{Array, AsArray};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Float64Type};
use ndarray::{Array2, ArrayView1, ArrayView2};
use tracing::{debug, warn};

/// Which columns contribute features
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeatureSelection {
    /// Every column except the identifier and label, in schema order
    Remaining,
    /// Exactly these columns, in this order
    Explicit(Vec<String>),
}

/// Explicit column roles for the input schema
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaDescriptor {
    pub id_column: String,
    pub label_column: Option<String>,
    pub features: FeatureSelection,
}

impl From<&SchemaConfig> for SchemaDescriptor {
    fn from(config: &SchemaConfig) -> Self {
        let features = if config.feature_columns.is_empty() {
            FeatureSelection::Remaining
        } else {
            FeatureSelection::Explicit(config.feature_columns.clone())
        };

        Self {
            id_column: config.id_column.clone(),
            label_column: config.label().map(str::to_string),
            features,
        }
    }
}

impl SchemaDescriptor {
    fn is_excluded(&self, column: &str) -> bool {
        column == self.id_column || self.label_column.as_deref() == Some(column)
    }

    /// Resolve the ordered feature column list against a concrete record set.
    ///
    /// Fails when the identifier or an explicit feature column is missing, or
    /// when a feature column is not numeric.
    pub fn resolve(&self, records: &RecordSet) -> Result<Vec<String>> {
        records.column(&self.id_column)?;

        if let Some(label) = &self.label_column {
            if !records.has_column(label) {
                warn!(label_column = %label, "Label column not present in input, ignoring");
            }
        }

        let columns: Vec<String> = match &self.features {
            FeatureSelection::Remaining => records
                .column_names()
                .into_iter()
                .filter(|c| !self.is_excluded(c))
                .collect(),
            FeatureSelection::Explicit(columns) => columns.clone(),
        };

        if columns.is_empty() {
            return Err(PipelineError::NoFeatureColumns);
        }

        let schema = records.schema();
        for column in &columns {
            let field = schema
                .field_with_name(column)
                .map_err(|_| PipelineError::MissingColumn {
                    column: column.clone(),
                })?;
            if !field.data_type().is_numeric() {
                return Err(PipelineError::NonNumericFeature {
                    column: column.clone(),
                    data_type: field.data_type().to_string(),
                });
            }
        }

        Ok(columns)
    }

    /// Numeric label values, or `None` when no usable label column exists.
    ///
    /// Nulls count as negative.
    pub fn label_values(&self, records: &RecordSet) -> Option<Vec<f64>> {
        let label = self.label_column.as_deref()?;
        let array = records.column(label).ok()?;
        if !array.data_type().is_numeric() && *array.data_type() != DataType::Boolean {
            return None;
        }

        let floats = cast(array, &DataType::Float64).ok()?;
        Some(
            floats
                .as_primitive::<Float64Type>()
                .iter()
                .map(|v| v.unwrap_or(0.0))
                .collect(),
        )
    }
}

/// Dense, immutable feature matrix (records x features)
#[derive(Debug, Clone)]
pub struct FeatureMatrix {
    columns: Vec<String>,
    values: Array2<f64>,
}

impl FeatureMatrix {
    /// Build from raw values; `values` must have one column per name.
    pub fn new(columns: Vec<String>, values: Array2<f64>) -> Result<Self> {
        if columns.len() != values.ncols() {
            return Err(PipelineError::InvalidConfig(format!(
                "{} feature names for {} feature columns",
                columns.len(),
                values.ncols()
            )));
        }
        Ok(Self { columns, values })
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.values.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.values.nrows() == 0
    }

    /// Length of every feature vector
    pub fn dimension(&self) -> usize {
        self.values.ncols()
    }

    /// Feature names in vector order
    pub fn column_names(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> ArrayView2<'_, f64> {
        self.values.view()
    }

    /// Feature vector of one record
    pub fn row(&self, index: usize) -> ArrayView1<'_, f64> {
        self.values.row(index)
    }
}

/// Assembles the composite feature vector of every record
#[derive(Debug, Clone)]
pub struct FeatureAssembler {
    schema: SchemaDescriptor,
}

impl FeatureAssembler {
    pub fn new(schema: SchemaDescriptor) -> Self {
        Self { schema }
    }

    pub fn schema(&self) -> &SchemaDescriptor {
        &self.schema
    }

    /// Concatenate the feature columns of each record into one vector.
    ///
    /// Every value must be present and finite.
    pub fn assemble(&self, records: &RecordSet) -> Result<FeatureMatrix> {
        let columns = self.schema.resolve(records)?;
        let mut values = Array2::<f64>::zeros((records.num_rows(), columns.len()));

        for (j, name) in columns.iter().enumerate() {
            let floats = cast(records.column(name)?, &DataType::Float64)?;
            for (row, value) in floats.as_primitive::<Float64Type>().iter().enumerate() {
                let value = value.ok_or_else(|| PipelineError::NullFeature {
                    column: name.clone(),
                    row,
                })?;
                if !value.is_finite() {
                    return Err(PipelineError::NonFiniteFeature {
                        column: name.clone(),
                        row,
                    });
                }
                values[[row, j]] = value;
            }
        }

        debug!(
            records = records.num_rows(),
            features = columns.len(),
            "Feature vectors assembled"
        );

        FeatureMatrix::new(columns, values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Float32Array, Float64Array, Int32Array, Int64Array, StringArray};
    use arrow::datatypes::{Field, Schema};
    use arrow::record_batch::RecordBatch;
    use std::sync::Arc;

    fn records() -> RecordSet {
        let schema = Arc::new(Schema::new(vec![
            Field::new("TransactionID", DataType::Int64, false),
            Field::new("isFraud", DataType::Int32, false),
            Field::new("TransactionAmt", DataType::Float64, false),
            Field::new("card1", DataType::Int32, false),
            Field::new("C1", DataType::Float32, false),
        ]));
        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int64Array::from(vec![1, 2, 3])),
                Arc::new(Int32Array::from(vec![0, 1, 0])),
                Arc::new(Float64Array::from(vec![68.5, 29.0, 59.0])),
                Arc::new(Int32Array::from(vec![13926, 2755, 4663])),
                Arc::new(Float32Array::from(vec![1.0, 1.0, 2.5])),
            ],
        )
        .unwrap();
        RecordSet::new(batch)
    }

    fn descriptor() -> SchemaDescriptor {
        SchemaDescriptor::from(&SchemaConfig::default())
    }

    #[test]
    fn test_vector_follows_schema_order() {
        let assembler = FeatureAssembler::new(descriptor());
        let features = assembler.assemble(&records()).unwrap();

        assert_eq!(features.len(), 3);
        assert_eq!(features.dimension(), 3);
        assert_eq!(features.column_names(), ["TransactionAmt", "card1", "C1"]);
        assert_eq!(features.row(0).to_vec(), vec![68.5, 13926.0, 1.0]);
        assert_eq!(features.row(2).to_vec(), vec![59.0, 4663.0, 2.5]);
    }

    #[test]
    fn test_explicit_columns_keep_given_order() {
        let mut config = SchemaConfig::default();
        config.feature_columns = vec!["C1".to_string(), "TransactionAmt".to_string()];
        let assembler = FeatureAssembler::new(SchemaDescriptor::from(&config));

        let features = assembler.assemble(&records()).unwrap();
        assert_eq!(features.column_names(), ["C1", "TransactionAmt"]);
        assert_eq!(features.row(1).to_vec(), vec![1.0, 29.0]);
    }

    #[test]
    fn test_non_numeric_column_is_named() {
        let schema = Arc::new(Schema::new(vec![
            Field::new("TransactionID", DataType::Int64, false),
            Field::new("ProductCD", DataType::Utf8, false),
        ]));
        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int64Array::from(vec![1])),
                Arc::new(StringArray::from(vec!["W"])),
            ],
        )
        .unwrap();

        let err = FeatureAssembler::new(descriptor())
            .assemble(&RecordSet::new(batch))
            .unwrap_err();
        match err {
            PipelineError::NonNumericFeature { column, .. } => assert_eq!(column, "ProductCD"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_columns() {
        let mut config = SchemaConfig::default();
        config.id_column = "TxnId".to_string();
        let err = FeatureAssembler::new(SchemaDescriptor::from(&config))
            .assemble(&records())
            .unwrap_err();
        assert!(matches!(err, PipelineError::MissingColumn { column } if column == "TxnId"));

        let mut config = SchemaConfig::default();
        config.feature_columns = vec!["V300".to_string()];
        let err = FeatureAssembler::new(SchemaDescriptor::from(&config))
            .assemble(&records())
            .unwrap_err();
        assert!(matches!(err, PipelineError::MissingColumn { column } if column == "V300"));
    }

    #[test]
    fn test_null_feature_is_rejected() {
        let schema = Arc::new(Schema::new(vec![
            Field::new("TransactionID", DataType::Int64, false),
            Field::new("dist1", DataType::Float64, true),
        ]));
        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int64Array::from(vec![1, 2])),
                Arc::new(Float64Array::from(vec![Some(1.0), None])),
            ],
        )
        .unwrap();

        let err = FeatureAssembler::new(descriptor())
            .assemble(&RecordSet::new(batch))
            .unwrap_err();
        assert!(matches!(err, PipelineError::NullFeature { row: 1, .. }));
    }

    #[test]
    fn test_only_excluded_columns() {
        let schema = Arc::new(Schema::new(vec![
            Field::new("TransactionID", DataType::Int64, false),
            Field::new("isFraud", DataType::Int32, false),
        ]));
        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int64Array::from(vec![1])),
                Arc::new(Int32Array::from(vec![0])),
            ],
        )
        .unwrap();

        let err = FeatureAssembler::new(descriptor())
            .assemble(&RecordSet::new(batch))
            .unwrap_err();
        assert!(matches!(err, PipelineError::NoFeatureColumns));
    }

    #[test]
    fn test_label_values() {
        let labels = descriptor().label_values(&records()).unwrap();
        assert_eq!(labels, vec![0.0, 1.0, 0.0]);

        let mut config = SchemaConfig::default();
        config.label_column = None;
        assert!(SchemaDescriptor::from(&config).label_values(&records()).is_none());
    }

    #[test]
    fn test_empty_label_name_makes_label_a_feature() {
        let mut config = SchemaConfig::default();
        config.label_column = Some(String::new());
        let descriptor = SchemaDescriptor::from(&config);
        assert_eq!(descriptor.label_column, None);

        let features = FeatureAssembler::new(descriptor).assemble(&records()).unwrap();
        assert!(features.column_names().iter().any(|c| c == "isFraud"));
        assert_eq!(features.dimension(), 4);
    }
}
