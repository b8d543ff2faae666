//! Transaction record set and input location

use crate::error::{PipelineError, Result};
use arrow::array::{Array, ArrayRef};
use arrow::compute::concat_batches;
use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use arrow::util::display::array_value_to_string;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Where the input parquet file lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputLocation {
    /// File on the local filesystem
    Local(PathBuf),
    /// Object in an S3 (or S3-compatible) bucket
    S3 { bucket: String, key: String },
}

impl FromStr for InputLocation {
    type Err = PipelineError;

    fn from_str(path: &str) -> Result<Self> {
        let remote = path
            .strip_prefix("s3://")
            .or_else(|| path.strip_prefix("s3a://"));

        let Some(rest) = remote else {
            return Ok(InputLocation::Local(PathBuf::from(path)));
        };

        match rest.split_once('/') {
            Some((bucket, key)) if !bucket.is_empty() && !key.is_empty() => Ok(InputLocation::S3 {
                bucket: bucket.to_string(),
                key: key.to_string(),
            }),
            _ => Err(PipelineError::InvalidConfig(format!(
                "object storage path '{}' must look like s3://bucket/key",
                path
            ))),
        }
    }
}

impl fmt::Display for InputLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputLocation::Local(path) => write!(f, "{}", path.display()),
            InputLocation::S3 { bucket, key } => write!(f, "s3://{}/{}", bucket, key),
        }
    }
}

/// Columnar set of transaction records: identifier, numeric attributes and label.
///
/// Read once per run and never mutated; every pipeline stage derives new data
/// from it.
#[derive(Debug, Clone)]
pub struct RecordSet {
    batch: RecordBatch,
}

impl RecordSet {
    /// Wrap a single record batch
    pub fn new(batch: RecordBatch) -> Self {
        Self { batch }
    }

    /// Concatenate decoded batches into one record set
    pub fn from_batches(schema: SchemaRef, batches: &[RecordBatch]) -> Result<Self> {
        let batch = concat_batches(&schema, batches)?;
        Ok(Self { batch })
    }

    pub fn num_rows(&self) -> usize {
        self.batch.num_rows()
    }

    pub fn is_empty(&self) -> bool {
        self.batch.num_rows() == 0
    }

    pub fn schema(&self) -> SchemaRef {
        self.batch.schema()
    }

    /// Column names in schema order
    pub fn column_names(&self) -> Vec<String> {
        self.batch
            .schema()
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.batch.column_by_name(name).is_some()
    }

    /// Look up a column by name
    pub fn column(&self, name: &str) -> Result<&ArrayRef> {
        self.batch
            .column_by_name(name)
            .ok_or_else(|| PipelineError::MissingColumn {
                column: name.to_string(),
            })
    }

    /// Render a single cell for display
    pub fn display_value(&self, column: &str, row: usize) -> Result<String> {
        let array = self.column(column)?;
        if array.is_null(row) {
            return Ok("null".to_string());
        }
        Ok(array_value_to_string(array, row)?)
    }

    pub fn batch(&self) -> &RecordBatch {
        &self.batch
    }
}
