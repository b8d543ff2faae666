//! Session: the run-scoped handle on storage.
//!
//! Opened once at pipeline start and released exactly once, either through
//! [`Session::close`] or on drop when an error unwinds the run.

use crate::config::InputConfig;
use crate::error::{PipelineError, Result};
use crate::types::record::{InputLocation, RecordSet};
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::Client as S3Client;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use std::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

/// Run-scoped storage session
pub struct Session {
    id: Uuid,
    s3: Option<S3Client>,
    started_at: DateTime<Utc>,
    opened_at: Instant,
    released: bool,
}

impl Session {
    /// Acquire the session. An S3 client is only built when the input is remote.
    pub async fn open(config: &InputConfig) -> Result<Self> {
        let location: InputLocation = config.path.parse()?;

        let s3 = match location {
            InputLocation::S3 { .. } => Some(Self::s3_client(config).await),
            InputLocation::Local(_) => None,
        };

        let session = Self {
            id: Uuid::new_v4(),
            s3,
            started_at: Utc::now(),
            opened_at: Instant::now(),
            released: false,
        };

        info!(
            session_id = %session.id,
            started_at = %session.started_at.to_rfc3339(),
            object_storage = session.s3.is_some(),
            "Session started"
        );
        Ok(session)
    }

    async fn s3_client(config: &InputConfig) -> S3Client {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = &config.region {
            loader = loader.region(Region::new(region.clone()));
        }
        let shared = loader.load().await;

        let mut builder = aws_sdk_s3::config::Builder::from(&shared);
        if let Some(endpoint) = &config.endpoint_url {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }
        S3Client::from_conf(builder.build())
    }

    /// Read a parquet file into one record set
    pub async fn read_parquet(&self, location: &InputLocation) -> Result<RecordSet> {
        let data = self.fetch(location).await?;
        let size = data.len();

        let input_error = |reason: String| PipelineError::Input {
            location: location.to_string(),
            reason,
        };

        let builder = ParquetRecordBatchReaderBuilder::try_new(data)
            .map_err(|e| input_error(e.to_string()))?;
        let schema = builder.schema().clone();
        let reader = builder.build().map_err(|e| input_error(e.to_string()))?;

        let batches = reader
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| input_error(e.to_string()))?;
        let records = RecordSet::from_batches(schema, &batches)?;

        info!(
            session_id = %self.id,
            location = %location,
            bytes = size,
            rows = records.num_rows(),
            columns = records.schema().fields().len(),
            "Input loaded"
        );
        Ok(records)
    }

    async fn fetch(&self, location: &InputLocation) -> Result<Bytes> {
        match location {
            InputLocation::Local(path) => {
                let data = tokio::fs::read(path)
                    .await
                    .map_err(|e| PipelineError::Input {
                        location: location.to_string(),
                        reason: e.to_string(),
                    })?;
                Ok(Bytes::from(data))
            }
            InputLocation::S3 { bucket, key } => {
                let client = self.s3.as_ref().ok_or_else(|| PipelineError::Input {
                    location: location.to_string(),
                    reason: "session was opened without object storage access".to_string(),
                })?;

                let object = client
                    .get_object()
                    .bucket(bucket)
                    .key(key)
                    .send()
                    .await
                    .map_err(|e| PipelineError::Input {
                        location: location.to_string(),
                        reason: DisplayErrorContext(&e).to_string(),
                    })?;

                let body = object.body.collect().await.map_err(|e| PipelineError::Input {
                    location: location.to_string(),
                    reason: e.to_string(),
                })?;
                Ok(body.into_bytes())
            }
        }
    }

    /// Release the session
    pub fn close(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.s3 = None;
        info!(
            session_id = %self.id,
            elapsed_ms = self.opened_at.elapsed().as_millis() as u64,
            "Session stopped"
        );
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if !self.released {
            warn!(session_id = %self.id, "Session released without explicit close");
            self.release();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Float64Array, Int64Array};
    use arrow::datatypes::{DataType, Field, Schema};
    use arrow::record_batch::RecordBatch;
    use parquet::arrow::ArrowWriter;
    use std::sync::Arc;

    fn write_sample(path: &std::path::Path) {
        let schema = Arc::new(Schema::new(vec![
            Field::new("TransactionID", DataType::Int64, false),
            Field::new("TransactionAmt", DataType::Float64, false),
        ]));
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(Int64Array::from(vec![10, 11, 12])),
                Arc::new(Float64Array::from(vec![1.5, 2.5, 3.5])),
            ],
        )
        .unwrap();

        let file = std::fs::File::create(path).unwrap();
        let mut writer = ArrowWriter::try_new(file, schema, None).unwrap();
        writer.write(&batch).unwrap();
        writer.write(&batch).unwrap();
        writer.close().unwrap();
    }

    #[tokio::test]
    async fn test_read_local_parquet() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("train.parquet");
        write_sample(&path);

        let config = InputConfig {
            path: path.display().to_string(),
            ..InputConfig::default()
        };
        let session = Session::open(&config).await.unwrap();
        let location: InputLocation = config.path.parse().unwrap();
        let records = session.read_parquet(&location).await.unwrap();
        session.close();

        assert_eq!(records.num_rows(), 6);
        assert_eq!(records.column_names(), vec!["TransactionID", "TransactionAmt"]);
        assert_eq!(records.display_value("TransactionID", 4).unwrap(), "11");
    }

    #[tokio::test]
    async fn test_missing_file_is_input_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = InputConfig {
            path: dir.path().join("absent.parquet").display().to_string(),
            ..InputConfig::default()
        };
        let session = Session::open(&config).await.unwrap();
        let location: InputLocation = config.path.parse().unwrap();

        let err = session.read_parquet(&location).await.unwrap_err();
        assert!(matches!(err, PipelineError::Input { .. }));
        assert_eq!(err.kind(), crate::error::ErrorKind::Configuration);
    }

    #[tokio::test]
    async fn test_not_parquet_is_input_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("train.parquet");
        std::fs::write(&path, b"TransactionID,TransactionAmt\n1,2.0\n").unwrap();

        let config = InputConfig {
            path: path.display().to_string(),
            ..InputConfig::default()
        };
        let session = Session::open(&config).await.unwrap();
        let err = session
            .read_parquet(&config.path.parse().unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Input { .. }));
    }
}
