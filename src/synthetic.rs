//! Seeded synthetic transactions: two well-separated Gaussian blobs plus a
//! handful of outliers sitting between them.
//!
//! Blob centres lie three standard deviations either side of the midpoint
//! along `V1`. That keeps blob members confidently assigned without every
//! posterior rounding to exactly 1, while midpoint outliers stay ambiguous
//! between the two components whichever one absorbs them during EM.
//!
//! Columns: `TransactionID`, `isFraud`, `TransactionAmt`, `V1`, `V2`. Outliers
//! are labelled `isFraud = 1` and occupy the last rows.

use crate::error::Result;
use crate::types::record::RecordSet;
use arrow::array::{Float64Array, Int32Array, Int64Array};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::error::ArrowError;
use arrow::record_batch::RecordBatch;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use std::ops::Range;
use std::sync::Arc;

/// First transaction identifier
const FIRST_ID: i64 = 2_987_000;

/// Mean transaction amount of both blobs
const BASE_AMOUNT: f64 = 100.0;

#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticDataset {
    /// Records per blob
    pub blob_size: usize,
    /// Outlier records
    pub outliers: usize,
    /// Distance of each blob centre from the midpoint along `V1`
    pub half_separation: f64,
    pub seed: u64,
}

impl Default for SyntheticDataset {
    fn default() -> Self {
        Self {
            blob_size: 495,
            outliers: 10,
            half_separation: 3.0,
            seed: 42,
        }
    }
}

impl SyntheticDataset {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn len(&self) -> usize {
        2 * self.blob_size + self.outliers
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Row indices of the outliers
    pub fn outlier_rows(&self) -> Range<usize> {
        2 * self.blob_size..self.len()
    }

    pub fn generate_batch(&self) -> std::result::Result<RecordBatch, ArrowError> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let noise = Normal::new(0.0, 1.0).map_err(|e| ArrowError::ComputeError(e.to_string()))?;

        let n = self.len();
        let mut ids = Vec::with_capacity(n);
        let mut labels: Vec<i32> = Vec::with_capacity(n);
        let mut amounts = Vec::with_capacity(n);
        let mut v1 = Vec::with_capacity(n);
        let mut v2 = Vec::with_capacity(n);

        for i in 0..n {
            ids.push(FIRST_ID + i as i64);
            if i < 2 * self.blob_size {
                let centre = if i < self.blob_size {
                    -self.half_separation
                } else {
                    self.half_separation
                };
                labels.push(0);
                amounts.push(BASE_AMOUNT + noise.sample(&mut rng));
                v1.push(centre + noise.sample(&mut rng));
                v2.push(noise.sample(&mut rng));
            } else {
                labels.push(1);
                amounts.push(BASE_AMOUNT + rng.gen_range(-1.0..1.0));
                v1.push(rng.gen_range(-0.2..0.2));
                v2.push(rng.gen_range(-1.0..1.0));
            }
        }

        let schema = Arc::new(Schema::new(vec![
            Field::new("TransactionID", DataType::Int64, false),
            Field::new("isFraud", DataType::Int32, false),
            Field::new("TransactionAmt", DataType::Float64, false),
            Field::new("V1", DataType::Float64, false),
            Field::new("V2", DataType::Float64, false),
        ]));

        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int64Array::from(ids)),
                Arc::new(Int32Array::from(labels)),
                Arc::new(Float64Array::from(amounts)),
                Arc::new(Float64Array::from(v1)),
                Arc::new(Float64Array::from(v2)),
            ],
        )
    }

    pub fn generate(&self) -> Result<RecordSet> {
        Ok(RecordSet::new(self.generate_batch()?))
    }
}
