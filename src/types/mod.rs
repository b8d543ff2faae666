//! Type definitions for the anomaly detection pipeline

pub mod anomaly;
pub mod record;

pub use anomaly::{Anomaly, AnomalySet, LabelSummary};
pub use record::{InputLocation, RecordSet};
