//! Anomaly data structures

use serde::{Deserialize, Serialize};

/// A record whose max-probability score fell strictly below the threshold
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    /// Row index in the input record set
    pub row: usize,
    /// Max posterior cluster probability
    pub score: f64,
    /// Most likely mixture component
    pub cluster: usize,
}

/// Records flagged as anomalous in one run
#[derive(Debug, Clone, Default)]
pub struct AnomalySet {
    threshold: f64,
    anomalies: Vec<Anomaly>,
}

impl AnomalySet {
    /// Select `{ row : scores[row] < threshold }`, in row order.
    ///
    /// The comparison is strict: a score equal to the threshold is not anomalous.
    pub fn filter(scores: &[f64], clusters: &[usize], threshold: f64) -> Self {
        let anomalies = scores
            .iter()
            .zip(clusters)
            .enumerate()
            .filter(|(_, (&score, _))| score < threshold)
            .map(|(row, (&score, &cluster))| Anomaly {
                row,
                score,
                cluster,
            })
            .collect();

        Self {
            threshold,
            anomalies,
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn len(&self) -> usize {
        self.anomalies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.anomalies.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Anomaly> {
        self.anomalies.iter()
    }

    /// Row indices of the flagged records
    pub fn rows(&self) -> Vec<usize> {
        self.anomalies.iter().map(|a| a.row).collect()
    }

    pub fn contains_row(&self, row: usize) -> bool {
        self.anomalies
            .binary_search_by_key(&row, |a| a.row)
            .is_ok()
    }
}

/// How the flagged records line up with the label column, when one exists
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LabelSummary {
    /// Records with a positive label
    pub labeled_positive: usize,
    /// Anomalies with a positive label
    pub flagged_positive: usize,
    /// Total anomalies
    pub flagged: usize,
    /// Total records
    pub total: usize,
}

impl LabelSummary {
    /// Count positives (label > 0) overall and among flagged rows
    pub fn from_labels(labels: &[f64], anomalies: &AnomalySet) -> Self {
        let labeled_positive = labels.iter().filter(|&&l| l > 0.0).count();
        let flagged_positive = anomalies
            .iter()
            .filter(|a| labels.get(a.row).is_some_and(|&l| l > 0.0))
            .count();

        Self {
            labeled_positive,
            flagged_positive,
            flagged: anomalies.len(),
            total: labels.len(),
        }
    }

    /// Positive rate across all records
    pub fn base_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.labeled_positive as f64 / self.total as f64
        }
    }

    /// Positive rate among flagged records
    pub fn flagged_rate(&self) -> f64 {
        if self.flagged == 0 {
            0.0
        } else {
            self.flagged_positive as f64 / self.flagged as f64
        }
    }
}
