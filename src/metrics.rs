//! Run metrics for the anomaly detection pipeline.

use std::fmt;
use std::time::{Duration, Instant};
use tracing::info;

/// Pipeline stage, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Load,
    Assemble,
    Fit,
    Score,
    Threshold,
    Filter,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Load => "load",
            Stage::Assemble => "assemble",
            Stage::Fit => "fit",
            Stage::Score => "score",
            Stage::Threshold => "threshold",
            Stage::Filter => "filter",
        };
        f.write_str(name)
    }
}

/// Metrics collected over one run
pub struct RunMetrics {
    start_time: Instant,
    stage_times: Vec<(Stage, Duration)>,
    records: u64,
    anomalies: u64,
    /// Max-probability score distribution, ten buckets over [0, 1]
    score_buckets: [u64; 10],
}

impl RunMetrics {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            stage_times: Vec::new(),
            records: 0,
            anomalies: 0,
            score_buckets: [0; 10],
        }
    }

    /// Time a stage and record its duration
    pub fn time<T>(&mut self, stage: Stage, f: impl FnOnce() -> T) -> T {
        let started = Instant::now();
        let result = f();
        self.record_stage(stage, started.elapsed());
        result
    }

    pub fn record_stage(&mut self, stage: Stage, elapsed: Duration) {
        info!(stage = %stage, elapsed_ms = elapsed.as_millis() as u64, "Stage finished");
        self.stage_times.push((stage, elapsed));
    }

    pub fn record_scores(&mut self, scores: &[f64]) {
        self.records = scores.len() as u64;
        for &score in scores {
            let bucket = (score.clamp(0.0, 1.0) * 10.0).min(9.0) as usize;
            self.score_buckets[bucket] += 1;
        }
    }

    pub fn record_anomalies(&mut self, count: usize) {
        self.anomalies = count as u64;
    }

    pub fn stage_time(&self, stage: Stage) -> Option<Duration> {
        self.stage_times
            .iter()
            .find(|(s, _)| *s == stage)
            .map(|(_, d)| *d)
    }

    pub fn get_score_distribution(&self) -> [u64; 10] {
        self.score_buckets
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Log summary statistics
    pub fn print_summary(&self) {
        let anomaly_rate = if self.records > 0 {
            (self.anomalies as f64 / self.records as f64) * 100.0
        } else {
            0.0
        };

        info!("╔══════════════════════════════════════════════════════════════╗");
        info!("║           GMM ANOMALY DETECTION - RUN SUMMARY                ║");
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!(
            "║ Records Scored: {:>10}  │  Total Time: {:>8.2} s          ║",
            self.records,
            self.elapsed().as_secs_f64()
        );
        info!(
            "║ Anomalies:      {:>10}  │  Anomaly Rate: {:>6.2}%          ║",
            self.anomalies, anomaly_rate
        );
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!("║ Stage Times:                                                 ║");
        for (stage, elapsed) in &self.stage_times {
            info!("║   {:10}: {:>10.1} ms", stage.to_string(), elapsed.as_secs_f64() * 1000.0);
        }
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!("║ Records per max_prob bucket:                                 ║");
        let buckets = self.get_score_distribution();
        let scored = self.records.max(1) as f64;
        for (i, count) in buckets.into_iter().enumerate() {
            let share = count as f64 / scored;
            let upper = if i == buckets.len() - 1 { ']' } else { ')' };
            info!(
                "║   max_prob [{:.1}, {:.1}{} {:>8}  {:<20}",
                i as f64 / 10.0,
                (i + 1) as f64 / 10.0,
                upper,
                count,
                "#".repeat((share * 20.0).round() as usize)
            );
        }
        info!("╚══════════════════════════════════════════════════════════════╝");
    }
}

impl Default for RunMetrics {
    fn default() -> Self {
        Self::new()
    }
}
