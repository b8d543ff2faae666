//! Console report of detected anomalies

use crate::config::{ReportConfig, ReportFormat};
use crate::error::{PipelineError, Result};
use crate::pipeline::Detection;
use crate::types::anomaly::Anomaly;
use crate::types::record::{InputLocation, RecordSet};
use arrow::array::{Array, AsArray};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Float64Type, Int64Type};
use comfy_table::presets::ASCII_FULL;
use comfy_table::Table;
use serde_json::{json, Map, Value};
use std::io::Write;

/// Name of the score column in the report
pub const SCORE_COLUMN: &str = "max_prob";

/// Writes the load confirmation, threshold, anomaly count and anomaly projection
#[derive(Debug, Clone)]
pub struct Reporter {
    columns: Vec<String>,
    max_rows: usize,
    format: ReportFormat,
}

impl From<&ReportConfig> for Reporter {
    fn from(config: &ReportConfig) -> Self {
        Self {
            columns: config.columns.clone(),
            max_rows: config.max_rows,
            format: config.format,
        }
    }
}

impl Reporter {
    /// Fail early if a projected column is missing from the input
    pub fn check(&self, records: &RecordSet) -> Result<()> {
        for column in &self.columns {
            records.column(column)?;
        }
        Ok(())
    }

    pub fn loaded<W: Write>(&self, out: &mut W, location: &InputLocation) -> Result<()> {
        if self.format == ReportFormat::Table {
            writeln!(out, "Successfully loaded data from {}", location)?;
        }
        Ok(())
    }

    pub fn write<W: Write>(
        &self,
        out: &mut W,
        records: &RecordSet,
        detection: &Detection,
    ) -> Result<()> {
        match self.format {
            ReportFormat::Table => self.write_table(out, records, detection),
            ReportFormat::Json => self.write_json(out, records, detection),
        }
    }

    fn write_table<W: Write>(
        &self,
        out: &mut W,
        records: &RecordSet,
        detection: &Detection,
    ) -> Result<()> {
        let anomalies = &detection.anomalies;

        writeln!(
            out,
            "Calculated anomaly probability threshold: {}",
            detection.threshold
        )?;
        writeln!(out, "Total count of predicted anomalies:")?;
        writeln!(out, "{}", anomalies.len())?;

        let mut table = Table::new();
        table.load_preset(ASCII_FULL);
        let mut header: Vec<&str> = self.columns.iter().map(String::as_str).collect();
        header.push(SCORE_COLUMN);
        table.set_header(header);

        for anomaly in anomalies.iter().take(self.max_rows) {
            table.add_row(self.table_row(records, anomaly)?);
        }
        writeln!(out, "{table}")?;

        if anomalies.len() > self.max_rows {
            writeln!(out, "only showing top {} rows", self.max_rows)?;
        }

        if let Some(labels) = &detection.labels {
            writeln!(
                out,
                "Labelled positives among anomalies: {} of {} ({:.2}%), base rate {:.2}%",
                labels.flagged_positive,
                labels.flagged,
                labels.flagged_rate() * 100.0,
                labels.base_rate() * 100.0
            )?;
        }

        Ok(())
    }

    fn table_row(&self, records: &RecordSet, anomaly: &Anomaly) -> Result<Vec<String>> {
        let mut row = Vec::with_capacity(self.columns.len() + 1);
        for column in &self.columns {
            row.push(records.display_value(column, anomaly.row)?);
        }
        row.push(anomaly.score.to_string());
        Ok(row)
    }

    fn write_json<W: Write>(
        &self,
        out: &mut W,
        records: &RecordSet,
        detection: &Detection,
    ) -> Result<()> {
        let summary = json!({
            "records": records.num_rows(),
            "threshold": detection.threshold,
            "anomalies": detection.anomalies.len(),
            "labels": detection.labels,
        });
        writeln!(out, "{}", serde_json::to_string(&summary).map_err(json_error)?)?;

        for anomaly in detection.anomalies.iter() {
            let mut object = Map::new();
            for column in &self.columns {
                object.insert(column.clone(), json_value(records, column, anomaly.row)?);
            }
            object.insert(SCORE_COLUMN.to_string(), json!(anomaly.score));
            object.insert("prediction".to_string(), json!(anomaly.cluster));
            writeln!(
                out,
                "{}",
                serde_json::to_string(&Value::Object(object)).map_err(json_error)?
            )?;
        }
        Ok(())
    }
}

fn json_error(e: serde_json::Error) -> PipelineError {
    PipelineError::Io(e.into())
}

/// Cell as JSON: integers and floats as numbers, anything else as its display string
fn json_value(records: &RecordSet, column: &str, row: usize) -> Result<Value> {
    let array = records.column(column)?;
    if array.is_null(row) {
        return Ok(Value::Null);
    }

    let data_type = array.data_type();
    if data_type.is_integer() {
        let ints = cast(array, &DataType::Int64)?;
        return Ok(json!(ints.as_primitive::<Int64Type>().value(row)));
    }
    if data_type.is_numeric() {
        let floats = cast(array, &DataType::Float64)?;
        return Ok(json!(floats.as_primitive::<Float64Type>().value(row)));
    }
    Ok(Value::String(records.display_value(column, row)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::metrics::RunMetrics;
    use crate::pipeline::DetectionPipeline;
    use crate::synthetic::SyntheticDataset;

    fn detect(records: &RecordSet) -> Detection {
        let mut config = AppConfig::default();
        config.model.components = 2;
        DetectionPipeline::from_config(&config)
            .unwrap()
            .run(records, &mut RunMetrics::new())
            .unwrap()
    }

    #[test]
    fn test_table_report() {
        let records = SyntheticDataset::default().generate().unwrap();
        let detection = detect(&records);
        let reporter = Reporter::from(&ReportConfig {
            max_rows: 5,
            ..ReportConfig::default()
        });

        let mut out = Vec::new();
        reporter.write(&mut out, &records, &detection).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.contains("Calculated anomaly probability threshold:"));
        assert!(text.contains(&format!("\n{}\n", detection.anomalies.len())));
        assert!(text.contains("TransactionID"));
        assert!(text.contains("TransactionAmt"));
        assert!(text.contains(SCORE_COLUMN));
        assert!(text.contains("Labelled positives among anomalies"));
        if detection.anomalies.len() > 5 {
            assert!(text.contains("only showing top 5 rows"));
        }
    }

    #[test]
    fn test_json_report() {
        let records = SyntheticDataset::default().generate().unwrap();
        let detection = detect(&records);
        let reporter = Reporter::from(&ReportConfig {
            format: ReportFormat::Json,
            ..ReportConfig::default()
        });

        let mut out = Vec::new();
        reporter.write(&mut out, &records, &detection).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<Value> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();

        assert_eq!(lines.len(), detection.anomalies.len() + 1);
        assert_eq!(lines[0]["records"], json!(1000));
        assert_eq!(lines[0]["anomalies"], json!(detection.anomalies.len()));
        for line in &lines[1..] {
            assert!(line["TransactionID"].is_i64());
            assert!(line["TransactionAmt"].is_f64());
            assert!(line[SCORE_COLUMN].as_f64().unwrap() < detection.threshold);
        }
    }

    #[test]
    fn test_missing_report_column() {
        let records = SyntheticDataset::default().generate().unwrap();
        let reporter = Reporter::from(&ReportConfig {
            columns: vec!["TransactionID".to_string(), "card4".to_string()],
            ..ReportConfig::default()
        });
        assert!(matches!(
            reporter.check(&records),
            Err(PipelineError::MissingColumn { column }) if column == "card4"
        ));
    }
}
