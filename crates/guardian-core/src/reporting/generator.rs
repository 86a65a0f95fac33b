use crate::error::Result;
use crate::pipeline::GuardianOutput;
use crate::types::{AnomalyResult, Explanation, QualityReport};
use crate::utils::is_numeric_dtype;
use chrono::Local;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

/// Full output of one run plus metadata, as written to disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuardianReport {
    /// Local time the report was generated
    pub generated_at: String,
    pub input_file: String,
    pub duration_ms: u64,
    pub dataset: DatasetShape,
    pub quality: QualityReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anomalies: Option<AnomalyResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<Explanation>,
    /// All analyzer recommendations, in dimension order
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetShape {
    pub rows: usize,
    pub columns: usize,
    pub numeric_columns: usize,
}

impl DatasetShape {
    pub fn of(df: &DataFrame) -> Self {
        Self {
            rows: df.height(),
            columns: df.width(),
            numeric_columns: df
                .get_columns()
                .iter()
                .filter(|c| is_numeric_dtype(c.dtype()))
                .count(),
        }
    }
}

impl GuardianReport {
    pub fn new(input_file: impl Into<String>, df: &DataFrame, output: GuardianOutput) -> Self {
        let recommendations = output
            .quality
            .recommendations()
            .into_iter()
            .map(str::to_string)
            .collect();
        Self {
            generated_at: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            input_file: input_file.into(),
            duration_ms: output.duration_ms,
            dataset: DatasetShape::of(df),
            quality: output.quality,
            anomalies: output.anomalies,
            explanation: output.explanation,
            recommendations,
        }
    }
}

/// Writes reports as pretty JSON under an output directory.
#[derive(Debug, Clone)]
pub struct ReportWriter {
    output_dir: PathBuf,
}

impl Default for ReportWriter {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("./outputs"),
        }
    }
}

impl ReportWriter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Write `<output_dir>/<base_name>_quality_report.json`, creating the
    /// directory if needed.
    pub fn write(&self, report: &GuardianReport, base_name: &str) -> Result<PathBuf> {
        fs::create_dir_all(&self.output_dir)?;

        let report_path = self
            .output_dir
            .join(format!("{}_quality_report.json", base_name));
        let mut file = File::create(&report_path)?;
        file.write_all(serde_json::to_string_pretty(report)?.as_bytes())?;

        info!("Report saved: {}", report_path.display());

        Ok(report_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::Guardian;

    fn sample_output(df: &DataFrame) -> GuardianOutput {
        Guardian::builder()
            .explanations(false)
            .build()
            .unwrap()
            .run(df)
            .unwrap()
    }

    #[test]
    fn test_report_carries_shape_and_recommendations() {
        let df = df![
            "amount" => [Some(1.0), None, None, Some(4.0), Some(5.0)],
            "city" => ["Oslo", "Oslo", "Bergen", "Oslo", "Bergen"],
        ]
        .unwrap();
        let report = GuardianReport::new("orders.csv", &df, sample_output(&df));

        assert_eq!(
            report.dataset,
            DatasetShape {
                rows: 5,
                columns: 2,
                numeric_columns: 1,
            }
        );
        assert_eq!(report.input_file, "orders.csv");
        assert!(report.explanation.is_none());
        assert!(report.anomalies.is_some());
        assert!(
            report
                .recommendations
                .iter()
                .any(|r| r.contains("'amount'"))
        );
    }

    #[test]
    fn test_write_report_to_file() {
        let df = df!["x" => [1.0, 2.0, 3.0, 4.0]].unwrap();
        let report = GuardianReport::new("x.csv", &df, sample_output(&df));

        let dir = std::env::temp_dir().join(format!("guardian_report_{}", std::process::id()));
        let path = ReportWriter::new(&dir).write(&report, "x").unwrap();

        assert_eq!(path, dir.join("x_quality_report.json"));
        let written: GuardianReport =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written.input_file, "x.csv");
        assert_eq!(written.dataset, report.dataset);
        assert_eq!(written.generated_at, report.generated_at);

        fs::remove_dir_all(&dir).ok();
    }
}
