//! Missing-value rates and correlated missingness.

use crate::error::Result;
use crate::types::{ColumnCompleteness, CompletenessReport, DatasetProfile, MissingPattern};
use crate::utils::{missing_mask, percentage, round_to};
use polars::prelude::*;
use std::collections::BTreeMap;

/// Jaccard similarity above which two columns are reported as missing together.
const CORRELATED_MISSING_THRESHOLD: f64 = 0.5;

pub struct CompletenessAnalyzer;

impl CompletenessAnalyzer {
    pub fn analyze(df: &DataFrame, profile: &DatasetProfile) -> Result<CompletenessReport> {
        let total_cells = profile.total_cells();
        let missing_cells: usize = profile.columns.iter().map(|c| c.missing_count).sum();
        let overall_completeness = percentage(total_cells - missing_cells, total_cells);

        let column_completeness = profile
            .columns
            .iter()
            .map(|col| {
                let completeness_score = if col.missing_count >= profile.n_rows {
                    0.0
                } else {
                    round_to(100.0 - col.missing_percentage, 2)
                };
                (
                    col.name.clone(),
                    ColumnCompleteness {
                        missing_count: col.missing_count,
                        missing_percentage: round_to(col.missing_percentage, 2),
                        completeness_score,
                        data_type: col.dtype.clone(),
                        unique_values: col.unique_count,
                    },
                )
            })
            .collect::<BTreeMap<_, _>>();

        let missing_patterns = Self::detect_missing_patterns(df)?;

        let recommendations = Self::recommendations(overall_completeness, profile);

        Ok(CompletenessReport {
            overall_completeness,
            column_completeness,
            missing_patterns,
            recommendations,
        })
    }

    /// Report column pairs whose missing rows overlap with Jaccard similarity > 0.5.
    fn detect_missing_patterns(df: &DataFrame) -> Result<Vec<MissingPattern>> {
        let masks = df
            .get_columns()
            .iter()
            .map(|col| {
                let series = col.as_materialized_series();
                Ok((series.name().to_string(), missing_mask(series)?))
            })
            .collect::<Result<Vec<(String, Vec<bool>)>>>()?;

        let counts: Vec<usize> = masks
            .iter()
            .map(|(_, mask)| mask.iter().filter(|&&m| m).count())
            .collect();

        let mut patterns = Vec::new();
        for i in 0..masks.len() {
            if counts[i] == 0 {
                continue;
            }
            for j in (i + 1)..masks.len() {
                let overlap = masks[i]
                    .1
                    .iter()
                    .zip(&masks[j].1)
                    .filter(|(a, b)| **a && **b)
                    .count();
                if overlap == 0 {
                    continue;
                }

                let union = counts[i] + counts[j] - overlap;
                let similarity = if union > 0 {
                    overlap as f64 / union as f64
                } else {
                    0.0
                };

                if similarity > CORRELATED_MISSING_THRESHOLD {
                    patterns.push(MissingPattern {
                        columns: [masks[i].0.clone(), masks[j].0.clone()],
                        overlap_count: overlap,
                        similarity_score: round_to(similarity, 3),
                        pattern_type: "correlated_missing".to_string(),
                    });
                }
            }
        }

        Ok(patterns)
    }

    fn recommendations(overall: f64, profile: &DatasetProfile) -> Vec<String> {
        let mut recommendations = Vec::new();

        if overall < 90.0 {
            recommendations.push(format!(
                "Overall completeness is {:.2}%. Consider data source quality improvement.",
                overall
            ));
        }

        for col in &profile.columns {
            let missing = round_to(col.missing_percentage, 2);
            if missing > 50.0 {
                recommendations.push(format!(
                    "Column '{}' has {:.2}% missing. Consider dropping or imputing.",
                    col.name, missing
                ));
            } else if missing > 20.0 {
                recommendations.push(format!(
                    "Column '{}' has {:.2}% missing. Imputation recommended.",
                    col.name, missing
                ));
            }
        }

        recommendations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profiler::ColumnProfiler;

    fn analyze(df: &DataFrame) -> CompletenessReport {
        let profile = ColumnProfiler::profile(df).unwrap();
        CompletenessAnalyzer::analyze(df, &profile).unwrap()
    }

    #[test]
    fn test_fully_populated_dataset() {
        let df = df![
            "a" => [1i64, 2, 3],
            "b" => ["x", "y", "z"],
        ]
        .unwrap();

        let report = analyze(&df);
        assert_eq!(report.overall_completeness, 100.0);
        assert!(report.missing_patterns.is_empty());
        assert!(report.recommendations.is_empty());
        assert_eq!(report.column_completeness["a"].completeness_score, 100.0);
    }

    #[test]
    fn test_heavily_missing_column_recommends_dropping() {
        let df = df![
            "id" => [1i64, 2, 3, 4, 5, 6, 7, 8, 9, 10],
            "notes" => [Some("a"), None, None, Some("b"), None, None, Some("c"), None, Some("d"), None],
        ]
        .unwrap();

        let report = analyze(&df);
        let notes = &report.column_completeness["notes"];
        assert_eq!(notes.missing_count, 6);
        assert_eq!(notes.missing_percentage, 60.0);
        assert_eq!(notes.completeness_score, 40.0);
        assert_eq!(report.overall_completeness, 70.0);
        assert!(report
            .recommendations
            .iter()
            .any(|r| r == "Column 'notes' has 60.00% missing. Consider dropping or imputing."));
        assert!(report
            .recommendations
            .iter()
            .any(|r| r.starts_with("Overall completeness is 70.00%")));
    }

    #[test]
    fn test_moderately_missing_column_recommends_imputation() {
        let df = df![
            "score" => [Some(1.0), None, Some(3.0), Some(4.0)],
        ]
        .unwrap();

        let report = analyze(&df);
        assert_eq!(
            report.recommendations.last().map(String::as_str),
            Some("Column 'score' has 25.00% missing. Imputation recommended.")
        );
    }

    #[test]
    fn test_correlated_missing_pattern() {
        let df = df![
            "street" => [None, None, Some("Main"), None],
            "zip" => [None, None, Some("12345"), Some("99999")],
            "name" => [Some("a"), Some("b"), Some("c"), Some("d")],
        ]
        .unwrap();

        let report = analyze(&df);
        assert_eq!(report.missing_patterns.len(), 1);
        let pattern = &report.missing_patterns[0];
        assert_eq!(pattern.columns, ["street".to_string(), "zip".to_string()]);
        assert_eq!(pattern.overlap_count, 2);
        assert_eq!(pattern.similarity_score, 0.667);
        assert_eq!(pattern.pattern_type, "correlated_missing");
    }

    #[test]
    fn test_all_missing_column_scores_zero() {
        let df = df![
            "empty" => [None::<f64>, None, None],
        ]
        .unwrap();

        let report = analyze(&df);
        assert_eq!(report.overall_completeness, 0.0);
        assert_eq!(report.column_completeness["empty"].completeness_score, 0.0);
    }

    #[test]
    fn test_empty_dataset() {
        let report = analyze(&DataFrame::empty());
        assert_eq!(report.overall_completeness, 0.0);
        assert!(report.column_completeness.is_empty());
    }
}
