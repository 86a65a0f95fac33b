//! Range violations, referential integrity and z-score outliers.

use crate::config::AnalysisConfig;
use crate::error::Result;
use crate::types::{
    AccuracyReport, DatasetProfile, OrphanedReferences, RangeViolation, StatisticalOutliers,
};
use crate::utils::{cell_keys, mean, present_numeric_values, quantile_sorted, round_to, sample_std};
use polars::prelude::*;
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// Score penalty per column with range violations.
const RANGE_PENALTY: f64 = 15.0;
const ORPHAN_SAMPLE_SIZE: usize = 5;

pub struct AccuracyAnalyzer;

impl AccuracyAnalyzer {
    pub fn analyze(
        df: &DataFrame,
        profile: &DatasetProfile,
        config: &AnalysisConfig,
    ) -> Result<AccuracyReport> {
        let mut range_violations = BTreeMap::new();
        let mut statistical_outliers = BTreeMap::new();

        for name in profile.numeric_columns() {
            let values = present_numeric_values(df.column(name)?.as_materialized_series())?;
            if values.is_empty() {
                continue;
            }
            if let Some(violation) = range_violation(&values, config.iqr_multiplier) {
                range_violations.insert(name.to_string(), violation);
            }
            if let Some(outliers) = zscore_outliers(&values, config.zscore_threshold) {
                statistical_outliers.insert(name.to_string(), outliers);
            }
        }

        let referential_integrity = Self::check_referential_integrity(df)?;

        let score = 100.0 - RANGE_PENALTY * range_violations.len() as f64;

        let mut recommendations = Vec::new();
        if !range_violations.is_empty() {
            recommendations.push(format!(
                "Found range violations in {} columns. Review extreme values.",
                range_violations.len()
            ));
        }
        if !referential_integrity.is_empty() {
            recommendations.push(
                "Found referential integrity issues. Check foreign key relationships.".to_string(),
            );
        }
        if !statistical_outliers.is_empty() {
            recommendations.push(format!(
                "Found statistical outliers in {} columns. Investigate extreme values.",
                statistical_outliers.len()
            ));
        }

        Ok(AccuracyReport {
            range_violations,
            referential_integrity,
            statistical_outliers,
            score,
            recommendations,
        })
    }

    /// Pair an `_id` column with each later column named after its base.
    ///
    /// For `customer_id` followed by `customer_ref`, every `customer_ref`
    /// value absent from `customer_id` is orphaned.
    fn check_referential_integrity(df: &DataFrame) -> Result<BTreeMap<String, OrphanedReferences>> {
        let names: Vec<String> = df
            .get_column_names()
            .iter()
            .map(|n| n.to_string())
            .collect();
        let mut checks = BTreeMap::new();

        for (i, key_col) in names.iter().enumerate() {
            let lowered = key_col.to_lowercase();
            if !lowered.contains("_id") {
                continue;
            }
            let base = lowered.replacen("_id", "", 1);

            for ref_col in &names[i + 1..] {
                if !ref_col.to_lowercase().starts_with(&base) {
                    continue;
                }

                let keys: HashSet<String> = cell_keys(df.column(key_col)?.as_materialized_series())?
                    .into_iter()
                    .flatten()
                    .collect();
                let orphaned: BTreeSet<String> =
                    cell_keys(df.column(ref_col)?.as_materialized_series())?
                        .into_iter()
                        .flatten()
                        .filter(|v| !keys.contains(v))
                        .collect();

                if !orphaned.is_empty() {
                    checks.insert(
                        format!("{}_to_{}", ref_col, key_col),
                        OrphanedReferences {
                            orphaned_count: orphaned.len(),
                            orphaned_sample: orphaned.into_iter().take(ORPHAN_SAMPLE_SIZE).collect(),
                        },
                    );
                }
            }
        }

        Ok(checks)
    }
}

/// Values outside `[Q1 - k*IQR, Q3 + k*IQR]`, or `None` if there are none.
fn range_violation(values: &[f64], multiplier: f64) -> Option<RangeViolation> {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let q1 = quantile_sorted(&sorted, 0.25)?;
    let q3 = quantile_sorted(&sorted, 0.75)?;
    let iqr = q3 - q1;
    let lower_bound = q1 - multiplier * iqr;
    let upper_bound = q3 + multiplier * iqr;

    let below_range_count = sorted.iter().filter(|&&v| v < lower_bound).count();
    let above_range_count = sorted.iter().filter(|&&v| v > upper_bound).count();
    if below_range_count == 0 && above_range_count == 0 {
        return None;
    }

    Some(RangeViolation {
        below_range_count,
        above_range_count,
        lower_bound,
        upper_bound,
        min_value: sorted[0],
        max_value: sorted[sorted.len() - 1],
    })
}

/// Values with `|z| > threshold` under the sample standard deviation.
fn zscore_outliers(values: &[f64], threshold: f64) -> Option<StatisticalOutliers> {
    let m = mean(values)?;
    let std = sample_std(values).filter(|s| *s > 0.0)?;

    let count = values
        .iter()
        .filter(|&&v| ((v - m) / std).abs() > threshold)
        .count();
    if count == 0 {
        return None;
    }

    Some(StatisticalOutliers {
        count,
        percentage: round_to(count as f64 / values.len() as f64 * 100.0, 2),
        mean: m,
        std,
    })
}
