//! Duplicate rows, duplicated values and per-column cardinality.

use crate::error::Result;
use crate::types::{
    Cardinality, ColumnUniqueness, DatasetProfile, DuplicateRows, DuplicateValues,
    UniquenessReport, ValueCount,
};
use crate::utils::{cell_keys, format_decimal, percentage, round_to};
use polars::prelude::*;
use std::collections::{BTreeMap, HashMap};

const MOST_COMMON_LIMIT: usize = 5;

pub struct UniquenessAnalyzer;

impl UniquenessAnalyzer {
    pub fn analyze(df: &DataFrame, profile: &DatasetProfile) -> Result<UniquenessReport> {
        let duplicate_rows = Self::check_duplicate_rows(df)?;

        let mut duplicate_values = BTreeMap::new();
        let mut low_uniqueness = Vec::new();
        for col in &profile.columns {
            let keys = cell_keys(df.column(&col.name)?.as_materialized_series())?;
            if let Some(info) = duplicated_values(&keys, profile.n_rows) {
                if info.unique_percentage < 50.0 {
                    low_uniqueness.push((col.name.clone(), info.unique_percentage));
                }
                duplicate_values.insert(col.name.clone(), info);
            }
        }

        let uniqueness_scores = profile
            .columns
            .iter()
            .map(|col| {
                let total_values = profile.n_rows - col.missing_count;
                let unique = col.unique_count as f64;
                let cardinality = if unique > total_values as f64 * 0.9 {
                    Cardinality::High
                } else if unique > total_values as f64 * 0.5 {
                    Cardinality::Medium
                } else {
                    Cardinality::Low
                };
                (
                    col.name.clone(),
                    ColumnUniqueness {
                        total_values,
                        unique_values: col.unique_count,
                        uniqueness_score: round_to(percentage(col.unique_count, total_values), 2),
                        cardinality,
                    },
                )
            })
            .collect();

        let mut recommendations = Vec::new();
        if duplicate_rows.duplicate_count > 0 {
            recommendations.push(format!(
                "Found {} duplicate rows ({}%). Consider deduplication.",
                duplicate_rows.duplicate_count,
                format_decimal(duplicate_rows.duplicate_percentage)
            ));
        }
        for (name, unique_percentage) in low_uniqueness {
            recommendations.push(format!(
                "Column '{}' has low uniqueness ({}%). May indicate data quality issue.",
                name,
                format_decimal(unique_percentage)
            ));
        }

        Ok(UniquenessReport {
            duplicate_rows,
            duplicate_values,
            uniqueness_scores,
            recommendations,
        })
    }

    /// Count rows that repeat an earlier row exactly.
    pub fn check_duplicate_rows(df: &DataFrame) -> Result<DuplicateRows> {
        let total_rows = df.height();
        let duplicate_count = if total_rows == 0 || df.width() == 0 {
            0
        } else {
            total_rows
                - df
                    .unique::<&str, &str>(None, UniqueKeepStrategy::First, None)?
                    .height()
        };
        let unique_count = total_rows - duplicate_count;

        Ok(DuplicateRows {
            total_rows,
            duplicate_count,
            unique_count,
            duplicate_percentage: round_to(percentage(duplicate_count, total_rows), 2),
            uniqueness_score: round_to(percentage(unique_count, total_rows), 2),
        })
    }
}

/// Values occurring more than once, or `None` if every value is distinct.
fn duplicated_values(keys: &[Option<String>], n_rows: usize) -> Option<DuplicateValues> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for key in keys.iter().flatten() {
        *counts.entry(key.as_str()).or_insert(0) += 1;
    }
    let unique = counts.len();

    let mut repeated: Vec<ValueCount> = counts
        .into_iter()
        .filter(|(_, n)| *n > 1)
        .map(|(value, count)| ValueCount {
            value: value.to_string(),
            count,
        })
        .collect();
    if repeated.is_empty() {
        return None;
    }
    repeated.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.value.cmp(&b.value)));

    Some(DuplicateValues {
        duplicate_value_count: repeated.len(),
        total_duplicate_occurrences: repeated.iter().map(|v| v.count).sum(),
        most_common: repeated.into_iter().take(MOST_COMMON_LIMIT).collect(),
        unique_percentage: round_to(percentage(unique, n_rows), 2),
    })
}
