//! Column profiling shared by every analyzer.
//!
//! A profile is computed once per analysis call and records, per column, its
//! dtype, semantic kind, missingness and cardinality.

use crate::error::Result;
use crate::types::{ColumnProfile, DatasetProfile};
use crate::utils::{cell_keys, column_kind, percentage};
use polars::prelude::*;
use std::collections::HashSet;
use tracing::debug;

/// Profiler for dataset structure and missingness.
pub struct ColumnProfiler;

impl ColumnProfiler {
    /// Profile every column of a dataset, preserving column order.
    ///
    /// An empty frame yields an empty profile rather than an error.
    pub fn profile(df: &DataFrame) -> Result<DatasetProfile> {
        let columns = df
            .get_columns()
            .iter()
            .map(|col| Self::profile_series(col.as_materialized_series(), df.height()))
            .collect::<Result<Vec<_>>>()?;

        debug!(
            rows = df.height(),
            columns = columns.len(),
            "Profiled dataset"
        );

        Ok(DatasetProfile {
            n_rows: df.height(),
            n_columns: df.width(),
            columns,
        })
    }

    /// Profile a single series against the dataset's row count.
    pub fn profile_series(series: &Series, n_rows: usize) -> Result<ColumnProfile> {
        let keys = cell_keys(series)?;
        let missing_count = keys.iter().filter(|k| k.is_none()).count();
        let unique_count = keys.iter().flatten().collect::<HashSet<_>>().len();

        Ok(ColumnProfile {
            name: series.name().to_string(),
            dtype: series.dtype().to_string(),
            kind: column_kind(series.dtype()),
            missing_count,
            missing_percentage: percentage(missing_count, n_rows),
            unique_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ColumnKind;

    #[test]
    fn test_profile_counts_missing_and_unique() {
        let df = df![
            "age" => [Some(30.0), None, Some(f64::NAN), Some(30.0)],
            "city" => [Some("Paris"), Some("Oslo"), None, Some("Paris")],
        ]
        .unwrap();

        let profile = ColumnProfiler::profile(&df).unwrap();
        assert_eq!(profile.n_rows, 4);
        assert_eq!(profile.n_columns, 2);

        let age = profile.column("age").unwrap();
        assert_eq!(age.kind, ColumnKind::Numeric);
        assert_eq!(age.missing_count, 2);
        assert_eq!(age.missing_percentage, 50.0);
        assert_eq!(age.unique_count, 1);

        let city = profile.column("city").unwrap();
        assert_eq!(city.kind, ColumnKind::Text);
        assert_eq!(city.missing_count, 1);
        assert_eq!(city.unique_count, 2);
    }

    #[test]
    fn test_profile_preserves_column_order() {
        let df = df![
            "b" => [1i64, 2],
            "a" => [true, false],
        ]
        .unwrap();

        let profile = ColumnProfiler::profile(&df).unwrap();
        let names: Vec<&str> = profile.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["b", "a"]);
        assert_eq!(profile.columns[1].kind, ColumnKind::Other);
    }

    #[test]
    fn test_profile_empty_frame() {
        let profile = ColumnProfiler::profile(&DataFrame::empty()).unwrap();
        assert_eq!(profile.n_rows, 0);
        assert!(profile.columns.is_empty());
    }
}
