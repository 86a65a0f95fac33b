//! Unsupervised row-level anomaly detection.
//!
//! Three detectors share the [`AnomalyDetector`] contract and run over a
//! [`NumericProjection`] of the dataset: the numeric columns, mean-imputed,
//! as plain row vectors. [`AnomalyEnsemble`] normalizes and weights their
//! scores, thresholds the fused score and attributes the flagged rows to
//! features.
//!
//! # Example
//!
//! ```rust,ignore
//! use guardian_core::{AnalysisConfig, AnomalyEnsemble, Explainer};
//!
//! let config = AnalysisConfig::default();
//! let run = AnomalyEnsemble::new(config.clone()).run(&df)?;
//! println!("{} anomalous rows", run.result.anomaly_count);
//!
//! let explanation = run.explain(&Explainer::new(&config));
//! ```

mod ensemble;
mod isolation_forest;
mod lof;
mod ocsvm;

pub use ensemble::{AnomalyEnsemble, EnsembleRun};
pub use isolation_forest::{IsolationForest, IsolationForestDetector};
pub use lof::LofDetector;
pub use ocsvm::{OneClassSvm, OneClassSvmDetector};

use crate::error::{GuardianError, Result};
use crate::types::DetectorKind;
use crate::utils::{is_numeric_dtype, mean, numeric_values, top_fraction};
use polars::prelude::*;
use std::collections::BTreeMap;

// =============================================================================
// Numeric Projection
// =============================================================================

/// Numeric columns of a dataset as row vectors, missing cells mean-imputed.
///
/// A column with no values at all is imputed with 0.
#[derive(Debug, Clone, PartialEq)]
pub struct NumericProjection {
    columns: Vec<String>,
    rows: Vec<Vec<f64>>,
}

impl NumericProjection {
    /// Project the numeric columns of `df`.
    pub fn from_frame(df: &DataFrame) -> Result<Self> {
        let mut columns = Vec::new();
        let mut values = Vec::new();

        for col in df.get_columns() {
            let series = col.as_materialized_series();
            if !is_numeric_dtype(series.dtype()) {
                continue;
            }
            let raw = numeric_values(series)?;
            let present: Vec<f64> = raw.iter().flatten().copied().collect();
            let fill = mean(&present).unwrap_or(0.0);

            columns.push(series.name().to_string());
            values.push(raw.into_iter().map(|v| v.unwrap_or(fill)).collect::<Vec<f64>>());
        }

        let rows = (0..df.height())
            .map(|i| values.iter().map(|column| column[i]).collect())
            .collect();

        Ok(Self { columns, rows })
    }

    /// Build a projection from row vectors, which must all have one value per column.
    pub fn from_rows(columns: Vec<String>, rows: Vec<Vec<f64>>) -> Result<Self> {
        if let Some((i, row)) = rows
            .iter()
            .enumerate()
            .find(|(_, row)| row.len() != columns.len())
        {
            return Err(GuardianError::Internal(format!(
                "row {} has {} values but the projection has {} columns",
                i,
                row.len(),
                columns.len()
            )));
        }
        Ok(Self { columns, rows })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn n_features(&self) -> usize {
        self.columns.len()
    }

    /// True when there is nothing to score: no rows or no numeric columns.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty() || self.columns.is_empty()
    }

    pub fn row(&self, i: usize) -> &[f64] {
        &self.rows[i]
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    fn column_mean<'a>(&self, feature: usize, rows: impl Iterator<Item = &'a Vec<f64>>) -> Option<f64> {
        let values: Vec<f64> = rows.map(|row| row[feature]).collect();
        mean(&values)
    }
}

// =============================================================================
// Detector Contract
// =============================================================================

/// A fitted model that scores a single row; higher means more anomalous.
pub trait ScoreModel: Send + Sync {
    /// Number of values expected per row.
    fn n_features(&self) -> usize;

    fn score(&self, row: &[f64]) -> f64;
}

/// Output of one detector over one projection.
pub struct Detection {
    /// Rows the detector itself considers anomalous.
    pub mask: Vec<bool>,
    /// Raw detector scores, one per row.
    pub scores: Vec<f64>,
    /// The fitted model, when the detector can score arbitrary rows.
    pub model: Option<Box<dyn ScoreModel>>,
}

impl Detection {
    /// Detection over an empty projection.
    pub fn empty() -> Self {
        Self {
            mask: Vec::new(),
            scores: Vec::new(),
            model: None,
        }
    }

    /// Flag the `contamination` fraction of rows with the largest `ranking` values.
    pub(crate) fn top_fraction(scores: Vec<f64>, ranking: &[f64], contamination: f64) -> Self {
        let mut mask = vec![false; ranking.len()];
        for i in top_fraction(ranking, contamination) {
            mask[i] = true;
        }
        Self {
            mask,
            scores,
            model: None,
        }
    }

    /// Indices of flagged rows, ascending.
    pub fn anomalies(&self) -> Vec<usize> {
        self.mask
            .iter()
            .enumerate()
            .filter_map(|(i, &flagged)| flagged.then_some(i))
            .collect()
    }
}

impl std::fmt::Debug for Detection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Detection")
            .field("mask", &self.mask)
            .field("scores", &self.scores)
            .field("model", &self.model.as_ref().map(|_| "ScoreModel"))
            .finish()
    }
}

/// Common capability of the ensemble members.
///
/// Each call fits fresh state; nothing is retained between calls.
pub trait AnomalyDetector: Send + Sync {
    fn kind(&self) -> DetectorKind;

    /// Fit on the projection and score every row of it.
    fn detect(&self, projection: &NumericProjection) -> Result<Detection>;

    /// Per-column weight of the given anomalous rows, summing to 1.
    fn feature_importance(
        &self,
        projection: &NumericProjection,
        anomaly_rows: &[usize],
    ) -> BTreeMap<String, f64> {
        mean_shift_importance(projection, anomaly_rows)
    }
}

/// `|mean(anomalous) - mean(normal)|` per column, normalized to sum to 1.
///
/// Returns an empty map when there are no anomalous rows. When every
/// difference is 0 the weight is spread uniformly.
pub fn mean_shift_importance(
    projection: &NumericProjection,
    anomaly_rows: &[usize],
) -> BTreeMap<String, f64> {
    if projection.is_empty() {
        return BTreeMap::new();
    }

    let mut flagged = vec![false; projection.n_rows()];
    for &row in anomaly_rows {
        if let Some(slot) = flagged.get_mut(row) {
            *slot = true;
        }
    }
    if !flagged.contains(&true) {
        return BTreeMap::new();
    }

    let shifts: Vec<f64> = (0..projection.n_features())
        .map(|feature| {
            let anomalous = projection.column_mean(
                feature,
                projection.rows.iter().zip(&flagged).filter(|(_, f)| **f).map(|(r, _)| r),
            );
            let normal = projection.column_mean(
                feature,
                projection.rows.iter().zip(&flagged).filter(|(_, f)| !**f).map(|(r, _)| r),
            );
            match (anomalous, normal) {
                (Some(a), Some(b)) if (a - b).is_finite() => (a - b).abs(),
                _ => 0.0,
            }
        })
        .collect();

    let total: f64 = shifts.iter().sum();
    let uniform = 1.0 / projection.n_features() as f64;
    projection
        .columns
        .iter()
        .zip(shifts)
        .map(|(name, shift)| {
            let weight = if total > 0.0 { shift / total } else { uniform };
            (name.clone(), weight)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_projection_imputes_column_mean() {
        let df = df![
            "a" => [Some(1.0), None, Some(3.0)],
            "label" => ["x", "y", "z"],
            "b" => [Some(4i64), Some(6), None],
            "empty" => [None::<f64>, None, None],
        ]
        .unwrap();

        let projection = NumericProjection::from_frame(&df).unwrap();
        assert_eq!(projection.columns(), &["a", "b", "empty"]);
        assert_eq!(projection.row(1), &[2.0, 6.0, 0.0]);
        assert_eq!(projection.row(2), &[3.0, 5.0, 0.0]);
        assert!(!projection.is_empty());
    }

    #[test]
    fn test_projection_without_numeric_columns_is_empty() {
        let df = df!["s" => ["a", "b"]].unwrap();
        let projection = NumericProjection::from_frame(&df).unwrap();
        assert_eq!(projection.n_features(), 0);
        assert!(projection.is_empty());
    }

    #[test]
    fn test_from_rows_rejects_ragged_rows() {
        let result = NumericProjection::from_rows(
            vec!["a".into(), "b".into()],
            vec![vec![1.0, 2.0], vec![3.0]],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_mean_shift_importance_normalizes() {
        let projection = NumericProjection::from_rows(
            vec!["x".into(), "y".into()],
            vec![vec![0.0, 0.0], vec![0.0, 1.0], vec![10.0, 1.0]],
        )
        .unwrap();

        let importance = mean_shift_importance(&projection, &[2]);
        // x shifts by 10, y by 0.5
        assert!((importance["x"] - 10.0 / 10.5).abs() < 1e-12);
        assert!((importance["y"] - 0.5 / 10.5).abs() < 1e-12);
        assert!((importance.values().sum::<f64>() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_mean_shift_importance_uniform_when_no_shift() {
        let projection = NumericProjection::from_rows(
            vec!["x".into(), "y".into()],
            vec![vec![1.0, 1.0], vec![1.0, 1.0]],
        )
        .unwrap();

        let importance = mean_shift_importance(&projection, &[0]);
        assert_eq!(importance["x"], 0.5);
        assert_eq!(importance["y"], 0.5);
    }

    #[test]
    fn test_mean_shift_importance_empty_without_anomalies() {
        let projection =
            NumericProjection::from_rows(vec!["x".into()], vec![vec![1.0], vec![2.0]]).unwrap();
        assert!(mean_shift_importance(&projection, &[]).is_empty());
        assert!(mean_shift_importance(&projection, &[7]).is_empty());
    }

    #[test]
    fn test_detection_top_fraction_mask() {
        let detection = Detection::top_fraction(vec![-1.0, -5.0, -2.0, -1.5], &[1.0, 5.0, 2.0, 1.5], 0.5);
        assert_eq!(detection.anomalies(), vec![1, 2]);
    }
}
