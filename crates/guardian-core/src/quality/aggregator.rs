//! Overall quality score: the four dimension analyzers over one snapshot.
//!
//! Each dimension score is clamped into [0, 100] before the unweighted mean is
//! taken.

use crate::config::AnalysisConfig;
use crate::error::Result;
use crate::profiler::ColumnProfiler;
use crate::types::{
    AccuracyReport, CompletenessReport, ConsistencyReport, DatasetProfile, QualityDimension,
    QualityReport, QualityScores, UniquenessReport,
};
use crate::utils::percentage;
use polars::prelude::*;
use tracing::{debug, info};

use super::{AccuracyAnalyzer, CompletenessAnalyzer, ConsistencyAnalyzer, UniquenessAnalyzer};

/// Runs the four analyzers over one snapshot and combines their scores.
#[derive(Debug, Clone, Default)]
pub struct QualityAggregator {
    config: AnalysisConfig,
}

impl QualityAggregator {
    pub fn new(config: AnalysisConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Profile the dataset and assess all four quality dimensions.
    pub fn assess(&self, df: &DataFrame) -> Result<QualityReport> {
        let profile = ColumnProfiler::profile(df)?;
        self.assess_profiled(df, &profile, |_| {})
    }

    /// Assess an already profiled dataset.
    ///
    /// `on_dimension` is called once per dimension as soon as its analyzer
    /// finishes; with `parallel` enabled the calls may come from worker
    /// threads and in any order.
    ///
    /// # Errors
    ///
    /// Returns `GuardianError::InvalidConfig` when the configuration fails
    /// validation.
    pub fn assess_profiled<F>(
        &self,
        df: &DataFrame,
        profile: &DatasetProfile,
        on_dimension: F,
    ) -> Result<QualityReport>
    where
        F: Fn(QualityDimension) + Sync,
    {
        self.config.validate()?;

        let completeness = || {
            let report = CompletenessAnalyzer::analyze(df, profile);
            on_dimension(QualityDimension::Completeness);
            report
        };
        let consistency = || {
            let report = ConsistencyAnalyzer::analyze(df, profile);
            on_dimension(QualityDimension::Consistency);
            report
        };
        let accuracy = || {
            let report = AccuracyAnalyzer::analyze(df, profile, &self.config);
            on_dimension(QualityDimension::Accuracy);
            report
        };
        let uniqueness = || {
            let report = UniquenessAnalyzer::analyze(df, profile);
            on_dimension(QualityDimension::Uniqueness);
            report
        };

        let (completeness, consistency, accuracy, uniqueness) = if self.config.parallel {
            let ((completeness, consistency), (accuracy, uniqueness)) = rayon::join(
                || rayon::join(completeness, consistency),
                || rayon::join(accuracy, uniqueness),
            );
            (completeness, consistency, accuracy, uniqueness)
        } else {
            (completeness(), consistency(), accuracy(), uniqueness())
        };

        let report = Self::combine(completeness?, consistency?, accuracy?, uniqueness?);
        info!(
            overall = report.scores.overall,
            completeness = report.scores.completeness,
            consistency = report.scores.consistency,
            accuracy = report.scores.accuracy,
            uniqueness = report.scores.uniqueness,
            "Quality assessment complete"
        );
        Ok(report)
    }

    /// Clamp the dimension scores into [0, 100] and average them.
    pub fn combine(
        completeness: CompletenessReport,
        consistency: ConsistencyReport,
        accuracy: AccuracyReport,
        uniqueness: UniquenessReport,
    ) -> QualityReport {
        let rows = &uniqueness.duplicate_rows;
        let scores = [
            completeness.overall_completeness,
            consistency.score,
            accuracy.score,
            percentage(rows.unique_count, rows.total_rows),
        ]
        .map(clamp_score);

        debug!(?scores, "Combining dimension scores");

        QualityReport {
            scores: QualityScores {
                completeness: scores[0],
                consistency: scores[1],
                accuracy: scores[2],
                uniqueness: scores[3],
                overall: clamp_score(scores.iter().sum::<f64>() / scores.len() as f64),
            },
            completeness,
            consistency,
            accuracy,
            uniqueness,
        }
    }
}

fn clamp_score(score: f64) -> f64 {
    if score.is_finite() {
        score.clamp(0.0, 100.0)
    } else {
        0.0
    }
}
