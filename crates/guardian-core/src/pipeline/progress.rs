//! Progress updates and cancellation for an assessment run.
//!
//! A run moves through the working stages in order. Each owns a fixed slice
//! of the overall progress bar; the four quality dimensions are computed
//! concurrently, so `QualityAnalysis` advances one item per finished
//! dimension rather than in a fixed order.

use crate::types::QualityDimension;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStage {
    Initializing,
    Profiling,
    QualityAnalysis,
    Aggregation,
    AnomalyDetection,
    Explanation,
    Complete,
    Cancelled,
    Failed,
}

impl AnalysisStage {
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Initializing => "Initializing",
            Self::Profiling => "Profiling Dataset",
            Self::QualityAnalysis => "Analyzing Quality",
            Self::Aggregation => "Scoring Quality",
            Self::AnomalyDetection => "Detecting Anomalies",
            Self::Explanation => "Explaining Anomalies",
            Self::Complete => "Complete",
            Self::Cancelled => "Cancelled",
            Self::Failed => "Failed",
        }
    }

    /// `(start, width)` of the stage on the overall progress bar. Terminal
    /// stages have no width.
    pub fn span(&self) -> (f32, f32) {
        match self {
            Self::Initializing => (0.00, 0.02),
            Self::Profiling => (0.02, 0.08),
            Self::QualityAnalysis => (0.10, 0.30),
            Self::Aggregation => (0.40, 0.02),
            Self::AnomalyDetection => (0.42, 0.38),
            Self::Explanation => (0.80, 0.20),
            Self::Complete => (1.0, 0.0),
            Self::Cancelled | Self::Failed => (0.0, 0.0),
        }
    }
}

/// One progress event. `progress` covers the whole run, `stage_progress`
/// only the current stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub stage: AnalysisStage,
    /// The quality dimension step, e.g. "Checking consistency".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub_stage: Option<String>,
    pub progress: f32,
    pub stage_progress: f32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items_processed: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items_total: Option<usize>,
}

impl ProgressUpdate {
    pub fn new(stage: AnalysisStage, stage_progress: f32, message: impl Into<String>) -> Self {
        let stage_progress = stage_progress.clamp(0.0, 1.0);
        let (start, width) = stage.span();
        Self {
            stage,
            sub_stage: None,
            progress: (start + width * stage_progress).clamp(0.0, 1.0),
            stage_progress,
            message: message.into(),
            items_processed: None,
            items_total: None,
        }
    }

    /// `done` of the `QualityDimension::ALL.len()` dimensions have finished,
    /// the latest being `dimension`.
    pub fn dimension_finished(dimension: QualityDimension, done: usize) -> Self {
        let total = QualityDimension::ALL.len();
        let step = dimension.step_message();
        Self {
            sub_stage: Some(step.to_string()),
            items_processed: Some(done),
            items_total: Some(total),
            ..Self::new(
                AnalysisStage::QualityAnalysis,
                done as f32 / total as f32,
                format!("{step} ({done}/{total})"),
            )
        }
    }

    pub fn complete(message: impl Into<String>) -> Self {
        Self::new(AnalysisStage::Complete, 1.0, message)
    }

    pub fn cancelled() -> Self {
        Self::new(AnalysisStage::Cancelled, 0.0, "Assessment cancelled by user")
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::new(AnalysisStage::Failed, 0.0, message)
    }
}

/// Receives progress updates during a run.
///
/// `QualityAnalysis` updates arrive from rayon worker threads, so reporters
/// must not block. Any `Fn(ProgressUpdate) + Send + Sync` closure is a
/// reporter.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, update: ProgressUpdate);
}

impl<F> ProgressReporter for F
where
    F: Fn(ProgressUpdate) + Send + Sync,
{
    fn report(&self, update: ProgressUpdate) {
        self(update)
    }
}

/// Shared cancellation flag. The run checks it between stages and stops with
/// [`GuardianError::Cancelled`](crate::error::GuardianError::Cancelled).
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

static_assertions::assert_impl_all!(CancellationToken: Send, Sync);
static_assertions::assert_impl_all!(ProgressUpdate: Send, Sync);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Visible to every clone, on any thread.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    const WORKING_STAGES: [AnalysisStage; 6] = [
        AnalysisStage::Initializing,
        AnalysisStage::Profiling,
        AnalysisStage::QualityAnalysis,
        AnalysisStage::Aggregation,
        AnalysisStage::AnomalyDetection,
        AnalysisStage::Explanation,
    ];

    #[test]
    fn test_working_stages_tile_the_progress_bar() {
        let mut end = 0.0;
        for stage in WORKING_STAGES {
            let (start, width) = stage.span();
            assert!((start - end).abs() < 1e-6, "{stage:?} does not start where the previous stage ends");
            end = start + width;
        }
        assert!((end - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_progress_is_placed_within_stage() {
        let update = ProgressUpdate::new(AnalysisStage::AnomalyDetection, 0.5, "Running detectors");
        assert!((update.progress - 0.61).abs() < 1e-6);

        let clamped = ProgressUpdate::new(AnalysisStage::Profiling, 3.0, "");
        assert_eq!(clamped.stage_progress, 1.0);
        assert!((clamped.progress - 0.10).abs() < 1e-6);
    }

    #[test]
    fn test_dimension_finished_counts_items() {
        let update = ProgressUpdate::dimension_finished(QualityDimension::Consistency, 2);
        assert_eq!(update.stage, AnalysisStage::QualityAnalysis);
        assert_eq!(update.sub_stage.as_deref(), Some("Checking consistency"));
        assert_eq!(update.message, "Checking consistency (2/4)");
        assert_eq!((update.items_processed, update.items_total), (Some(2), Some(4)));
        assert!((update.progress - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_terminal_updates() {
        assert_eq!(ProgressUpdate::complete("done").progress, 1.0);
        let cancelled = ProgressUpdate::cancelled();
        assert_eq!(cancelled.stage, AnalysisStage::Cancelled);
        assert_eq!(cancelled.progress, 0.0);
        assert_eq!(ProgressUpdate::failed("boom").stage, AnalysisStage::Failed);
    }

    #[test]
    fn test_closures_are_reporters() {
        let seen = Mutex::new(Vec::new());
        let reporter = |update: ProgressUpdate| seen.lock().unwrap().push(update.stage);
        reporter.report(ProgressUpdate::new(AnalysisStage::Profiling, 0.0, ""));
        reporter.report(ProgressUpdate::complete(""));
        assert_eq!(
            seen.into_inner().unwrap(),
            vec![AnalysisStage::Profiling, AnalysisStage::Complete]
        );
    }

    #[test]
    fn test_update_json_shape() {
        let json = serde_json::to_value(ProgressUpdate::dimension_finished(QualityDimension::Accuracy, 3)).unwrap();
        assert_eq!(json["stage"], "quality_analysis");
        assert_eq!(json["items_processed"], 3);

        let plain = serde_json::to_value(ProgressUpdate::new(AnalysisStage::Profiling, 0.0, "")).unwrap();
        assert!(plain.get("sub_stage").is_none());
    }

    #[test]
    fn test_cancel_is_shared_across_threads() {
        let token = CancellationToken::new();
        let remote = token.clone();
        std::thread::spawn(move || remote.cancel()).join().unwrap();
        assert!(token.is_cancelled());
    }
}
