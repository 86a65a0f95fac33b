//! The `Guardian` facade and its builder.
//!
//! `Guardian` ties the profiler, the quality aggregator, the anomaly ensemble
//! and the explainer together behind one call, with progress reporting and
//! cancellation between stages.

use crate::anomaly::AnomalyEnsemble;
use crate::config::AnalysisConfig;
use crate::error::{GuardianError, Result};
use crate::explain::Explainer;
use crate::pipeline::progress::{AnalysisStage, CancellationToken, ProgressReporter, ProgressUpdate};
use crate::profiler::ColumnProfiler;
use crate::quality::QualityAggregator;
use crate::types::{AnomalyResult, Explanation, QualityReport};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;
use tracing::{error, info};

/// Everything a full run produces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuardianOutput {
    pub quality: QualityReport,
    /// `None` when anomaly detection was disabled.
    pub anomalies: Option<AnomalyResult>,
    /// `None` when anomaly detection or explanations were disabled.
    pub explanation: Option<Explanation>,
    pub duration_ms: u64,
}

/// Quality assessment and anomaly detection over a single dataset snapshot.
///
/// Use [`Guardian::builder()`] to configure one.
///
/// # Example
///
/// ```rust,ignore
/// use guardian_core::{AnalysisConfig, CancellationToken, Guardian};
///
/// let token = CancellationToken::new();
/// let output = Guardian::builder()
///     .config(AnalysisConfig::builder().contamination(0.05).build()?)
///     .cancellation_token(token.clone())
///     .on_progress(|update| {
///         println!("[{:.0}%] {}", update.progress * 100.0, update.message);
///     })
///     .build()?
///     .run(&df)?;
///
/// println!("overall quality: {:.1}", output.quality.scores.overall);
/// ```
pub struct Guardian {
    config: AnalysisConfig,
    anomaly_detection: bool,
    explanations: bool,
    progress_reporter: Option<Arc<dyn ProgressReporter>>,
    cancellation_token: CancellationToken,
}

// Runs are typically moved onto a worker thread.
static_assertions::assert_impl_all!(Guardian: Send, Sync);

impl Guardian {
    pub fn builder() -> GuardianBuilder {
        GuardianBuilder::default()
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Profile the dataset and score the four quality dimensions.
    pub fn assess(&self, df: &DataFrame) -> Result<QualityReport> {
        self.finish(self.assess_internal(df), |report| {
            format!("Quality score {:.1}", report.scores.overall)
        })
    }

    /// Run the detector ensemble over the numeric columns.
    pub fn detect_anomalies(&self, df: &DataFrame) -> Result<AnomalyResult> {
        let result = self.check_cancelled().and_then(|_| {
            self.report_progress(ProgressUpdate::new(
                AnalysisStage::AnomalyDetection,
                0.0,
                "Running anomaly detectors...",
            ));
            AnomalyEnsemble::new(self.config.clone()).detect_anomalies(df)
        });
        self.finish(result, |result| {
            format!("Flagged {} anomalous rows", result.anomaly_count)
        })
    }

    /// Quality assessment followed by anomaly detection and explanation.
    ///
    /// # Errors
    ///
    /// Returns `Err(GuardianError::Cancelled)` if the token was cancelled
    /// between stages. A detector that fails does not fail the run; it is
    /// recorded in the anomaly result instead.
    pub fn run(&self, df: &DataFrame) -> Result<GuardianOutput> {
        self.finish(self.run_internal(df), |output| {
            format!(
                "Quality score {:.1}, {} anomalous rows",
                output.quality.scores.overall,
                output.anomalies.as_ref().map_or(0, |a| a.anomaly_count)
            )
        })
    }

    fn run_internal(&self, df: &DataFrame) -> Result<GuardianOutput> {
        let start_time = Instant::now();
        let quality = self.assess_internal(df)?;

        let (anomalies, explanation) = if self.anomaly_detection {
            self.check_cancelled()?;
            self.report_progress(ProgressUpdate::new(
                AnalysisStage::AnomalyDetection,
                0.0,
                "Running anomaly detectors...",
            ));
            let run = AnomalyEnsemble::new(self.config.clone()).run(df)?;
            self.report_progress(ProgressUpdate::new(
                AnalysisStage::AnomalyDetection,
                1.0,
                format!("Flagged {} anomalous rows", run.result.anomaly_count),
            ));

            let explanation = if self.explanations {
                self.check_cancelled()?;
                self.report_progress(ProgressUpdate::new(
                    AnalysisStage::Explanation,
                    0.0,
                    "Explaining anomaly scores...",
                ));
                let explanation = run.explain(&Explainer::new(&self.config));
                self.report_progress(ProgressUpdate::new(
                    AnalysisStage::Explanation,
                    1.0,
                    format!("Explained {} rows", explanation.rows.len()),
                ));
                Some(explanation)
            } else {
                None
            };
            (Some(run.into_result()), explanation)
        } else {
            info!("Skipping anomaly detection (disabled)");
            (None, None)
        };

        Ok(GuardianOutput {
            quality,
            anomalies,
            explanation,
            duration_ms: start_time.elapsed().as_millis() as u64,
        })
    }

    fn assess_internal(&self, df: &DataFrame) -> Result<QualityReport> {
        info!(rows = df.height(), columns = df.width(), "Starting quality assessment");
        self.report_progress(ProgressUpdate::new(
            AnalysisStage::Initializing,
            0.0,
            "Starting quality assessment...",
        ));
        self.check_cancelled()?;

        self.report_progress(ProgressUpdate::new(
            AnalysisStage::Profiling,
            0.0,
            "Profiling dataset...",
        ));
        let profile = ColumnProfiler::profile(df)?;
        self.report_progress(ProgressUpdate::new(
            AnalysisStage::Profiling,
            1.0,
            format!("Profiled {} columns", profile.n_columns),
        ));

        self.check_cancelled()?;

        let finished = AtomicUsize::new(0);
        let aggregator = QualityAggregator::new(self.config.clone());
        let report = aggregator.assess_profiled(df, &profile, |dimension| {
            let done = finished.fetch_add(1, Ordering::SeqCst) + 1;
            self.report_progress(ProgressUpdate::dimension_finished(dimension, done));
        })?;

        self.report_progress(ProgressUpdate::new(
            AnalysisStage::Aggregation,
            1.0,
            format!("Overall quality score {:.1}", report.scores.overall),
        ));
        Ok(report)
    }

    /// Emit the terminal progress update for a finished call.
    fn finish<T>(&self, result: Result<T>, summary: impl FnOnce(&T) -> String) -> Result<T> {
        match result {
            Ok(value) => {
                self.report_progress(ProgressUpdate::complete(summary(&value)));
                Ok(value)
            }
            Err(e) => {
                if e.is_cancelled() {
                    self.report_progress(ProgressUpdate::cancelled());
                } else {
                    self.report_progress(ProgressUpdate::failed(e.to_string()));
                }
                error!("Assessment error: {}", e);
                Err(e)
            }
        }
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.cancellation_token.is_cancelled() {
            return Err(GuardianError::Cancelled);
        }
        Ok(())
    }

    fn report_progress(&self, update: ProgressUpdate) {
        if let Some(reporter) = &self.progress_reporter {
            reporter.report(update);
        }
    }
}

/// Builder for a [`Guardian`].
#[derive(Default)]
pub struct GuardianBuilder {
    config: Option<AnalysisConfig>,
    anomaly_detection: Option<bool>,
    explanations: Option<bool>,
    progress_reporter: Option<Arc<dyn ProgressReporter>>,
    cancellation_token: Option<CancellationToken>,
}

static_assertions::assert_impl_all!(GuardianBuilder: Send);

impl GuardianBuilder {
    pub fn config(mut self, config: AnalysisConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Whether [`Guardian::run`] runs the detector ensemble (default: true).
    pub fn anomaly_detection(mut self, enabled: bool) -> Self {
        self.anomaly_detection = Some(enabled);
        self
    }

    /// Whether [`Guardian::run`] explains the flagged rows (default: true).
    pub fn explanations(mut self, enabled: bool) -> Self {
        self.explanations = Some(enabled);
        self
    }

    /// Set a progress reporter for receiving updates during a run.
    ///
    /// Updates from the quality stage may arrive from rayon worker threads.
    pub fn progress_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.progress_reporter = Some(reporter);
        self
    }

    /// Set a progress callback closure.
    ///
    /// ```rust,ignore
    /// let guardian = Guardian::builder()
    ///     .on_progress(|update| {
    ///         println!("[{:.0}%] {:?}: {}",
    ///             update.progress * 100.0,
    ///             update.stage,
    ///             update.message
    ///         );
    ///     })
    ///     .build()?;
    /// ```
    pub fn on_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(ProgressUpdate) + Send + Sync + 'static,
    {
        self.progress_reporter = Some(Arc::new(callback));
        self
    }

    /// Set a cancellation token. Cancelling any clone of it stops the run at
    /// the next stage boundary with [`GuardianError::Cancelled`].
    pub fn cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancellation_token = Some(token);
        self
    }

    /// Build the guardian.
    ///
    /// # Errors
    ///
    /// Returns `GuardianError::InvalidConfig` if the configuration fails
    /// validation.
    pub fn build(self) -> Result<Guardian> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        Ok(Guardian {
            config,
            anomaly_detection: self.anomaly_detection.unwrap_or(true),
            explanations: self.explanations.unwrap_or(true),
            progress_reporter: self.progress_reporter,
            cancellation_token: self.cancellation_token.unwrap_or_default(),
        })
    }
}
