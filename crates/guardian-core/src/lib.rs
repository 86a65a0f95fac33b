//! Data Quality Guardian core
//!
//! Data quality scoring and unsupervised anomaly detection for tabular
//! datasets, built on Polars.
//!
//! # Overview
//!
//! - **Profiling**: per-column dtype, missingness and cardinality
//! - **Quality scoring**: completeness, consistency, accuracy and uniqueness,
//!   each on a 0-100 scale, averaged into an overall score
//! - **Anomaly detection**: isolation forest, local outlier factor and
//!   one-class SVM, fused with fixed weights and thresholded by contamination
//! - **Explainability**: sampled Shapley attributions of the isolation forest
//!   score for the flagged rows
//! - **Progress Reporting**: stage updates with cancellation support
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use guardian_core::{AnalysisConfig, Guardian};
//! use polars::prelude::*;
//!
//! let df = CsvReadOptions::default()
//!     .with_has_header(true)
//!     .try_into_reader_with_file_path(Some("orders.csv".into()))?
//!     .finish()?;
//!
//! let output = Guardian::builder()
//!     .config(AnalysisConfig::builder().contamination(0.05).build()?)
//!     .on_progress(|update| {
//!         println!("[{:.0}%] {}", update.progress * 100.0, update.message);
//!     })
//!     .build()?
//!     .run(&df)?;
//!
//! println!("Overall quality: {:.1}", output.quality.scores.overall);
//! for rec in output.quality.recommendations() {
//!     println!("- {rec}");
//! }
//! ```
//!
//! # Using the engines directly
//!
//! The facade is optional; every stage is usable on its own:
//!
//! ```rust,ignore
//! use guardian_core::{AnalysisConfig, AnomalyEnsemble, Explainer, QualityAggregator};
//!
//! let config = AnalysisConfig::default();
//! let quality = QualityAggregator::new(config.clone()).assess(&df)?;
//!
//! let run = AnomalyEnsemble::new(config.clone()).run(&df)?;
//! let explanation = run.explain(&Explainer::new(&config));
//! ```
//!
//! # Configuration
//!
//! [`AnalysisConfigBuilder::from_env()`] seeds the builder from
//! `ANOMALY_CONTAMINATION` and `RANDOM_STATE`.

pub mod anomaly;
pub mod config;
pub mod error;
pub mod explain;
pub mod pipeline;
pub mod profiler;
pub mod quality;
pub mod reporting;
pub mod types;
pub mod utils;

// Re-exports for convenient access
pub use anomaly::{
    AnomalyDetector, AnomalyEnsemble, EnsembleRun, IsolationForestDetector, LofDetector,
    NumericProjection, OneClassSvmDetector, ScoreModel,
};
pub use config::{AnalysisConfig, AnalysisConfigBuilder, ConfigValidationError};
pub use error::{GuardianError, Result as GuardianResult};
pub use explain::Explainer;
pub use pipeline::{
    AnalysisStage, CancellationToken, Guardian, GuardianBuilder, GuardianOutput, ProgressReporter,
    ProgressUpdate,
};
pub use profiler::ColumnProfiler;
pub use quality::{
    AccuracyAnalyzer, CompletenessAnalyzer, ConsistencyAnalyzer, QualityAggregator,
    UniquenessAnalyzer,
};
pub use reporting::{GuardianReport, ReportWriter};
pub use types::{
    AccuracyReport, AnomalyResult, ColumnProfile, CompletenessReport, ConsistencyReport,
    DatasetProfile, DetectorKind, Explanation, ExplanationStatus, QualityDimension, QualityReport,
    QualityScores, UniquenessReport,
};
