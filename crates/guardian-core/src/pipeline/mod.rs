//! Orchestration of a full assessment run.
//!
//! [`Guardian`] sequences profiling, quality scoring, anomaly detection and
//! explanation, reporting progress and honouring cancellation in between.

mod builder;
pub mod progress;

pub use builder::{Guardian, GuardianBuilder, GuardianOutput};
pub use progress::{AnalysisStage, CancellationToken, ProgressReporter, ProgressUpdate};
