//! Data quality scoring.
//!
//! Four independent analyzers score completeness, consistency, accuracy and
//! uniqueness; [`QualityAggregator`] runs them over the same snapshot and
//! averages the clamped scores.

mod accuracy;
mod aggregator;
mod completeness;
mod consistency;
mod uniqueness;

pub use accuracy::AccuracyAnalyzer;
pub use aggregator::QualityAggregator;
pub use completeness::CompletenessAnalyzer;
pub use consistency::ConsistencyAnalyzer;
pub use uniqueness::UniquenessAnalyzer;
