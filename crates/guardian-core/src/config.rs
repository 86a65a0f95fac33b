//! Configuration for quality assessment and anomaly detection.
//!
//! Use [`AnalysisConfig::builder()`] for a validated configuration, or
//! [`AnalysisConfigBuilder::from_env()`] to pick up the service-level
//! `ANOMALY_CONTAMINATION` and `RANDOM_STATE` settings.

use serde::{Deserialize, Serialize};
use std::env;
use tracing::warn;

/// Default expected fraction of anomalous rows.
pub const DEFAULT_CONTAMINATION: f64 = 0.1;
/// Default seed for the isolation forest.
pub const DEFAULT_RANDOM_STATE: u64 = 42;

/// Configuration shared by the quality analyzers, the detectors and the explainer.
///
/// # Example
///
/// ```rust,ignore
/// use guardian_core::AnalysisConfig;
///
/// let config = AnalysisConfig::builder()
///     .contamination(0.05)
///     .random_state(7)
///     .build()?;
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Expected fraction of anomalous rows, in (0, 1).
    /// Drives per-detector contamination, the OCSVM ν, and the ensemble percentile.
    /// Default: 0.1
    pub contamination: f64,

    /// Seed for the isolation forest's sub-sampling and split selection.
    /// Default: 42
    pub random_state: u64,

    /// IQR multiplier for accuracy range violations.
    /// Default: 3.0
    pub iqr_multiplier: f64,

    /// Absolute z-score above which a value is a statistical outlier.
    /// Default: 3.0
    pub zscore_threshold: f64,

    /// Number of isolation trees.
    /// Default: 100
    pub n_estimators: usize,

    /// Upper bound on rows sampled per isolation tree.
    /// Default: 256
    pub max_samples: usize,

    /// Neighborhood size for the local outlier factor (capped at rows - 1).
    /// Default: 20
    pub lof_neighbors: usize,

    /// Number of flagged rows that receive a per-row explanation.
    /// Default: 10
    pub explain_max_rows: usize,

    /// Permutation/background pairs sampled per explained row.
    /// Default: 16
    pub explain_permutations: usize,

    /// Run analyzers and detectors on the rayon pool.
    /// Default: true
    pub parallel: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            contamination: DEFAULT_CONTAMINATION,
            random_state: DEFAULT_RANDOM_STATE,
            iqr_multiplier: 3.0,
            zscore_threshold: 3.0,
            n_estimators: 100,
            max_samples: 256,
            lof_neighbors: 20,
            explain_max_rows: 10,
            explain_permutations: 16,
            parallel: true,
        }
    }
}

impl AnalysisConfig {
    /// Create a new configuration builder.
    pub fn builder() -> AnalysisConfigBuilder {
        AnalysisConfigBuilder::default()
    }

    /// Validate the configuration and return errors if invalid.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if !(self.contamination > 0.0 && self.contamination < 1.0) {
            return Err(ConfigValidationError::InvalidContamination(
                self.contamination,
            ));
        }

        for (field, value) in [
            ("iqr_multiplier", self.iqr_multiplier),
            ("zscore_threshold", self.zscore_threshold),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigValidationError::InvalidThreshold {
                    field: field.to_string(),
                    value,
                });
            }
        }

        for (field, value) in [
            ("n_estimators", self.n_estimators),
            ("max_samples", self.max_samples),
            ("lof_neighbors", self.lof_neighbors),
            ("explain_permutations", self.explain_permutations),
        ] {
            if value == 0 {
                return Err(ConfigValidationError::ZeroCount(field.to_string()));
            }
        }

        Ok(())
    }
}

/// Errors that can occur during configuration validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Invalid contamination: {0} (must be strictly between 0.0 and 1.0)")]
    InvalidContamination(f64),

    #[error("Invalid threshold for '{field}': {value} (must be a positive number)")]
    InvalidThreshold { field: String, value: f64 },

    #[error("Invalid value for '{0}': must be at least 1")]
    ZeroCount(String),
}

/// Builder for [`AnalysisConfig`] with fluent API.
#[derive(Debug, Default)]
pub struct AnalysisConfigBuilder {
    contamination: Option<f64>,
    random_state: Option<u64>,
    iqr_multiplier: Option<f64>,
    zscore_threshold: Option<f64>,
    n_estimators: Option<usize>,
    max_samples: Option<usize>,
    lof_neighbors: Option<usize>,
    explain_max_rows: Option<usize>,
    explain_permutations: Option<usize>,
    parallel: Option<bool>,
}

impl AnalysisConfigBuilder {
    /// Seed the builder from `ANOMALY_CONTAMINATION` and `RANDOM_STATE`.
    ///
    /// Unparseable values are logged and ignored so the defaults apply.
    pub fn from_env() -> Self {
        let mut builder = Self::default();

        if let Ok(raw) = env::var("ANOMALY_CONTAMINATION") {
            match raw.trim().parse::<f64>() {
                Ok(value) => builder.contamination = Some(value),
                Err(_) => warn!("Ignoring unparseable ANOMALY_CONTAMINATION={}", raw),
            }
        }

        if let Ok(raw) = env::var("RANDOM_STATE") {
            match raw.trim().parse::<u64>() {
                Ok(value) => builder.random_state = Some(value),
                Err(_) => warn!("Ignoring unparseable RANDOM_STATE={}", raw),
            }
        }

        builder
    }

    /// Set the expected anomalous fraction.
    ///
    /// # Arguments
    /// * `contamination` - Value strictly between 0.0 and 1.0 (e.g., 0.1 = 10%)
    pub fn contamination(mut self, contamination: f64) -> Self {
        self.contamination = Some(contamination);
        self
    }

    /// Set the isolation forest seed.
    pub fn random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    /// Set the IQR multiplier used for range violations.
    pub fn iqr_multiplier(mut self, multiplier: f64) -> Self {
        self.iqr_multiplier = Some(multiplier);
        self
    }

    /// Set the z-score threshold used for statistical outliers.
    pub fn zscore_threshold(mut self, threshold: f64) -> Self {
        self.zscore_threshold = Some(threshold);
        self
    }

    /// Set the number of isolation trees.
    pub fn n_estimators(mut self, n: usize) -> Self {
        self.n_estimators = Some(n);
        self
    }

    /// Set the per-tree sample cap.
    pub fn max_samples(mut self, n: usize) -> Self {
        self.max_samples = Some(n);
        self
    }

    /// Set the LOF neighborhood size.
    pub fn lof_neighbors(mut self, k: usize) -> Self {
        self.lof_neighbors = Some(k);
        self
    }

    /// Set how many flagged rows get a per-row explanation.
    pub fn explain_max_rows(mut self, n: usize) -> Self {
        self.explain_max_rows = Some(n);
        self
    }

    /// Set the number of sampled permutations per explained row.
    pub fn explain_permutations(mut self, n: usize) -> Self {
        self.explain_permutations = Some(n);
        self
    }

    /// Enable or disable parallel execution.
    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = Some(parallel);
        self
    }

    /// Build the configuration.
    ///
    /// Returns a validated `AnalysisConfig` or an error if validation fails.
    pub fn build(self) -> Result<AnalysisConfig, ConfigValidationError> {
        let defaults = AnalysisConfig::default();
        let config = AnalysisConfig {
            contamination: self.contamination.unwrap_or(defaults.contamination),
            random_state: self.random_state.unwrap_or(defaults.random_state),
            iqr_multiplier: self.iqr_multiplier.unwrap_or(defaults.iqr_multiplier),
            zscore_threshold: self.zscore_threshold.unwrap_or(defaults.zscore_threshold),
            n_estimators: self.n_estimators.unwrap_or(defaults.n_estimators),
            max_samples: self.max_samples.unwrap_or(defaults.max_samples),
            lof_neighbors: self.lof_neighbors.unwrap_or(defaults.lof_neighbors),
            explain_max_rows: self.explain_max_rows.unwrap_or(defaults.explain_max_rows),
            explain_permutations: self
                .explain_permutations
                .unwrap_or(defaults.explain_permutations),
            parallel: self.parallel.unwrap_or(defaults.parallel),
        };

        config.validate()?;
        Ok(config)
    }
}
