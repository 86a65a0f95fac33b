//! Error types for the quality and anomaly engines.
//!
//! Most degenerate inputs (empty frames, constant columns, a failing detector)
//! are absorbed into neutral results and never reach this type. What remains
//! are frame-access and report-writing failures, rejected configurations and
//! cancellation.
//!
//! Errors serialize as `{code, message}` so a caller can forward them as-is.

use crate::config::ConfigValidationError;
use serde::Serialize;
use serde::ser::SerializeStruct;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GuardianError {
    #[error("Assessment cancelled")]
    Cancelled,

    /// The configuration failed validation before any work started.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(#[from] ConfigValidationError),

    /// One ensemble member could not fit or score the projection. The
    /// ensemble records this in the detector's report instead of returning it.
    #[error("Detector '{detector}' failed: {reason}")]
    DetectorFailed { detector: String, reason: String },

    /// A broken internal invariant, such as a detector returning the wrong
    /// number of scores.
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl GuardianError {
    pub fn detector(detector: impl Into<String>, reason: impl Into<String>) -> Self {
        GuardianError::DetectorFailed {
            detector: detector.into(),
            reason: reason.into(),
        }
    }

    /// Stable, machine-readable code for the error kind.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Cancelled => "CANCELLED",
            Self::InvalidConfig(_) => "INVALID_CONFIG",
            Self::DetectorFailed { .. } => "DETECTOR_FAILED",
            Self::Internal(_) => "INTERNAL_ERROR",
            Self::Io(_) => "IO_ERROR",
            Self::Polars(_) => "POLARS_ERROR",
            Self::Json(_) => "JSON_ERROR",
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl Serialize for GuardianError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut state = serializer.serialize_struct("GuardianError", 2)?;
        state.serialize_field("code", &self.error_code())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}

pub type Result<T> = std::result::Result<T, GuardianError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code() {
        assert_eq!(GuardianError::Cancelled.error_code(), "CANCELLED");
        assert_eq!(
            GuardianError::detector("lof", "too few rows").error_code(),
            "DETECTOR_FAILED"
        );
    }

    #[test]
    fn test_config_error_converts() {
        let error: GuardianError = ConfigValidationError::InvalidContamination(1.5).into();
        assert_eq!(error.error_code(), "INVALID_CONFIG");
        assert!(error.to_string().contains("1.5"));
        assert!(!error.is_cancelled());
    }

    #[test]
    fn test_error_serializes_code_and_message() {
        let error = GuardianError::detector("ocsvm", "solver produced a non-finite offset");
        let json = serde_json::to_value(&error).unwrap();
        assert_eq!(json["code"], "DETECTOR_FAILED");
        assert_eq!(
            json["message"],
            "Detector 'ocsvm' failed: solver produced a non-finite offset"
        );
    }
}
