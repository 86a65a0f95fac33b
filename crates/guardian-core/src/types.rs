use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// Profiling Types
// ============================================================================

/// Semantic kind of a column as seen by the analyzers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    /// Integer or floating point column.
    Numeric,
    /// String or categorical column.
    Text,
    /// Boolean, temporal or nested column.
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnProfile {
    pub name: String,
    pub dtype: String,
    pub kind: ColumnKind,
    pub missing_count: usize,
    pub missing_percentage: f64,
    /// Distinct non-missing values.
    pub unique_count: usize,
}

/// Per-column profile of one dataset snapshot, in column order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetProfile {
    pub n_rows: usize,
    pub n_columns: usize,
    pub columns: Vec<ColumnProfile>,
}

impl DatasetProfile {
    /// Look up a column profile by name.
    pub fn column(&self, name: &str) -> Option<&ColumnProfile> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Total number of cells (rows x columns).
    pub fn total_cells(&self) -> usize {
        self.n_rows * self.n_columns
    }

    /// Names of the numeric columns, in column order.
    pub fn numeric_columns(&self) -> Vec<&str> {
        self.columns_of_kind(ColumnKind::Numeric)
    }

    /// Names of the text columns, in column order.
    pub fn text_columns(&self) -> Vec<&str> {
        self.columns_of_kind(ColumnKind::Text)
    }

    fn columns_of_kind(&self, kind: ColumnKind) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| c.kind == kind)
            .map(|c| c.name.as_str())
            .collect()
    }
}

// ============================================================================
// Completeness
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnCompleteness {
    pub missing_count: usize,
    pub missing_percentage: f64,
    pub completeness_score: f64,
    pub data_type: String,
    pub unique_values: usize,
}

/// Two columns whose missing cells largely coincide.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissingPattern {
    pub columns: [String; 2],
    pub overlap_count: usize,
    pub similarity_score: f64,
    pub pattern_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletenessReport {
    pub overall_completeness: f64,
    pub column_completeness: BTreeMap<String, ColumnCompleteness>,
    pub missing_patterns: Vec<MissingPattern>,
    pub recommendations: Vec<String>,
}

// ============================================================================
// Consistency
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormatIssue {
    pub pattern_count: usize,
    /// Structural pattern -> number of distinct values that produce it.
    pub patterns: BTreeMap<String, usize>,
    pub consistency_score: f64,
}

/// Two distinct values that collapse to the same trimmed, lowercased form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueInconsistency {
    pub original_values: [String; 2],
    pub issue: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeIssue {
    pub mixed_types: BTreeMap<String, usize>,
    pub dominant_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsistencyReport {
    pub format_consistency: BTreeMap<String, FormatIssue>,
    pub value_consistency: BTreeMap<String, Vec<ValueInconsistency>>,
    pub type_consistency: BTreeMap<String, TypeIssue>,
    /// `100 - 10 * format-inconsistent columns`; may be negative.
    pub score: f64,
    pub recommendations: Vec<String>,
}

// ============================================================================
// Accuracy
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeViolation {
    pub below_range_count: usize,
    pub above_range_count: usize,
    pub lower_bound: f64,
    pub upper_bound: f64,
    pub min_value: f64,
    pub max_value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrphanedReferences {
    pub orphaned_count: usize,
    pub orphaned_sample: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatisticalOutliers {
    pub count: usize,
    pub percentage: f64,
    pub mean: f64,
    pub std: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccuracyReport {
    pub range_violations: BTreeMap<String, RangeViolation>,
    /// Keyed `"<referencing>_to_<referenced>"`.
    pub referential_integrity: BTreeMap<String, OrphanedReferences>,
    pub statistical_outliers: BTreeMap<String, StatisticalOutliers>,
    /// `100 - 15 * range-violating columns`; may be negative.
    pub score: f64,
    pub recommendations: Vec<String>,
}

// ============================================================================
// Uniqueness
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateRows {
    pub total_rows: usize,
    pub duplicate_count: usize,
    pub unique_count: usize,
    pub duplicate_percentage: f64,
    pub uniqueness_score: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueCount {
    pub value: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateValues {
    pub duplicate_value_count: usize,
    pub total_duplicate_occurrences: usize,
    pub most_common: Vec<ValueCount>,
    pub unique_percentage: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cardinality {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnUniqueness {
    pub total_values: usize,
    pub unique_values: usize,
    pub uniqueness_score: f64,
    pub cardinality: Cardinality,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UniquenessReport {
    pub duplicate_rows: DuplicateRows,
    pub duplicate_values: BTreeMap<String, DuplicateValues>,
    pub uniqueness_scores: BTreeMap<String, ColumnUniqueness>,
    pub recommendations: Vec<String>,
}

// ============================================================================
// Aggregate Quality Report
// ============================================================================

/// The four quality dimensions, in the order they are reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityDimension {
    Completeness,
    Consistency,
    Accuracy,
    Uniqueness,
}

impl QualityDimension {
    pub const ALL: [QualityDimension; 4] = [
        Self::Completeness,
        Self::Consistency,
        Self::Accuracy,
        Self::Uniqueness,
    ];

    /// Progress text shown while this dimension is being analyzed.
    pub fn step_message(&self) -> &'static str {
        match self {
            Self::Completeness => "Analyzing completeness",
            Self::Consistency => "Checking consistency",
            Self::Accuracy => "Validating accuracy",
            Self::Uniqueness => "Computing uniqueness",
        }
    }
}

/// Dimension scores, each in [0, 100].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityScores {
    pub completeness: f64,
    pub consistency: f64,
    pub accuracy: f64,
    pub uniqueness: f64,
    /// Arithmetic mean of the four dimension scores.
    pub overall: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    pub scores: QualityScores,
    pub completeness: CompletenessReport,
    pub consistency: ConsistencyReport,
    pub accuracy: AccuracyReport,
    pub uniqueness: UniquenessReport,
}

impl QualityReport {
    /// All recommendations across the four dimensions, in dimension order.
    pub fn recommendations(&self) -> Vec<&str> {
        self.completeness
            .recommendations
            .iter()
            .chain(&self.consistency.recommendations)
            .chain(&self.accuracy.recommendations)
            .chain(&self.uniqueness.recommendations)
            .map(String::as_str)
            .collect()
    }
}

// ============================================================================
// Anomaly Detection Types
// ============================================================================

/// The detectors that make up the default ensemble.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectorKind {
    IsolationForest,
    Lof,
    Ocsvm,
}

impl DetectorKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::IsolationForest => "isolation_forest",
            Self::Lof => "lof",
            Self::Ocsvm => "ocsvm",
        }
    }

    /// Static ensemble weight.
    pub fn weight(&self) -> f64 {
        match self {
            Self::IsolationForest => 0.4,
            Self::Lof => 0.3,
            Self::Ocsvm => 0.3,
        }
    }
}

/// Whether a detector produced usable scores for this call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DetectorOutcome {
    Ok,
    Failed { reason: String },
}

impl DetectorOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorReport {
    pub detector: DetectorKind,
    pub weight: f64,
    pub outcome: DetectorOutcome,
    /// Rows this detector flagged on its own, ascending.
    pub anomalies: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureWeight {
    pub feature: String,
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyResult {
    /// Ensemble score per row.
    pub scores: Vec<f64>,
    /// Flagged rows, ascending.
    pub anomalies: Vec<usize>,
    pub anomaly_count: usize,
    pub anomaly_percentage: f64,
    pub threshold: f64,
    pub contamination: f64,
    pub detectors: Vec<DetectorReport>,
    /// Column -> weight; sums to 1 when non-empty.
    pub feature_importance: BTreeMap<String, f64>,
    /// Numeric columns the detectors saw, in column order.
    pub features: Vec<String>,
}

impl AnomalyResult {
    /// Result for a dataset without numeric rows or columns.
    pub fn empty(contamination: f64, features: Vec<String>) -> Self {
        Self {
            scores: Vec::new(),
            anomalies: Vec::new(),
            anomaly_count: 0,
            anomaly_percentage: 0.0,
            threshold: 0.0,
            contamination,
            detectors: Vec::new(),
            feature_importance: BTreeMap::new(),
            features,
        }
    }

    /// Feature importance sorted by weight, heaviest first.
    pub fn ranked_features(&self) -> Vec<FeatureWeight> {
        let mut ranked: Vec<FeatureWeight> = self
            .feature_importance
            .iter()
            .map(|(feature, &weight)| FeatureWeight {
                feature: feature.clone(),
                weight,
            })
            .collect();
        ranked.sort_by(|a, b| b.weight.total_cmp(&a.weight));
        ranked
    }

    /// Per-detector flagged rows.
    pub fn detector_anomalies(&self, kind: DetectorKind) -> Option<&[usize]> {
        self.detectors
            .iter()
            .find(|d| d.detector == kind)
            .map(|d| d.anomalies.as_slice())
    }
}

// ============================================================================
// Explanation Types
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExplanationStatus {
    Ok,
    NoNumericFeatures,
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureContribution {
    pub feature: String,
    pub contribution: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowExplanation {
    pub row: usize,
    pub score: f64,
    /// Mean model score over the background rows sampled for this row.
    pub baseline: f64,
    /// Sorted by absolute contribution, largest first.
    pub contributions: Vec<FeatureContribution>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Explanation {
    pub status: ExplanationStatus,
    pub explanation_type: String,
    pub rows: Vec<RowExplanation>,
    /// Normalized mean absolute contribution, heaviest first.
    pub global_importance: Vec<FeatureWeight>,
}

impl Explanation {
    pub const EXPLANATION_TYPE: &'static str = "permutation_shap";

    fn with_status(status: ExplanationStatus) -> Self {
        Self {
            status,
            explanation_type: Self::EXPLANATION_TYPE.to_string(),
            rows: Vec::new(),
            global_importance: Vec::new(),
        }
    }

    /// Nothing to explain: no rows were scored.
    pub fn empty() -> Self {
        Self::with_status(ExplanationStatus::Ok)
    }

    pub fn no_numeric_features() -> Self {
        Self::with_status(ExplanationStatus::NoNumericFeatures)
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self::with_status(ExplanationStatus::Failed {
            reason: reason.into(),
        })
    }

    pub fn is_ok(&self) -> bool {
        matches!(self.status, ExplanationStatus::Ok)
    }
}
