use super::{
    AnomalyDetector, Detection, IsolationForestDetector, LofDetector, NumericProjection,
    OneClassSvmDetector, ScoreModel,
};
use crate::config::AnalysisConfig;
use crate::error::{GuardianError, Result};
use crate::explain::Explainer;
use crate::types::{AnomalyResult, DetectorOutcome, DetectorReport, Explanation};
use crate::utils::{normalize_abs, percentage, percentile, round_to};
use polars::prelude::*;
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use tracing::{info, warn};

/// Weighted fusion of the isolation forest, LOF and one-class SVM detectors.
pub struct AnomalyEnsemble {
    config: AnalysisConfig,
    detectors: Vec<Box<dyn AnomalyDetector>>,
}

/// One detection call: the result plus what is needed to explain it.
pub struct EnsembleRun {
    pub result: AnomalyResult,
    pub projection: NumericProjection,
    model: Option<Box<dyn ScoreModel>>,
}

impl EnsembleRun {
    /// Attribute the flagged rows to features using the fitted isolation forest.
    pub fn explain(&self, explainer: &Explainer) -> Explanation {
        if self.projection.n_features() == 0 {
            return Explanation::no_numeric_features();
        }
        if self.projection.n_rows() == 0 {
            return Explanation::empty();
        }
        match &self.model {
            Some(model) => explainer.explain(model.as_ref(), &self.projection, &self.result.anomalies),
            None => Explanation::failed("no fitted isolation forest is available for this run"),
        }
    }

    pub fn into_result(self) -> AnomalyResult {
        self.result
    }
}

impl std::fmt::Debug for EnsembleRun {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnsembleRun")
            .field("result", &self.result)
            .field("projection", &self.projection)
            .field("has_model", &self.model.is_some())
            .finish()
    }
}

impl AnomalyEnsemble {
    /// The default three-detector ensemble.
    pub fn new(config: AnalysisConfig) -> Self {
        let detectors: Vec<Box<dyn AnomalyDetector>> = vec![
            Box::new(IsolationForestDetector::new(&config)),
            Box::new(LofDetector::new(&config)),
            Box::new(OneClassSvmDetector::new(&config)),
        ];
        Self { config, detectors }
    }

    /// An ensemble over caller-supplied detectors, weighted by their kind.
    pub fn with_detectors(config: AnalysisConfig, detectors: Vec<Box<dyn AnomalyDetector>>) -> Self {
        Self { config, detectors }
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn detect_anomalies(&self, df: &DataFrame) -> Result<AnomalyResult> {
        Ok(self.run(df)?.into_result())
    }

    /// Project `df` and run the ensemble over it.
    ///
    /// # Errors
    ///
    /// Returns `GuardianError::InvalidConfig` for a configuration that fails
    /// validation, before any detector runs.
    pub fn run(&self, df: &DataFrame) -> Result<EnsembleRun> {
        self.config.validate()?;
        let projection = NumericProjection::from_frame(df)?;
        Ok(self.run_projection(projection))
    }

    /// Run every detector over the projection and fuse the results.
    ///
    /// A detector that fails or panics contributes zero scores, no flagged rows
    /// and no feature importance; the failure is recorded in its report and
    /// never aborts the run.
    pub fn run_projection(&self, projection: NumericProjection) -> EnsembleRun {
        let contamination = self.config.contamination;
        if projection.is_empty() {
            info!(
                rows = projection.n_rows(),
                features = projection.n_features(),
                "Nothing to score; returning empty anomaly result"
            );
            return EnsembleRun {
                result: AnomalyResult::empty(contamination, projection.columns().to_vec()),
                projection,
                model: None,
            };
        }

        let n = projection.n_rows();
        let run_one = |detector: &Box<dyn AnomalyDetector>| {
            let kind = detector.kind();
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| detector.detect(&projection)))
                .unwrap_or_else(|_| Err(GuardianError::detector(kind.name(), "detector panicked")))
                .and_then(|detection| check_shape(detection, n));
            (kind, outcome)
        };
        let detections: Vec<_> = if self.config.parallel {
            self.detectors.par_iter().map(run_one).collect()
        } else {
            self.detectors.iter().map(run_one).collect()
        };

        let mut ensemble_scores = vec![0.0; n];
        let mut reports = Vec::with_capacity(detections.len());
        let mut model = None;
        let mut survived = Vec::with_capacity(detections.len());
        for (kind, outcome) in detections {
            survived.push(outcome.is_ok());
            let weight = kind.weight();
            match outcome {
                Ok(detection) => {
                    for (total, s) in ensemble_scores.iter_mut().zip(normalize_abs(&detection.scores)) {
                        *total += weight * s;
                    }
                    reports.push(DetectorReport {
                        detector: kind,
                        weight,
                        outcome: DetectorOutcome::Ok,
                        anomalies: detection.anomalies(),
                    });
                    if model.is_none() {
                        model = detection.model;
                    }
                }
                Err(e) => {
                    warn!(detector = kind.name(), error = %e, "Detector failed; contributing zero scores");
                    reports.push(DetectorReport {
                        detector: kind,
                        weight,
                        outcome: DetectorOutcome::Failed {
                            reason: e.to_string(),
                        },
                        anomalies: Vec::new(),
                    });
                }
            }
        }

        let threshold = percentile(&ensemble_scores, (1.0 - contamination) * 100.0).unwrap_or(0.0);
        let anomalies: Vec<usize> = ensemble_scores
            .iter()
            .enumerate()
            .filter_map(|(i, &s)| (s > threshold).then_some(i))
            .collect();

        let feature_importance = self.fuse_importance(&projection, &anomalies, &survived);

        info!(
            rows = n,
            anomalies = anomalies.len(),
            threshold,
            failed = reports.iter().filter(|r| !r.outcome.is_ok()).count(),
            "Anomaly ensemble complete"
        );

        let result = AnomalyResult {
            anomaly_count: anomalies.len(),
            anomaly_percentage: round_to(percentage(anomalies.len(), n), 2),
            scores: ensemble_scores,
            anomalies,
            threshold,
            contamination,
            detectors: reports,
            feature_importance,
            features: projection.columns().to_vec(),
        };

        EnsembleRun {
            result,
            projection,
            model,
        }
    }

    /// Weighted sum of each surviving detector's importance over the ensemble's
    /// flagged rows, renormalized by the surviving weight.
    fn fuse_importance(
        &self,
        projection: &NumericProjection,
        anomalies: &[usize],
        survived: &[bool],
    ) -> BTreeMap<String, f64> {
        let mut fused: BTreeMap<String, f64> = BTreeMap::new();
        if anomalies.is_empty() {
            return fused;
        }

        let mut total_weight = 0.0;
        for (detector, _) in self.detectors.iter().zip(survived).filter(|(_, ok)| **ok) {
            let importance = detector.feature_importance(projection, anomalies);
            if importance.is_empty() {
                continue;
            }
            let weight = detector.kind().weight();
            total_weight += weight;
            for (feature, value) in importance {
                *fused.entry(feature).or_insert(0.0) += weight * value;
            }
        }

        if total_weight > 0.0 {
            fused.values_mut().for_each(|v| *v /= total_weight);
        }
        fused
    }
}

fn check_shape(detection: Detection, n: usize) -> Result<Detection> {
    if detection.scores.len() != n || detection.mask.len() != n {
        return Err(GuardianError::Internal(format!(
            "expected {} scores, got {} scores and {} flags",
            n,
            detection.scores.len(),
            detection.mask.len()
        )));
    }
    if detection.scores.iter().any(|s| !s.is_finite()) {
        return Err(GuardianError::Internal("non-finite detector score".to_string()));
    }
    Ok(detection)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DetectorKind, ExplanationStatus};

    struct FailingDetector;

    impl AnomalyDetector for FailingDetector {
        fn kind(&self) -> DetectorKind {
            DetectorKind::Ocsvm
        }

        fn detect(&self, _projection: &NumericProjection) -> Result<Detection> {
            Err(GuardianError::detector("ocsvm", "kernel exploded"))
        }

        /// Would skew the fused importance toward `y` if it were counted.
        fn feature_importance(&self, _: &NumericProjection, _: &[usize]) -> BTreeMap<String, f64> {
            BTreeMap::from([("y".to_string(), 1.0)])
        }
    }

    struct PanickingDetector;

    impl AnomalyDetector for PanickingDetector {
        fn kind(&self) -> DetectorKind {
            DetectorKind::Lof
        }

        fn detect(&self, _projection: &NumericProjection) -> Result<Detection> {
            panic!("distance matrix is singular")
        }
    }

    fn blob_with_outliers() -> DataFrame {
        let mut x: Vec<f64> = (0..95).map(|i| ((i * 37) % 19) as f64 * 0.1).collect();
        let mut y: Vec<f64> = (0..95).map(|i| ((i * 11) % 23) as f64 * 0.1).collect();
        x.extend([30.0, -25.0, 40.0, 28.0, -33.0]);
        y.extend([31.0, 27.0, -35.0, -29.0, 36.0]);
        let label: Vec<String> = (0..100).map(|i| format!("row{i}")).collect();
        df!["x" => x, "y" => y, "label" => label].unwrap()
    }

    #[test]
    fn test_flags_top_rows_by_ensemble_score() {
        let run = AnomalyEnsemble::new(AnalysisConfig::default())
            .run(&blob_with_outliers())
            .unwrap();
        let result = &run.result;

        assert_eq!(result.scores.len(), 100);
        assert!(result.anomaly_count <= 10);
        assert_eq!(result.anomaly_count, result.anomalies.len());
        for i in 95..100 {
            assert!(result.anomalies.contains(&i), "row {i} should be flagged");
        }

        let min_flagged = result
            .anomalies
            .iter()
            .map(|&i| result.scores[i])
            .fold(f64::INFINITY, f64::min);
        for (i, &s) in result.scores.iter().enumerate() {
            if !result.anomalies.contains(&i) {
                assert!(s <= result.threshold && s < min_flagged);
            }
        }
    }

    #[test]
    fn test_feature_importance_sums_to_one() {
        let result = AnomalyEnsemble::new(AnalysisConfig::default())
            .detect_anomalies(&blob_with_outliers())
            .unwrap();
        let total: f64 = result.feature_importance.values().sum();
        assert!((total - 1.0).abs() < 1e-6);
        assert_eq!(result.features, vec!["x", "y"]);
    }

    #[test]
    fn test_failing_detector_is_recorded_not_fatal() {
        let config = AnalysisConfig::default();
        let ensemble = AnomalyEnsemble::with_detectors(
            config.clone(),
            vec![
                Box::new(IsolationForestDetector::new(&config)),
                Box::new(FailingDetector),
            ],
        );

        let result = ensemble.detect_anomalies(&blob_with_outliers()).unwrap();
        let failed = &result.detectors[1];
        assert_eq!(failed.detector, DetectorKind::Ocsvm);
        assert!(matches!(
            &failed.outcome,
            DetectorOutcome::Failed { reason } if reason.contains("kernel exploded")
        ));
        assert!(failed.anomalies.is_empty());
        assert!(result.detectors[0].outcome.is_ok());
        assert!(!result.anomalies.is_empty());

        // Only the forest survives, so its importance is the fused importance.
        let projection = NumericProjection::from_frame(&blob_with_outliers()).unwrap();
        let forest_only = IsolationForestDetector::new(&config).feature_importance(&projection, &result.anomalies);
        assert_eq!(result.feature_importance.len(), forest_only.len());
        for (feature, weight) in &forest_only {
            assert!((result.feature_importance[feature] - weight).abs() < 1e-12);
        }
    }

    #[test]
    fn test_panicking_detector_is_recorded_not_fatal() {
        let config = AnalysisConfig::default();
        let ensemble = AnomalyEnsemble::with_detectors(
            config.clone(),
            vec![
                Box::new(IsolationForestDetector::new(&config)),
                Box::new(PanickingDetector),
            ],
        );

        let result = ensemble.detect_anomalies(&blob_with_outliers()).unwrap();
        assert!(matches!(
            &result.detectors[1].outcome,
            DetectorOutcome::Failed { reason } if reason.contains("panicked")
        ));
        for i in 95..100 {
            assert!(result.anomalies.contains(&i));
        }
    }

    #[test]
    fn test_invalid_config_is_rejected_before_detection() {
        let config = AnalysisConfig {
            lof_neighbors: 0,
            ..AnalysisConfig::default()
        };
        let err = AnomalyEnsemble::new(config).detect_anomalies(&blob_with_outliers()).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_CONFIG");
    }

    #[test]
    fn test_unvalidated_projection_run_isolates_lof() {
        let config = AnalysisConfig {
            lof_neighbors: 0,
            ..AnalysisConfig::default()
        };
        let projection = NumericProjection::from_frame(&blob_with_outliers()).unwrap();
        let run = AnomalyEnsemble::new(config).run_projection(projection);

        let lof = &run.result.detectors[1];
        assert_eq!(lof.detector, DetectorKind::Lof);
        assert!(!lof.outcome.is_ok());
        assert!(run.result.detectors[0].outcome.is_ok());
        assert!(run.result.detectors[2].outcome.is_ok());
        assert_eq!(run.result.scores.len(), 100);
    }

    #[test]
    fn test_zero_rows_explain_as_empty() {
        let df = df!["x" => Vec::<f64>::new(), "y" => Vec::<f64>::new()].unwrap();
        let run = AnomalyEnsemble::new(AnalysisConfig::default()).run(&df).unwrap();

        assert!(run.result.scores.is_empty());
        assert_eq!(run.result.features, vec!["x", "y"]);
        let explanation = run.explain(&Explainer::new(&AnalysisConfig::default()));
        assert!(explanation.is_ok());
        assert!(explanation.rows.is_empty());
    }

    #[test]
    fn test_no_numeric_columns_gives_empty_result() {
        let df = df!["name" => ["a", "b", "c"]].unwrap();
        let run = AnomalyEnsemble::new(AnalysisConfig::default()).run(&df).unwrap();

        assert!(run.result.scores.is_empty());
        assert!(run.result.anomalies.is_empty());
        assert!(run.result.feature_importance.is_empty());
        assert_eq!(
            run.explain(&Explainer::new(&AnalysisConfig::default())).status,
            ExplanationStatus::NoNumericFeatures
        );
    }

    #[test]
    fn test_missing_model_fails_explanation() {
        let config = AnalysisConfig::default();
        let ensemble = AnomalyEnsemble::with_detectors(config.clone(), vec![Box::new(LofDetector::new(&config))]);
        let run = ensemble.run(&blob_with_outliers()).unwrap();

        let explanation = run.explain(&Explainer::new(&config));
        assert!(matches!(explanation.status, ExplanationStatus::Failed { .. }));
    }

    #[test]
    fn test_parallel_and_sequential_agree() {
        let df = blob_with_outliers();
        let parallel = AnomalyEnsemble::new(AnalysisConfig::default())
            .detect_anomalies(&df)
            .unwrap();
        let sequential = AnomalyEnsemble::new(AnalysisConfig::builder().parallel(false).build().unwrap())
            .detect_anomalies(&df)
            .unwrap();
        assert_eq!(parallel.anomalies, sequential.anomalies);
        assert_eq!(parallel.scores, sequential.scores);
    }
}
