//! Local outlier factor: density of a row relative to its neighbors.

use super::{AnomalyDetector, Detection, NumericProjection};
use crate::config::AnalysisConfig;
use crate::error::{GuardianError, Result};
use crate::types::DetectorKind;
use rayon::prelude::*;

/// Keeps the local reachability density finite when neighbors coincide.
const DENSITY_EPSILON: f64 = 1e-10;

#[derive(Debug, Clone)]
pub struct LofDetector {
    n_neighbors: usize,
    contamination: f64,
}

struct Neighborhood {
    /// (row, distance) of the k nearest other rows, nearest first.
    neighbors: Vec<(usize, f64)>,
    k_distance: f64,
}

impl LofDetector {
    pub fn new(config: &AnalysisConfig) -> Self {
        Self {
            n_neighbors: config.lof_neighbors,
            contamination: config.contamination,
        }
    }

    /// Local outlier factor of every row (about 1 for inliers).
    ///
    /// Every row is neutral when there is no neighborhood to compare against:
    /// fewer than two rows, or `n_neighbors == 0`.
    pub fn outlier_factors(&self, projection: &NumericProjection) -> Vec<f64> {
        let n = projection.n_rows();
        let k = self.n_neighbors.min(n.saturating_sub(1));
        if k == 0 {
            return vec![1.0; n];
        }
        let rows = projection.rows();

        let neighborhoods: Vec<Neighborhood> = (0..n)
            .into_par_iter()
            .map(|i| {
                let mut distances: Vec<(usize, f64)> = (0..n)
                    .filter(|&j| j != i)
                    .map(|j| (j, euclidean(&rows[i], &rows[j])))
                    .collect();
                distances.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
                distances.truncate(k);
                Neighborhood {
                    k_distance: distances[k - 1].1,
                    neighbors: distances,
                }
            })
            .collect();

        let densities: Vec<f64> = neighborhoods
            .iter()
            .map(|hood| {
                let reach: f64 = hood
                    .neighbors
                    .iter()
                    .map(|&(j, d)| d.max(neighborhoods[j].k_distance))
                    .sum::<f64>()
                    / k as f64;
                1.0 / (reach + DENSITY_EPSILON)
            })
            .collect();

        neighborhoods
            .iter()
            .zip(&densities)
            .map(|(hood, &density)| {
                let neighbor_density: f64 =
                    hood.neighbors.iter().map(|&(j, _)| densities[j]).sum::<f64>() / k as f64;
                neighbor_density / density
            })
            .collect()
    }
}

impl AnomalyDetector for LofDetector {
    fn kind(&self) -> DetectorKind {
        DetectorKind::Lof
    }

    fn detect(&self, projection: &NumericProjection) -> Result<Detection> {
        if projection.is_empty() {
            return Ok(Detection::empty());
        }
        if self.n_neighbors == 0 {
            return Err(GuardianError::detector(
                DetectorKind::Lof.name(),
                "n_neighbors must be at least 1",
            ));
        }

        let factors = self.outlier_factors(projection);
        if factors.iter().any(|f| !f.is_finite()) {
            return Err(GuardianError::detector(
                DetectorKind::Lof.name(),
                "non-finite outlier factor (are there infinite values?)",
            ));
        }

        let scores = factors.iter().map(|f| -f).collect();
        Ok(Detection::top_fraction(scores, &factors, self.contamination))
    }
}

fn euclidean(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f64>()
        .sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid_with_outlier() -> NumericProjection {
        let mut rows: Vec<Vec<f64>> = (0..25)
            .map(|i| vec![(i % 5) as f64, (i / 5) as f64])
            .collect();
        rows.push(vec![40.0, 40.0]);
        NumericProjection::from_rows(vec!["x".into(), "y".into()], rows).unwrap()
    }

    #[test]
    fn test_outlier_has_largest_factor() {
        let projection = grid_with_outlier();
        let detector = LofDetector::new(&AnalysisConfig::default());
        let factors = detector.outlier_factors(&projection);

        let outlier = factors[25];
        assert!(outlier > 2.0);
        assert!(factors[..25].iter().all(|&f| f < outlier));
    }

    #[test]
    fn test_scores_are_negative_factors() {
        let projection = grid_with_outlier();
        let detector = LofDetector::new(&AnalysisConfig::default());
        let detection = detector.detect(&projection).unwrap();
        let factors = detector.outlier_factors(&projection);

        for (score, factor) in detection.scores.iter().zip(&factors) {
            assert_eq!(*score, -factor);
        }
        assert!(detection.mask[25]);
        assert_eq!(detection.anomalies().len(), 2);
    }

    #[test]
    fn test_duplicate_points_stay_finite() {
        let projection = NumericProjection::from_rows(
            vec!["x".into()],
            vec![vec![1.0], vec![1.0], vec![1.0], vec![5.0]],
        )
        .unwrap();
        let detection = LofDetector::new(&AnalysisConfig::default())
            .detect(&projection)
            .unwrap();
        assert!(detection.scores.iter().all(|s| s.is_finite()));
    }

    #[test]
    fn test_single_row_is_neutral() {
        let projection = NumericProjection::from_rows(vec!["x".into()], vec![vec![3.0]]).unwrap();
        let detection = LofDetector::new(&AnalysisConfig::default())
            .detect(&projection)
            .unwrap();
        assert_eq!(detection.scores, vec![-1.0]);
        assert!(detection.anomalies().is_empty());
    }

    #[test]
    fn test_zero_neighbors_is_a_detector_error() {
        let config = AnalysisConfig {
            lof_neighbors: 0,
            ..AnalysisConfig::default()
        };
        let detector = LofDetector::new(&config);
        let projection = grid_with_outlier();

        assert_eq!(detector.outlier_factors(&projection), vec![1.0; 26]);
        let err = detector.detect(&projection).unwrap_err();
        assert_eq!(err.error_code(), "DETECTOR_FAILED");
        assert!(err.to_string().contains("n_neighbors"));
    }
}
