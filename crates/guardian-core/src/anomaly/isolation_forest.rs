//! Isolation forest: anomalies are isolated by fewer random splits.

use super::{AnomalyDetector, Detection, NumericProjection, ScoreModel};
use crate::config::AnalysisConfig;
use crate::error::{GuardianError, Result};
use crate::types::DetectorKind;
use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use tracing::debug;

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

/// Average path length of an unsuccessful BST search over `n` points.
fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

#[derive(Debug, Clone)]
enum Node {
    Leaf {
        size: usize,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone)]
struct IsolationTree {
    nodes: Vec<Node>,
}

impl IsolationTree {
    fn grow(data: &[Vec<f64>], indices: Vec<usize>, height_limit: usize, rng: &mut StdRng) -> Self {
        let mut tree = Self { nodes: Vec::new() };
        tree.build(data, indices, 0, height_limit, rng);
        tree
    }

    fn build(
        &mut self,
        data: &[Vec<f64>],
        indices: Vec<usize>,
        depth: usize,
        height_limit: usize,
        rng: &mut StdRng,
    ) -> usize {
        let id = self.nodes.len();
        self.nodes.push(Node::Leaf {
            size: indices.len(),
        });
        if depth >= height_limit || indices.len() <= 1 {
            return id;
        }

        // Only features that still vary inside this node can split it.
        let n_features = data[indices[0]].len();
        let candidates: Vec<(usize, f64, f64)> = (0..n_features)
            .filter_map(|feature| {
                let (lo, hi) = indices.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &i| {
                    (lo.min(data[i][feature]), hi.max(data[i][feature]))
                });
                (lo < hi && (hi - lo).is_finite()).then_some((feature, lo, hi))
            })
            .collect();
        if candidates.is_empty() {
            return id;
        }

        let (feature, lo, hi) = candidates[rng.gen_range(0..candidates.len())];
        let threshold = rng.gen_range(lo..hi);
        let (left_idx, right_idx): (Vec<usize>, Vec<usize>) =
            indices.into_iter().partition(|&i| data[i][feature] < threshold);

        let left = self.build(data, left_idx, depth + 1, height_limit, rng);
        let right = self.build(data, right_idx, depth + 1, height_limit, rng);
        self.nodes[id] = Node::Split {
            feature,
            threshold,
            left,
            right,
        };
        id
    }

    fn path_length(&self, row: &[f64]) -> f64 {
        let mut node = 0;
        let mut depth = 0.0;
        loop {
            match &self.nodes[node] {
                Node::Leaf { size } => return depth + average_path_length(*size),
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if row[*feature] < *threshold { *left } else { *right };
                    depth += 1.0;
                }
            }
        }
    }
}

/// A fitted isolation forest.
#[derive(Debug, Clone)]
pub struct IsolationForest {
    trees: Vec<IsolationTree>,
    sample_size: usize,
    n_features: usize,
}

impl IsolationForest {
    /// Mean path length of `row` over all trees.
    pub fn expected_path_length(&self, row: &[f64]) -> f64 {
        if self.trees.is_empty() {
            return 0.0;
        }
        self.trees.iter().map(|t| t.path_length(row)).sum::<f64>() / self.trees.len() as f64
    }
}

impl ScoreModel for IsolationForest {
    fn n_features(&self) -> usize {
        self.n_features
    }

    /// `2^(-E[h(x)] / c(sample_size))`, in (0, 1]; 0.5 when nothing can be isolated.
    fn score(&self, row: &[f64]) -> f64 {
        let c = average_path_length(self.sample_size);
        if c <= 0.0 {
            return 0.5;
        }
        2f64.powf(-self.expected_path_length(row) / c)
    }
}

#[derive(Debug, Clone)]
pub struct IsolationForestDetector {
    n_estimators: usize,
    max_samples: usize,
    contamination: f64,
    random_state: u64,
}

impl IsolationForestDetector {
    pub fn new(config: &AnalysisConfig) -> Self {
        Self {
            n_estimators: config.n_estimators,
            max_samples: config.max_samples,
            contamination: config.contamination,
            random_state: config.random_state,
        }
    }

    /// Grow the forest. Tree `t` draws from its own RNG seeded with
    /// `random_state + t`, so the result does not depend on thread scheduling.
    pub fn fit(&self, projection: &NumericProjection) -> IsolationForest {
        let n = projection.n_rows();
        let sample_size = self.max_samples.min(n);
        let height_limit = if sample_size > 1 {
            (sample_size as f64).log2().ceil() as usize
        } else {
            0
        };
        let data = projection.rows();

        let trees = (0..self.n_estimators)
            .into_par_iter()
            .map(|t| {
                let mut rng = StdRng::seed_from_u64(self.random_state.wrapping_add(t as u64));
                let indices = sample(&mut rng, n, sample_size).into_vec();
                IsolationTree::grow(data, indices, height_limit, &mut rng)
            })
            .collect();

        debug!(
            trees = self.n_estimators,
            sample_size, height_limit, "Fitted isolation forest"
        );

        IsolationForest {
            trees,
            sample_size,
            n_features: projection.n_features(),
        }
    }
}

impl AnomalyDetector for IsolationForestDetector {
    fn kind(&self) -> DetectorKind {
        DetectorKind::IsolationForest
    }

    fn detect(&self, projection: &NumericProjection) -> Result<Detection> {
        if projection.is_empty() {
            return Ok(Detection::empty());
        }
        if self.n_estimators == 0 || self.max_samples == 0 {
            return Err(GuardianError::detector(
                DetectorKind::IsolationForest.name(),
                "n_estimators and max_samples must be at least 1",
            ));
        }

        let forest = self.fit(projection);
        let scores: Vec<f64> = projection
            .rows()
            .par_iter()
            .map(|row| forest.score(row))
            .collect();

        let mut detection = Detection::top_fraction(scores.clone(), &scores, self.contamination);
        detection.model = Some(Box::new(forest));
        Ok(detection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clustered_with_outlier() -> NumericProjection {
        let mut rows: Vec<Vec<f64>> = (0..50)
            .map(|i| vec![(i % 10) as f64 * 0.1, (i / 10) as f64 * 0.1])
            .collect();
        rows.push(vec![25.0, -30.0]);
        NumericProjection::from_rows(vec!["x".into(), "y".into()], rows).unwrap()
    }

    #[test]
    fn test_average_path_length() {
        assert_eq!(average_path_length(1), 0.0);
        assert_eq!(average_path_length(2), 1.0);
        // c(256) is roughly 10.24
        assert!((average_path_length(256) - 10.244).abs() < 0.01);
    }

    #[test]
    fn test_outlier_scores_highest() {
        let projection = clustered_with_outlier();
        let detector = IsolationForestDetector::new(&AnalysisConfig::default());
        let detection = detector.detect(&projection).unwrap();

        let outlier = detection.scores[50];
        assert!(detection.scores[..50].iter().all(|&s| s < outlier));
        assert!(detection.mask[50]);
        assert_eq!(detection.anomalies().len(), 5);
        assert!(detection.scores.iter().all(|&s| s > 0.0 && s <= 1.0));
    }

    #[test]
    fn test_seeded_forest_is_deterministic() {
        let projection = clustered_with_outlier();
        let detector = IsolationForestDetector::new(&AnalysisConfig::default());
        let a = detector.detect(&projection).unwrap();
        let b = detector.detect(&projection).unwrap();
        assert_eq!(a.scores, b.scores);
    }

    #[test]
    fn test_exposes_fitted_model() {
        let projection = clustered_with_outlier();
        let detector = IsolationForestDetector::new(&AnalysisConfig::default());
        let detection = detector.detect(&projection).unwrap();

        let model = detection.model.expect("forest should be returned");
        assert_eq!(model.n_features(), 2);
        assert_eq!(model.score(projection.row(50)), detection.scores[50]);
    }

    #[test]
    fn test_single_row_is_neutral() {
        let projection = NumericProjection::from_rows(vec!["x".into()], vec![vec![1.0]]).unwrap();
        let detector = IsolationForestDetector::new(&AnalysisConfig::default());
        let detection = detector.detect(&projection).unwrap();
        assert_eq!(detection.scores, vec![0.5]);
        assert!(detection.anomalies().is_empty());
    }

    #[test]
    fn test_empty_forest_is_a_detector_error() {
        let config = AnalysisConfig {
            n_estimators: 0,
            ..AnalysisConfig::default()
        };
        let result = IsolationForestDetector::new(&config).detect(&clustered_with_outlier());
        assert!(matches!(result, Err(GuardianError::DetectorFailed { .. })));
    }
}
