//! Feature attribution for anomaly scores.
//!
//! Contributions are Shapley values estimated by sampling (permutation,
//! background row) pairs. For each pair the row's features are switched in
//! one at a time, in permutation order, starting from the background row;
//! each switch credits the change in model score to the switched feature.
//! Averaged over the pairs, a row's contributions sum exactly to its score
//! minus the mean score of the background rows it was compared against,
//! which is reported as the row's baseline.

use crate::anomaly::{NumericProjection, ScoreModel};
use crate::config::AnalysisConfig;
use crate::types::{Explanation, ExplanationStatus, FeatureContribution, FeatureWeight, RowExplanation};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use tracing::debug;

/// Per-row attribution before it is sorted for presentation.
struct Attribution {
    score: f64,
    baseline: f64,
    contributions: Vec<f64>,
}

#[derive(Debug, Clone)]
pub struct Explainer {
    max_rows: usize,
    permutations: usize,
    seed: u64,
    parallel: bool,
}

impl Explainer {
    pub fn new(config: &AnalysisConfig) -> Self {
        Self {
            max_rows: config.explain_max_rows,
            permutations: config.explain_permutations.max(1),
            seed: config.random_state,
            parallel: config.parallel,
        }
    }

    /// Explain `model` on the projection.
    ///
    /// Per-row explanations cover the first `explain_max_rows` entries of
    /// `anomaly_rows` that lie inside the projection. Global importance is the
    /// normalized mean absolute contribution over every row.
    pub fn explain(
        &self,
        model: &dyn ScoreModel,
        projection: &NumericProjection,
        anomaly_rows: &[usize],
    ) -> Explanation {
        if projection.n_features() == 0 {
            return Explanation::no_numeric_features();
        }
        if model.n_features() != projection.n_features() {
            return Explanation::failed(format!(
                "model expects {} features but the projection has {}",
                model.n_features(),
                projection.n_features()
            ));
        }

        let attributions: Vec<Attribution> = if self.parallel {
            (0..projection.n_rows())
                .into_par_iter()
                .map(|row| self.attribute(model, projection, row))
                .collect()
        } else {
            (0..projection.n_rows())
                .map(|row| self.attribute(model, projection, row))
                .collect()
        };

        if attributions
            .iter()
            .any(|a| !a.score.is_finite() || !a.baseline.is_finite())
        {
            return Explanation::failed("model produced a non-finite score");
        }

        let columns = projection.columns();
        let rows: Vec<RowExplanation> = anomaly_rows
            .iter()
            .copied()
            .filter(|&row| row < attributions.len())
            .take(self.max_rows)
            .map(|row| {
                let attribution = &attributions[row];
                let mut contributions: Vec<FeatureContribution> = columns
                    .iter()
                    .zip(&attribution.contributions)
                    .map(|(feature, &contribution)| FeatureContribution {
                        feature: feature.clone(),
                        contribution,
                    })
                    .collect();
                contributions.sort_by(|a, b| b.contribution.abs().total_cmp(&a.contribution.abs()));
                RowExplanation {
                    row,
                    score: attribution.score,
                    baseline: attribution.baseline,
                    contributions,
                }
            })
            .collect();

        let global_importance = global_importance(columns, &attributions);

        debug!(
            explained_rows = rows.len(),
            features = columns.len(),
            "Computed anomaly explanations"
        );

        Explanation {
            status: ExplanationStatus::Ok,
            explanation_type: Explanation::EXPLANATION_TYPE.to_string(),
            rows,
            global_importance,
        }
    }

    fn attribute(&self, model: &dyn ScoreModel, projection: &NumericProjection, row: usize) -> Attribution {
        let target = projection.row(row);
        let n_features = target.len();
        let mut rng = StdRng::seed_from_u64(self.seed ^ (row as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15));
        let mut order: Vec<usize> = (0..n_features).collect();
        let mut contributions = vec![0.0; n_features];
        let mut baseline = 0.0;

        for _ in 0..self.permutations {
            let background = projection.row(rng.gen_range(0..projection.n_rows()));
            order.shuffle(&mut rng);

            let mut current = background.to_vec();
            let mut previous = model.score(&current);
            baseline += previous;
            for &feature in &order {
                current[feature] = target[feature];
                let next = model.score(&current);
                contributions[feature] += next - previous;
                previous = next;
            }
        }

        let samples = self.permutations as f64;
        contributions.iter_mut().for_each(|c| *c /= samples);
        Attribution {
            score: model.score(target),
            baseline: baseline / samples,
            contributions,
        }
    }
}

fn global_importance(columns: &[String], attributions: &[Attribution]) -> Vec<FeatureWeight> {
    if attributions.is_empty() {
        return Vec::new();
    }

    let mut mean_abs = vec![0.0; columns.len()];
    for attribution in attributions {
        for (total, c) in mean_abs.iter_mut().zip(&attribution.contributions) {
            *total += c.abs();
        }
    }
    let n = attributions.len() as f64;
    mean_abs.iter_mut().for_each(|v| *v /= n);

    let total: f64 = mean_abs.iter().sum();
    let mut importance: Vec<FeatureWeight> = columns
        .iter()
        .zip(mean_abs)
        .map(|(feature, value)| FeatureWeight {
            feature: feature.clone(),
            weight: if total > 0.0 { value / total } else { 0.0 },
        })
        .collect();
    importance.sort_by(|a, b| b.weight.total_cmp(&a.weight));
    importance
}
