//! One-class SVM with an RBF kernel, trained by SMO.
//!
//! Solves the ν-one-class dual
//!
//! ```text
//! min 1/2 aᵀKa   s.t.  0 <= a_i <= 1,  Σ a_i = ν·l
//! ```
//!
//! with maximal-violating-pair working set selection. The decision value of a
//! row is `Σ a_i K(x_i, x) - ρ`; rows below zero fall outside the support.

use super::{AnomalyDetector, Detection, NumericProjection};
use crate::config::AnalysisConfig;
use crate::error::{GuardianError, Result};
use crate::types::DetectorKind;
use rayon::prelude::*;
use tracing::debug;

/// Stopping tolerance on the maximal KKT violation.
const TOLERANCE: f64 = 1e-3;
/// Floor for the second-order term of a working pair.
const TAU: f64 = 1e-12;

#[derive(Debug, Clone)]
pub struct OneClassSvmDetector {
    nu: f64,
}

/// A fitted one-class SVM.
#[derive(Debug, Clone)]
pub struct OneClassSvm {
    support_vectors: Vec<Vec<f64>>,
    coefficients: Vec<f64>,
    rho: f64,
    gamma: f64,
}

impl OneClassSvm {
    pub fn decision_function(&self, row: &[f64]) -> f64 {
        self.support_vectors
            .iter()
            .zip(&self.coefficients)
            .map(|(sv, a)| a * rbf(sv, row, self.gamma))
            .sum::<f64>()
            - self.rho
    }

    pub fn n_support(&self) -> usize {
        self.support_vectors.len()
    }
}

impl OneClassSvmDetector {
    pub fn new(config: &AnalysisConfig) -> Self {
        Self {
            nu: config.contamination,
        }
    }

    pub fn fit(&self, projection: &NumericProjection) -> Result<OneClassSvm> {
        let data = projection.rows();
        let l = data.len();
        let gamma = 1.0 / projection.n_features().max(1) as f64;
        let kernel_row = |i: usize| -> Vec<f64> { data.iter().map(|x| rbf(&data[i], x, gamma)).collect() };

        // Feasible start: the first ⌊ν·l⌋ multipliers at the upper bound.
        let total = self.nu * l as f64;
        let full = (total.floor() as usize).min(l);
        let mut alpha = vec![0.0; l];
        alpha[..full].fill(1.0);
        if full < l {
            alpha[full] = total - full as f64;
        }

        let mut gradient = vec![0.0; l];
        for (j, &a) in alpha.iter().enumerate() {
            if a > 0.0 {
                for (g, k) in gradient.iter_mut().zip(kernel_row(j)) {
                    *g += a * k;
                }
            }
        }

        let max_iter = (100 * l).max(10_000);
        let mut iterations = 0;
        while iterations < max_iter {
            let Some((i, j)) = select_working_pair(&alpha, &gradient) else {
                break;
            };
            let k_i = kernel_row(i);
            let k_j = kernel_row(j);
            let quad = (k_i[i] + k_j[j] - 2.0 * k_i[j]).max(TAU);
            let step = ((gradient[j] - gradient[i]) / quad)
                .min(1.0 - alpha[i])
                .min(alpha[j]);
            if step <= 0.0 {
                break;
            }

            alpha[i] += step;
            alpha[j] -= step;
            for (k, g) in gradient.iter_mut().enumerate() {
                *g += step * (k_i[k] - k_j[k]);
            }
            iterations += 1;
        }

        let rho = compute_rho(&alpha, &gradient);
        if !rho.is_finite() {
            return Err(GuardianError::detector(
                DetectorKind::Ocsvm.name(),
                "solver produced a non-finite offset",
            ));
        }

        let (support_vectors, coefficients): (Vec<Vec<f64>>, Vec<f64>) = alpha
            .iter()
            .enumerate()
            .filter(|(_, a)| **a > 0.0)
            .map(|(i, &a)| (data[i].clone(), a))
            .unzip();

        debug!(
            iterations,
            support_vectors = support_vectors.len(),
            rho,
            "Fitted one-class SVM"
        );

        Ok(OneClassSvm {
            support_vectors,
            coefficients,
            rho,
            gamma,
        })
    }
}

impl AnomalyDetector for OneClassSvmDetector {
    fn kind(&self) -> DetectorKind {
        DetectorKind::Ocsvm
    }

    fn detect(&self, projection: &NumericProjection) -> Result<Detection> {
        if projection.is_empty() {
            return Ok(Detection::empty());
        }

        let model = self.fit(projection)?;
        let scores: Vec<f64> = projection
            .rows()
            .par_iter()
            .map(|row| model.decision_function(row))
            .collect();
        if scores.iter().any(|s| !s.is_finite()) {
            return Err(GuardianError::detector(
                DetectorKind::Ocsvm.name(),
                "non-finite decision value (are there infinite values?)",
            ));
        }

        let mask = scores.iter().map(|&s| s < 0.0).collect();
        Ok(Detection {
            mask,
            scores,
            model: None,
        })
    }
}

/// Maximal violating pair: `i` may grow, `j` may shrink.
fn select_working_pair(alpha: &[f64], gradient: &[f64]) -> Option<(usize, usize)> {
    let mut up: Option<(usize, f64)> = None;
    let mut low: Option<(usize, f64)> = None;
    for (t, (&a, &g)) in alpha.iter().zip(gradient).enumerate() {
        if a < 1.0 && up.is_none_or(|(_, best)| -g > best) {
            up = Some((t, -g));
        }
        if a > 0.0 && low.is_none_or(|(_, best)| -g < best) {
            low = Some((t, -g));
        }
    }

    let ((i, max_up), (j, min_low)) = (up?, low?);
    (max_up - min_low >= TOLERANCE).then_some((i, j))
}

/// Offset from the free multipliers, or the midpoint of the feasible interval.
fn compute_rho(alpha: &[f64], gradient: &[f64]) -> f64 {
    let mut upper = f64::INFINITY;
    let mut lower = f64::NEG_INFINITY;
    let mut free_sum = 0.0;
    let mut free = 0usize;

    for (&a, &g) in alpha.iter().zip(gradient) {
        if a >= 1.0 {
            lower = lower.max(g);
        } else if a <= 0.0 {
            upper = upper.min(g);
        } else {
            free_sum += g;
            free += 1;
        }
    }

    if free > 0 {
        free_sum / free as f64
    } else {
        (upper + lower) / 2.0
    }
}

fn rbf(a: &[f64], b: &[f64], gamma: f64) -> f64 {
    let squared: f64 = a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum();
    (-gamma * squared).exp()
}
