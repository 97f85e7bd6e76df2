//! Exact t-SNE projection to two dimensions.
//!
//! Quadratic in the number of points; meant for the few hundred to few
//! thousand words one would plot.

use oorandom::Rand32;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{EmbedError, Result};

const PERPLEXITY_TOLERANCE: f64 = 1e-5;
const PERPLEXITY_STEPS: usize = 50;
const MIN_GAIN: f64 = 0.01;
const INIT_STD: f64 = 1e-4;
const MIN_PROBABILITY: f64 = 1e-12;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TsneConfig {
    pub perplexity: f64,
    pub iterations: usize,
    pub learning_rate: f64,
    pub early_exaggeration: f64,
    /// Iterations run with exaggerated P and the low momentum.
    pub exaggeration_iters: usize,
    pub initial_momentum: f64,
    pub final_momentum: f64,
    pub seed: u64,
}

impl Default for TsneConfig {
    fn default() -> Self {
        Self {
            perplexity: 30.0,
            iterations: 1000,
            learning_rate: 200.0,
            early_exaggeration: 12.0,
            exaggeration_iters: 250,
            initial_momentum: 0.5,
            final_momentum: 0.8,
            seed: 0,
        }
    }
}

impl TsneConfig {
    pub fn with_perplexity(mut self, perplexity: f64) -> Self {
        self.perplexity = perplexity.max(1.0);
        self
    }

    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

/// Project `points` to 2-D.
///
/// Fails if there are fewer than two points, if they differ in dimension, or
/// if `perplexity` is not below the number of points.
pub fn tsne(points: &[Vec<f32>], config: &TsneConfig) -> Result<Vec<[f32; 2]>> {
    let n = points.len();
    if n < 2 {
        return Err(EmbedError::InvalidArgument(format!(
            "t-SNE needs at least 2 points, got {n}"
        )));
    }
    if config.perplexity >= n as f64 {
        return Err(EmbedError::InvalidArgument(format!(
            "perplexity {} must be smaller than the number of points ({n})",
            config.perplexity
        )));
    }
    let dim = points[0].len();
    if points.iter().any(|p| p.len() != dim) {
        return Err(EmbedError::InvalidArgument(
            "all points must have the same dimension".into(),
        ));
    }

    let distances = squared_distances(points);
    let p = joint_probabilities(&distances, n, config.perplexity);

    let mut rng = Rand32::new(config.seed);
    let mut y: Vec<[f64; 2]> = (0..n)
        .map(|_| [gaussian(&mut rng) * INIT_STD, gaussian(&mut rng) * INIT_STD])
        .collect();
    let mut update = vec![[0.0f64; 2]; n];
    let mut gains = vec![[1.0f64; 2]; n];
    let mut num = vec![0.0f64; n * n];

    for iter in 0..config.iterations {
        let early = iter < config.exaggeration_iters;
        let exaggeration = if early { config.early_exaggeration } else { 1.0 };
        let momentum = if early {
            config.initial_momentum
        } else {
            config.final_momentum
        };

        // Student-t kernel
        let mut sum_num = 0.0;
        for i in 0..n {
            for j in (i + 1)..n {
                let dy0 = y[i][0] - y[j][0];
                let dy1 = y[i][1] - y[j][1];
                let v = 1.0 / (1.0 + dy0 * dy0 + dy1 * dy1);
                num[i * n + j] = v;
                num[j * n + i] = v;
                sum_num += 2.0 * v;
            }
        }
        let sum_num = sum_num.max(MIN_PROBABILITY);

        for i in 0..n {
            let mut grad = [0.0f64; 2];
            for j in 0..n {
                if i == j {
                    continue;
                }
                let v = num[i * n + j];
                let q = (v / sum_num).max(MIN_PROBABILITY);
                let mult = (exaggeration * p[i * n + j] - q) * v;
                grad[0] += mult * (y[i][0] - y[j][0]);
                grad[1] += mult * (y[i][1] - y[j][1]);
            }

            for d in 0..2 {
                let g = 4.0 * grad[d];
                gains[i][d] = if (g > 0.0) != (update[i][d] > 0.0) {
                    gains[i][d] + 0.2
                } else {
                    (gains[i][d] * 0.8).max(MIN_GAIN)
                };
                update[i][d] = momentum * update[i][d] - config.learning_rate * gains[i][d] * g;
            }
        }

        for (yi, ui) in y.iter_mut().zip(&update) {
            yi[0] += ui[0];
            yi[1] += ui[1];
        }
        center(&mut y);

        if (iter + 1) % 100 == 0 {
            debug!(
                iteration = iter + 1,
                kl = kl_divergence(&p, &num, sum_num, n),
                "t-SNE progress"
            );
        }
    }

    Ok(y.into_iter().map(|[a, b]| [a as f32, b as f32]).collect())
}

fn squared_distances(points: &[Vec<f32>]) -> Vec<f64> {
    let n = points.len();
    let mut d = vec![0.0; n * n];
    for i in 0..n {
        for j in (i + 1)..n {
            let s: f64 = points[i]
                .iter()
                .zip(&points[j])
                .map(|(a, b)| (*a as f64 - *b as f64).powi(2))
                .sum();
            d[i * n + j] = s;
            d[j * n + i] = s;
        }
    }
    d
}

/// Symmetrised joint probabilities with each row calibrated to the target
/// perplexity by binary search over the Gaussian precision.
fn joint_probabilities(distances: &[f64], n: usize, perplexity: f64) -> Vec<f64> {
    let target = perplexity.ln();
    let mut conditional = vec![0.0; n * n];

    for i in 0..n {
        let row = &distances[i * n..(i + 1) * n];
        let mut beta = 1.0;
        let (mut lo, mut hi) = (f64::NEG_INFINITY, f64::INFINITY);
        let mut probs = vec![0.0; n];

        for _ in 0..PERPLEXITY_STEPS {
            let entropy = row_probabilities(row, i, beta, &mut probs);
            let diff = entropy - target;
            if diff.abs() < PERPLEXITY_TOLERANCE {
                break;
            }
            if diff > 0.0 {
                lo = beta;
                beta = if hi.is_infinite() { beta * 2.0 } else { (beta + hi) / 2.0 };
            } else {
                hi = beta;
                beta = if lo.is_infinite() { beta / 2.0 } else { (beta + lo) / 2.0 };
            }
        }
        row_probabilities(row, i, beta, &mut probs);
        conditional[i * n..(i + 1) * n].copy_from_slice(&probs);
    }

    let mut joint = vec![0.0; n * n];
    let denom = 2.0 * n as f64;
    for i in 0..n {
        for j in 0..n {
            if i != j {
                let p = (conditional[i * n + j] + conditional[j * n + i]) / denom;
                joint[i * n + j] = p.max(MIN_PROBABILITY);
            }
        }
    }
    joint
}

/// Fill `probs` with the conditional distribution for row `i` and return its
/// Shannon entropy in nats.
fn row_probabilities(row: &[f64], i: usize, beta: f64, probs: &mut [f64]) -> f64 {
    // shift by the nearest neighbour so exp() never underflows to all zeros
    let min = row
        .iter()
        .enumerate()
        .filter(|&(j, _)| j != i)
        .map(|(_, &d)| d)
        .fold(f64::INFINITY, f64::min);

    let mut sum = 0.0;
    let mut weighted = 0.0;
    for (j, (&d, p)) in row.iter().zip(probs.iter_mut()).enumerate() {
        if j == i {
            *p = 0.0;
            continue;
        }
        *p = (-(d - min) * beta).exp();
        sum += *p;
        weighted += (d - min) * *p;
    }
    let sum = sum.max(MIN_PROBABILITY);
    for p in probs.iter_mut() {
        *p /= sum;
    }
    sum.ln() + beta * weighted / sum
}

fn kl_divergence(p: &[f64], num: &[f64], sum_num: f64, n: usize) -> f64 {
    let mut kl = 0.0;
    for i in 0..n {
        for j in 0..n {
            if i != j {
                let pij = p[i * n + j];
                let q = (num[i * n + j] / sum_num).max(MIN_PROBABILITY);
                kl += pij * (pij / q).ln();
            }
        }
    }
    kl
}

fn center(y: &mut [[f64; 2]]) {
    let n = y.len() as f64;
    let mean = y
        .iter()
        .fold([0.0, 0.0], |acc, p| [acc[0] + p[0] / n, acc[1] + p[1] / n]);
    for p in y {
        p[0] -= mean[0];
        p[1] -= mean[1];
    }
}

/// Standard normal draw via Box-Muller.
fn gaussian(rng: &mut Rand32) -> f64 {
    let u1 = (rng.rand_float() as f64).max(f64::MIN_POSITIVE);
    let u2 = rng.rand_float() as f64;
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}
