/**
 * RecoBlend
 * Copyright (C) 2026 RecoBlend contributors
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with this program. If not, see <http://www.gnu.org/licenses/>.
 */

// Learns the weights of a linear blend of several models' predictions by minimizing the RMSE of
// the blend against held-out ground truth. The search runs on the mean squared error, which has
// the same minimizers as the RMSE and stays smooth at a perfect fit.

use std::time::Instant;

use nalgebra::{DMatrix, DVector};

use crate::error::{Error, Result};
use crate::predictions::{AlignedRows, BlendTable, PredictionTable};
use crate::rmse::RmseAccumulator;
use crate::utils;

/// Constraints on the blend weights.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Constraint {
    /// Any real weights, negative or larger than one included.
    Unconstrained,
    /// Non-negative weights summing to one.
    Simplex,
}

impl Default for Constraint {
    fn default() -> Self {
        Constraint::Unconstrained
    }
}

#[derive(Clone, Copy, Debug)]
pub struct BlendConfig {
    pub max_iterations: usize,
    pub constraint: Constraint,
    /// Stops once the largest gradient component (or weight change, under constraints) drops
    /// below this.
    pub tolerance: f64,
}

impl Default for BlendConfig {
    fn default() -> Self {
        BlendConfig {
            max_iterations: 1000,
            constraint: Constraint::default(),
            tolerance: 1e-10,
        }
    }
}

#[derive(Clone, Debug)]
pub struct BlendOutcome {
    /// One weight per model, in the column order of the blend table.
    pub weights: Vec<(String, f64)>,
    pub rmse: f64,
    pub iterations: usize,
    /// `false` if the iteration cap was hit; the weights are still the best found.
    pub converged: bool,
}

impl BlendOutcome {

    pub fn weight_values(&self) -> Vec<f64> {
        self.weights.iter().map(|(_, weight)| *weight).collect()
    }
}

/// Quadratic form of the mean squared error, `mse(w) = w'Gw - 2c'w + s`.
struct SquaredError {
    gram: DMatrix<f64>,
    cross: DVector<f64>,
    target_energy: f64,
}

impl SquaredError {

    fn new(rows: &AlignedRows) -> Self {
        let n = rows.targets.len() as f64;
        let transposed = rows.predictions.transpose();

        SquaredError {
            gram: &transposed * &rows.predictions / n,
            cross: &transposed * &rows.targets / n,
            target_energy: rows.targets.dot(&rows.targets) / n,
        }
    }

    fn value(&self, weights: &DVector<f64>) -> f64 {
        weights.dot(&(&self.gram * weights)) - 2.0 * self.cross.dot(weights) + self.target_energy
    }

    fn gradient(&self, weights: &DVector<f64>) -> DVector<f64> {
        (&self.gram * weights - &self.cross) * 2.0
    }
}

struct Search {
    weights: DVector<f64>,
    iterations: usize,
    converged: bool,
}

/// Finds blend weights for the models of `table`, starting from uniform weights.
pub fn optimize(
    table: &BlendTable,
    ground_truth: &PredictionTable,
    config: &BlendConfig,
) -> Result<BlendOutcome> {

    let num_models = table.models().len();
    if num_models == 0 {
        return Err(Error::InvalidConfig("no models to blend".to_owned()));
    }

    let rows = table.align(ground_truth)?;
    let objective = SquaredError::new(&rows);
    let initial = DVector::from_element(num_models, 1.0 / num_models as f64);

    let start = Instant::now();

    let search = match config.constraint {
        Constraint::Unconstrained => quasi_newton(&objective, initial, config),
        Constraint::Simplex => projected_gradient(&objective, initial, config),
    };

    let rmse = blended_rmse(&rows, &search.weights)?;

    if search.converged {
        tracing::info!(
            iterations = search.iterations,
            rmse,
            elapsed_ms = utils::to_millis(start.elapsed()),
            "blend weights optimized",
        );
    } else {
        tracing::warn!(
            iterations = search.iterations,
            rmse,
            "blend optimization hit the iteration cap, keeping the best weights found",
        );
    }

    let weights = table.models().iter()
        .cloned()
        .zip(search.weights.iter().copied())
        .collect();

    Ok(BlendOutcome { weights, rmse, iterations: search.iterations, converged: search.converged })
}

/// Applies learned weights to a blend table. Rows with a missing model prediction become NaN.
pub fn blend_predictions(table: &BlendTable, outcome: &BlendOutcome) -> Result<PredictionTable> {

    for ((model, _), expected) in outcome.weights.iter().zip(table.models()) {
        if model != expected {
            return Err(Error::InvalidConfig(format!(
                "weights were learned for {}, table has {}", model, expected)));
        }
    }

    table.combine(&outcome.weight_values())
}

fn blended_rmse(rows: &AlignedRows, weights: &DVector<f64>) -> Result<f64> {
    let blended = &rows.predictions * weights;
    let mut accumulator = RmseAccumulator::default();
    for (prediction, target) in blended.iter().zip(rows.targets.iter()) {
        accumulator.push(prediction - target);
    }
    accumulator.finalise()
}

/// BFGS with a backtracking (Armijo) line search.
fn quasi_newton(objective: &SquaredError, initial: DVector<f64>, config: &BlendConfig) -> Search {

    const ARMIJO: f64 = 1e-4;
    const MIN_STEP: f64 = 1e-20;

    let num_models = initial.len();
    let mut weights = initial;
    let mut value = objective.value(&weights);
    let mut gradient = objective.gradient(&weights);
    let mut inverse_hessian = DMatrix::<f64>::identity(num_models, num_models);

    for iteration in 0..config.max_iterations {

        if gradient.amax() < config.tolerance {
            return Search { weights, iterations: iteration, converged: true };
        }

        let mut direction = -(&inverse_hessian * &gradient);
        let mut slope = gradient.dot(&direction);
        if slope >= 0.0 {
            // Lost descent, restart from steepest descent
            inverse_hessian = DMatrix::identity(num_models, num_models);
            direction = -gradient.clone();
            slope = gradient.dot(&direction);
        }

        let mut step = 1.0;
        let (candidate, candidate_value) = loop {
            let candidate = &weights + &direction * step;
            let candidate_value = objective.value(&candidate);
            if candidate_value <= value + ARMIJO * step * slope {
                break (candidate, candidate_value);
            }
            step *= 0.5;
            if step < MIN_STEP {
                // No further decrease representable at this precision
                return Search { weights, iterations: iteration, converged: true };
            }
        };

        let candidate_gradient = objective.gradient(&candidate);
        let s = &candidate - &weights;
        let y = &candidate_gradient - &gradient;
        let curvature = s.dot(&y);

        if curvature > f64::EPSILON * s.norm() * y.norm() {
            let rho = 1.0 / curvature;
            let identity = DMatrix::<f64>::identity(num_models, num_models);
            let left = &identity - &s * y.transpose() * rho;
            let right = &identity - &y * s.transpose() * rho;
            inverse_hessian = &left * &inverse_hessian * &right + &s * s.transpose() * rho;
        }

        let decrease = value - candidate_value;

        weights = candidate;
        value = candidate_value;
        gradient = candidate_gradient;

        if decrease.abs() <= config.tolerance * config.tolerance * value.abs().max(1.0) {
            return Search { weights, iterations: iteration + 1, converged: true };
        }
    }

    Search { weights, iterations: config.max_iterations, converged: false }
}

/// Projected gradient descent on the probability simplex with a fixed step of 1/L, where L bounds
/// the largest eigenvalue of the Hessian.
fn projected_gradient(objective: &SquaredError, initial: DVector<f64>, config: &BlendConfig) -> Search {

    let mut weights = project_onto_simplex(&initial);
    let lipschitz = 2.0 * objective.gram.trace();

    if !(lipschitz > 0.0) {
        return Search { weights, iterations: 0, converged: true };
    }

    for iteration in 0..config.max_iterations {
        let gradient = objective.gradient(&weights);
        let next = project_onto_simplex(&(&weights - gradient / lipschitz));
        let change = (&next - &weights).amax();
        weights = next;

        if change < config.tolerance {
            return Search { weights, iterations: iteration + 1, converged: true };
        }
    }

    Search { weights, iterations: config.max_iterations, converged: false }
}

/// Euclidean projection onto `{w : w >= 0, sum(w) = 1}`, following Duchi et al. (2008).
fn project_onto_simplex(v: &DVector<f64>) -> DVector<f64> {

    let mut sorted: Vec<f64> = v.iter().copied().collect();
    sorted.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));

    let mut cumulative = 0.0;
    let mut theta = 0.0;
    for (index, value) in sorted.iter().enumerate() {
        cumulative += value;
        let candidate = (cumulative - 1.0) / (index + 1) as f64;
        if value - candidate > 0.0 {
            theta = candidate;
        }
    }

    v.map(|value| (value - theta).max(0.0))
}
