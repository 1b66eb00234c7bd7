//! Optimal interval lengths for a fixed waypoint sequence.
//!
//! The outer problem is `min_τ J(τ)` subject to `τᵢ > 0` and
//! `Σ τᵢ = t_f − t₀`, with `J` a [`SobolevNorm`]. The cost and Jacobian
//! contracts ([`SobolevNorm::value`], [`SobolevNorm::gradient`]) together
//! with [`ExecTimeConstraint`] are what an external NLP solver needs; the
//! bundled driver instead removes both constraints structurally by
//! optimizing over unconstrained logits `ρ` with `τ = T·softmax(ρ)` and runs
//! a BFGS line-search method on them, starting from the uniform partition.

use std::sync::Arc;

use log::{debug, warn};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use wolfe_bfgs::Bfgs;

use crate::basis::{Basis, BasisError};
use crate::gspline::Gspline;
use crate::sobolev::{DerivativeWeight, SobolevError, SobolevNorm};

/// Default lower-bound factor for interval lengths: `τ_min = 1e−6·T`.
pub const MIN_INTERVAL_FRACTION: f64 = 1e-6;

#[derive(Debug, Error)]
pub enum OptimizationError {
    #[error("total duration must be positive and finite, got {0}")]
    InvalidExecTime(f64),

    #[error("need at least two waypoints, got {0}")]
    TooFewWaypoints(usize),

    #[error("interval-length optimization failed: {0}")]
    DriverFailed(String),

    #[error(transparent)]
    Sobolev(#[from] SobolevError),

    #[error(transparent)]
    Basis(#[from] BasisError),
}

/// The fixed-total-duration equality constraint `Σ τᵢ − T = 0`.
///
/// Exposed for external NLP solvers; its Jacobian is the all-ones row.
#[derive(Clone, Copy, Debug)]
pub struct ExecTimeConstraint {
    num_intervals: usize,
    exec_time: f64,
}

impl ExecTimeConstraint {
    pub fn new(num_intervals: usize, exec_time: f64) -> Self {
        Self {
            num_intervals,
            exec_time,
        }
    }

    pub fn exec_time(&self) -> f64 {
        self.exec_time
    }

    pub fn value(&self, tau: &Array1<f64>) -> f64 {
        tau.sum() - self.exec_time
    }

    pub fn jacobian(&self) -> Array1<f64> {
        Array1::ones(self.num_intervals)
    }

    /// Per-component lower bounds `τᵢ ≥ 1e−6·T`.
    pub fn lower_bounds(&self) -> Array1<f64> {
        Array1::from_elem(self.num_intervals, MIN_INTERVAL_FRACTION * self.exec_time)
    }
}

/// Canonical problem families: basis and weight set per the classic
/// minimum-derivative costs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Preset {
    /// Piecewise linear, weight on the first derivative.
    BrokenLines,
    /// Legendre d = 4, weight on the second derivative.
    MinimumAcceleration,
    /// Legendre d = 6, weight on the third derivative.
    MinimumJerk,
    /// Legendre d = 8, weight on the fourth derivative.
    MinimumSnap,
    /// Legendre d = 10, weight on the fifth derivative.
    MinimumCrackle,
}

impl Preset {
    pub fn basis_dim(&self) -> usize {
        match self {
            Preset::BrokenLines => 2,
            Preset::MinimumAcceleration => 4,
            Preset::MinimumJerk => 6,
            Preset::MinimumSnap => 8,
            Preset::MinimumCrackle => 10,
        }
    }

    pub fn basis(&self) -> Result<Basis, BasisError> {
        Basis::legendre(self.basis_dim())
    }

    pub fn weights(&self) -> Vec<DerivativeWeight> {
        let order = self.basis_dim() / 2;
        vec![DerivativeWeight::new(order, 1.0)]
    }
}

#[derive(Clone, Debug)]
pub struct OptimizationOptions {
    pub max_iterations: usize,
    pub tolerance: f64,
}

impl Default for OptimizationOptions {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            tolerance: 1e-10,
        }
    }
}

/// `τ = T·softmax(ρ)`: strictly positive with the exact total by
/// construction.
fn softmax_lengths(exec_time: f64, rho: &Array1<f64>) -> Array1<f64> {
    let max = rho.fold(f64::NEG_INFINITY, |a, &b| a.max(b));
    let exp = rho.mapv(|r| (r - max).exp());
    let total: f64 = exp.sum();
    exp.mapv(|e| exec_time * e / total)
}

/// Chain `∇_τ J` through the softmax Jacobian `diag(τ) − τ·τᵀ/T`.
fn chain_gradient(exec_time: f64, tau: &Array1<f64>, grad_tau: &Array1<f64>) -> Array1<f64> {
    let weighted = grad_tau.dot(tau) / exec_time;
    Array1::from_shape_fn(tau.len(), |q| tau[q] * (grad_tau[q] - weighted))
}

/// Minimize the Sobolev cost over interval lengths and return the optimal
/// gspline on `[0, exec_time]`.
pub fn optimal_sobolev_gspline(
    waypoints: &Array2<f64>,
    basis: Arc<Basis>,
    exec_time: f64,
    weights: Vec<DerivativeWeight>,
) -> Result<Gspline, OptimizationError> {
    optimal_sobolev_gspline_with_options(
        waypoints,
        basis,
        exec_time,
        weights,
        &OptimizationOptions::default(),
    )
}

pub fn optimal_sobolev_gspline_with_options(
    waypoints: &Array2<f64>,
    basis: Arc<Basis>,
    exec_time: f64,
    weights: Vec<DerivativeWeight>,
    options: &OptimizationOptions,
) -> Result<Gspline, OptimizationError> {
    if !(exec_time > 0.0) || !exec_time.is_finite() {
        return Err(OptimizationError::InvalidExecTime(exec_time));
    }
    if waypoints.nrows() < 2 {
        return Err(OptimizationError::TooFewWaypoints(waypoints.nrows()));
    }

    let num_intervals = waypoints.nrows() - 1;
    let mut cost = SobolevNorm::new(waypoints.clone(), basis, weights)?;

    if num_intervals == 1 {
        let tau = Array1::from_elem(1, exec_time);
        return Ok(cost.gspline(&tau)?);
    }

    let tau_star = {
        let eval = |rho: &Array1<f64>| -> (f64, Array1<f64>) {
            let tau = softmax_lengths(exec_time, rho);
            match cost.value(&tau).and_then(|value| {
                let grad_tau = cost.gradient(&tau)?;
                Ok((value, grad_tau))
            }) {
                Ok((value, grad_tau)) => (value, chain_gradient(exec_time, &tau, &grad_tau)),
                Err(e) => {
                    // A recoverable line-search probe (e.g. a near-degenerate
                    // partition) should not abort the whole optimization.
                    warn!("interval-length objective evaluation failed: {e}");
                    (f64::INFINITY, Array1::zeros(rho.len()))
                }
            }
        };

        let mut solver = Bfgs::new(Array1::zeros(num_intervals), eval)
            .with_tolerance(options.tolerance)
            .with_max_iterations(options.max_iterations)
            .with_rng_seed(0x1010_u64);
        let solution = match solver.run() {
            Ok(sol) => sol,
            Err(wolfe_bfgs::BfgsError::LineSearchFailed { last_solution, .. }) => *last_solution,
            Err(wolfe_bfgs::BfgsError::MaxIterationsReached { last_solution }) => *last_solution,
            Err(e) => {
                return Err(OptimizationError::DriverFailed(format!("{e:?}")));
            }
        };
        debug!(
            "interval-length optimization: {} iterations, cost {:.6e}",
            solution.iterations, solution.final_value
        );
        softmax_lengths(exec_time, &solution.final_point)
    };

    Ok(cost.gspline(&tau_star)?)
}

/// Solve one of the canonical problems on the uniform-duration domain.
pub fn optimal_gspline(
    waypoints: &Array2<f64>,
    exec_time: f64,
    preset: Preset,
) -> Result<Gspline, OptimizationError> {
    let basis = Arc::new(preset.basis()?);
    optimal_sobolev_gspline(waypoints, basis, exec_time, preset.weights())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn softmax_partition_is_positive_and_sums_to_total() {
        let rho = array![0.3, -2.0, 1.7, 0.0];
        let tau = softmax_lengths(5.0, &rho);
        assert!(tau.iter().all(|&t| t > 0.0));
        assert_abs_diff_eq!(tau.sum(), 5.0, epsilon = 1e-12);
    }

    #[test]
    fn chained_gradient_matches_finite_differences() {
        // Quadratic test cost F(τ) = Σ cᵢ·τᵢ² with known gradient.
        let coeff = array![1.0, 2.5, 0.5];
        let exec_time = 2.0;
        let f = |rho: &Array1<f64>| -> f64 {
            let tau = softmax_lengths(exec_time, rho);
            coeff.iter().zip(tau.iter()).map(|(c, t)| c * t * t).sum()
        };

        let rho = array![0.2, -0.4, 0.1];
        let tau = softmax_lengths(exec_time, &rho);
        let grad_tau = Array1::from_shape_fn(3, |i| 2.0 * coeff[i] * tau[i]);
        let chained = chain_gradient(exec_time, &tau, &grad_tau);

        let h = 1e-7;
        for q in 0..3 {
            let mut plus = rho.clone();
            plus[q] += h;
            let mut minus = rho.clone();
            minus[q] -= h;
            let fd = (f(&plus) - f(&minus)) / (2.0 * h);
            assert_abs_diff_eq!(chained[q], fd, epsilon = 1e-6 * (1.0 + fd.abs()));
        }
    }

    #[test]
    fn exec_time_constraint_contract() {
        let constraint = ExecTimeConstraint::new(4, 2.0);
        assert_abs_diff_eq!(
            constraint.value(&array![0.5, 0.5, 0.5, 0.5]),
            0.0,
            epsilon = 1e-15
        );
        assert_abs_diff_eq!(
            constraint.value(&array![1.0, 0.5, 0.5, 0.5]),
            0.5,
            epsilon = 1e-15
        );
        assert_eq!(constraint.jacobian(), Array1::ones(4));
        for &b in constraint.lower_bounds().iter() {
            assert_abs_diff_eq!(b, 2e-6, epsilon = 1e-18);
        }
    }

    #[test]
    fn presets_follow_the_canonical_table() {
        let cases = [
            (Preset::BrokenLines, 2, 1),
            (Preset::MinimumAcceleration, 4, 2),
            (Preset::MinimumJerk, 6, 3),
            (Preset::MinimumSnap, 8, 4),
            (Preset::MinimumCrackle, 10, 5),
        ];
        for (preset, dim, order) in cases {
            assert_eq!(preset.basis_dim(), dim);
            let weights = preset.weights();
            assert_eq!(weights.len(), 1);
            assert_eq!(weights[0].order, order);
            assert_abs_diff_eq!(weights[0].weight, 1.0, epsilon = 0.0);
            assert_eq!(preset.basis().unwrap().dim(), dim);
        }
    }

    #[test]
    fn single_interval_needs_no_search() {
        let basis = Arc::new(Basis::legendre(6).unwrap());
        let waypoints = array![[0.0, 1.0], [2.0, -1.0]];
        let g = optimal_sobolev_gspline(
            &waypoints,
            basis,
            3.0,
            vec![DerivativeWeight::new(3, 1.0)],
        )
        .unwrap();
        assert_eq!(g.num_intervals(), 1);
        assert_abs_diff_eq!(g.exec_time(), 3.0, epsilon = 1e-12);
    }
}
