//! Weighted Sobolev seminorm of the interpolating gspline.
//!
//! For fixed waypoints, basis, and a weight set `{(kⱼ, wⱼ)}`, the cost as a
//! function of the interval lengths is
//!
//! `J(τ) = Σⱼ wⱼ·∫ ‖x^{(kⱼ)}(t)‖² dt = yᵀ·(Σⱼ wⱼ·Qⱼ(τ))·y`
//!
//! with `y = A(τ)⁻¹·r` the interpolator solution and `Qⱼ` block-diagonal
//! (one energy Gram block per interval per coordinate). Neither `Qⱼ` nor its
//! `τ`-derivative is ever materialized: the quadratic forms contract segment
//! by segment. The gradient combines the interpolator's coefficient
//! sensitivity with the local `∂Q/∂τ_p` term:
//!
//! `∂J/∂τ_p = 2·zᵀ·∂y/∂τ_p + yᵀ·(Σⱼ wⱼ·∂Qⱼ/∂τ_p)·y`, `z = Σⱼ wⱼ·Qⱼ·y`.

use std::sync::Arc;

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::basis::{Basis, BasisError};
use crate::gspline::Gspline;
use crate::interpolator::{InterpolationError, Interpolator};

/// One term of the Sobolev cost: `weight · ‖x^{(order)}‖²_{L²}`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DerivativeWeight {
    pub order: usize,
    pub weight: f64,
}

impl DerivativeWeight {
    pub fn new(order: usize, weight: f64) -> Self {
        Self { order, weight }
    }
}

#[derive(Debug, Error)]
pub enum SobolevError {
    #[error("weight set must contain at least one term")]
    EmptyWeights,

    #[error("invalid weight (order {order}, weight {weight}): orders must be >= 1 and weights > 0")]
    InvalidWeight { order: usize, weight: f64 },

    #[error(transparent)]
    Interpolation(#[from] InterpolationError),

    #[error(transparent)]
    Basis(#[from] BasisError),
}

/// The Sobolev cost of the gspline implicitly defined by `(waypoints, τ)`.
///
/// Owns its interpolator exclusively; the basis is shared read-only.
pub struct SobolevNorm {
    interpolator: Interpolator,
    waypoints: Array2<f64>,
    weights: Vec<DerivativeWeight>,
}

impl SobolevNorm {
    pub fn new(
        waypoints: Array2<f64>,
        basis: Arc<Basis>,
        weights: Vec<DerivativeWeight>,
    ) -> Result<Self, SobolevError> {
        if weights.is_empty() {
            return Err(SobolevError::EmptyWeights);
        }
        for w in &weights {
            if w.order < 1 || !(w.weight > 0.0) || !w.weight.is_finite() {
                return Err(SobolevError::InvalidWeight {
                    order: w.order,
                    weight: w.weight,
                });
            }
        }
        let num_intervals = waypoints.nrows().saturating_sub(1);
        let codom_dim = waypoints.ncols();
        let interpolator = Interpolator::new(basis, codom_dim, num_intervals)?;
        Ok(Self {
            interpolator,
            waypoints,
            weights,
        })
    }

    pub fn num_intervals(&self) -> usize {
        self.interpolator.num_intervals()
    }

    pub fn waypoints(&self) -> &Array2<f64> {
        &self.waypoints
    }

    pub fn weights(&self) -> &[DerivativeWeight] {
        &self.weights
    }

    /// The interpolating gspline at these interval lengths.
    pub fn gspline(&mut self, tau: &Array1<f64>) -> Result<Gspline, SobolevError> {
        Ok(self.interpolator.interpolate(&self.waypoints, tau)?)
    }

    /// `J(τ)`.
    pub fn value(&mut self, tau: &Array1<f64>) -> Result<f64, SobolevError> {
        let y = self.interpolator.solve(&self.waypoints, tau)?;
        let z = self.weighted_gram_apply(tau, &y)?;
        Ok(y.dot(&z))
    }

    /// `∇_τ J(τ)`.
    pub fn gradient(&mut self, tau: &Array1<f64>) -> Result<Array1<f64>, SobolevError> {
        let y = self.interpolator.solve(&self.waypoints, tau)?;
        let z = self.weighted_gram_apply(tau, &y)?;

        let n = self.num_intervals();
        let basis = self.interpolator.basis().clone();
        let d = basis.dim();
        let c = self.interpolator.codom_dim();

        let mut grad = Array1::zeros(n);
        let mut dblock = Array2::zeros((d, d));
        for p in 0..n {
            let dy = self.interpolator.solve_derivative_wrt_tau(p)?;
            let mut component = 2.0 * z.dot(&dy);

            // Local term: ∂Q/∂τ_p only touches the p-th diagonal block.
            dblock.fill(0.0);
            for w in &self.weights {
                let mut term = Array2::zeros((d, d));
                basis.add_block_derivative_wrt_tau(tau[p], w.order, &mut term)?;
                dblock.scaled_add(w.weight, &term);
            }
            for coord in 0..c {
                let offset = (p * c + coord) * d;
                for row in 0..d {
                    let yr = y[offset + row];
                    for col in 0..d {
                        component += yr * dblock[[row, col]] * y[offset + col];
                    }
                }
            }
            grad[p] = component;
        }
        Ok(grad)
    }

    /// `z = (Σⱼ wⱼ·Qⱼ(τ))·y`, contracted block by block.
    fn weighted_gram_apply(
        &mut self,
        tau: &Array1<f64>,
        y: &Array1<f64>,
    ) -> Result<Array1<f64>, SobolevError> {
        let basis = self.interpolator.basis().clone();
        let d = basis.dim();
        let c = self.interpolator.codom_dim();
        let n = self.num_intervals();

        let mut z = Array1::zeros(y.len());
        let mut block = Array2::zeros((d, d));
        for interval in 0..n {
            block.fill(0.0);
            for w in &self.weights {
                let mut term = Array2::zeros((d, d));
                basis.add_block_derivative(tau[interval], w.order, &mut term)?;
                block.scaled_add(w.weight, &term);
            }
            for coord in 0..c {
                let offset = (interval * c + coord) * d;
                for row in 0..d {
                    let mut acc = 0.0;
                    for col in 0..d {
                        acc += block[[row, col]] * y[offset + col];
                    }
                    z[offset + row] = acc;
                }
            }
        }
        Ok(z)
    }
}
