//! Waypoint interpolation as a square sparse block linear system.
//!
//! For a basis of even dimension `d`, `N` intervals, and codomain dimension
//! `c`, the `N·c·d` coefficients are pinned by exactly `N·c·d` rows:
//!
//! - `2·N·c` interpolation rows (each interval hits its waypoint at both
//!   window endpoints),
//! - `c·(d−2)` natural boundary rows (derivative orders `1 … d/2 − 1` vanish
//!   at the two outer endpoints),
//! - `(N−1)·c·(d−2)` continuity rows (derivative orders `1 … d−2` agree
//!   across every internal joint).
//!
//! The matrix depends on the interval lengths `τ` only through the
//! derivative scalings, so the factorization is cached keyed on `τ` and
//! reused verbatim by repeated solves. The derivative of the solution with
//! respect to one interval length never re-assembles the full system: only
//! the rows touching that interval have nonzero `∂A/∂τ_p`, and the cached
//! factorization back-solves `A·∂y/∂τ_p = −(∂A/∂τ_p)·y`.

use std::sync::Arc;

use faer::sparse::{SparseColMat, Triplet};
use log::debug;
use ndarray::{Array1, Array2};
use thiserror::Error;

use crate::basis::{Basis, BasisError, WindowFunctions};
use crate::gspline::{Gspline, GsplineError};
use crate::linalg::{LinalgError, SparseLuFactor, max_abs_residual, sparse_from_triplets};

/// Solutions whose residual exceeds this (scaled by the data magnitude) are
/// reported as singular rather than returned.
const RESIDUAL_TOL: f64 = 1e-8;

#[derive(Debug, Error)]
pub enum InterpolationError {
    #[error("waypoint matrix is {found_rows}x{found_cols}, expected {expected_rows}x{expected_cols}")]
    WaypointShapeMismatch {
        expected_rows: usize,
        expected_cols: usize,
        found_rows: usize,
        found_cols: usize,
    },

    #[error("interval-length vector has length {found}, expected {expected}")]
    IntervalCountMismatch { expected: usize, found: usize },

    #[error("interval length at index {index} is {value}; lengths must be positive")]
    NonPositiveIntervalLength { index: usize, value: f64 },

    #[error("interpolation matrix is singular to working tolerance ({detail})")]
    SingularSystem { detail: String },

    #[error("interval index {index} is out of range for {count} intervals")]
    IntervalIndexOutOfRange { index: usize, count: usize },

    #[error("coefficient sensitivity requires a prior solve with the same interval lengths")]
    MissingSolve,

    #[error(transparent)]
    Basis(#[from] BasisError),

    #[error(transparent)]
    Gspline(#[from] GsplineError),

    #[error(transparent)]
    Linalg(#[from] LinalgError),
}

/// Row/column bookkeeping of the square system.
#[derive(Clone, Copy, Debug)]
pub(crate) struct SystemShape {
    pub num_intervals: usize,
    pub codom_dim: usize,
    pub dim: usize,
}

impl SystemShape {
    pub fn size(&self) -> usize {
        self.num_intervals * self.codom_dim * self.dim
    }

    /// Highest boundary derivative order (`d/2 − 1`).
    pub fn boundary_orders(&self) -> usize {
        self.dim / 2 - 1
    }

    /// Highest interior continuity order (`d − 2`).
    pub fn continuity_orders(&self) -> usize {
        self.dim - 2
    }

    pub fn row_interp_left(&self, interval: usize, coord: usize) -> usize {
        2 * (interval * self.codom_dim + coord)
    }

    pub fn row_interp_right(&self, interval: usize, coord: usize) -> usize {
        self.row_interp_left(interval, coord) + 1
    }

    fn boundary_base(&self) -> usize {
        2 * self.num_intervals * self.codom_dim
    }

    /// Natural condition of order `deriv` at the domain start.
    pub fn row_boundary_start(&self, deriv: usize, coord: usize) -> usize {
        self.boundary_base() + (deriv - 1) * self.codom_dim + coord
    }

    /// Natural condition of order `deriv` at the domain end.
    pub fn row_boundary_end(&self, deriv: usize, coord: usize) -> usize {
        self.boundary_base() + (self.boundary_orders() + deriv - 1) * self.codom_dim + coord
    }

    fn continuity_base(&self) -> usize {
        self.boundary_base() + 2 * self.boundary_orders() * self.codom_dim
    }

    /// Continuity of order `deriv` at joint `joint ∈ [1, N)`.
    pub fn row_continuity(&self, joint: usize, deriv: usize, coord: usize) -> usize {
        self.continuity_base()
            + ((joint - 1) * self.continuity_orders() + (deriv - 1)) * self.codom_dim
            + coord
    }

    pub fn col(&self, interval: usize, coord: usize, basis_index: usize) -> usize {
        (interval * self.codom_dim + coord) * self.dim + basis_index
    }
}

/// Exact nonzero count of the assembled matrix, used to reserve triplet
/// storage up front.
fn nonzero_count(shape: &SystemShape) -> usize {
    let SystemShape {
        num_intervals: n,
        codom_dim: c,
        dim: d,
    } = *shape;
    2 * n * c * d + 2 * shape.boundary_orders() * c * d
        + (n - 1) * shape.continuity_orders() * c * 2 * d
}

pub(crate) fn assemble_matrix(
    window: &dyn WindowFunctions,
    shape: &SystemShape,
    tau: &Array1<f64>,
) -> Result<SparseColMat<usize, f64>, InterpolationError> {
    let d = shape.dim;
    let n = shape.num_intervals;
    let size = shape.size();
    let mut triplets = Vec::with_capacity(nonzero_count(shape));
    let mut buf = vec![0.0; d];

    // Interpolation rows: each interval pinned at both window endpoints.
    for interval in 0..n {
        for (s, right) in [(-1.0, false), (1.0, true)] {
            window.eval_window_into(s, tau[interval], &mut buf);
            for coord in 0..shape.codom_dim {
                let row = if right {
                    shape.row_interp_right(interval, coord)
                } else {
                    shape.row_interp_left(interval, coord)
                };
                for b in 0..d {
                    if buf[b] != 0.0 {
                        triplets.push(Triplet::new(row, shape.col(interval, coord, b), buf[b]));
                    }
                }
            }
        }
    }

    // Natural boundary rows at the two outer endpoints.
    for deriv in 1..=shape.boundary_orders() {
        window.eval_window_deriv_into(-1.0, tau[0], deriv, &mut buf)?;
        for coord in 0..shape.codom_dim {
            let row = shape.row_boundary_start(deriv, coord);
            for b in 0..d {
                if buf[b] != 0.0 {
                    triplets.push(Triplet::new(row, shape.col(0, coord, b), buf[b]));
                }
            }
        }
        window.eval_window_deriv_into(1.0, tau[n - 1], deriv, &mut buf)?;
        for coord in 0..shape.codom_dim {
            let row = shape.row_boundary_end(deriv, coord);
            for b in 0..d {
                if buf[b] != 0.0 {
                    triplets.push(Triplet::new(row, shape.col(n - 1, coord, b), buf[b]));
                }
            }
        }
    }

    // Interior continuity rows.
    let mut right_buf = vec![0.0; d];
    for joint in 1..n {
        for deriv in 1..=shape.continuity_orders() {
            window.eval_window_deriv_into(1.0, tau[joint - 1], deriv, &mut buf)?;
            window.eval_window_deriv_into(-1.0, tau[joint], deriv, &mut right_buf)?;
            for coord in 0..shape.codom_dim {
                let row = shape.row_continuity(joint, deriv, coord);
                for b in 0..d {
                    if buf[b] != 0.0 {
                        triplets.push(Triplet::new(row, shape.col(joint - 1, coord, b), buf[b]));
                    }
                    if right_buf[b] != 0.0 {
                        triplets.push(Triplet::new(
                            row,
                            shape.col(joint, coord, b),
                            -right_buf[b],
                        ));
                    }
                }
            }
        }
    }

    Ok(sparse_from_triplets(size, size, &triplets)?)
}

pub(crate) fn assemble_rhs(shape: &SystemShape, waypoints: &Array2<f64>) -> Array1<f64> {
    let mut rhs = Array1::zeros(shape.size());
    for interval in 0..shape.num_intervals {
        for coord in 0..shape.codom_dim {
            rhs[shape.row_interp_left(interval, coord)] = waypoints[[interval, coord]];
            rhs[shape.row_interp_right(interval, coord)] = waypoints[[interval + 1, coord]];
        }
    }
    rhs
}

struct CachedSystem {
    tau: Array1<f64>,
    matrix: SparseColMat<usize, f64>,
    factor: SparseLuFactor,
    solution: Option<Array1<f64>>,
}

/// Builds, factorizes, and solves the interpolation system for one
/// `(basis, codomain, interval-count)` configuration. Waypoints and interval
/// lengths vary per call; the factorization is reused while `τ` is
/// unchanged.
pub struct Interpolator {
    basis: Arc<Basis>,
    shape: SystemShape,
    cached: Option<CachedSystem>,
    factorizations: usize,
}

impl Interpolator {
    pub fn new(
        basis: Arc<Basis>,
        codom_dim: usize,
        num_intervals: usize,
    ) -> Result<Self, InterpolationError> {
        if codom_dim == 0 {
            return Err(BasisError::EmptyCodomain.into());
        }
        if num_intervals == 0 {
            return Err(InterpolationError::IntervalCountMismatch {
                expected: 1,
                found: 0,
            });
        }
        let shape = SystemShape {
            num_intervals,
            codom_dim,
            dim: basis.dim(),
        };
        // Row accounting closes exactly for every even basis dimension; a
        // mismatch here is a counting bug, not a user error.
        let rows = 2 * num_intervals * codom_dim
            + 2 * shape.boundary_orders() * codom_dim
            + (num_intervals - 1) * shape.continuity_orders() * codom_dim;
        assert_eq!(rows, shape.size(), "interpolation system must be square");
        Ok(Self {
            basis,
            shape,
            cached: None,
            factorizations: 0,
        })
    }

    pub fn basis(&self) -> &Arc<Basis> {
        &self.basis
    }

    pub fn num_intervals(&self) -> usize {
        self.shape.num_intervals
    }

    pub fn codom_dim(&self) -> usize {
        self.shape.codom_dim
    }

    /// Number of unknowns `N·c·d`.
    pub fn problem_size(&self) -> usize {
        self.shape.size()
    }

    /// How many times a sparse factorization has been computed; repeated
    /// solves with unchanged `τ` do not increment this.
    pub fn num_factorizations(&self) -> usize {
        self.factorizations
    }

    fn validate_tau(&self, tau: &Array1<f64>) -> Result<(), InterpolationError> {
        if tau.len() != self.shape.num_intervals {
            return Err(InterpolationError::IntervalCountMismatch {
                expected: self.shape.num_intervals,
                found: tau.len(),
            });
        }
        for (index, &value) in tau.iter().enumerate() {
            if !(value > 0.0) || !value.is_finite() {
                return Err(InterpolationError::NonPositiveIntervalLength { index, value });
            }
        }
        Ok(())
    }

    fn validate_waypoints(&self, waypoints: &Array2<f64>) -> Result<(), InterpolationError> {
        let expected_rows = self.shape.num_intervals + 1;
        let expected_cols = self.shape.codom_dim;
        if waypoints.nrows() != expected_rows || waypoints.ncols() != expected_cols {
            return Err(InterpolationError::WaypointShapeMismatch {
                expected_rows,
                expected_cols,
                found_rows: waypoints.nrows(),
                found_cols: waypoints.ncols(),
            });
        }
        Ok(())
    }

    fn ensure_factorized(&mut self, tau: &Array1<f64>) -> Result<(), InterpolationError> {
        if let Some(cached) = &self.cached
            && cached.tau == *tau
        {
            return Ok(());
        }
        let matrix = assemble_matrix(self.basis.window(), &self.shape, tau)?;
        let factor = SparseLuFactor::new(&matrix).map_err(|e| match e {
            LinalgError::FactorizationFailed => InterpolationError::SingularSystem {
                detail: "sparse LU factorization failed".to_string(),
            },
            other => other.into(),
        })?;
        self.factorizations += 1;
        debug!(
            "interpolator: refactorized {}x{} system (count {})",
            self.shape.size(),
            self.shape.size(),
            self.factorizations
        );
        self.cached = Some(CachedSystem {
            tau: tau.clone(),
            matrix,
            factor,
            solution: None,
        });
        Ok(())
    }

    /// Solve for the coefficient vector interpolating `waypoints` with the
    /// given interval lengths.
    pub fn solve(
        &mut self,
        waypoints: &Array2<f64>,
        tau: &Array1<f64>,
    ) -> Result<Array1<f64>, InterpolationError> {
        self.validate_waypoints(waypoints)?;
        self.validate_tau(tau)?;
        self.ensure_factorized(tau)?;

        let rhs = assemble_rhs(&self.shape, waypoints);
        let cached = self.cached.as_mut().expect("factorization just ensured");
        let y = cached.factor.solve(&rhs);

        if !y.iter().all(|v| v.is_finite()) {
            return Err(InterpolationError::SingularSystem {
                detail: "solution contains non-finite entries".to_string(),
            });
        }
        let scale = 1.0 + y.iter().fold(0.0f64, |m, v| m.max(v.abs()));
        let residual = max_abs_residual(&cached.matrix, &y, &rhs);
        if residual > RESIDUAL_TOL * scale {
            return Err(InterpolationError::SingularSystem {
                detail: format!("residual {residual:.3e} exceeds tolerance"),
            });
        }

        cached.solution = Some(y.clone());
        Ok(y)
    }

    /// Solve and wrap the coefficients into a gspline on `[0, Στ]`.
    pub fn interpolate(
        &mut self,
        waypoints: &Array2<f64>,
        tau: &Array1<f64>,
    ) -> Result<Gspline, InterpolationError> {
        let y = self.solve(waypoints, tau)?;
        Ok(Gspline::new(
            self.basis.clone(),
            self.shape.codom_dim,
            tau.clone(),
            y,
        )?)
    }

    /// `∂y/∂τ_p` for the most recent solve.
    ///
    /// From `A(τ)·y = r` with `r` independent of `τ`:
    /// `A·∂y/∂τ_p = −(∂A/∂τ_p)·y`, and `∂A/∂τ_p` only has entries in the
    /// rows that evaluate the basis on interval `p`.
    pub fn solve_derivative_wrt_tau(
        &mut self,
        interval: usize,
    ) -> Result<Array1<f64>, InterpolationError> {
        let n = self.shape.num_intervals;
        if interval >= n {
            return Err(InterpolationError::IntervalIndexOutOfRange {
                index: interval,
                count: n,
            });
        }
        let shape = self.shape;
        let window = self.basis.window();
        let cached = self.cached.as_ref().ok_or(InterpolationError::MissingSolve)?;
        let y = cached
            .solution
            .as_ref()
            .ok_or(InterpolationError::MissingSolve)?;
        let tau_p = cached.tau[interval];

        let d = shape.dim;
        let mut v = Array1::<f64>::zeros(shape.size());
        let mut buf = vec![0.0; d];

        let segment_dot = |buf: &[f64], y: &Array1<f64>, coord: usize| -> f64 {
            let mut acc = 0.0;
            for b in 0..d {
                acc += buf[b] * y[shape.col(interval, coord, b)];
            }
            acc
        };

        // Interpolation rows of interval p (nonzero only for τ-coupled
        // window families).
        for (s, right) in [(-1.0, false), (1.0, true)] {
            window.eval_window_deriv_wrt_tau_into(s, tau_p, 0, &mut buf)?;
            if buf.iter().any(|&x| x != 0.0) {
                for coord in 0..shape.codom_dim {
                    let row = if right {
                        shape.row_interp_right(interval, coord)
                    } else {
                        shape.row_interp_left(interval, coord)
                    };
                    v[row] += segment_dot(&buf, y, coord);
                }
            }
        }

        // Boundary rows when p is the first or last interval.
        if interval == 0 {
            for deriv in 1..=shape.boundary_orders() {
                window.eval_window_deriv_wrt_tau_into(-1.0, tau_p, deriv, &mut buf)?;
                for coord in 0..shape.codom_dim {
                    v[shape.row_boundary_start(deriv, coord)] += segment_dot(&buf, y, coord);
                }
            }
        }
        if interval == n - 1 {
            for deriv in 1..=shape.boundary_orders() {
                window.eval_window_deriv_wrt_tau_into(1.0, tau_p, deriv, &mut buf)?;
                for coord in 0..shape.codom_dim {
                    v[shape.row_boundary_end(deriv, coord)] += segment_dot(&buf, y, coord);
                }
            }
        }

        // Joint at the left end of interval p: p is the right piece there.
        if interval >= 1 {
            for deriv in 1..=shape.continuity_orders() {
                window.eval_window_deriv_wrt_tau_into(-1.0, tau_p, deriv, &mut buf)?;
                for coord in 0..shape.codom_dim {
                    v[shape.row_continuity(interval, deriv, coord)] -=
                        segment_dot(&buf, y, coord);
                }
            }
        }
        // Joint at the right end of interval p: p is the left piece there.
        if interval + 1 < n {
            for deriv in 1..=shape.continuity_orders() {
                window.eval_window_deriv_wrt_tau_into(1.0, tau_p, deriv, &mut buf)?;
                for coord in 0..shape.codom_dim {
                    v[shape.row_continuity(interval + 1, deriv, coord)] +=
                        segment_dot(&buf, y, coord);
                }
            }
        }

        let neg_v = v.mapv(|x| -x);
        Ok(cached.factor.solve(&neg_v))
    }
}
