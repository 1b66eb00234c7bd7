//! Piecewise vector-valued functions backed by basis coefficients.
//!
//! A [`Gspline`] stores one coefficient segment of length `d` per
//! `(interval, coordinate)` pair, flattened with the `(interval, coord,
//! basis-index)` major-to-minor stride. Evaluation locates the interval by
//! binary search on the breakpoints, maps the query to the canonical window
//! coordinate, and contracts the segment against the basis values.

use std::sync::Arc;

use ndarray::{Array1, Array2};
use thiserror::Error;

use crate::basis::{Basis, BasisError};

/// Relative tolerance for clamping queries that sit just outside the domain.
const DOMAIN_TOL: f64 = 1e-9;

#[derive(Debug, Error)]
pub enum GsplineError {
    #[error("coefficient vector has length {found}, expected {expected} (N·c·d)")]
    CoefficientSizeMismatch { expected: usize, found: usize },

    #[error("codomain dimension must be at least 1")]
    EmptyCodomain,

    #[error("a gspline needs at least one interval")]
    NoIntervals,

    #[error("interval length at index {index} is {value}; lengths must be positive")]
    NonPositiveIntervalLength { index: usize, value: f64 },

    #[error("query point {t} is outside the domain [{start}, {end}]")]
    OutOfDomain { t: f64, start: f64, end: f64 },

    #[error(transparent)]
    Basis(#[from] BasisError),
}

/// A piecewise function on `[0, Στ]` with an independent basis-coefficient
/// segment per interval. Immutable after construction; derived gsplines own
/// fresh coefficient buffers.
pub struct Gspline {
    basis: Arc<Basis>,
    codom_dim: usize,
    num_intervals: usize,
    interval_lengths: Array1<f64>,
    breakpoints: Array1<f64>,
    coefficients: Array1<f64>,
}

impl Gspline {
    pub fn new(
        basis: Arc<Basis>,
        codom_dim: usize,
        interval_lengths: Array1<f64>,
        coefficients: Array1<f64>,
    ) -> Result<Self, GsplineError> {
        if codom_dim == 0 {
            return Err(GsplineError::EmptyCodomain);
        }
        let num_intervals = interval_lengths.len();
        if num_intervals == 0 {
            return Err(GsplineError::NoIntervals);
        }
        for (index, &value) in interval_lengths.iter().enumerate() {
            if !(value > 0.0) || !value.is_finite() {
                return Err(GsplineError::NonPositiveIntervalLength { index, value });
            }
        }
        let expected = num_intervals * codom_dim * basis.dim();
        if coefficients.len() != expected {
            return Err(GsplineError::CoefficientSizeMismatch {
                expected,
                found: coefficients.len(),
            });
        }

        let mut breakpoints = Array1::zeros(num_intervals + 1);
        for i in 0..num_intervals {
            breakpoints[i + 1] = breakpoints[i] + interval_lengths[i];
        }

        Ok(Self {
            basis,
            codom_dim,
            num_intervals,
            interval_lengths,
            breakpoints,
            coefficients,
        })
    }

    pub fn basis(&self) -> &Arc<Basis> {
        &self.basis
    }

    pub fn codom_dim(&self) -> usize {
        self.codom_dim
    }

    pub fn num_intervals(&self) -> usize {
        self.num_intervals
    }

    pub fn interval_lengths(&self) -> &Array1<f64> {
        &self.interval_lengths
    }

    pub fn breakpoints(&self) -> &Array1<f64> {
        &self.breakpoints
    }

    pub fn coefficients(&self) -> &Array1<f64> {
        &self.coefficients
    }

    /// Total duration `t_f − t₀`.
    pub fn exec_time(&self) -> f64 {
        self.breakpoints[self.num_intervals]
    }

    /// Evaluate at every query time; one row per query, one column per
    /// codomain coordinate.
    pub fn value(&self, times: &Array1<f64>) -> Result<Array2<f64>, GsplineError> {
        let mut out = Array2::zeros((times.len(), self.codom_dim));
        let mut window = vec![0.0; self.basis.dim()];
        for (row, &t) in times.iter().enumerate() {
            self.eval_single(t, &mut window, |coord, v| out[[row, coord]] = v)?;
        }
        Ok(out)
    }

    /// Evaluate at a single query time.
    pub fn value_at(&self, t: f64) -> Result<Array1<f64>, GsplineError> {
        let mut out = Array1::zeros(self.codom_dim);
        let mut window = vec![0.0; self.basis.dim()];
        self.eval_single(t, &mut window, |coord, v| out[coord] = v)?;
        Ok(out)
    }

    /// The `order`-th derivative as a new gspline over the same breakpoints.
    pub fn derivate(&self, order: usize) -> Result<Gspline, GsplineError> {
        let d = self.basis.dim();
        let mut derived = Array1::zeros(self.coefficients.len());
        for interval in 0..self.num_intervals {
            let block = self
                .basis
                .derivative_matrix_on_interval(self.interval_lengths[interval], order)?;
            for coord in 0..self.codom_dim {
                let offset = (interval * self.codom_dim + coord) * d;
                for row in 0..d {
                    let mut acc = 0.0;
                    for col in 0..d {
                        acc += block[[row, col]] * self.coefficients[offset + col];
                    }
                    derived[offset + row] = acc;
                }
            }
        }
        Ok(Gspline {
            basis: self.basis.clone(),
            codom_dim: self.codom_dim,
            num_intervals: self.num_intervals,
            interval_lengths: self.interval_lengths.clone(),
            breakpoints: self.breakpoints.clone(),
            coefficients: derived,
        })
    }

    /// Locate the interval for `t`, clamping queries within tolerance of the
    /// domain ends. At an exact internal breakpoint the right interval wins.
    fn locate(&self, t: f64) -> Result<(usize, f64), GsplineError> {
        let start = self.breakpoints[0];
        let end = self.exec_time();
        let tol = DOMAIN_TOL * (end - start);
        if t < start - tol || t > end + tol {
            return Err(GsplineError::OutOfDomain { t, start, end });
        }
        let t = t.clamp(start, end);

        // partition_point gives the first breakpoint strictly greater than t,
        // so exact hits on b_i select the interval to the right.
        let slice = self
            .breakpoints
            .as_slice()
            .expect("breakpoints are contiguous");
        let idx = slice.partition_point(|&b| b <= t);
        let interval = idx.saturating_sub(1).min(self.num_intervals - 1);

        let tau = self.interval_lengths[interval];
        let s = 2.0 * (t - self.breakpoints[interval]) / tau - 1.0;
        Ok((interval, s.clamp(-1.0, 1.0)))
    }

    fn eval_single(
        &self,
        t: f64,
        window: &mut [f64],
        mut sink: impl FnMut(usize, f64),
    ) -> Result<(), GsplineError> {
        let (interval, s) = self.locate(t)?;
        let d = self.basis.dim();
        self.basis
            .eval_window(s, self.interval_lengths[interval], window)?;
        for coord in 0..self.codom_dim {
            let offset = (interval * self.codom_dim + coord) * d;
            let mut acc = 0.0;
            for b in 0..d {
                acc += self.coefficients[offset + b] * window[b];
            }
            sink(coord, acc);
        }
        Ok(())
    }
}

impl std::fmt::Debug for Gspline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gspline")
            .field("basis", &self.basis.name())
            .field("codom_dim", &self.codom_dim)
            .field("num_intervals", &self.num_intervals)
            .field("exec_time", &self.exec_time())
            .finish()
    }
}
