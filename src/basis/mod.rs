//! Function bases on the canonical window `[-1, 1]`.
//!
//! A gspline piece is a linear combination of `d` window functions evaluated
//! at the normalized coordinate `s = 2(t − bᵢ)/τᵢ − 1`. This module provides
//! the three basis families (`Legendre`, `LagrangeGll`, `Tenten`), their
//! analytic derivative operators, the per-interval energy Gram blocks used by
//! the Sobolev cost, and the assembly of the spline-wide sparse operators:
//! the block-diagonal derivative operator and the continuity-constraint
//! operator.
//!
//! Canonical matrices (coefficient-space derivative powers and Gram
//! matrices) are memoized per basis instance behind reader/writer locks, so
//! a basis can be shared read-only between interpolators and cost functions.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use faer::sparse::{SparseColMat, Triplet};
use ndarray::{Array1, Array2};
use thiserror::Error;

use crate::linalg::{LinalgError, sparse_from_triplets};

mod lagrange_gll;
mod legendre;
mod tenten;

pub use lagrange_gll::LagrangeGllBasis;
pub use legendre::LegendreBasis;
pub use tenten::TentenBasis;

/// Errors surfaced by basis construction, evaluation, and assembly.
#[derive(Debug, Error)]
pub enum BasisError {
    #[error("basis dimension must be an even integer >= 2, got {0}")]
    InvalidDimension(usize),

    #[error("basis parameter `{name}` must lie strictly in {range}, got {value}")]
    InvalidParameter {
        name: &'static str,
        range: &'static str,
        value: f64,
    },

    #[error("basis `{basis}` does not implement derivative order {order} analytically")]
    UnsupportedDerivative { basis: &'static str, order: usize },

    #[error("output buffer has length {found} but the basis dimension is {expected}")]
    BufferSizeMismatch { expected: usize, found: usize },

    #[error("block matrix is {found_rows}x{found_cols}, expected {expected}x{expected}")]
    BlockShapeMismatch {
        expected: usize,
        found_rows: usize,
        found_cols: usize,
    },

    #[error("interval-length vector has length {found}, expected {expected}")]
    IntervalCountMismatch { expected: usize, found: usize },

    #[error("interval length at index {index} is {value}; lengths must be positive")]
    NonPositiveIntervalLength { index: usize, value: f64 },

    #[error("codomain dimension must be at least 1")]
    EmptyCodomain,

    #[error(transparent)]
    Linalg(#[from] LinalgError),
}

/// The per-family operations behind the [`Basis`] façade.
///
/// Dynamic dispatch happens only at the assembly entry points below; the hot
/// evaluation loops inside each family are monomorphic.
pub(crate) trait WindowFunctions: Send + Sync {
    fn dim(&self) -> usize;

    fn name(&self) -> &'static str;

    /// Basis values at canonical `s` for a piece of length `tau`.
    fn eval_window_into(&self, s: f64, tau: f64, out: &mut [f64]);

    /// Values of the `order`-th derivative **in `t`** of the window
    /// functions, including every chain-rule factor of the `s → t` map.
    fn eval_window_deriv_into(
        &self,
        s: f64,
        tau: f64,
        order: usize,
        out: &mut [f64],
    ) -> Result<(), BasisError>;

    /// `∂/∂τ` of [`eval_window_deriv_into`](Self::eval_window_deriv_into).
    fn eval_window_deriv_wrt_tau_into(
        &self,
        s: f64,
        tau: f64,
        order: usize,
        out: &mut [f64],
    ) -> Result<(), BasisError>;

    /// Canonical-coordinate coefficient-space derivative operator `D_k`
    /// (no interval scaling).
    fn derivative_matrix(&self, order: usize) -> Result<Arc<Array2<f64>>, BasisError>;

    /// The `d × d` coefficient-space block of the `order`-th t-derivative on
    /// an interval of length `tau` (interval scaling included).
    fn derivative_matrix_on_interval(
        &self,
        tau: f64,
        order: usize,
    ) -> Result<Array2<f64>, BasisError>;

    /// Accumulate into `block` the energy Gram
    /// `∫_piece B^{(k)}(t)·B^{(k)}(t)ᵀ dt` for a piece of length `tau`.
    fn add_block_derivative(
        &self,
        tau: f64,
        order: usize,
        block: &mut Array2<f64>,
    ) -> Result<(), BasisError>;

    /// Accumulate `∂/∂τ` of the energy Gram block.
    fn add_block_derivative_wrt_tau(
        &self,
        tau: f64,
        order: usize,
        block: &mut Array2<f64>,
    ) -> Result<(), BasisError>;
}

/// A finite-dimensional function space on the canonical window.
///
/// Shared read-only (typically behind an [`Arc`]) by gsplines,
/// interpolators, and Sobolev costs; interior caches make repeated
/// derivative-operator queries cheap.
pub enum Basis {
    Legendre(LegendreBasis),
    LagrangeGll(LagrangeGllBasis),
    Tenten(TentenBasis),
}

impl Basis {
    /// Shifted-Legendre polynomials on `[-1, 1]`; the default family.
    pub fn legendre(dim: usize) -> Result<Self, BasisError> {
        Ok(Self::Legendre(LegendreBasis::new(dim)?))
    }

    /// Lagrange cardinals at the Gauss–Lobatto–Legendre nodes of degree
    /// `dim − 1`.
    pub fn lagrange_gll(dim: usize) -> Result<Self, BasisError> {
        Ok(Self::LagrangeGll(LagrangeGllBasis::new(dim)?))
    }

    /// The 6-dimensional exponential-trigonometric "1010" family with
    /// frequency parameter `alpha ∈ (0, 1)`.
    pub fn tenten(alpha: f64) -> Result<Self, BasisError> {
        Ok(Self::Tenten(TentenBasis::new(alpha)?))
    }

    pub(crate) fn window(&self) -> &dyn WindowFunctions {
        match self {
            Self::Legendre(b) => b,
            Self::LagrangeGll(b) => b,
            Self::Tenten(b) => b,
        }
    }

    pub fn dim(&self) -> usize {
        self.window().dim()
    }

    pub fn name(&self) -> &'static str {
        self.window().name()
    }

    /// Basis values at canonical `s ∈ [-1, 1]` for a piece of length `tau`.
    pub fn eval_window(&self, s: f64, tau: f64, out: &mut [f64]) -> Result<(), BasisError> {
        self.check_buffer(out.len())?;
        self.window().eval_window_into(s, tau, out);
        Ok(())
    }

    /// `order`-th derivative in `t` of the window functions at `s`.
    pub fn eval_window_deriv(
        &self,
        s: f64,
        tau: f64,
        order: usize,
        out: &mut [f64],
    ) -> Result<(), BasisError> {
        self.check_buffer(out.len())?;
        self.window().eval_window_deriv_into(s, tau, order, out)
    }

    /// `∂/∂τ` of the `order`-th t-derivative of the window functions.
    pub fn eval_window_deriv_wrt_tau(
        &self,
        s: f64,
        tau: f64,
        order: usize,
        out: &mut [f64],
    ) -> Result<(), BasisError> {
        self.check_buffer(out.len())?;
        self.window()
            .eval_window_deriv_wrt_tau_into(s, tau, order, out)
    }

    /// Canonical coefficient-space derivative operator (memoized).
    pub fn derivative_matrix(&self, order: usize) -> Result<Arc<Array2<f64>>, BasisError> {
        self.window().derivative_matrix(order)
    }

    /// The scaled `d × d` derivative block for one interval.
    pub fn derivative_matrix_on_interval(
        &self,
        tau: f64,
        order: usize,
    ) -> Result<Array2<f64>, BasisError> {
        self.window().derivative_matrix_on_interval(tau, order)
    }

    /// Accumulate the per-interval energy Gram block into `block`.
    pub fn add_block_derivative(
        &self,
        tau: f64,
        order: usize,
        block: &mut Array2<f64>,
    ) -> Result<(), BasisError> {
        self.check_block(block)?;
        self.window().add_block_derivative(tau, order, block)
    }

    /// Accumulate the `τ`-derivative of the energy Gram block into `block`.
    pub fn add_block_derivative_wrt_tau(
        &self,
        tau: f64,
        order: usize,
        block: &mut Array2<f64>,
    ) -> Result<(), BasisError> {
        self.check_block(block)?;
        self.window()
            .add_block_derivative_wrt_tau(tau, order, block)
    }

    /// Sparse block-diagonal operator mapping a piecewise-coefficient vector
    /// to the piecewise-coefficient vector of its `order`-th t-derivative.
    pub fn block_diagonal_derivative(
        &self,
        num_intervals: usize,
        codom_dim: usize,
        order: usize,
        interval_lengths: &Array1<f64>,
    ) -> Result<SparseColMat<usize, f64>, BasisError> {
        assemble_block_diagonal(
            self.window(),
            num_intervals,
            codom_dim,
            order,
            interval_lengths,
        )
    }

    /// Sparse operator whose kernel is exactly the set of piecewise
    /// coefficient vectors continuous to derivative order `order − 1` at
    /// every internal breakpoint. Shape `(N−1)·c·order × N·c·d`.
    pub fn continuity_matrix(
        &self,
        num_intervals: usize,
        codom_dim: usize,
        order: usize,
        interval_lengths: &Array1<f64>,
    ) -> Result<SparseColMat<usize, f64>, BasisError> {
        assemble_continuity(
            self.window(),
            num_intervals,
            codom_dim,
            order,
            interval_lengths,
        )
    }

    fn check_buffer(&self, found: usize) -> Result<(), BasisError> {
        let expected = self.dim();
        if found != expected {
            return Err(BasisError::BufferSizeMismatch { expected, found });
        }
        Ok(())
    }

    fn check_block(&self, block: &Array2<f64>) -> Result<(), BasisError> {
        let expected = self.dim();
        if block.nrows() != expected || block.ncols() != expected {
            return Err(BasisError::BlockShapeMismatch {
                expected,
                found_rows: block.nrows(),
                found_cols: block.ncols(),
            });
        }
        Ok(())
    }
}

impl std::fmt::Debug for Basis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Basis")
            .field("name", &self.name())
            .field("dim", &self.dim())
            .finish()
    }
}

pub(crate) fn validate_interval_lengths(
    expected: usize,
    interval_lengths: &Array1<f64>,
) -> Result<(), BasisError> {
    if interval_lengths.len() != expected {
        return Err(BasisError::IntervalCountMismatch {
            expected,
            found: interval_lengths.len(),
        });
    }
    for (index, &value) in interval_lengths.iter().enumerate() {
        if !(value > 0.0) || !value.is_finite() {
            return Err(BasisError::NonPositiveIntervalLength { index, value });
        }
    }
    Ok(())
}

/// Block-diagonal derivative operator over all `N·c` coefficient segments.
pub(crate) fn assemble_block_diagonal(
    window: &dyn WindowFunctions,
    num_intervals: usize,
    codom_dim: usize,
    order: usize,
    interval_lengths: &Array1<f64>,
) -> Result<SparseColMat<usize, f64>, BasisError> {
    if codom_dim == 0 {
        return Err(BasisError::EmptyCodomain);
    }
    validate_interval_lengths(num_intervals, interval_lengths)?;
    let d = window.dim();
    let size = num_intervals * codom_dim * d;

    let mut triplets = Vec::with_capacity(num_intervals * codom_dim * d * d);
    for interval in 0..num_intervals {
        let block = window.derivative_matrix_on_interval(interval_lengths[interval], order)?;
        for coord in 0..codom_dim {
            let offset = (interval * codom_dim + coord) * d;
            for row in 0..d {
                for col in 0..d {
                    let value = block[[row, col]];
                    if value != 0.0 {
                        triplets.push(Triplet::new(offset + row, offset + col, value));
                    }
                }
            }
        }
    }
    Ok(sparse_from_triplets(size, size, &triplets)?)
}

/// Continuity rows for derivative orders `0 … order − 1` at every internal
/// breakpoint; `2d` nonzeros per row.
pub(crate) fn assemble_continuity(
    window: &dyn WindowFunctions,
    num_intervals: usize,
    codom_dim: usize,
    order: usize,
    interval_lengths: &Array1<f64>,
) -> Result<SparseColMat<usize, f64>, BasisError> {
    if codom_dim == 0 {
        return Err(BasisError::EmptyCodomain);
    }
    validate_interval_lengths(num_intervals, interval_lengths)?;
    let d = window.dim();
    let cols = num_intervals * codom_dim * d;
    let joints = num_intervals.saturating_sub(1);
    let rows = joints * codom_dim * order;

    let mut left = vec![0.0; d];
    let mut right = vec![0.0; d];
    let mut triplets = Vec::with_capacity(rows * 2 * d);
    for joint in 1..num_intervals {
        let tau_left = interval_lengths[joint - 1];
        let tau_right = interval_lengths[joint];
        for deriv in 0..order {
            window.eval_window_deriv_into(1.0, tau_left, deriv, &mut left)?;
            window.eval_window_deriv_into(-1.0, tau_right, deriv, &mut right)?;
            for coord in 0..codom_dim {
                let row = ((joint - 1) * codom_dim + coord) * order + deriv;
                let col_left = ((joint - 1) * codom_dim + coord) * d;
                let col_right = (joint * codom_dim + coord) * d;
                for b in 0..d {
                    if left[b] != 0.0 {
                        triplets.push(Triplet::new(row, col_left + b, left[b]));
                    }
                    if right[b] != 0.0 {
                        triplets.push(Triplet::new(row, col_right + b, -right[b]));
                    }
                }
            }
        }
    }
    Ok(sparse_from_triplets(rows, cols, &triplets)?)
}

/// Memoized canonical matrices shared by the basis families.
///
/// Derivative powers grow as a vector (`D⁰ = I`, `Dᵏ = Dᵏ⁻¹·D¹`); Gram
/// matrices are keyed by derivative order. Writers are serialized; readers
/// see a consistent snapshot.
pub(crate) struct MatrixCache {
    dim: usize,
    derivatives: RwLock<Vec<Arc<Array2<f64>>>>,
    grams: RwLock<BTreeMap<usize, Arc<Array2<f64>>>>,
}

impl MatrixCache {
    pub(crate) fn new(dim: usize) -> Self {
        Self {
            dim,
            derivatives: RwLock::new(vec![Arc::new(Array2::eye(dim))]),
            grams: RwLock::new(BTreeMap::new()),
        }
    }

    /// `Dᵏ` where `D¹` is produced by `first` on the first miss.
    pub(crate) fn derivative_power(
        &self,
        order: usize,
        first: &dyn Fn() -> Array2<f64>,
    ) -> Arc<Array2<f64>> {
        {
            let mats = self
                .derivatives
                .read()
                .expect("derivative cache lock poisoned");
            if order < mats.len() {
                return mats[order].clone();
            }
        }
        let mut mats = self
            .derivatives
            .write()
            .expect("derivative cache lock poisoned");
        if mats.len() == 1 && order >= 1 {
            let d1 = first();
            debug_assert_eq!(d1.nrows(), self.dim);
            mats.push(Arc::new(d1));
        }
        while mats.len() <= order {
            let next = mats[mats.len() - 1].dot(mats[1].as_ref());
            mats.push(Arc::new(next));
        }
        mats[order].clone()
    }

    /// Canonical Gram matrix of derivative order `order`.
    pub(crate) fn gram(
        &self,
        order: usize,
        build: &dyn Fn() -> Array2<f64>,
    ) -> Arc<Array2<f64>> {
        {
            let grams = self.grams.read().expect("gram cache lock poisoned");
            if let Some(g) = grams.get(&order) {
                return g.clone();
            }
        }
        let mut grams = self.grams.write().expect("gram cache lock poisoned");
        grams
            .entry(order)
            .or_insert_with(|| Arc::new(build()))
            .clone()
    }
}

pub(crate) fn ensure_even_dim(dim: usize) -> Result<(), BasisError> {
    if dim < 2 || dim % 2 != 0 {
        return Err(BasisError::InvalidDimension(dim));
    }
    Ok(())
}
