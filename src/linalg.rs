//! Bridge between `ndarray` storage and `faer` kernels.
//!
//! All public data interchange in this crate is `ndarray`; the sparse
//! interpolation system is factorized by `faer`. This module keeps the
//! conversions in one place: zero-copy `MatRef` views over dense arrays,
//! triplet-based CSC construction, a CSC matvec, and a thin wrapper around
//! the sparse LU factorization with an `Array1` solve surface.

use faer::linalg::solvers::Solve;
use faer::sparse::linalg::solvers::Lu as SparseLu;
use faer::sparse::{SparseColMat, Triplet};
use faer::{Mat, MatRef};
use ndarray::Array1;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LinalgError {
    #[error("failed to assemble sparse matrix from triplets: {0}")]
    SparseCreation(String),

    #[error("sparse LU factorization failed; matrix is singular to working precision")]
    FactorizationFailed,
}

/// Zero-copy column view of a dense vector.
///
/// SAFETY: the view borrows `v` immutably for its lifetime; strides are taken
/// from `ndarray`, so sliced (non-unit-stride) inputs are handled too.
#[inline]
pub fn array1_as_col(v: &Array1<f64>) -> MatRef<'_, f64> {
    let stride = v.strides()[0];
    unsafe { MatRef::from_raw_parts(v.as_ptr(), v.len(), 1, stride, 0) }
}

/// Copy the first column of a faer matrix into an owned `Array1`.
#[inline]
pub fn col_to_array1(m: &Mat<f64>) -> Array1<f64> {
    Array1::from_shape_fn(m.nrows(), |i| m[(i, 0)])
}

/// Build a CSC matrix from triplets, surfacing assembly failures uniformly.
pub fn sparse_from_triplets(
    nrows: usize,
    ncols: usize,
    triplets: &[Triplet<usize, usize, f64>],
) -> Result<SparseColMat<usize, f64>, LinalgError> {
    SparseColMat::try_new_from_triplets(nrows, ncols, triplets)
        .map_err(|e| LinalgError::SparseCreation(format!("{e:?}")))
}

/// `out = A · x` for a CSC matrix.
pub fn sparse_matvec(matrix: &SparseColMat<usize, f64>, vector: &Array1<f64>) -> Array1<f64> {
    let mut out = Array1::<f64>::zeros(matrix.nrows());
    let (symbolic, values) = matrix.parts();
    let col_ptr = symbolic.col_ptr();
    let row_idx = symbolic.row_idx();
    for col in 0..matrix.ncols() {
        let x = vector[col];
        if x == 0.0 {
            continue;
        }
        for idx in col_ptr[col]..col_ptr[col + 1] {
            out[row_idx[idx]] += values[idx] * x;
        }
    }
    out
}

/// Sparse LU factorization of a square system with a dense-vector solve.
pub struct SparseLuFactor {
    factor: SparseLu<usize, f64>,
    n: usize,
}

impl SparseLuFactor {
    /// Factorize `a`; reports failure (structural or numerical singularity)
    /// as `FactorizationFailed`.
    pub fn new(a: &SparseColMat<usize, f64>) -> Result<Self, LinalgError> {
        let factor = a
            .as_ref()
            .sp_lu()
            .map_err(|_| LinalgError::FactorizationFailed)?;
        Ok(Self {
            factor,
            n: a.ncols(),
        })
    }

    pub fn dim(&self) -> usize {
        self.n
    }

    /// Solve `A · x = rhs`.
    pub fn solve(&self, rhs: &Array1<f64>) -> Array1<f64> {
        let out = self.factor.solve(array1_as_col(rhs));
        col_to_array1(&out)
    }
}

/// `‖A·x − b‖∞`, used to confirm a factorization actually inverted the system.
pub fn max_abs_residual(
    a: &SparseColMat<usize, f64>,
    x: &Array1<f64>,
    b: &Array1<f64>,
) -> f64 {
    let ax = sparse_matvec(a, x);
    ax.iter()
        .zip(b.iter())
        .map(|(l, r)| (l - r).abs())
        .fold(0.0, f64::max)
}
