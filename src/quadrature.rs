//! Gauss–Legendre quadrature on the canonical window `[-1, 1]`.
//!
//! Nodes and weights are computed with the Golub–Welsch algorithm: the
//! three-term recurrence of the Legendre polynomials defines a symmetric
//! tridiagonal Jacobi matrix whose eigenvalues are the quadrature nodes and
//! whose eigenvector first components give the weights. An `n`-point rule
//! integrates polynomials up to degree `2n − 1` exactly, which is what the
//! basis Gram-matrix assembly relies on.
//!
//! Rules are memoized per node count; callers share them read-only.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, OnceLock};

/// A Gauss–Legendre rule on `[-1, 1]`.
#[derive(Debug)]
pub struct GaussLegendreRule {
    nodes: Vec<f64>,
    weights: Vec<f64>,
}

impl GaussLegendreRule {
    pub fn degree(&self) -> usize {
        self.nodes.len()
    }

    pub fn nodes(&self) -> &[f64] {
        &self.nodes
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// Integrate `f` over `[-1, 1]`.
    pub fn integrate<F: FnMut(f64) -> f64>(&self, mut f: F) -> f64 {
        self.nodes
            .iter()
            .zip(&self.weights)
            .map(|(&s, &w)| w * f(s))
            .sum()
    }
}

fn rule_cache() -> &'static Mutex<BTreeMap<usize, Arc<GaussLegendreRule>>> {
    static CACHE: OnceLock<Mutex<BTreeMap<usize, Arc<GaussLegendreRule>>>> = OnceLock::new();
    CACHE.get_or_init(|| Mutex::new(BTreeMap::new()))
}

/// Fetch (or build and memoize) the `n`-point Gauss–Legendre rule.
///
/// Panics if `n == 0`; a zero-point rule is a programming error.
pub fn gauss_legendre(n: usize) -> Arc<GaussLegendreRule> {
    assert!(n > 0, "quadrature rule needs at least one node");
    let mut cache = rule_cache().lock().expect("quadrature cache lock poisoned");
    cache
        .entry(n)
        .or_insert_with(|| Arc::new(compute_gauss_legendre(n)))
        .clone()
}

/// Golub–Welsch: eigen-decompose the Legendre Jacobi matrix.
///
/// For Legendre polynomials the monic recurrence gives a Jacobi matrix with
/// zero diagonal and off-diagonal `βᵢ = i/√(4i² − 1)`; the total weight is
/// `μ₀ = ∫_{-1}^{1} ds = 2`.
fn compute_gauss_legendre(n: usize) -> GaussLegendreRule {
    let mut diag = vec![0.0f64; n];
    let mut off_diag = vec![0.0f64; n.saturating_sub(1)];
    for (i, b) in off_diag.iter_mut().enumerate() {
        let k = (i + 1) as f64;
        *b = k / (4.0 * k * k - 1.0).sqrt();
    }

    let (eigenvalues, first_components) = symmetric_tridiagonal_eigen(&mut diag, &mut off_diag);

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| {
        eigenvalues[a]
            .partial_cmp(&eigenvalues[b])
            .expect("quadrature eigenvalues must be finite")
    });

    let mu0 = 2.0;
    let mut nodes = Vec::with_capacity(n);
    let mut weights = Vec::with_capacity(n);
    for &i in &order {
        // Clean up the tiny asymmetry the QR sweeps leave on the symmetric rule.
        let x = eigenvalues[i];
        nodes.push(if x.abs() < 1e-15 { 0.0 } else { x });
        weights.push(mu0 * first_components[i] * first_components[i]);
    }

    GaussLegendreRule { nodes, weights }
}

/// Implicit-shift QR on a symmetric tridiagonal matrix.
///
/// Returns the eigenvalues and the first component of each eigenvector
/// (all Golub–Welsch needs). Rotations are accumulated into the first row of
/// `Qᵀ` only.
fn symmetric_tridiagonal_eigen(diag: &mut [f64], off_diag: &mut [f64]) -> (Vec<f64>, Vec<f64>) {
    let size = diag.len();
    let mut first = vec![0.0f64; size];
    if size == 0 {
        return (Vec::new(), first);
    }
    first[0] = 1.0;
    if size == 1 {
        return (diag.to_vec(), first);
    }

    let eps = 1e-15;
    let max_iter = 200;

    let mut n = size;
    while n > 1 {
        let mut converged = false;
        for _ in 0..max_iter {
            let mut m = n - 1;
            while m > 0 {
                if off_diag[m - 1].abs() <= eps * (diag[m - 1].abs() + diag[m].abs()) {
                    off_diag[m - 1] = 0.0;
                    break;
                }
                m -= 1;
            }

            if m == n - 1 {
                n -= 1;
                converged = true;
                break;
            }

            let shift = wilkinson_shift(diag[n - 2], diag[n - 1], off_diag[n - 2]);

            let mut x = diag[m] - shift;
            let mut y = off_diag[m];

            for k in m..(n - 1) {
                let (c, s) = if y.abs() > eps {
                    let r = x.hypot(y);
                    if r > 0.0 && r.is_finite() {
                        (x / r, -y / r)
                    } else {
                        (1.0, 0.0)
                    }
                } else {
                    (1.0, 0.0)
                };

                if k > m {
                    off_diag[k - 1] = x.hypot(y);
                }

                let d1 = diag[k];
                let d2 = diag[k + 1];
                let e_k = off_diag[k];

                diag[k] = c * c * d1 + s * s * d2 - 2.0 * c * s * e_k;
                diag[k + 1] = s * s * d1 + c * c * d2 + 2.0 * c * s * e_k;
                off_diag[k] = c * s * (d1 - d2) + (c * c - s * s) * e_k;

                if k < n - 2 {
                    x = off_diag[k];
                    y = -s * off_diag[k + 1];
                    off_diag[k + 1] *= c;
                }

                let t = first[k];
                first[k] = c * t - s * first[k + 1];
                first[k + 1] = s * t + c * first[k + 1];
            }
        }
        if !converged {
            // Force trailing deflation rather than looping forever; for the
            // well-separated Legendre spectra this never fires in practice.
            off_diag[n - 2] = 0.0;
            n -= 1;
        }
    }

    (diag.to_vec(), first)
}

#[inline]
fn wilkinson_shift(a: f64, c: f64, b: f64) -> f64 {
    let d = (a - c) * 0.5;
    let t = d.hypot(b);
    // sign(0) = +1 so the denominator below cannot vanish while b != 0.
    let sgn = if d >= 0.0 { 1.0 } else { -1.0 };
    c - sgn * b * b / (d.abs() + t).max(f64::MIN_POSITIVE)
}
