//! Lagrange cardinal basis at Gauss–Lobatto–Legendre nodes.
//!
//! Nodes are `ξ₀ = −1`, `ξ_{d−1} = +1`, and the roots of `P'_{d−1}` in
//! between, found by Newton iteration from Chebyshev–Lobatto starting
//! points. Evaluation uses the second-form barycentric formula (stable near
//! nodes); differentiation uses the analytic nodal differentiation matrix
//! built from the barycentric weights. The canonical Gram is integrated
//! exactly with a `d`-point Gauss–Legendre rule.

use std::sync::Arc;

use ndarray::Array2;

use super::{BasisError, MatrixCache, WindowFunctions, ensure_even_dim};
use crate::quadrature::gauss_legendre;

const NODE_HIT_TOL: f64 = 1e-13;

pub struct LagrangeGllBasis {
    dim: usize,
    nodes: Vec<f64>,
    bary_weights: Vec<f64>,
    cache: MatrixCache,
}

impl LagrangeGllBasis {
    pub(crate) fn new(dim: usize) -> Result<Self, BasisError> {
        ensure_even_dim(dim)?;
        let nodes = gll_nodes(dim);
        let bary_weights = barycentric_weights(&nodes);
        Ok(Self {
            dim,
            nodes,
            bary_weights,
            cache: MatrixCache::new(dim),
        })
    }

    /// Interpolation nodes on `[-1, 1]`.
    pub fn nodes(&self) -> &[f64] {
        &self.nodes
    }

    /// Second-form barycentric evaluation of all cardinals at `s`.
    fn values_into(&self, s: f64, out: &mut [f64]) {
        for (j, &node) in self.nodes.iter().enumerate() {
            if (s - node).abs() < NODE_HIT_TOL {
                out.fill(0.0);
                out[j] = 1.0;
                return;
            }
        }
        let mut denom = 0.0;
        for j in 0..self.dim {
            let term = self.bary_weights[j] / (s - self.nodes[j]);
            out[j] = term;
            denom += term;
        }
        for v in out.iter_mut() {
            *v /= denom;
        }
    }

    /// Analytic nodal differentiation matrix: `D[i][j] = l'_j(ξ_i)`.
    fn first_derivative_matrix(&self) -> Array2<f64> {
        let d = self.dim;
        let mut mat = Array2::zeros((d, d));
        for i in 0..d {
            let mut diag = 0.0;
            for j in 0..d {
                if i != j {
                    let entry = (self.bary_weights[j] / self.bary_weights[i])
                        / (self.nodes[i] - self.nodes[j]);
                    mat[[i, j]] = entry;
                    diag -= entry;
                }
            }
            mat[[i, i]] = diag;
        }
        mat
    }

    fn derivative_power(&self, order: usize) -> Arc<Array2<f64>> {
        self.cache
            .derivative_power(order, &|| self.first_derivative_matrix())
    }

    /// `G₀` integrated exactly: cardinal products have degree `2d − 2` and
    /// the `d`-point rule is exact through `2d − 1`.
    fn canonical_gram(&self) -> Array2<f64> {
        let rule = gauss_legendre(self.dim);
        let mut g = Array2::zeros((self.dim, self.dim));
        let mut buf = vec![0.0; self.dim];
        for (&s, &w) in rule.nodes().iter().zip(rule.weights()) {
            self.values_into(s, &mut buf);
            for row in 0..self.dim {
                for col in 0..self.dim {
                    g[[row, col]] += w * buf[row] * buf[col];
                }
            }
        }
        g
    }

    /// `G_k = (Dᵏ)ᵀ·G₀·Dᵏ`.
    fn gram(&self, order: usize) -> Arc<Array2<f64>> {
        self.cache.gram(order, &|| {
            let g0 = self.canonical_gram();
            if order == 0 {
                return g0;
            }
            let dk = self.derivative_power(order);
            dk.t().dot(&g0).dot(dk.as_ref())
        })
    }
}

impl WindowFunctions for LagrangeGllBasis {
    fn dim(&self) -> usize {
        self.dim
    }

    fn name(&self) -> &'static str {
        "lagrange_gll"
    }

    fn eval_window_into(&self, s: f64, _tau: f64, out: &mut [f64]) {
        self.values_into(s, out);
    }

    fn eval_window_deriv_into(
        &self,
        s: f64,
        tau: f64,
        order: usize,
        out: &mut [f64],
    ) -> Result<(), BasisError> {
        if order == 0 {
            self.values_into(s, out);
            return Ok(());
        }
        let mut values = vec![0.0; self.dim];
        self.values_into(s, &mut values);
        let dk = self.derivative_power(order);
        let scale = (2.0 / tau).powi(order as i32);
        for m in 0..self.dim {
            let mut acc = 0.0;
            for n in 0..self.dim {
                acc += dk[[n, m]] * values[n];
            }
            out[m] = scale * acc;
        }
        Ok(())
    }

    fn eval_window_deriv_wrt_tau_into(
        &self,
        s: f64,
        tau: f64,
        order: usize,
        out: &mut [f64],
    ) -> Result<(), BasisError> {
        if order == 0 {
            out.fill(0.0);
            return Ok(());
        }
        self.eval_window_deriv_into(s, tau, order, out)?;
        let factor = -(order as f64) / tau;
        for v in out.iter_mut() {
            *v *= factor;
        }
        Ok(())
    }

    fn derivative_matrix(&self, order: usize) -> Result<Arc<Array2<f64>>, BasisError> {
        Ok(self.derivative_power(order))
    }

    fn derivative_matrix_on_interval(
        &self,
        tau: f64,
        order: usize,
    ) -> Result<Array2<f64>, BasisError> {
        let dk = self.derivative_power(order);
        let scale = (2.0 / tau).powi(order as i32);
        Ok(dk.as_ref() * scale)
    }

    fn add_block_derivative(
        &self,
        tau: f64,
        order: usize,
        block: &mut Array2<f64>,
    ) -> Result<(), BasisError> {
        let gram = self.gram(order);
        let scale = (2.0 / tau).powi(2 * order as i32 - 1);
        block.scaled_add(scale, gram.as_ref());
        Ok(())
    }

    fn add_block_derivative_wrt_tau(
        &self,
        tau: f64,
        order: usize,
        block: &mut Array2<f64>,
    ) -> Result<(), BasisError> {
        let gram = self.gram(order);
        let scale =
            -(2.0 * order as f64 - 1.0) / tau * (2.0 / tau).powi(2 * order as i32 - 1);
        block.scaled_add(scale, gram.as_ref());
        Ok(())
    }
}

/// Gauss–Lobatto–Legendre nodes: `±1` plus the roots of `P'_{d−1}`.
fn gll_nodes(dim: usize) -> Vec<f64> {
    let n = dim - 1;
    let mut nodes = vec![0.0; dim];
    nodes[0] = -1.0;
    nodes[n] = 1.0;
    for j in 1..n {
        // Chebyshev–Lobatto start, a few Newton steps on P'_n.
        let mut x = -(std::f64::consts::PI * j as f64 / n as f64).cos();
        for _ in 0..50 {
            let (p, dp) = legendre_value_and_derivative(n, x);
            // P''_n from the Legendre ODE.
            let ddp = (2.0 * x * dp - (n as f64) * (n as f64 + 1.0) * p) / (1.0 - x * x);
            let step = dp / ddp;
            x -= step;
            if step.abs() < 1e-15 {
                break;
            }
        }
        nodes[j] = x;
    }
    // The node set is symmetric; tie mirrored pairs to the same bit pattern.
    for j in 1..=(dim - 1) / 2 {
        let k = dim - 1 - j;
        if j < k {
            let avg = 0.5 * (nodes[j] - nodes[k]);
            nodes[j] = avg;
            nodes[k] = -avg;
        }
    }
    nodes
}

fn legendre_value_and_derivative(n: usize, x: f64) -> (f64, f64) {
    let mut p_prev = 1.0;
    let mut p = x;
    if n == 0 {
        return (1.0, 0.0);
    }
    for k in 1..n {
        let kf = k as f64;
        let p_next = ((2.0 * kf + 1.0) * x * p - kf * p_prev) / (kf + 1.0);
        p_prev = p;
        p = p_next;
    }
    // (x² − 1)·P'_n = n·(x·P_n − P_{n−1}); callers stay strictly inside (−1, 1).
    let dp = (n as f64) * (x * p - p_prev) / (x * x - 1.0);
    (p, dp)
}

fn barycentric_weights(nodes: &[f64]) -> Vec<f64> {
    let d = nodes.len();
    let mut weights = vec![1.0; d];
    for j in 0..d {
        for i in 0..d {
            if i != j {
                weights[j] /= nodes[j] - nodes[i];
            }
        }
    }
    // Only ratios matter; normalize to tame the dynamic range for larger d.
    let max = weights.iter().fold(0.0f64, |m, w| m.max(w.abs()));
    for w in &mut weights {
        *w /= max;
    }
    weights
}
