//! Shifted-Legendre window basis.
//!
//! The window functions are the Legendre polynomials `P₀ … P_{d−1}` on
//! `[-1, 1]`. Values come from the three-term recurrence; derivatives come
//! from the coefficient-space differentiation matrix, whose entries follow
//! the classical expansion `P'_m = Σ (2n+1)·P_n` over `n < m` with `m − n`
//! odd. The canonical Gram is diagonal (`∫P_n² = 2/(2n+1)`), which makes the
//! energy blocks and their `τ`-derivatives closed-form.

use std::sync::Arc;

use ndarray::Array2;

use super::{BasisError, MatrixCache, WindowFunctions, ensure_even_dim};

pub struct LegendreBasis {
    dim: usize,
    cache: MatrixCache,
}

impl LegendreBasis {
    pub(crate) fn new(dim: usize) -> Result<Self, BasisError> {
        ensure_even_dim(dim)?;
        Ok(Self {
            dim,
            cache: MatrixCache::new(dim),
        })
    }

    /// Three-term recurrence: `(n+1)·P_{n+1} = (2n+1)·s·P_n − n·P_{n−1}`.
    fn values_into(&self, s: f64, out: &mut [f64]) {
        out[0] = 1.0;
        if self.dim > 1 {
            out[1] = s;
        }
        for n in 1..self.dim - 1 {
            let nf = n as f64;
            out[n + 1] = ((2.0 * nf + 1.0) * s * out[n] - nf * out[n - 1]) / (nf + 1.0);
        }
    }

    fn first_derivative_matrix(&self) -> Array2<f64> {
        let mut d1 = Array2::zeros((self.dim, self.dim));
        for col in 1..self.dim {
            for row in 0..col {
                if (col - row) % 2 == 1 {
                    d1[[row, col]] = 2.0 * row as f64 + 1.0;
                }
            }
        }
        d1
    }

    fn derivative_power(&self, order: usize) -> Arc<Array2<f64>> {
        self.cache
            .derivative_power(order, &|| self.first_derivative_matrix())
    }

    /// `G_k = (Dᵏ)ᵀ·G₀·Dᵏ` with `G₀ = diag(2/(2n+1))`.
    fn gram(&self, order: usize) -> Arc<Array2<f64>> {
        self.cache.gram(order, &|| {
            let dk = self.derivative_power(order);
            let mut g = Array2::zeros((self.dim, self.dim));
            for row in 0..self.dim {
                for col in 0..self.dim {
                    let mut acc = 0.0;
                    for n in 0..self.dim {
                        let g0 = 2.0 / (2.0 * n as f64 + 1.0);
                        acc += dk[[n, row]] * g0 * dk[[n, col]];
                    }
                    g[[row, col]] = acc;
                }
            }
            g
        })
    }
}

impl WindowFunctions for LegendreBasis {
    fn dim(&self) -> usize {
        self.dim
    }

    fn name(&self) -> &'static str {
        "legendre"
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
        // B^{(k)} = (Dᵏ)ᵀ·B as functions of s, then the t-chain factor.
        for m in 0..self.dim {
            let mut acc = 0.0;
            for n in 0..m {
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
            // Window values do not depend on the interval length.
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
        // ∫_piece = (τ/2)·(2/τ)^{2k}·G_k = (2/τ)^{2k−1}·G_k.
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

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn finite_difference_deriv(basis: &LegendreBasis, s: f64, tau: f64, order: usize) -> Vec<f64> {
        let h = 1e-6;
        let d = basis.dim();
        let mut plus = vec![0.0; d];
        let mut minus = vec![0.0; d];
        basis
            .eval_window_deriv_into(s + h, tau, order - 1, &mut plus)
            .unwrap();
        basis
            .eval_window_deriv_into(s - h, tau, order - 1, &mut minus)
            .unwrap();
        // d/dt = (2/τ)·d/ds.
        (0..d)
            .map(|i| (plus[i] - minus[i]) / (2.0 * h) * (2.0 / tau))
            .collect()
    }

    #[test]
    fn recurrence_matches_closed_forms() {
        let basis = LegendreBasis::new(6).unwrap();
        let mut out = vec![0.0; 6];
        let s = 0.3;
        basis.eval_window_into(s, 1.0, &mut out);
        assert_abs_diff_eq!(out[0], 1.0, epsilon = 1e-15);
        assert_abs_diff_eq!(out[1], s, epsilon = 1e-15);
        assert_abs_diff_eq!(out[2], 0.5 * (3.0 * s * s - 1.0), epsilon = 1e-14);
        assert_abs_diff_eq!(out[3], 0.5 * (5.0 * s * s * s - 3.0 * s), epsilon = 1e-14);
    }

    #[test]
    fn derivative_matrix_agrees_with_finite_differences() {
        let basis = LegendreBasis::new(8).unwrap();
        let tau = 1.7;
        for order in 1..4 {
            for &s in &[-0.9, -0.25, 0.0, 0.55, 0.9] {
                let mut analytic = vec![0.0; 8];
                basis
                    .eval_window_deriv_into(s, tau, order, &mut analytic)
                    .unwrap();
                let fd = finite_difference_deriv(&basis, s, tau, order);
                for i in 0..8 {
                    assert_abs_diff_eq!(analytic[i], fd[i], epsilon = 1e-5 * (1.0 + fd[i].abs()));
                }
            }
        }
    }

    #[test]
    fn tau_derivative_of_window_derivatives() {
        let basis = LegendreBasis::new(6).unwrap();
        let tau = 0.8;
        let h = 1e-7;
        for order in 1..4 {
            for &s in &[-1.0, -0.3, 0.6, 1.0] {
                let mut analytic = vec![0.0; 6];
                basis
                    .eval_window_deriv_wrt_tau_into(s, tau, order, &mut analytic)
                    .unwrap();
                let mut plus = vec![0.0; 6];
                let mut minus = vec![0.0; 6];
                basis
                    .eval_window_deriv_into(s, tau + h, order, &mut plus)
                    .unwrap();
                basis
                    .eval_window_deriv_into(s, tau - h, order, &mut minus)
                    .unwrap();
                for i in 0..6 {
                    let fd = (plus[i] - minus[i]) / (2.0 * h);
                    assert_abs_diff_eq!(analytic[i], fd, epsilon = 1e-5 * (1.0 + fd.abs()));
                }
            }
        }
    }

    #[test]
    fn energy_block_matches_quadrature() {
        let basis = LegendreBasis::new(4).unwrap();
        let tau = 1.3;
        let order = 1;
        let mut block = Array2::zeros((4, 4));
        basis.add_block_derivative(tau, order, &mut block).unwrap();

        let rule = crate::quadrature::gauss_legendre(8);
        let mut buf = vec![0.0; 4];
        for row in 0..4 {
            for col in 0..4 {
                let quad = (tau / 2.0)
                    * rule.integrate(|s| {
                        basis
                            .eval_window_deriv_into(s, tau, order, &mut buf)
                            .unwrap();
                        buf[row] * buf[col]
                    });
                assert_abs_diff_eq!(block[[row, col]], quad, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn energy_block_tau_derivative_matches_finite_differences() {
        let basis = LegendreBasis::new(6).unwrap();
        let tau = 0.9;
        let h = 1e-6;
        for order in 1..4 {
            let mut analytic = Array2::zeros((6, 6));
            basis
                .add_block_derivative_wrt_tau(tau, order, &mut analytic)
                .unwrap();
            let mut plus = Array2::zeros((6, 6));
            let mut minus = Array2::zeros((6, 6));
            basis.add_block_derivative(tau + h, order, &mut plus).unwrap();
            basis
                .add_block_derivative(tau - h, order, &mut minus)
                .unwrap();
            for row in 0..6 {
                for col in 0..6 {
                    let fd = (plus[[row, col]] - minus[[row, col]]) / (2.0 * h);
                    assert_abs_diff_eq!(
                        analytic[[row, col]],
                        fd,
                        epsilon = 1e-4 * (1.0 + fd.abs())
                    );
                }
            }
        }
    }
}
