//! The "1010" exponential-trigonometric window basis.
//!
//! Six window functions spanning `{eᵖcos p, eᵖsin p, e⁻ᵖcos p, e⁻ᵖsin p,
//! p, 1}` with `p(s, τ) = τ·κ·s` and `κ = 2^{−3/2}·(α/(1−α))^{1/4}`,
//! `α ∈ (0, 1)`. The span is closed under `d/dp`, so differentiation is an
//! in-place shuffle of the six values; the `s → t` chain collapses to the
//! τ-independent factor `d/dt = 2κ·d/dp`, while the evaluation point itself
//! still moves with `τ` through `p`.
//!
//! Coefficient-space derivative operators and energy blocks are provided for
//! orders 0–3 (the analytically supported surface of this family); point
//! evaluation of window derivatives is closed under the shuffle at any
//! order. Energy blocks integrate with a fixed high-order Gauss–Legendre
//! rule, which is exact to machine precision for these smooth integrands at
//! practical `τ·κ`.

use std::sync::Arc;

use ndarray::Array2;

use super::{BasisError, MatrixCache, WindowFunctions};
use crate::quadrature::gauss_legendre;

const DIM: usize = 6;
const MAX_ANALYTIC_ORDER: usize = 3;
const QUADRATURE_POINTS: usize = 48;
/// `2^{−3/2}`.
const KAPPA_SCALE: f64 = 0.353_553_390_593_273_79;

pub struct TentenBasis {
    alpha: f64,
    kappa: f64,
    cache: MatrixCache,
}

impl TentenBasis {
    pub(crate) fn new(alpha: f64) -> Result<Self, BasisError> {
        if !(alpha > 0.0 && alpha < 1.0) || !alpha.is_finite() {
            return Err(BasisError::InvalidParameter {
                name: "alpha",
                range: "(0, 1)",
                value: alpha,
            });
        }
        let kappa = KAPPA_SCALE * (alpha / (1.0 - alpha)).powf(0.25);
        Ok(Self {
            alpha,
            kappa,
            cache: MatrixCache::new(DIM),
        })
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    /// The frequency factor `κ = 2^{−3/2}·(α/(1−α))^{1/4}`.
    pub fn kappa(&self) -> f64 {
        self.kappa
    }

    fn base_values(p: f64, out: &mut [f64]) {
        let ep = p.exp();
        let cp = p.cos();
        let sp = p.sin();
        out[0] = ep * cp;
        out[1] = ep * sp;
        out[2] = cp / ep;
        out[3] = sp / ep;
        out[4] = p;
        out[5] = 1.0;
    }

    /// One application of `d/dp` to the six values in place.
    fn shuffle(buf: &mut [f64]) {
        let v0 = buf[0];
        let v1 = buf[1];
        buf[0] = v0 - v1;
        buf[1] = v0 + v1;
        let v2 = buf[2];
        let v3 = buf[3];
        buf[2] = -v2 - v3;
        buf[3] = v2 - v3;
        buf[4] = buf[5];
        buf[5] = 0.0;
    }

    /// Values of the `order`-th `p`-derivative of the window functions.
    fn p_derivative_values(&self, s: f64, tau: f64, order: usize, out: &mut [f64]) {
        Self::base_values(tau * self.kappa * s, out);
        for _ in 0..order {
            Self::shuffle(out);
        }
    }

    fn check_order(&self, order: usize) -> Result<(), BasisError> {
        if order > MAX_ANALYTIC_ORDER {
            return Err(BasisError::UnsupportedDerivative {
                basis: "1010",
                order,
            });
        }
        Ok(())
    }

    /// Coefficient-space shuffle: derivative coefficients are `Mᵀ·y` where
    /// `f' = M·f`.
    fn first_derivative_matrix(&self) -> Array2<f64> {
        let m = [
            [1.0, -1.0, 0.0, 0.0, 0.0, 0.0],
            [1.0, 1.0, 0.0, 0.0, 0.0, 0.0],
            [0.0, 0.0, -1.0, -1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, -1.0, 0.0, 0.0],
            [0.0, 0.0, 0.0, 0.0, 0.0, 1.0],
            [0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
        ];
        let mut transposed = Array2::zeros((DIM, DIM));
        for row in 0..DIM {
            for col in 0..DIM {
                transposed[[col, row]] = m[row][col];
            }
        }
        transposed
    }

    fn derivative_power(&self, order: usize) -> Arc<Array2<f64>> {
        self.cache
            .derivative_power(order, &|| self.first_derivative_matrix())
    }
}

impl WindowFunctions for TentenBasis {
    fn dim(&self) -> usize {
        DIM
    }

    fn name(&self) -> &'static str {
        "1010"
    }

    fn eval_window_into(&self, s: f64, tau: f64, out: &mut [f64]) {
        Self::base_values(tau * self.kappa * s, out);
    }

    fn eval_window_deriv_into(
        &self,
        s: f64,
        tau: f64,
        order: usize,
        out: &mut [f64],
    ) -> Result<(), BasisError> {
        // d/dt = (2/τ)·d/ds = (2/τ)·(τκ)·d/dp = 2κ·d/dp.
        self.p_derivative_values(s, tau, order, out);
        let scale = (2.0 * self.kappa).powi(order as i32);
        for v in out.iter_mut() {
            *v *= scale;
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
        // The chain factor (2κ)^k is τ-free; only the evaluation point moves:
        // ∂/∂τ [(2κ)^k f^{(k)}(τκs)] = (2κ)^k·κs·f^{(k+1)}(τκs).
        self.p_derivative_values(s, tau, order + 1, out);
        let scale = (2.0 * self.kappa).powi(order as i32) * self.kappa * s;
        for v in out.iter_mut() {
            *v *= scale;
        }
        Ok(())
    }

    fn derivative_matrix(&self, order: usize) -> Result<Arc<Array2<f64>>, BasisError> {
        self.check_order(order)?;
        Ok(self.derivative_power(order))
    }

    fn derivative_matrix_on_interval(
        &self,
        _tau: f64,
        order: usize,
    ) -> Result<Array2<f64>, BasisError> {
        self.check_order(order)?;
        let dk = self.derivative_power(order);
        let scale = (2.0 * self.kappa).powi(order as i32);
        Ok(dk.as_ref() * scale)
    }

    fn add_block_derivative(
        &self,
        tau: f64,
        order: usize,
        block: &mut Array2<f64>,
    ) -> Result<(), BasisError> {
        self.check_order(order)?;
        let rule = gauss_legendre(QUADRATURE_POINTS);
        let mut g = vec![0.0; DIM];
        for (&s, &w) in rule.nodes().iter().zip(rule.weights()) {
            self.eval_window_deriv_into(s, tau, order, &mut g)?;
            let scale = 0.5 * tau * w;
            for row in 0..DIM {
                for col in 0..DIM {
                    block[[row, col]] += scale * g[row] * g[col];
                }
            }
        }
        Ok(())
    }

    fn add_block_derivative_wrt_tau(
        &self,
        tau: f64,
        order: usize,
        block: &mut Array2<f64>,
    ) -> Result<(), BasisError> {
        self.check_order(order)?;
        let rule = gauss_legendre(QUADRATURE_POINTS);
        let mut g = vec![0.0; DIM];
        let mut dg = vec![0.0; DIM];
        // Q(τ) = (τ/2)·∫ g·gᵀ ds, so
        // dQ/dτ = (1/2)·∫ g·gᵀ ds + (τ/2)·∫ (∂g·gᵀ + g·∂gᵀ) ds.
        for (&s, &w) in rule.nodes().iter().zip(rule.weights()) {
            self.eval_window_deriv_into(s, tau, order, &mut g)?;
            self.eval_window_deriv_wrt_tau_into(s, tau, order, &mut dg)?;
            for row in 0..DIM {
                for col in 0..DIM {
                    block[[row, col]] += w
                        * (0.5 * g[row] * g[col]
                            + 0.5 * tau * (dg[row] * g[col] + g[row] * dg[col]));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn rejects_alpha_outside_open_interval() {
        for bad in [0.0, 1.0, -0.2, 1.5, f64::NAN] {
            assert!(matches!(
                TentenBasis::new(bad),
                Err(BasisError::InvalidParameter { name: "alpha", .. })
            ));
        }
    }

    #[test]
    fn kappa_at_half_is_the_scale_constant() {
        let basis = TentenBasis::new(0.5).unwrap();
        assert_abs_diff_eq!(basis.kappa(), KAPPA_SCALE, epsilon = 1e-15);
    }

    #[test]
    fn shuffle_differentiates_every_family_member() {
        // d/dp of [eᵖcos, eᵖsin, e⁻ᵖcos, e⁻ᵖsin, p, 1] at a generic p.
        let p = 0.37;
        let mut buf = vec![0.0; 6];
        TentenBasis::base_values(p, &mut buf);
        TentenBasis::shuffle(&mut buf);
        let ep = p.exp();
        assert_abs_diff_eq!(buf[0], ep * (p.cos() - p.sin()), epsilon = 1e-14);
        assert_abs_diff_eq!(buf[1], ep * (p.sin() + p.cos()), epsilon = 1e-14);
        assert_abs_diff_eq!(buf[2], (-p.cos() - p.sin()) / ep, epsilon = 1e-14);
        assert_abs_diff_eq!(buf[3], (p.cos() - p.sin()) / ep, epsilon = 1e-14);
        assert_abs_diff_eq!(buf[4], 1.0, epsilon = 0.0);
        assert_abs_diff_eq!(buf[5], 0.0, epsilon = 0.0);
    }

    #[test]
    fn window_derivative_matches_finite_differences_in_t() {
        let basis = TentenBasis::new(0.5).unwrap();
        let tau = 1.4;
        let h = 1e-6;
        for order in 1..=3 {
            for &s in &[-0.8, 0.0, 0.65] {
                let mut analytic = vec![0.0; 6];
                basis
                    .eval_window_deriv_into(s, tau, order, &mut analytic)
                    .unwrap();
                // FD in s of the (order−1)-th t-derivative, then d/dt = (2/τ)·d/ds.
                let mut plus = vec![0.0; 6];
                let mut minus = vec![0.0; 6];
                basis
                    .eval_window_deriv_into(s + h, tau, order - 1, &mut plus)
                    .unwrap();
                basis
                    .eval_window_deriv_into(s - h, tau, order - 1, &mut minus)
                    .unwrap();
                for i in 0..6 {
                    let fd = (plus[i] - minus[i]) / (2.0 * h) * (2.0 / tau);
                    assert_abs_diff_eq!(analytic[i], fd, epsilon = 1e-5 * (1.0 + fd.abs()));
                }
            }
        }
    }

    #[test]
    fn tau_derivative_matches_finite_differences() {
        let basis = TentenBasis::new(0.3).unwrap();
        let tau = 0.9;
        let h = 1e-7;
        for order in 0..=3 {
            for &s in &[-1.0, -0.2, 0.75, 1.0] {
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
    fn coefficient_shuffle_agrees_with_pointwise_derivative() {
        // For y the coefficients of a span element, Mᵀ·y must reproduce the
        // derivative seen by pointwise evaluation.
        let basis = TentenBasis::new(0.5).unwrap();
        let tau = 1.1;
        let y = [0.4, -1.2, 0.9, 0.1, 2.0, -0.7];
        let block = basis.derivative_matrix_on_interval(tau, 1).unwrap();
        let dy: Vec<f64> = (0..6)
            .map(|row| (0..6).map(|col| block[[row, col]] * y[col]).sum())
            .collect();
        let mut values = vec![0.0; 6];
        let mut derivs = vec![0.0; 6];
        for &s in &[-0.6, 0.15, 0.95] {
            basis.eval_window_into(s, tau, &mut values);
            basis.eval_window_deriv_into(s, tau, 1, &mut derivs).unwrap();
            let from_coeffs: f64 = (0..6).map(|i| dy[i] * values[i]).sum();
            let from_eval: f64 = (0..6).map(|i| y[i] * derivs[i]).sum();
            assert_abs_diff_eq!(from_coeffs, from_eval, epsilon = 1e-11);
        }
    }

    #[test]
    fn order_four_operators_are_unsupported() {
        let basis = TentenBasis::new(0.5).unwrap();
        assert!(matches!(
            basis.derivative_matrix(4),
            Err(BasisError::UnsupportedDerivative { order: 4, .. })
        ));
        let mut block = Array2::zeros((6, 6));
        assert!(matches!(
            basis.add_block_derivative(1.0, 4, &mut block),
            Err(BasisError::UnsupportedDerivative { order: 4, .. })
        ));
    }

    #[test]
    fn energy_block_tau_derivative_matches_finite_differences() {
        let basis = TentenBasis::new(0.5).unwrap();
        let tau = 1.2;
        let h = 1e-6;
        for order in [1usize, 3] {
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
