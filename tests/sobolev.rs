use std::sync::Arc;

use gsplines::quadrature::gauss_legendre;
use gsplines::{Basis, DerivativeWeight, SobolevError, SobolevNorm};
use ndarray::{Array1, Array2, array};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn random_waypoints(rng: &mut StdRng, rows: usize, cols: usize) -> Array2<f64> {
    Array2::from_shape_fn((rows, cols), |_| rng.gen_range(-2.0..2.0))
}

fn finite_difference_gradient(
    norm: &mut SobolevNorm,
    tau: &Array1<f64>,
    h: f64,
) -> Array1<f64> {
    let mut grad = Array1::zeros(tau.len());
    for p in 0..tau.len() {
        let mut plus = tau.clone();
        plus[p] += h;
        let mut minus = tau.clone();
        minus[p] -= h;
        grad[p] = (norm.value(&plus).unwrap() - norm.value(&minus).unwrap()) / (2.0 * h);
    }
    grad
}

#[test]
fn value_agrees_with_quadrature_of_the_integrand() {
    // Cross-check J = Σ w·∫‖x^{(k)}‖² against per-interval Gauss–Legendre
    // quadrature of the differentiated gspline itself.
    let mut rng = StdRng::seed_from_u64(0xC0_0001);
    let basis = Arc::new(Basis::legendre(6).unwrap());
    let waypoints = random_waypoints(&mut rng, 4, 2);
    let mut norm = SobolevNorm::new(
        waypoints,
        basis,
        vec![DerivativeWeight::new(3, 1.0)],
    )
    .unwrap();

    let tau = array![1.0, 1.5, 0.5];
    let nominal = norm.value(&tau).unwrap();

    let g = norm.gspline(&tau).unwrap();
    let d3 = g.derivate(3).unwrap();
    let rule = gauss_legendre(12);
    let mut quadrature = 0.0;
    for i in 0..3 {
        let t0 = g.breakpoints()[i];
        let tf = g.breakpoints()[i + 1];
        quadrature += (tf - t0) / 2.0
            * rule.integrate(|s| {
                let t = t0 + (s + 1.0) / 2.0 * (tf - t0);
                let v = d3.value_at(t).unwrap();
                v.dot(&v)
            });
    }
    assert!(
        (nominal - quadrature).abs() <= 1e-8 * (1.0 + quadrature.abs()),
        "value {nominal} vs quadrature {quadrature}"
    );
}

#[test]
fn gradient_matches_finite_differences_on_mixed_weights() {
    // N = 4, d = 4, c = 3, weights {(1, 0.3), (2, 0.7)}.
    let mut rng = StdRng::seed_from_u64(0xC0_0002);
    let basis = Arc::new(Basis::legendre(4).unwrap());
    let waypoints = random_waypoints(&mut rng, 5, 3);
    let mut norm = SobolevNorm::new(
        waypoints,
        basis,
        vec![
            DerivativeWeight::new(1, 0.3),
            DerivativeWeight::new(2, 0.7),
        ],
    )
    .unwrap();

    let tau = array![0.9, 1.2, 1.1, 0.8];
    let analytic = norm.gradient(&tau).unwrap();
    let fd = finite_difference_gradient(&mut norm, &tau, 1e-6);

    let scale = 1.0 + analytic.iter().fold(0.0f64, |m, v| m.max(v.abs()));
    for p in 0..4 {
        assert!(
            (analytic[p] - fd[p]).abs() <= 1e-5 * scale,
            "component {p}: analytic {} vs fd {}",
            analytic[p],
            fd[p]
        );
    }
}

#[test]
fn gradient_matches_finite_differences_for_minimum_jerk_weights() {
    let mut rng = StdRng::seed_from_u64(0xC0_0003);
    let basis = Arc::new(Basis::legendre(6).unwrap());
    let waypoints = random_waypoints(&mut rng, 5, 2);
    let mut norm = SobolevNorm::new(
        waypoints,
        basis,
        vec![DerivativeWeight::new(3, 1.0)],
    )
    .unwrap();

    let tau = array![1.4, 0.7, 1.1, 0.8];
    let analytic = norm.gradient(&tau).unwrap();
    let fd = finite_difference_gradient(&mut norm, &tau, 1e-6);

    let scale = 1.0 + analytic.iter().fold(0.0f64, |m, v| m.max(v.abs()));
    for p in 0..4 {
        assert!(
            (analytic[p] - fd[p]).abs() <= 1e-5 * scale,
            "component {p}: analytic {} vs fd {}",
            analytic[p],
            fd[p]
        );
    }
}

#[test]
fn tenten_gradient_matches_finite_differences() {
    // Exercises the τ-coupled window family: interpolation rows contribute
    // to ∂A/∂τ and the energy blocks are integrated numerically.
    let basis = Arc::new(Basis::tenten(0.5).unwrap());
    let waypoints = array![[0.0], [1.0], [0.0]];
    let mut norm = SobolevNorm::new(
        waypoints,
        basis,
        vec![DerivativeWeight::new(3, 1.0)],
    )
    .unwrap();

    let tau = array![0.8, 1.2];
    let analytic = norm.gradient(&tau).unwrap();
    let fd = finite_difference_gradient(&mut norm, &tau, 1e-6);

    let scale = 1.0 + analytic.iter().fold(0.0f64, |m, v| m.max(v.abs()));
    for p in 0..2 {
        assert!(
            (analytic[p] - fd[p]).abs() <= 1e-5 * scale,
            "component {p}: analytic {} vs fd {}",
            analytic[p],
            fd[p]
        );
    }
}

#[test]
fn weight_validation_happens_at_construction() {
    let basis = Arc::new(Basis::legendre(6).unwrap());
    let waypoints = array![[0.0], [1.0], [0.0]];
    assert!(matches!(
        SobolevNorm::new(
            waypoints.clone(),
            basis.clone(),
            vec![DerivativeWeight::new(3, 0.0)]
        ),
        Err(SobolevError::InvalidWeight { .. })
    ));
    assert!(matches!(
        SobolevNorm::new(waypoints, basis, vec![]),
        Err(SobolevError::EmptyWeights)
    ));
}
