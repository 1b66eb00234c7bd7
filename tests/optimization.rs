use std::sync::Arc;

use gsplines::{
    Basis, DerivativeWeight, ExecTimeConstraint, Preset, optimal_gspline,
    optimal_sobolev_gspline,
};
use ndarray::{Array1, array};

#[test]
fn three_point_minimum_jerk_splits_symmetrically() {
    // Symmetric waypoints over a total duration of 2 must give τ = [1, 1].
    let waypoints = array![[0.0], [1.0], [0.0]];
    let g = optimal_gspline(&waypoints, 2.0, Preset::MinimumJerk).unwrap();

    assert!((g.exec_time() - 2.0).abs() <= 1e-12);
    assert!(
        (g.interval_lengths()[0] - 1.0).abs() <= 1e-6,
        "tau = {:?}",
        g.interval_lengths()
    );
    assert!((g.interval_lengths()[1] - 1.0).abs() <= 1e-6);

    // The optimum still interpolates.
    assert!((g.value_at(0.0).unwrap()[0]).abs() <= 1e-9);
    assert!((g.value_at(g.breakpoints()[1]).unwrap()[0] - 1.0).abs() <= 1e-9);
    assert!((g.value_at(2.0).unwrap()[0]).abs() <= 1e-9);
}

#[test]
fn broken_lines_allocate_time_proportionally_to_displacement() {
    // For piecewise-linear splines the cost is Σ (Δwᵢ)²/τᵢ, minimized at
    // τᵢ ∝ |Δwᵢ|; displacements 2 and 1 over T = 3 give τ = [2, 1].
    let waypoints = array![[0.0], [2.0], [3.0]];
    let g = optimal_gspline(&waypoints, 3.0, Preset::BrokenLines).unwrap();

    assert!(
        (g.interval_lengths()[0] - 2.0).abs() <= 1e-4,
        "tau = {:?}",
        g.interval_lengths()
    );
    assert!((g.interval_lengths()[1] - 1.0).abs() <= 1e-4);
    assert!((g.exec_time() - 3.0).abs() <= 1e-12);
}

#[test]
fn optimum_interpolates_multidimensional_waypoints() {
    let waypoints = array![[0.0, 1.0], [1.5, -0.5], [0.5, 0.5], [2.0, 0.0]];
    let basis = Arc::new(Basis::legendre(6).unwrap());
    let g = optimal_sobolev_gspline(
        &waypoints,
        basis,
        4.0,
        vec![DerivativeWeight::new(3, 1.0)],
    )
    .unwrap();

    assert!((g.exec_time() - 4.0).abs() <= 1e-12);
    for (i, &t) in g.breakpoints().iter().enumerate() {
        let v = g.value_at(t).unwrap();
        for coord in 0..2 {
            assert!(
                (v[coord] - waypoints[[i, coord]]).abs() <= 1e-8,
                "waypoint {i}, coord {coord}"
            );
        }
    }
}

#[test]
fn interval_lengths_respect_the_lower_bound_policy() {
    let waypoints = array![[0.0], [1.0], [1.0], [0.0]];
    let g = optimal_gspline(&waypoints, 3.0, Preset::MinimumAcceleration).unwrap();
    let bounds = ExecTimeConstraint::new(3, 3.0).lower_bounds();
    for (p, &tau) in g.interval_lengths().iter().enumerate() {
        assert!(tau >= bounds[p], "interval {p} collapsed to {tau}");
    }
}

#[test]
fn exec_time_constraint_is_satisfied_at_the_optimum() {
    let waypoints = array![[0.0], [0.7], [-0.3], [1.0]];
    let g = optimal_gspline(&waypoints, 5.0, Preset::MinimumSnap).unwrap();
    let constraint = ExecTimeConstraint::new(3, 5.0);
    assert!(constraint.value(g.interval_lengths()).abs() <= 1e-10);
    assert_eq!(constraint.jacobian(), Array1::ones(3));
}

#[test]
fn invalid_durations_are_rejected() {
    let waypoints = array![[0.0], [1.0]];
    let basis = Arc::new(Basis::legendre(4).unwrap());
    assert!(
        optimal_sobolev_gspline(
            &waypoints,
            basis.clone(),
            0.0,
            vec![DerivativeWeight::new(2, 1.0)]
        )
        .is_err()
    );
    assert!(
        optimal_sobolev_gspline(
            &array![[1.0]],
            basis,
            1.0,
            vec![DerivativeWeight::new(2, 1.0)]
        )
        .is_err()
    );
}
