//! Generalized splines with optimal interval lengths.
//!
//! A *gspline* is a piecewise vector-valued function on a real interval:
//! each piece lives in a chosen function basis over the canonical window
//! `[-1, 1]`, and the piece durations are themselves design variables. This
//! crate builds gsplines that interpolate a waypoint sequence subject to
//! derivative-continuity constraints, and finds the positive interval
//! lengths (of fixed total duration) minimizing a weighted Sobolev seminorm
//! `Σⱼ wⱼ·∫ ‖x^{(kⱼ)}(t)‖² dt`, with the gradient obtained semi-analytically
//! through the derivative of the interpolation solution with respect to each
//! interval length.
//!
//! The pieces fit together leaf to root: [`basis`] provides the window
//! families and sparse operator assembly, [`gspline`] the piecewise
//! function, [`interpolator`] the square sparse constraint system,
//! [`sobolev`] the cost and its gradient, and [`optimize`] the outer
//! fixed-duration problem with its canonical presets.

pub mod basis;
pub mod gspline;
pub mod interpolator;
pub mod linalg;
pub mod optimize;
pub mod quadrature;
pub mod sobolev;

pub use basis::{Basis, BasisError, LagrangeGllBasis, LegendreBasis, TentenBasis};
pub use gspline::{Gspline, GsplineError};
pub use interpolator::{InterpolationError, Interpolator};
pub use optimize::{
    ExecTimeConstraint, MIN_INTERVAL_FRACTION, OptimizationError, OptimizationOptions, Preset,
    optimal_gspline, optimal_sobolev_gspline, optimal_sobolev_gspline_with_options,
};
pub use quadrature::{GaussLegendreRule, gauss_legendre};
pub use sobolev::{DerivativeWeight, SobolevError, SobolevNorm};
