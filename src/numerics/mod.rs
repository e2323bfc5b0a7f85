//! # Numerical building blocks
//!
//! Self-contained numerical tools shared by the recombination, reionization and merge stages.
//!
//! ## Overview
//!
//! - [`ode`]: adaptive Cash–Karp Runge–Kutta integrator over fixed-size states,
//! - [`spline`]: cubic spline second derivatives, evaluation, bracketing and integration,
//! - [`smoothstep`]: polynomial blending functions used to switch between physical regimes.
pub mod ode;
pub mod smoothstep;
pub mod spline;
