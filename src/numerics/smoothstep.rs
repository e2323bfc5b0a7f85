//! Polynomial smooth-step functions.
//!
//! They blend two regimes over a finite interval with a continuous first derivative, so that
//! the recombination integrator and the reionization profile never see a hard switch.

/// Goes from 0 to 1 when `x` goes from -1 to 1 (cubic, zero slope at both ends).
#[inline]
pub fn f1(x: f64) -> f64 {
    -0.75 * x * (x * x / 3. - 1.) + 0.5
}

/// Goes from 0 to 1 when `x` goes from 0 to 1 (cubic, zero slope at both ends).
#[inline]
pub fn f2(x: f64) -> f64 {
    x * x * (0.5 - x / 3.) * 6.
}

/// Half-width, in units of the profile argument, of the reionization step.
///
/// With this scaling the step has the same slope at its center as `(tanh(u) + 1) / 2`.
const STEP_HALF_WIDTH: f64 = 1.5;

/// Value, first and second derivative of a smooth step going from 0 (u → -∞) to 1 (u → +∞).
///
/// The step is `f1(u / 1.5)` inside `|u| < 1.5` and constant outside; it replaces the
/// hyperbolic tangent of the usual reionization parametrization with a compactly supported
/// polynomial whose derivatives are known in closed form.
///
/// Return
/// ----------
/// * `(s, ds/du, d²s/du²)`
pub fn reionization_step(u: f64) -> (f64, f64, f64) {
    let v = u / STEP_HALF_WIDTH;
    if v <= -1. {
        (0., 0., 0.)
    } else if v >= 1. {
        (1., 0., 0.)
    } else {
        let ds = 0.75 * (1. - v * v) / STEP_HALF_WIDTH;
        let dds = -1.5 * v / (STEP_HALF_WIDTH * STEP_HALF_WIDTH);
        (f1(v), ds, dds)
    }
}
