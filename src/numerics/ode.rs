//! # Adaptive Runge–Kutta integration
//!
//! Embedded Cash–Karp 4(5) pair with error-per-step control, used to evolve the recombination
//! system between two tabulated redshifts. The integrator works in either direction (the
//! recombination history is integrated toward decreasing redshift).
//!
//! The state is a fixed-size [`nalgebra::SVector`], so the right-hand side of a system is a
//! plain function from `(x, y)` to `dy/dx` without heap allocation.
use nalgebra::SVector;

use crate::thermo_errors::ThermoError;

/// A system of first-order ODEs `dy/dx = f(x, y)`.
pub trait OdeSystem<const N: usize> {
    /// Evaluate the derivatives at `(x, y)`.
    fn rhs(&self, x: f64, y: &SVector<f64, N>) -> Result<SVector<f64, N>, ThermoError>;
}

/// Step-size policy and tolerances of the integrator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepControl {
    /// Relative tolerance on each component.
    pub rtol: f64,
    /// Absolute tolerance on each component.
    pub atol: f64,
    /// Smallest step magnitude accepted before giving up.
    pub min_step: f64,
    /// Maximum number of step attempts (accepted + rejected) per call.
    pub max_steps: usize,
    /// Maximum growth factor of the step between two accepted steps.
    pub max_growth: f64,
}

/// Counters returned with every successful integration.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct IntegrationStats {
    pub accepted: usize,
    pub rejected: usize,
    pub last_step: f64,
}

const SAFETY: f64 = 0.9;
const MAX_SHRINK: f64 = 0.1;

// Cash–Karp tableau
const A2: f64 = 1. / 5.;
const A3: f64 = 3. / 10.;
const A4: f64 = 3. / 5.;
const A6: f64 = 7. / 8.;
const B21: f64 = 1. / 5.;
const B31: f64 = 3. / 40.;
const B32: f64 = 9. / 40.;
const B41: f64 = 3. / 10.;
const B42: f64 = -9. / 10.;
const B43: f64 = 6. / 5.;
const B51: f64 = -11. / 54.;
const B52: f64 = 5. / 2.;
const B53: f64 = -70. / 27.;
const B54: f64 = 35. / 27.;
const B61: f64 = 1631. / 55296.;
const B62: f64 = 175. / 512.;
const B63: f64 = 575. / 13824.;
const B64: f64 = 44275. / 110592.;
const B65: f64 = 253. / 4096.;
const C1: f64 = 37. / 378.;
const C3: f64 = 250. / 621.;
const C4: f64 = 125. / 594.;
const C6: f64 = 512. / 1771.;
const DC1: f64 = C1 - 2825. / 27648.;
const DC3: f64 = C3 - 18575. / 48384.;
const DC4: f64 = C4 - 13525. / 55296.;
const DC5: f64 = -277. / 14336.;
const DC6: f64 = C6 - 0.25;

/// Adaptive Cash–Karp integrator.
#[derive(Debug, Clone)]
pub struct CashKarp {
    stage: &'static str,
    control: StepControl,
}

impl CashKarp {
    /// Create an integrator.
    ///
    /// Arguments
    /// -----------------
    /// * `stage`: name of the pipeline stage, reported in [`ThermoError::NumericalDivergence`].
    /// * `control`: tolerances and step-size policy.
    pub fn new(stage: &'static str, control: StepControl) -> Self {
        CashKarp { stage, control }
    }

    /// Integrate `system` from `x0` to `x1` starting from `y0`.
    ///
    /// Arguments
    /// -----------------
    /// * `system`: right-hand side of the ODE.
    /// * `x0`, `x1`: integration bounds (`x1 < x0` is allowed).
    /// * `y0`: state at `x0`.
    /// * `first_step`: magnitude of the first trial step, the whole interval if `None`.
    ///
    /// Return
    /// ----------
    /// * The state at `x1` with the step statistics, or [`ThermoError::NumericalDivergence`]
    ///   when the step underflows, the step budget is exhausted or the state stops being finite.
    pub fn integrate<S, const N: usize>(
        &self,
        system: &S,
        x0: f64,
        x1: f64,
        y0: SVector<f64, N>,
        first_step: Option<f64>,
    ) -> Result<(SVector<f64, N>, IntegrationStats), ThermoError>
    where
        S: OdeSystem<N>,
    {
        let span = x1 - x0;
        let mut stats = IntegrationStats::default();
        if span == 0. {
            return Ok((y0, stats));
        }
        let direction = span.signum();
        let mut h = first_step.map_or(span.abs(), |s| s.abs().min(span.abs())) * direction;
        let mut x = x0;
        let mut y = y0;

        for iteration in 0..self.control.max_steps {
            if (x + h - x1) * direction > 0. {
                h = x1 - x;
            }

            let dydx = system.rhs(x, &y)?;
            if dydx.iter().any(|v| !v.is_finite()) {
                return Err(ThermoError::divergence(
                    self.stage,
                    x,
                    h,
                    iteration,
                    "non-finite derivative",
                ));
            }

            let (y_new, y_err) = self.cash_karp_step(system, x, &y, &dydx, h)?;
            let err = self.error_norm(&y, &y_new, &y_err);

            if err <= 1. {
                x += h;
                y = y_new;
                stats.accepted += 1;
                stats.last_step = h;
                if (x - x1) * direction >= 0. {
                    return Ok((y, stats));
                }
                let growth = if err == 0. {
                    self.control.max_growth
                } else {
                    (SAFETY * err.powf(-0.2)).min(self.control.max_growth)
                };
                h *= growth;
            } else {
                stats.rejected += 1;
                // a NaN error norm means the trial step left the physical domain
                let shrink = if err.is_finite() {
                    (SAFETY * err.powf(-0.25)).max(MAX_SHRINK)
                } else {
                    MAX_SHRINK
                };
                h *= shrink;
                if h.abs() < self.control.min_step {
                    return Err(ThermoError::divergence(
                        self.stage,
                        x,
                        h,
                        iteration,
                        "step size underflow",
                    ));
                }
            }
        }

        Err(ThermoError::divergence(
            self.stage,
            x,
            h,
            self.control.max_steps,
            "maximum number of steps reached",
        ))
    }

    fn error_norm<const N: usize>(
        &self,
        y: &SVector<f64, N>,
        y_new: &SVector<f64, N>,
        y_err: &SVector<f64, N>,
    ) -> f64 {
        let mut err: f64 = 0.;
        for i in 0..N {
            let scale = self.control.atol + self.control.rtol * y[i].abs().max(y_new[i].abs());
            let ratio = y_err[i].abs() / scale;
            if !ratio.is_finite() {
                return f64::NAN;
            }
            err = err.max(ratio);
        }
        err
    }

    fn cash_karp_step<S, const N: usize>(
        &self,
        system: &S,
        x: f64,
        y: &SVector<f64, N>,
        k1: &SVector<f64, N>,
        h: f64,
    ) -> Result<(SVector<f64, N>, SVector<f64, N>), ThermoError>
    where
        S: OdeSystem<N>,
    {
        let k2 = system.rhs(x + A2 * h, &(y + k1 * (B21 * h)))?;
        let k3 = system.rhs(x + A3 * h, &(y + (k1 * B31 + k2 * B32) * h))?;
        let k4 = system.rhs(x + A4 * h, &(y + (k1 * B41 + k2 * B42 + k3 * B43) * h))?;
        let k5 = system.rhs(
            x + h,
            &(y + (k1 * B51 + k2 * B52 + k3 * B53 + k4 * B54) * h),
        )?;
        let k6 = system.rhs(
            x + A6 * h,
            &(y + (k1 * B61 + k2 * B62 + k3 * B63 + k4 * B64 + k5 * B65) * h),
        )?;

        let y_out = y + (k1 * C1 + k3 * C3 + k4 * C4 + k6 * C6) * h;
        let y_err = (k1 * DC1 + k3 * DC3 + k4 * DC4 + k5 * DC5 + k6 * DC6) * h;
        Ok((y_out, y_err))
    }
}
