//! # Precision parameters of the thermodynamics pipeline
//!
//! This module defines [`ThermoPrecision`], the read-only set of numerical knobs consumed once at
//! the start of a run, and its validating builder.
//!
//! ## Purpose
//!
//! The [`ThermoPrecision`] object centralizes every tunable parameter of
//! [`ThermoContext::new`](crate::thermodynamics::ThermoContext::new). It allows you to:
//!
//! - Choose the recombination grid (start redshift and number of steps),
//! - Tune the RECFAST fudge factors, helium corrections and regime switches,
//! - Adjust the tolerances and step-size policy of the adaptive ODE integrator,
//! - Control the reionization sampling, the shape of the reionization profile and the optical
//!   depth root search,
//! - Set the visibility threshold defining the free-streaming redshift.
//!
//! ## Example
//!
//! ```rust
//! use cosmotherm::precision::ThermoPrecision;
//!
//! let precision = ThermoPrecision::builder()
//!     .recfast_nz0(5_000)
//!     .ode_rtol(1e-5)
//!     .reionization_optical_depth_tol(1e-5)
//!     .build()
//!     .unwrap();
//! println!("{precision:#}");
//! ```
//!
//! ## See also
//!
//! * [`crate::thermo_params::ThermoParams`] – physical inputs of the same run.
//! * [`crate::thermodynamics::ThermoContext::new`] – pipeline entry point.
use std::cmp::Ordering::{Equal, Greater, Less};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::numerics::ode::StepControl;
use crate::thermo_errors::ThermoError;

/// Numerical configuration of the thermodynamics pipeline.
///
/// Fields
/// -----------------
/// **Recombination (RECFAST)**
/// * `recfast_z_initial` – redshift at which the recombination history starts (fully ionized).
/// * `recfast_nz0` – number of equal redshift steps between `recfast_z_initial` and 0.
/// * `recfast_fudge_h` – fudge factor of the hydrogen recombination rate.
/// * `recfast_fudge_he` – fudge factor of the helium K factor (used with `recfast_heswitch ≥ 3`).
/// * `recfast_heswitch` – helium recombination corrections, from 0 (none) to 6 (all).
/// * `recfast_h_frac` – ratio of Thomson to Hubble time below which `Tb = Trad`.
/// * `recfast_z_he_{1,2,3}` / `recfast_delta_z_he_{1,2,3}` – centers and half-widths of the
///   three helium Saha regimes.
/// * `recfast_x_he0_trigger{,2,_delta}` – helium Saha exit thresholds and blending width.
/// * `recfast_x_h0_trigger{,2,_delta}` – hydrogen Saha exit thresholds and blending width.
///
/// **Integrator**
/// * `ode_rtol`, `ode_atol` – relative and absolute tolerances of the adaptive stepper.
/// * `ode_max_steps` – step budget per recombination interval.
/// * `ode_min_step` – smallest step in redshift before the integration is declared divergent.
/// * `ode_step_growth` – largest growth factor between two accepted steps.
///
/// **Reionization**
/// * `reionization_z_start_max` – largest admissible reionization start redshift.
/// * `reionization_sampling` – largest relative variation of `dκ/dz` between two samples.
/// * `reionization_max_step`, `reionization_min_step` – bounds of the sampling step in `z`.
/// * `reionization_optical_depth_tol` – relative tolerance of the optical depth root search.
/// * `reionization_max_iter` – iteration budget of the optical depth root search.
/// * `reionization_exponent`, `reionization_width` – shape of the hydrogen transition.
/// * `reionization_start_factor` – start redshift is `z_reio + start_factor × width`.
/// * `helium_fullreio_redshift`, `helium_fullreio_width` – second helium reionization.
///
/// **Visibility**
/// * `visibility_threshold_free_streaming` – fraction of the visibility peak defining the
///   free-streaming redshift.
/// * `visibility_z_min`, `visibility_z_max` – redshift window searched for the visibility peak.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThermoPrecision {
    // --- Recombination ---
    pub recfast_z_initial: f64,
    pub recfast_nz0: usize,
    pub recfast_fudge_h: f64,
    pub recfast_fudge_he: f64,
    pub recfast_heswitch: u8,
    pub recfast_h_frac: f64,
    pub recfast_z_he_1: f64,
    pub recfast_delta_z_he_1: f64,
    pub recfast_z_he_2: f64,
    pub recfast_delta_z_he_2: f64,
    pub recfast_z_he_3: f64,
    pub recfast_delta_z_he_3: f64,
    pub recfast_x_he0_trigger: f64,
    pub recfast_x_he0_trigger2: f64,
    pub recfast_x_he0_trigger_delta: f64,
    pub recfast_x_h0_trigger: f64,
    pub recfast_x_h0_trigger2: f64,
    pub recfast_x_h0_trigger_delta: f64,

    // --- Integrator ---
    pub ode_rtol: f64,
    pub ode_atol: f64,
    pub ode_max_steps: usize,
    pub ode_min_step: f64,
    pub ode_step_growth: f64,

    // --- Reionization ---
    pub reionization_z_start_max: f64,
    pub reionization_sampling: f64,
    pub reionization_max_step: f64,
    pub reionization_min_step: f64,
    pub reionization_optical_depth_tol: f64,
    pub reionization_max_iter: usize,
    pub reionization_exponent: f64,
    pub reionization_width: f64,
    pub reionization_start_factor: f64,
    pub helium_fullreio_redshift: f64,
    pub helium_fullreio_width: f64,

    // --- Visibility ---
    pub visibility_threshold_free_streaming: f64,
    pub visibility_z_min: f64,
    pub visibility_z_max: f64,
}

impl ThermoPrecision {
    /// Equivalent to [`ThermoPrecision::default()`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a [`ThermoPrecisionBuilder`] initialized with the defaults.
    pub fn builder() -> ThermoPrecisionBuilder {
        ThermoPrecisionBuilder::new()
    }

    /// Step control of the recombination integrator.
    pub(crate) fn step_control(&self) -> StepControl {
        StepControl {
            rtol: self.ode_rtol,
            atol: self.ode_atol,
            min_step: self.ode_min_step,
            max_steps: self.ode_max_steps,
            max_growth: self.ode_step_growth,
        }
    }

    /// Highest reionization redshift reachable by the optical depth search.
    pub fn reionization_z_reio_max(&self) -> f64 {
        self.reionization_z_start_max - self.reionization_start_factor * self.reionization_width
    }
}

impl Default for ThermoPrecision {
    fn default() -> Self {
        ThermoPrecision {
            recfast_z_initial: 1.0e4,
            recfast_nz0: 10_000,
            recfast_fudge_h: 1.14,
            recfast_fudge_he: 0.86,
            recfast_heswitch: 6,
            recfast_h_frac: 1.0e-3,
            recfast_z_he_1: 8000.,
            recfast_delta_z_he_1: 50.,
            recfast_z_he_2: 5000.,
            recfast_delta_z_he_2: 100.,
            recfast_z_he_3: 3500.,
            recfast_delta_z_he_3: 50.,
            recfast_x_he0_trigger: 0.995,
            recfast_x_he0_trigger2: 0.995,
            recfast_x_he0_trigger_delta: 0.05,
            recfast_x_h0_trigger: 0.995,
            recfast_x_h0_trigger2: 0.995,
            recfast_x_h0_trigger_delta: 0.05,

            ode_rtol: 1.0e-6,
            ode_atol: 1.0e-10,
            ode_max_steps: 10_000,
            ode_min_step: 1.0e-10,
            ode_step_growth: 5.,

            reionization_z_start_max: 50.,
            reionization_sampling: 5.0e-2,
            reionization_max_step: 0.1,
            reionization_min_step: 1.0e-6,
            reionization_optical_depth_tol: 1.0e-4,
            reionization_max_iter: 100,
            reionization_exponent: 1.5,
            reionization_width: 0.5,
            reionization_start_factor: 8.,
            helium_fullreio_redshift: 3.5,
            helium_fullreio_width: 0.5,

            visibility_threshold_free_streaming: 1.0e-2,
            visibility_z_min: 500.,
            visibility_z_max: 2000.,
        }
    }
}

/// Builder for [`ThermoPrecision`], with validation.
#[derive(Debug, Clone, Default)]
pub struct ThermoPrecisionBuilder {
    params: ThermoPrecision,
}

impl ThermoPrecisionBuilder {
    /// Create a new builder initialized with default values.
    pub fn new() -> Self {
        Self {
            params: ThermoPrecision::default(),
        }
    }

    // --- Recombination ---
    pub fn recfast_z_initial(mut self, v: f64) -> Self {
        self.params.recfast_z_initial = v;
        self
    }
    pub fn recfast_nz0(mut self, v: usize) -> Self {
        self.params.recfast_nz0 = v;
        self
    }
    pub fn recfast_fudge_h(mut self, v: f64) -> Self {
        self.params.recfast_fudge_h = v;
        self
    }
    pub fn recfast_fudge_he(mut self, v: f64) -> Self {
        self.params.recfast_fudge_he = v;
        self
    }
    pub fn recfast_heswitch(mut self, v: u8) -> Self {
        self.params.recfast_heswitch = v;
        self
    }
    pub fn recfast_h_frac(mut self, v: f64) -> Self {
        self.params.recfast_h_frac = v;
        self
    }
    pub fn recfast_z_he_1(mut self, z: f64, delta: f64) -> Self {
        self.params.recfast_z_he_1 = z;
        self.params.recfast_delta_z_he_1 = delta;
        self
    }
    pub fn recfast_z_he_2(mut self, z: f64, delta: f64) -> Self {
        self.params.recfast_z_he_2 = z;
        self.params.recfast_delta_z_he_2 = delta;
        self
    }
    pub fn recfast_z_he_3(mut self, z: f64, delta: f64) -> Self {
        self.params.recfast_z_he_3 = z;
        self.params.recfast_delta_z_he_3 = delta;
        self
    }
    pub fn recfast_x_he0_trigger(mut self, trigger: f64, trigger2: f64, delta: f64) -> Self {
        self.params.recfast_x_he0_trigger = trigger;
        self.params.recfast_x_he0_trigger2 = trigger2;
        self.params.recfast_x_he0_trigger_delta = delta;
        self
    }
    pub fn recfast_x_h0_trigger(mut self, trigger: f64, trigger2: f64, delta: f64) -> Self {
        self.params.recfast_x_h0_trigger = trigger;
        self.params.recfast_x_h0_trigger2 = trigger2;
        self.params.recfast_x_h0_trigger_delta = delta;
        self
    }

    // --- Integrator ---
    pub fn ode_rtol(mut self, v: f64) -> Self {
        self.params.ode_rtol = v;
        self
    }
    pub fn ode_atol(mut self, v: f64) -> Self {
        self.params.ode_atol = v;
        self
    }
    pub fn ode_max_steps(mut self, v: usize) -> Self {
        self.params.ode_max_steps = v;
        self
    }
    pub fn ode_min_step(mut self, v: f64) -> Self {
        self.params.ode_min_step = v;
        self
    }
    pub fn ode_step_growth(mut self, v: f64) -> Self {
        self.params.ode_step_growth = v;
        self
    }

    // --- Reionization ---
    pub fn reionization_z_start_max(mut self, v: f64) -> Self {
        self.params.reionization_z_start_max = v;
        self
    }
    pub fn reionization_sampling(mut self, v: f64) -> Self {
        self.params.reionization_sampling = v;
        self
    }
    pub fn reionization_max_step(mut self, v: f64) -> Self {
        self.params.reionization_max_step = v;
        self
    }
    pub fn reionization_min_step(mut self, v: f64) -> Self {
        self.params.reionization_min_step = v;
        self
    }
    pub fn reionization_optical_depth_tol(mut self, v: f64) -> Self {
        self.params.reionization_optical_depth_tol = v;
        self
    }
    pub fn reionization_max_iter(mut self, v: usize) -> Self {
        self.params.reionization_max_iter = v;
        self
    }
    pub fn reionization_exponent(mut self, v: f64) -> Self {
        self.params.reionization_exponent = v;
        self
    }
    pub fn reionization_width(mut self, v: f64) -> Self {
        self.params.reionization_width = v;
        self
    }
    pub fn reionization_start_factor(mut self, v: f64) -> Self {
        self.params.reionization_start_factor = v;
        self
    }
    pub fn helium_fullreio(mut self, redshift: f64, width: f64) -> Self {
        self.params.helium_fullreio_redshift = redshift;
        self.params.helium_fullreio_width = width;
        self
    }

    // --- Visibility ---
    pub fn visibility_threshold_free_streaming(mut self, v: f64) -> Self {
        self.params.visibility_threshold_free_streaming = v;
        self
    }

    /// Redshift window searched for the visibility peak.
    pub fn visibility_window(mut self, z_min: f64, z_max: f64) -> Self {
        self.params.visibility_z_min = z_min;
        self.params.visibility_z_max = z_max;
        self
    }

    // ---- Numeric helpers for PartialOrd (handle NaN as invalid) ----

    /// Return true iff x > 0.0 and comparable (i.e., not NaN).
    #[inline]
    fn gt0(x: f64) -> bool {
        x.partial_cmp(&0.0) == Some(Greater)
    }

    /// Return true iff x >= 0.0 and comparable (i.e., not NaN).
    #[inline]
    fn ge0(x: f64) -> bool {
        matches!(x.partial_cmp(&0.0), Some(Greater) | Some(Equal))
    }

    /// Return true iff a < b and comparable (i.e., not NaN).
    #[inline]
    fn lt(a: f64, b: f64) -> bool {
        a.partial_cmp(&b) == Some(Less)
    }

    /// Return true iff a <= b and comparable (i.e., not NaN).
    #[inline]
    fn le(a: f64, b: f64) -> bool {
        matches!(a.partial_cmp(&b), Some(Less) | Some(Equal))
    }

    /// Finalize the builder and produce a [`ThermoPrecision`] instance.
    ///
    /// Validation rules
    /// -----------------
    /// * `recfast_nz0 ≥ 2`, `recfast_z_initial > recfast_z_he_1 + recfast_delta_z_he_1`.
    /// * `0 < recfast_z_he_3 < recfast_z_he_2 < recfast_z_he_1`, every helium half-width `> 0`.
    /// * Fudge factors and `recfast_h_frac` `> 0`, `recfast_heswitch ≤ 6`.
    /// * Saha triggers in `(0, 1]`, their deltas `> 0`.
    /// * `ode_rtol > 0`, `ode_atol > 0`, `ode_min_step > 0`, `ode_max_steps ≥ 1`, `ode_step_growth > 1`.
    /// * `0 < reionization_min_step ≤ reionization_max_step`, `reionization_sampling > 0`,
    ///   `reionization_optical_depth_tol > 0`, `reionization_max_iter ≥ 1`.
    /// * `reionization_exponent`, `reionization_width`, `reionization_start_factor` `> 0` and
    ///   `reionization_start_factor × reionization_width < reionization_z_start_max`.
    /// * `reionization_z_start_max < recfast_z_initial`.
    /// * `helium_fullreio_redshift ≥ 0`, `helium_fullreio_width > 0`.
    /// * `0 < visibility_threshold_free_streaming < 1`.
    /// * `0 ≤ visibility_z_min < visibility_z_max ≤ recfast_z_initial`.
    ///
    /// Returns
    /// -----------------
    /// * `Ok(ThermoPrecision)` if all values are valid.
    /// * `Err(ThermoError::ConfigurationError)` naming the first rule that fails.
    pub fn build(self) -> Result<ThermoPrecision, ThermoError> {
        self.params.validate()?;
        Ok(self.params)
    }
}

impl ThermoPrecision {
    /// Check the rules documented on [`ThermoPrecisionBuilder::build`].
    ///
    /// Deserialized configurations bypass the builder; the pipeline calls this again before
    /// using them.
    pub fn validate(&self) -> Result<(), ThermoError> {
        type B = ThermoPrecisionBuilder;
        let p = self;
        let fail = |msg: &str| -> Result<(), ThermoError> {
            Err(ThermoError::ConfigurationError(msg.to_string()))
        };

        // --- Recombination grid ---
        if p.recfast_nz0 < 2 {
            return fail("recfast_nz0 must be >= 2");
        }
        if !B::lt(p.recfast_z_he_1 + p.recfast_delta_z_he_1, p.recfast_z_initial) {
            return fail("recfast_z_initial must be above recfast_z_he_1 + recfast_delta_z_he_1");
        }

        // --- Helium regimes ---
        if !(B::gt0(p.recfast_z_he_3)
            && B::lt(p.recfast_z_he_3, p.recfast_z_he_2)
            && B::lt(p.recfast_z_he_2, p.recfast_z_he_1))
        {
            return fail("require 0 < recfast_z_he_3 < recfast_z_he_2 < recfast_z_he_1");
        }
        if !(B::gt0(p.recfast_delta_z_he_1)
            && B::gt0(p.recfast_delta_z_he_2)
            && B::gt0(p.recfast_delta_z_he_3))
        {
            return fail("helium regime half-widths must be > 0");
        }

        // --- Rate law ---
        if !(B::gt0(p.recfast_fudge_h) && B::gt0(p.recfast_fudge_he)) {
            return fail("RECFAST fudge factors must be > 0");
        }
        if !B::gt0(p.recfast_h_frac) {
            return fail("recfast_h_frac must be > 0");
        }
        if p.recfast_heswitch > 6 {
            return fail("recfast_heswitch must be in 0..=6");
        }
        for trigger in [
            p.recfast_x_he0_trigger,
            p.recfast_x_he0_trigger2,
            p.recfast_x_h0_trigger,
            p.recfast_x_h0_trigger2,
        ] {
            if !(B::gt0(trigger) && B::le(trigger, 1.)) {
                return fail("Saha triggers must be in (0, 1]");
            }
        }
        if !(B::gt0(p.recfast_x_he0_trigger_delta) && B::gt0(p.recfast_x_h0_trigger_delta)) {
            return fail("Saha trigger deltas must be > 0");
        }

        // --- Integrator ---
        if !(B::gt0(p.ode_rtol) && B::gt0(p.ode_atol)) {
            return fail("ode_rtol and ode_atol must be > 0");
        }
        if !B::gt0(p.ode_min_step) {
            return fail("ode_min_step must be > 0");
        }
        if p.ode_max_steps == 0 {
            return fail("ode_max_steps must be >= 1");
        }
        if !B::lt(1., p.ode_step_growth) {
            return fail("ode_step_growth must be > 1");
        }

        // --- Reionization ---
        if !(B::gt0(p.reionization_min_step)
            && B::le(p.reionization_min_step, p.reionization_max_step))
        {
            return fail("require 0 < reionization_min_step <= reionization_max_step");
        }
        if !B::gt0(p.reionization_sampling) {
            return fail("reionization_sampling must be > 0");
        }
        if !B::gt0(p.reionization_optical_depth_tol) {
            return fail("reionization_optical_depth_tol must be > 0");
        }
        if p.reionization_max_iter == 0 {
            return fail("reionization_max_iter must be >= 1");
        }
        if !(B::gt0(p.reionization_exponent)
            && B::gt0(p.reionization_width)
            && B::gt0(p.reionization_start_factor))
        {
            return fail("reionization exponent, width and start factor must be > 0");
        }
        if !B::gt0(p.reionization_z_reio_max()) {
            return fail("reionization_start_factor * reionization_width must be below reionization_z_start_max");
        }
        if !B::lt(p.reionization_z_start_max, p.recfast_z_initial) {
            return fail("reionization_z_start_max must be below recfast_z_initial");
        }
        if !(B::ge0(p.helium_fullreio_redshift) && B::gt0(p.helium_fullreio_width)) {
            return fail("require helium_fullreio_redshift >= 0 and helium_fullreio_width > 0");
        }

        // --- Visibility ---
        if !(B::gt0(p.visibility_threshold_free_streaming)
            && B::lt(p.visibility_threshold_free_streaming, 1.))
        {
            return fail("visibility_threshold_free_streaming must be in (0, 1)");
        }
        if !(B::ge0(p.visibility_z_min)
            && B::lt(p.visibility_z_min, p.visibility_z_max)
            && B::le(p.visibility_z_max, p.recfast_z_initial))
        {
            return fail("require 0 <= visibility_z_min < visibility_z_max <= recfast_z_initial");
        }

        Ok(())
    }
}

impl fmt::Display for ThermoPrecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if f.alternate() {
            const PARAM_COL: usize = 52; // width reserved for "name = value"
            writeln!(f, "Thermodynamics Precision Parameters")?;
            writeln!(f, "-----------------------------------")?;

            macro_rules! line {
                ($fmt:expr, $val:expr, $comment:expr) => {{
                    let s = format!($fmt, $val);
                    let pad = if s.len() < PARAM_COL {
                        " ".repeat(PARAM_COL - s.len())
                    } else {
                        " ".to_string()
                    };
                    writeln!(f, "  {}{}# {}", s, pad, $comment)
                }};
            }

            writeln!(f, "[Recombination]")?;
            line!(
                "recfast_z_initial            = {:.1}",
                self.recfast_z_initial,
                "Start of the recombination history"
            )?;
            line!(
                "recfast_nz0                  = {}",
                self.recfast_nz0,
                "Number of redshift steps"
            )?;
            line!(
                "recfast_fudge_h              = {:.3}",
                self.recfast_fudge_h,
                "Hydrogen fudge factor"
            )?;
            line!(
                "recfast_fudge_he             = {:.3}",
                self.recfast_fudge_he,
                "Helium fudge factor"
            )?;
            line!(
                "recfast_heswitch             = {}",
                self.recfast_heswitch,
                "Helium corrections level"
            )?;
            line!(
                "recfast_h_frac               = {:.1e}",
                self.recfast_h_frac,
                "Tight coupling switch on t_Th / t_H"
            )?;
            line!(
                "recfast_z_he_1 / delta       = {}",
                format!("{:.0} / {:.0}", self.recfast_z_he_1, self.recfast_delta_z_he_1),
                "HeIII Saha regime"
            )?;
            line!(
                "recfast_z_he_2 / delta       = {}",
                format!("{:.0} / {:.0}", self.recfast_z_he_2, self.recfast_delta_z_he_2),
                "HeII plateau"
            )?;
            line!(
                "recfast_z_he_3 / delta       = {}",
                format!("{:.0} / {:.0}", self.recfast_z_he_3, self.recfast_delta_z_he_3),
                "HeII Saha regime"
            )?;
            line!(
                "recfast_x_he0_trigger        = {}",
                format!(
                    "{:.3} / {:.3} / {:.3}",
                    self.recfast_x_he0_trigger,
                    self.recfast_x_he0_trigger2,
                    self.recfast_x_he0_trigger_delta
                ),
                "Helium Saha exit (trigger / trigger2 / delta)"
            )?;
            line!(
                "recfast_x_h0_trigger         = {}",
                format!(
                    "{:.3} / {:.3} / {:.3}",
                    self.recfast_x_h0_trigger,
                    self.recfast_x_h0_trigger2,
                    self.recfast_x_h0_trigger_delta
                ),
                "Hydrogen Saha exit (trigger / trigger2 / delta)"
            )?;

            writeln!(f, "\n[Integrator]")?;
            line!(
                "ode_rtol                     = {:.1e}",
                self.ode_rtol,
                "Relative tolerance"
            )?;
            line!(
                "ode_atol                     = {:.1e}",
                self.ode_atol,
                "Absolute tolerance"
            )?;
            line!(
                "ode_max_steps                = {}",
                self.ode_max_steps,
                "Step budget per interval"
            )?;
            line!(
                "ode_min_step                 = {:.1e}",
                self.ode_min_step,
                "Step underflow threshold"
            )?;
            line!(
                "ode_step_growth              = {:.2}",
                self.ode_step_growth,
                "Maximum step growth"
            )?;

            writeln!(f, "\n[Reionization]")?;
            line!(
                "reionization_z_start_max     = {:.1}",
                self.reionization_z_start_max,
                "Largest start redshift"
            )?;
            line!(
                "reionization_sampling        = {:.1e}",
                self.reionization_sampling,
                "Relative variation of dkappa/dz per sample"
            )?;
            line!(
                "reionization_max_step        = {:.1e}",
                self.reionization_max_step,
                "Largest sampling step"
            )?;
            line!(
                "reionization_min_step        = {:.1e}",
                self.reionization_min_step,
                "Smallest sampling step"
            )?;
            line!(
                "reionization_optical_depth_tol = {:.1e}",
                self.reionization_optical_depth_tol,
                "Relative tolerance on tau"
            )?;
            line!(
                "reionization_max_iter        = {}",
                self.reionization_max_iter,
                "Root search budget"
            )?;
            line!(
                "reionization_exponent        = {:.2}",
                self.reionization_exponent,
                "Hydrogen transition exponent"
            )?;
            line!(
                "reionization_width           = {:.2}",
                self.reionization_width,
                "Hydrogen transition width"
            )?;
            line!(
                "reionization_start_factor    = {:.1}",
                self.reionization_start_factor,
                "Start redshift offset in widths"
            )?;
            line!(
                "helium_fullreio              = {}",
                format!(
                    "{:.2} / {:.2}",
                    self.helium_fullreio_redshift, self.helium_fullreio_width
                ),
                "Helium full reionization (redshift / width)"
            )?;

            writeln!(f, "\n[Visibility]")?;
            line!(
                "visibility_threshold_free_streaming = {:.1e}",
                self.visibility_threshold_free_streaming,
                "Fraction of the peak"
            )?;
            line!(
                "visibility_z_min / max       = {}",
                format!("{:.0} / {:.0}", self.visibility_z_min, self.visibility_z_max),
                "Peak search window"
            )?;

            Ok(())
        } else {
            write!(
                f,
                "ThermoPrecision(z_initial={:.0}, nz0={}, heswitch={}, rtol={:.1e}, atol={:.1e}, z_start_max={:.1}, tau_tol={:.1e}, fs_threshold={:.1e})",
                self.recfast_z_initial,
                self.recfast_nz0,
                self.recfast_heswitch,
                self.ode_rtol,
                self.ode_atol,
                self.reionization_z_start_max,
                self.reionization_optical_depth_tol,
                self.visibility_threshold_free_streaming,
            )
        }
    }
}

#[cfg(test)]
mod precision_test {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let precision = ThermoPrecision::builder().build().unwrap();
        assert_eq!(precision, ThermoPrecision::default());
        assert_eq!(precision.reionization_z_reio_max(), 46.);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let cases = [
            ThermoPrecision::builder().recfast_nz0(1),
            ThermoPrecision::builder().recfast_heswitch(7),
            ThermoPrecision::builder().ode_rtol(0.),
            ThermoPrecision::builder().ode_atol(f64::NAN),
            ThermoPrecision::builder().ode_step_growth(1.),
            ThermoPrecision::builder().recfast_z_he_2(9000., 100.),
            ThermoPrecision::builder().reionization_min_step(1.),
            ThermoPrecision::builder().reionization_width(10.),
            ThermoPrecision::builder().visibility_threshold_free_streaming(1.),
            ThermoPrecision::builder().visibility_window(2000., 500.),
            ThermoPrecision::builder().visibility_window(500., 2e4),
            ThermoPrecision::builder().recfast_x_h0_trigger(1.2, 0.995, 0.05),
            ThermoPrecision::builder().recfast_z_initial(7000.),
        ];
        for builder in cases {
            assert!(matches!(
                builder.build(),
                Err(ThermoError::ConfigurationError(_))
            ));
        }
    }

    #[test]
    fn test_display() {
        let precision = ThermoPrecision::default();
        let compact = format!("{precision}");
        assert!(compact.starts_with("ThermoPrecision(z_initial=10000, nz0=10000"));
        let table = format!("{precision:#}");
        assert!(table.contains("[Reionization]"));
        assert!(table.contains("recfast_fudge_h              = 1.140"));
    }

    #[test]
    fn test_step_control() {
        let control = ThermoPrecision::builder()
            .ode_rtol(1e-8)
            .ode_max_steps(42)
            .build()
            .unwrap()
            .step_control();
        assert_eq!(control.rtol, 1e-8);
        assert_eq!(control.max_steps, 42);
        assert_eq!(control.max_growth, 5.);
    }
}
