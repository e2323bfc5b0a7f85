//! # Reionization engine
//!
//! Late-time ionization history on top of the recombination history, for the CAMB-like
//! parametrization of [`ReionizationScheme::Camb`](crate::thermo_params::ReionizationScheme).
//!
//! ## Overview
//!
//! 1. Fix the profile ([`profile::ReionizationParameters`]) from the reionization redshift, or
//!    from the optical depth by a Brent root search over the redshift.
//! 2. Sample the profile from `z_start` down to z = 0, with a step halved until `dκ/dz` varies
//!    by less than `reionization_sampling` between two samples. The merged table takes the
//!    recombination rows strictly above `z_start`.
//! 3. Integrate the baryon temperature along the samples with the Compton-coupling law of the
//!    recombination stage, then derive `cb2` and `dcb2`.
//! 4. Integrate `dκ/dz` into the optical depth, with the analytic `d³κ/dz³` as the spline
//!    second derivatives.
//!
//! ## See also
//!
//! * [`crate::recombination`] – provides the starting point and the rate-law coefficients.
//! * [`crate::merge`] – splices the reionization table in front of the recombination table.
use std::cell::Cell;

use roots::{find_root_brent, SearchError, SimpleConvergency};
use tracing::{debug, info};

use crate::background::Background;
use crate::constants::{Redshift, C_LIGHT, MPC_OVER_M};
use crate::indices::{IndexRegistry, RecombinationQuantity, ReionizationQuantity};
use crate::numerics::spline::interval_integral;
use crate::precision::ThermoPrecision;
use crate::recombination::recfast::RecfastCoefficients;
use crate::recombination::{conformal_time_derivative, RecombinationHistory};
use crate::table::ColumnTable;
use crate::thermo_errors::ThermoError;
use crate::thermo_params::ReionizationInput;

pub mod profile;

use profile::{interpolate_column, ReionizationParameters};

/// Reionization history, increasing in redshift from z = 0.
pub type ReionizationTable = ColumnTable<ReionizationQuantity>;

/// Result of the reionization stage.
#[derive(Debug, Clone)]
pub struct ReionizationHistory {
    pub table: ReionizationTable,
    pub parameters: ReionizationParameters,
    /// Thomson optical depth integrated over the table.
    pub optical_depth: f64,
}

/// Samples of the profile, ordered by decreasing redshift.
struct ProfileSamples {
    z: Vec<f64>,
    xe: Vec<f64>,
    dkappa_dz: Vec<f64>,
    d3kappa_dz3: Vec<f64>,
}

impl ProfileSamples {
    /// `∫ dκ/dz dz` over the sampled range.
    fn optical_depth(&self) -> f64 {
        (0..self.z.len().saturating_sub(1))
            .map(|i| {
                interval_integral(
                    self.z[i] - self.z[i + 1],
                    [self.dkappa_dz[i], self.dkappa_dz[i + 1]],
                    [self.d3kappa_dz3[i], self.d3kappa_dz3[i + 1]],
                )
            })
            .sum()
    }
}

/// Everything the profile sampling needs besides the profile itself.
struct Sampler<'a> {
    coefficients: &'a RecfastCoefficients,
    background: &'a dyn Background,
    precision: &'a ThermoPrecision,
}

impl Sampler<'_> {
    /// `(x_e, dκ/dz, d³κ/dz³)` at `z`.
    ///
    /// With `c0 = N_now σ_T`, `P = (1+z)² / H` and `dκ/dz = c0 x_e P`, the third derivative is
    /// `c0 (x_e'' P + 2 x_e' P' + x_e P'')`.
    fn optical_depth_derivatives(
        &self,
        parameters: &ReionizationParameters,
        z: Redshift,
    ) -> Result<(f64, f64, f64), ThermoError> {
        let profile = parameters.xe(z);
        let point = self.background.at_z(z)?;
        let (h, dh, ddh) = (point.hubble, point.dhubble_dz, point.d2hubble_dz2);
        let x = 1. + z;
        let c0 = self.coefficients.dkappa(0., 1.);

        let p = x * x / h;
        let dp = 2. * x / h - x * x * dh / (h * h);
        let ddp = 2. / h - 4. * x * dh / (h * h) - x * x * ddh / (h * h)
            + 2. * x * x * dh * dh / (h * h * h);

        let dkappa_dz = c0 * profile.xe * p;
        let d3kappa_dz3 =
            c0 * (profile.d2xe_dz2 * p + 2. * profile.dxe_dz * dp + profile.xe * ddp);
        Ok((profile.xe, dkappa_dz, d3kappa_dz3))
    }

    /// Adaptive sampling of the profile down to z = 0.
    fn sample(&self, parameters: &ReionizationParameters) -> Result<ProfileSamples, ThermoError> {
        let p = self.precision;
        let mut z = parameters.z_start;
        let (xe, dkappa_dz, d3kappa_dz3) = self.optical_depth_derivatives(parameters, z)?;
        let mut samples = ProfileSamples {
            z: vec![z],
            xe: vec![xe],
            dkappa_dz: vec![dkappa_dz],
            d3kappa_dz3: vec![d3kappa_dz3],
        };

        while z > 0. {
            let current = samples.dkappa_dz[samples.dkappa_dz.len() - 1];
            let mut dz = p.reionization_max_step;
            let (z_next, next) = loop {
                let z_next = (z - dz).max(0.);
                let next = self.optical_depth_derivatives(parameters, z_next)?;
                let variation = ((next.1 - current) / current).abs();
                if variation < p.reionization_sampling {
                    break (z_next, next);
                }
                dz /= 2.;
                if dz < p.reionization_min_step {
                    return Err(ThermoError::divergence(
                        "reionization sampling",
                        z,
                        dz,
                        samples.z.len(),
                        format!(
                            "relative variation of dkappa/dz still {variation:.3e} at the smallest step"
                        ),
                    ));
                }
            };
            z = z_next;
            samples.z.push(z_next);
            samples.xe.push(next.0);
            samples.dkappa_dz.push(next.1);
            samples.d3kappa_dz3.push(next.2);
        }
        Ok(samples)
    }

    /// Optical depth of the profile starting at `z_reio`.
    fn optical_depth(
        &self,
        z_reio: Redshift,
        recombination: &RecombinationHistory,
    ) -> Result<f64, ThermoError> {
        let parameters = ReionizationParameters::new(
            z_reio,
            self.precision,
            self.coefficients,
            &recombination.table,
        )?;
        Ok(self.sample(&parameters)?.optical_depth())
    }
}

/// Build the reionization history.
///
/// Arguments
/// -----------------
/// * `input`: reionization redshift, or optical depth to match.
/// * `precision`: sampling, profile shape and root search settings.
/// * `background`: expansion history, with `dH/dz` and `d²H/dz²`.
/// * `recombination`: history the reionization starts from.
/// * `layout`: column layout of the output table.
///
/// Return
/// ----------
/// * The [`ReionizationHistory`], ordered by increasing redshift from z = 0.
/// * [`ThermoError::ConfigurationError`] if the profile would start above
///   `reionization_z_start_max`.
/// * [`ThermoError::UnreachableOpticalDepth`] if the target optical depth is outside what the
///   admissible reionization redshifts produce.
/// * [`ThermoError::NumericalDivergence`] if the sampling or the root search fails.
pub fn reionization_camb(
    input: ReionizationInput,
    precision: &ThermoPrecision,
    background: &dyn Background,
    recombination: &RecombinationHistory,
    layout: IndexRegistry<ReionizationQuantity>,
) -> Result<ReionizationHistory, ThermoError> {
    let sampler = Sampler {
        coefficients: &recombination.coefficients,
        background,
        precision,
    };

    let z_reio = match input {
        ReionizationInput::Redshift(z_reio) => z_reio,
        ReionizationInput::OpticalDepth(target) => {
            search_reionization_redshift(&sampler, target, recombination)?
        }
    };

    let parameters = ReionizationParameters::new(
        z_reio,
        precision,
        &recombination.coefficients,
        &recombination.table,
    )?;
    let samples = sampler.sample(&parameters)?;
    let optical_depth = samples.optical_depth();
    if let ReionizationInput::OpticalDepth(target) = input {
        check_optical_depth(precision, target, z_reio, optical_depth)?;
    }
    let table = build_table(&sampler, samples, recombination, layout)?;

    info!(
        "reionization: z_reio = {:.4}, tau_reio = {:.6}, {} rows below z = {:.2}",
        z_reio,
        optical_depth,
        table.len(),
        parameters.z_start
    );

    Ok(ReionizationHistory {
        table,
        parameters,
        optical_depth,
    })
}

/// Reionization redshift whose optical depth is `target`.
fn search_reionization_redshift(
    sampler: &Sampler,
    target: f64,
    recombination: &RecombinationHistory,
) -> Result<Redshift, ThermoError> {
    let precision = sampler.precision;
    let z_sup = precision.reionization_z_reio_max();
    let tau_min = sampler.optical_depth(0., recombination)?;
    let tau_max = sampler.optical_depth(z_sup, recombination)?;
    debug!(
        "reionization: optical depth spans [{:.6}, {:.6}] for z_reio in [0, {:.2}]",
        tau_min, tau_max, z_sup
    );
    if !(tau_min..=tau_max).contains(&target) {
        return Err(ThermoError::UnreachableOpticalDepth {
            target,
            tau_min,
            tau_max,
        });
    }

    // the root finder only sees numbers; the first failure is kept aside
    let failure: Cell<Option<ThermoError>> = Cell::new(None);
    let residual = |z_reio: f64| match sampler.optical_depth(z_reio, recombination) {
        Ok(tau) => tau - target,
        Err(err) => {
            failure.set(Some(err));
            f64::NAN
        }
    };

    let mut tol = SimpleConvergency {
        eps: precision.reionization_optical_depth_tol * target,
        max_iter: precision.reionization_max_iter,
    };
    let found = find_root_brent(0., z_sup, &residual, &mut tol);
    if let Some(err) = failure.take() {
        return Err(err);
    }
    match found {
        Ok(z_reio) => {
            debug!("reionization: tau = {target} reached at z_reio = {z_reio:.6}");
            Ok(z_reio)
        }
        Err(SearchError::NoConvergency) => Err(ThermoError::divergence(
            "optical depth search",
            z_sup,
            0.,
            precision.reionization_max_iter,
            format!("no reionization redshift found for tau = {target}"),
        )),
        Err(err) => Err(err.into()),
    }
}

/// Reject a root whose optical depth misses `target` by more than the search tolerance.
fn check_optical_depth(
    precision: &ThermoPrecision,
    target: f64,
    z_reio: Redshift,
    optical_depth: f64,
) -> Result<(), ThermoError> {
    let tolerance = precision.reionization_optical_depth_tol * target;
    if (optical_depth - target).abs() > tolerance {
        return Err(ThermoError::divergence(
            "optical depth search",
            z_reio,
            0.,
            precision.reionization_max_iter,
            format!(
                "tau = {optical_depth} at z_reio = {z_reio} misses {target} by more than {tolerance:.3e}"
            ),
        ));
    }
    Ok(())
}

/// Temperatures, sound speed and table assembly for the final samples.
fn build_table(
    sampler: &Sampler,
    samples: ProfileSamples,
    recombination: &RecombinationHistory,
    layout: IndexRegistry<ReionizationQuantity>,
) -> Result<ReionizationTable, ThermoError> {
    let c = sampler.coefficients;
    let background = sampler.background;
    let n = samples.z.len();
    let hubble_si = |z: f64| -> Result<f64, ThermoError> {
        Ok(background.hubble(z)? * C_LIGHT / MPC_OVER_M)
    };

    let mut tb = Vec::with_capacity(n);
    tb.push(interpolate_column(
        &recombination.table,
        RecombinationQuantity::Tb,
        samples.z[0],
    )?);

    // Heun steps towards z = 0
    let mut slope =
        c.temperature_derivative(samples.z[0], samples.xe[0], tb[0], hubble_si(samples.z[0])?);
    let mut slopes = Vec::with_capacity(n);
    slopes.push(slope);
    for i in 0..n - 1 {
        let (z0, z1) = (samples.z[i], samples.z[i + 1]);
        let h = z1 - z0;
        let predicted = tb[i] + h * slope;
        let h1 = hubble_si(z1)?;
        let corrector = c.temperature_derivative(z1, samples.xe[i + 1], predicted, h1);
        let t1 = tb[i] + 0.5 * h * (slope + corrector);
        if !(t1.is_finite() && t1 > 0.) {
            return Err(ThermoError::divergence(
                "reionization temperature",
                z1,
                h,
                i + 1,
                format!("baryon temperature became {t1}"),
            ));
        }
        slope = c.temperature_derivative(z1, samples.xe[i + 1], t1, h1);
        tb.push(t1);
        slopes.push(slope);
    }

    let ProfileSamples {
        mut z,
        mut xe,
        mut dkappa_dz,
        mut d3kappa_dz3,
    } = samples;
    let mut cb2: Vec<f64> = (0..n)
        .map(|i| c.sound_speed_squared(z[i], xe[i], tb[i], slopes[i]))
        .collect();
    for column in [&mut z, &mut xe, &mut dkappa_dz, &mut d3kappa_dz3, &mut tb, &mut cb2] {
        column.reverse();
    }
    let dkappa: Vec<f64> = z.iter().zip(&xe).map(|(&z, &xe)| c.dkappa(z, xe)).collect();
    let dcb2 = conformal_time_derivative(&z, &cb2, background)?;

    let mut table = ColumnTable::new(layout, z)?;
    table.set_column(ReionizationQuantity::Xe, &xe)?;
    table.set_column(ReionizationQuantity::Tb, &tb)?;
    table.set_column(ReionizationQuantity::Cb2, &cb2)?;
    table.set_column(ReionizationQuantity::Dcb2, &dcb2)?;
    table.set_column(ReionizationQuantity::Dkappa, &dkappa)?;
    table.set_column(ReionizationQuantity::DkappaDz, &dkappa_dz)?;
    table.set_column(ReionizationQuantity::D3kappaDz3, &d3kappa_dz3)?;
    Ok(table)
}

#[cfg(test)]
mod reionization_test {
    use super::*;
    use crate::unit_test_global::{BACKGROUND, PRECISION, RECOMBINATION, REIONIZATION_Z11};
    use approx::assert_relative_eq;

    fn run(input: ReionizationInput) -> Result<ReionizationHistory, ThermoError> {
        reionization_camb(
            input,
            &PRECISION,
            &*BACKGROUND,
            &RECOMBINATION,
            IndexRegistry::full(),
        )
    }

    #[test]
    fn test_redshift_input() {
        let history = &*REIONIZATION_Z11;
        let table = &history.table;
        assert_eq!(table.z()[0], 0.);
        assert_eq!(history.parameters.z_start, 15.);
        assert_eq!(*table.z().last().unwrap(), 15.);
        assert!(
            history.optical_depth > 0.05 && history.optical_depth < 0.1,
            "tau = {}",
            history.optical_depth
        );

        let xe = table.column(ReionizationQuantity::Xe).unwrap();
        assert_relative_eq!(xe[0], 1. + 2. * RECOMBINATION.coefficients.f_he);
        assert_relative_eq!(*xe.last().unwrap(), history.parameters.xe_before);
    }

    #[test]
    fn test_sampling_resolves_the_step() {
        let history = &*REIONIZATION_Z11;
        let dkappa_dz = history.table.column(ReionizationQuantity::DkappaDz).unwrap();
        let sampling = PRECISION.reionization_sampling;
        for w in dkappa_dz.windows(2) {
            assert!(((w[0] - w[1]) / w[1]).abs() < sampling);
        }
        let z = history.table.z();
        assert!(z
            .windows(2)
            .all(|w| w[1] - w[0] <= PRECISION.reionization_max_step + 1e-12));
    }

    #[test]
    fn test_temperature_is_heated() {
        let history = &*REIONIZATION_Z11;
        let table = &history.table;
        let tb = table.column(ReionizationQuantity::Tb).unwrap();
        assert!(tb.iter().all(|&t| t > 0.));
        let start = table.len() - 1;
        let recombination = &RECOMBINATION.table;
        let row_15 = recombination.z().partition_point(|&v| v < 15.);
        assert_eq!(
            tb[start],
            recombination.value(row_15, RecombinationQuantity::Tb).unwrap()
        );

        // cb2 only turns negative where Compton heating makes Tb rise with time
        let cb2 = table.column(ReionizationQuantity::Cb2).unwrap();
        assert!(cb2.iter().all(|v| v.is_finite()));
        assert!(cb2[0] > 0. && cb2[start] > 0.);
        let heated: Vec<usize> = (1..table.len()).filter(|&i| cb2[i] < 0.).collect();
        assert!(!heated.is_empty());
        for i in heated {
            assert!(tb[i - 1] > tb[i], "cb2 < 0 without heating at z = {}", table.z()[i]);
        }
    }

    #[test]
    fn test_sampling_starts_at_profile_start() {
        // a start redshift between two recombination grid points is sampled exactly
        let history = run(ReionizationInput::Redshift(8.3)).unwrap();
        let z_start = history.parameters.z_start;
        assert_relative_eq!(z_start, 12.3);
        assert_eq!(*history.table.z().last().unwrap(), z_start);
        assert_relative_eq!(
            *history.table.column(ReionizationQuantity::Xe).unwrap().last().unwrap(),
            history.parameters.xe_before
        );

        // the whole profile is integrated even when it starts below the first grid step
        let early = run(ReionizationInput::Redshift(0.)).unwrap();
        assert!(early.optical_depth > 0., "tau = {}", early.optical_depth);
        let later = run(ReionizationInput::Redshift(0.5)).unwrap();
        assert!(later.optical_depth > early.optical_depth);
    }

    #[test]
    fn test_optical_depth_input() {
        let target = 0.066;
        let history = run(ReionizationInput::OpticalDepth(target)).unwrap();
        let z_reio = history.parameters.z_reio;
        assert!(z_reio > 7. && z_reio < 10., "z_reio = {z_reio}");
        let tolerance = PRECISION.reionization_optical_depth_tol;
        assert!(
            (history.optical_depth - target).abs() <= tolerance * target,
            "tau = {}",
            history.optical_depth
        );

        let forward = run(ReionizationInput::Redshift(z_reio)).unwrap();
        assert_relative_eq!(forward.optical_depth, history.optical_depth, max_relative = 1e-12);
    }

    #[test]
    fn test_unreachable_optical_depth() {
        assert!(matches!(
            run(ReionizationInput::OpticalDepth(5.)),
            Err(ThermoError::UnreachableOpticalDepth { .. })
        ));
        for target in [1e-4, 1e-8] {
            let err = run(ReionizationInput::OpticalDepth(target)).unwrap_err();
            let ThermoError::UnreachableOpticalDepth { tau_min, .. } = err else {
                panic!("unexpected error {err}");
            };
            assert!(tau_min > target, "tau_min = {tau_min}");
        }
    }

    #[test]
    fn test_missed_optical_depth_is_rejected() {
        assert!(check_optical_depth(&PRECISION, 0.066, 8., 0.066 * (1. + 1e-6)).is_ok());
        assert!(matches!(
            check_optical_depth(&PRECISION, 0.066, 8., 0.),
            Err(ThermoError::NumericalDivergence { .. })
        ));
    }

    #[test]
    fn test_start_above_limit() {
        assert!(matches!(
            run(ReionizationInput::Redshift(47.)),
            Err(ThermoError::ConfigurationError(_))
        ));
    }
}
