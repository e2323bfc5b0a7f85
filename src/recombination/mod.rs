//! # Recombination engine
//!
//! Ionization and temperature history from a fully ionized plasma at `recfast_z_initial` down
//! to z = 0, with the RECFAST 1.4 rate law ([`recfast`]).
//!
//! ## Overview
//!
//! The redshift range is split into `recfast_nz0` equal steps. On each step the history is in
//! one of six regimes:
//!
//! 1. everything ionized, `x_e = 1 + 2 f_He`;
//! 2. HeIII ⇌ HeII in Saha equilibrium;
//! 3. helium singly ionized, `x_e = 1 + f_He`;
//! 4. HeII ⇌ HeI in Saha equilibrium, while `x_He` stays above `recfast_x_he0_trigger`;
//! 5. helium integrated, hydrogen in Saha equilibrium, while `x_H` stays above
//!    `recfast_x_h0_trigger`;
//! 6. full integration of `(x_H, x_He, T_mat)`.
//!
//! Regime changes are never hard switches: each new value is blended with the previous regime
//! through the smooth steps of [`crate::numerics::smoothstep`] over a configurable width, so the
//! tabulated `x_e` and its derivatives stay continuous.
//!
//! ## Output
//!
//! A [`RecombinationTable`] ordered by increasing redshift with `xe`, `Tb`, `cb2`, `dcb2` and
//! `dkappa`, plus the [`RecfastCoefficients`] reused by the reionization stage.
use nalgebra::Vector3;
use tracing::{debug, info};

use crate::background::Background;
use crate::indices::{IndexRegistry, RecombinationQuantity};
use crate::numerics::ode::{CashKarp, OdeSystem};
use crate::numerics::smoothstep::{f1, f2};
use crate::precision::ThermoPrecision;
use crate::table::ColumnTable;
use crate::thermo_errors::ThermoError;
use crate::thermo_params::ThermoParams;

pub mod recfast;

use recfast::{RecfastCoefficients, RecfastSystem};

/// Recombination history, increasing in redshift.
pub type RecombinationTable = ColumnTable<RecombinationQuantity>;

/// Result of the recombination stage.
#[derive(Debug, Clone)]
pub struct RecombinationHistory {
    pub table: RecombinationTable,
    pub coefficients: RecfastCoefficients,
}

/// Regime of the recombination history on one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Regime {
    FullyIonized,
    HeliumIIISaha,
    HeliumSinglyIonized,
    HeliumIISaha,
    HydrogenSaha,
    FullIntegration,
}

/// Integrate the recombination history.
///
/// Arguments
/// -----------------
/// * `params`: validated physical inputs.
/// * `precision`: validated precision parameters.
/// * `background`: expansion history.
/// * `layout`: column layout of the output table.
///
/// Return
/// ----------
/// * The [`RecombinationHistory`], or
///   [`ThermoError::NumericalDivergence`] if the stepper fails or the history stops being finite.
pub fn recombination_with_recfast(
    params: &ThermoParams,
    precision: &ThermoPrecision,
    background: &dyn Background,
    layout: IndexRegistry<RecombinationQuantity>,
) -> Result<RecombinationHistory, ThermoError> {
    let coefficients = RecfastCoefficients::new(params, precision, background);
    let c = &coefficients;
    let system = RecfastSystem::new(c, background);
    let solver = CashKarp::new("recombination", precision.step_control());

    let nz = precision.recfast_nz0;
    let z_initial = precision.recfast_z_initial;
    let redshift_at = |i: usize| z_initial * (nz - i) as f64 / nz as f64;

    let p = precision;
    let mut y = Vector3::new(1., 1., c.t_now * (1. + z_initial));
    let mut xe_column = Vec::with_capacity(nz + 1);
    let mut tb_column = Vec::with_capacity(nz + 1);
    let mut cb2_column = Vec::with_capacity(nz + 1);

    let mut push_row = |z: f64, x0: f64, y: &Vector3<f64>| -> Result<(), ThermoError> {
        let dy = system.rhs(z, y)?;
        let cb2 = c.sound_speed_squared(z, x0, y[2], dy[2]);
        if !(x0.is_finite() && cb2.is_finite()) {
            return Err(ThermoError::divergence(
                "recombination",
                z,
                0.,
                xe_column.len(),
                "non-finite ionization fraction or sound speed",
            ));
        }
        xe_column.push(x0);
        tb_column.push(y[2]);
        cb2_column.push(cb2);
        Ok(())
    };

    push_row(z_initial, c.xe_fully_ionized(), &y)?;

    let mut regime = Regime::FullyIonized;
    let mut step_hint: Option<f64> = None;
    for i in 0..nz {
        let z_start = redshift_at(i);
        let z = redshift_at(i + 1);
        let trad = c.t_now * (1. + z);

        let next_regime = if z > p.recfast_z_he_1 + p.recfast_delta_z_he_1 {
            Regime::FullyIonized
        } else if z > p.recfast_z_he_2 + p.recfast_delta_z_he_2 {
            Regime::HeliumIIISaha
        } else if z > p.recfast_z_he_3 + p.recfast_delta_z_he_3 {
            Regime::HeliumSinglyIonized
        } else if y[1] > p.recfast_x_he0_trigger {
            Regime::HeliumIISaha
        } else if y[0] > p.recfast_x_h0_trigger {
            Regime::HydrogenSaha
        } else {
            Regime::FullIntegration
        };
        if next_regime != regime {
            debug!("recombination: entering {:?} at z = {:.2}", next_regime, z);
            regime = next_regime;
        }

        let x0 = match regime {
            Regime::FullyIonized => {
                y = Vector3::new(1., 1., trad);
                c.xe_fully_ionized()
            }
            Regime::HeliumIIISaha => {
                y = Vector3::new(1., 1., trad);
                let x0_new = c.saha_he2(z);
                if z > p.recfast_z_he_1 - p.recfast_delta_z_he_1 {
                    let s = (p.recfast_z_he_1 - z) / p.recfast_delta_z_he_1;
                    let x0_previous = c.xe_fully_ionized();
                    x0_previous + (x0_new - x0_previous) * f1(s)
                } else {
                    x0_new
                }
            }
            Regime::HeliumSinglyIonized => {
                y = Vector3::new(1., 1., trad);
                let x0_new = 1. + c.f_he;
                if z > p.recfast_z_he_2 - p.recfast_delta_z_he_2 {
                    let s = (p.recfast_z_he_2 - z) / p.recfast_delta_z_he_2;
                    let x0_previous = c.saha_he2(z);
                    x0_previous + (x0_new - x0_previous) * f1(s)
                } else {
                    x0_new
                }
            }
            Regime::HeliumIISaha => {
                let x0_new = c.saha_he1(z);
                let x0 = if z > p.recfast_z_he_3 - p.recfast_delta_z_he_3 {
                    let s = (p.recfast_z_he_3 - z) / p.recfast_delta_z_he_3;
                    let x0_previous = 1. + c.f_he;
                    x0_previous + (x0_new - x0_previous) * f1(s)
                } else {
                    x0_new
                };
                y = Vector3::new(1., (x0 - 1.) / c.f_he, trad);
                x0
            }
            Regime::HydrogenSaha => {
                let x_h0 = c.saha_h(z);
                let (y_end, stats) = solver.integrate(&system, z_start, z, y, step_hint)?;
                step_hint = Some(stats.last_step);
                y = y_end;
                y[0] = x_h0;
                let x0_new = y[0] + c.f_he * y[1];
                let s = (p.recfast_x_he0_trigger - y[1]) / p.recfast_x_he0_trigger_delta;
                if s < 1. {
                    let x0_previous = c.saha_he1(z);
                    x0_previous + (x0_new - x0_previous) * f2(s.max(0.))
                } else {
                    x0_new
                }
            }
            Regime::FullIntegration => {
                let (y_end, stats) = solver.integrate(&system, z_start, z, y, step_hint)?;
                step_hint = Some(stats.last_step);
                y = y_end;
                let x0_new = y[0] + c.f_he * y[1];
                let s = (p.recfast_x_h0_trigger - y[0]) / p.recfast_x_h0_trigger_delta;
                if s < 1. {
                    let x0_previous = c.saha_h(z) + c.f_he * y[1];
                    x0_previous + (x0_new - x0_previous) * f2(s.max(0.))
                } else {
                    x0_new
                }
            }
        };

        push_row(z, x0, &y)?;
    }

    // rows were produced from high to low redshift
    let mut z_grid: Vec<f64> = (0..=nz).map(redshift_at).collect();
    z_grid.reverse();
    xe_column.reverse();
    tb_column.reverse();
    cb2_column.reverse();

    let dkappa_column: Vec<f64> = z_grid
        .iter()
        .zip(&xe_column)
        .map(|(&z, &xe)| c.dkappa(z, xe))
        .collect();
    let dcb2_column = conformal_time_derivative(&z_grid, &cb2_column, background)?;

    let mut table = ColumnTable::new(layout, z_grid)?;
    table.set_column(RecombinationQuantity::Xe, &xe_column)?;
    table.set_column(RecombinationQuantity::Tb, &tb_column)?;
    table.set_column(RecombinationQuantity::Cb2, &cb2_column)?;
    table.set_column(RecombinationQuantity::Dcb2, &dcb2_column)?;
    table.set_column(RecombinationQuantity::Dkappa, &dkappa_column)?;

    info!(
        "recombination: {} rows from z = {:.1}, xe(z=0) = {:.4e}, Tb(z=0) = {:.4e} K",
        table.len(),
        z_initial,
        xe_column[0],
        tb_column[0]
    );

    Ok(RecombinationHistory {
        table,
        coefficients,
    })
}

/// `d(column)/dη` by finite differences in redshift, converted with `dz/dη = −H`.
///
/// Central differences inside the table, one-sided differences on the two end rows.
pub(crate) fn conformal_time_derivative(
    z: &[f64],
    column: &[f64],
    background: &dyn Background,
) -> Result<Vec<f64>, ThermoError> {
    let n = z.len();
    if n < 2 {
        return Ok(vec![0.; n]);
    }
    (0..n)
        .map(|i| {
            let (lo, hi) = match i {
                0 => (0, 1),
                _ if i == n - 1 => (n - 2, n - 1),
                _ => (i - 1, i + 1),
            };
            let dcolumn_dz = (column[hi] - column[lo]) / (z[hi] - z[lo]);
            Ok(-background.hubble(z[i])? * dcolumn_dz)
        })
        .collect()
}
