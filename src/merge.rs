//! # Merge & derive
//!
//! Splices the reionization table in front of the recombination table and derives every
//! column of the final thermodynamics table, together with the scalars characterizing
//! recombination.
//!
//! ## Overview
//!
//! - rows: all reionization rows (from z = 0 up to the start of reionization), then the
//!   recombination rows strictly above the last reionization redshift;
//! - `ddkappa`, `dddkappa`: first and second conformal-time derivatives of the cubic spline of
//!   `dkappa` over `η`, with estimated-derivative end conditions;
//! - `exp_m_kappa`: `κ` is the spline quadrature of `dkappa` from z = 0, so `κ(0) = 0`;
//! - `g`, `dg`, `ddg`: visibility function and its conformal-time derivatives;
//! - `Tb`, `cb2`, `dcb2`: copied from the source tables as they are.
//!
//! `η` decreases along the rows; the spline routines accept decreasing abscissas.
use tracing::{debug, info};

use crate::background::Background;
use crate::constants::{Mpc, Redshift};
use crate::indices::{IndexRegistry, RecombinationQuantity, ReionizationQuantity, ThermoQuantity};
use crate::numerics::spline::{
    node_derivatives, running_integral, second_derivatives, SplineBoundary,
};
use crate::precision::ThermoPrecision;
use crate::recombination::RecombinationHistory;
use crate::reionization::ReionizationHistory;
use crate::table::ColumnTable;
use crate::thermo_errors::ThermoError;

/// Final thermodynamics table, increasing in redshift from z = 0.
pub type ThermoTable = ColumnTable<ThermoQuantity>;

/// Scalars derived from the visibility function.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecombinationScalars {
    /// Redshift of the maximum of the visibility function.
    pub z_visibility_max: Redshift,
    /// Redshift below which the visibility function stays under the free-streaming threshold.
    pub z_visibility_free_streaming: Redshift,
    /// Conformal time at `z_visibility_max`.
    pub conformal_time_at_recombination: Mpc,
    /// Comoving sound horizon at `z_visibility_max`.
    pub sound_horizon_at_recombination: Mpc,
}

/// Output of the merge stage.
#[derive(Debug, Clone)]
pub struct MergedHistory {
    pub table: ThermoTable,
    /// Conformal time of every row.
    pub conformal_time: Vec<f64>,
    /// First recombination row of the merged table, `None` without reionization.
    pub junction_row: Option<usize>,
    pub scalars: RecombinationScalars,
}

/// Source columns of the merged rows.
#[derive(Default)]
struct Spliced {
    z: Vec<f64>,
    xe: Vec<f64>,
    dkappa: Vec<f64>,
    tb: Vec<f64>,
    cb2: Vec<f64>,
    dcb2: Vec<f64>,
}

fn splice(
    recombination: &RecombinationHistory,
    reionization: Option<&ReionizationHistory>,
) -> Result<(Spliced, Option<usize>), ThermoError> {
    type R = RecombinationQuantity;
    type Q = ReionizationQuantity;

    let rec = &recombination.table;
    let mut out = Spliced::default();
    let mut first_rec_row = 0;
    let mut junction_row = None;

    if let Some(reio) = reionization {
        let table = &reio.table;
        out.z.extend_from_slice(table.z());
        out.xe.extend_from_slice(table.column(Q::Xe)?);
        out.dkappa.extend_from_slice(table.column(Q::Dkappa)?);
        out.tb.extend_from_slice(table.column(Q::Tb)?);
        out.cb2.extend_from_slice(table.column(Q::Cb2)?);
        out.dcb2.extend_from_slice(table.column(Q::Dcb2)?);

        let z_last = table.z().last().copied().unwrap_or(0.);
        first_rec_row = rec.z().partition_point(|&v| v <= z_last);
        junction_row = Some(out.z.len());
    }

    out.z.extend_from_slice(&rec.z()[first_rec_row..]);
    out.xe.extend_from_slice(&rec.column(R::Xe)?[first_rec_row..]);
    out.dkappa
        .extend_from_slice(&rec.column(R::Dkappa)?[first_rec_row..]);
    out.tb.extend_from_slice(&rec.column(R::Tb)?[first_rec_row..]);
    out.cb2.extend_from_slice(&rec.column(R::Cb2)?[first_rec_row..]);
    out.dcb2
        .extend_from_slice(&rec.column(R::Dcb2)?[first_rec_row..]);

    Ok((out, junction_row))
}

/// Merge the stage tables and derive the final columns.
///
/// Arguments
/// -----------------
/// * `recombination`: recombination history.
/// * `reionization`: reionization history, if the scheme has one.
/// * `precision`: provides the free-streaming threshold.
/// * `background`: conformal time and sound horizon.
/// * `layout`: column layout of the final table.
///
/// Return
/// ----------
/// * The [`MergedHistory`].
/// * [`ThermoError::MonotonicityViolation`] if the spliced redshifts are not strictly increasing.
/// * [`ThermoError::NumericalDivergence`] if the visibility peak is not inside
///   `[visibility_z_min, visibility_z_max]`.
pub fn merge_and_derive(
    recombination: &RecombinationHistory,
    reionization: Option<&ReionizationHistory>,
    precision: &ThermoPrecision,
    background: &dyn Background,
    layout: IndexRegistry<ThermoQuantity>,
) -> Result<MergedHistory, ThermoError> {
    let (rows, junction_row) = splice(recombination, reionization)?;
    let mut table = ColumnTable::new(layout, rows.z)?;
    let n = table.len();

    let eta = table
        .z()
        .iter()
        .map(|&z| Ok(background.at_z(z)?.conformal_time))
        .collect::<Result<Vec<f64>, ThermoError>>()?;

    let dddkappa = second_derivatives(&eta, &rows.dkappa, SplineBoundary::EstimatedDerivative)?;
    let ddkappa = node_derivatives(&eta, &rows.dkappa, &dddkappa);
    // integral from z = 0 along decreasing η
    let kappa: Vec<f64> = running_integral(&eta, &rows.dkappa, &dddkappa)
        .into_iter()
        .map(|v| -v)
        .collect();

    let mut exp_m_kappa = Vec::with_capacity(n);
    let mut g = Vec::with_capacity(n);
    let mut dg = Vec::with_capacity(n);
    let mut ddg = Vec::with_capacity(n);
    let mut rate = Vec::with_capacity(n);
    for i in 0..n {
        let e = (-kappa[i]).exp();
        let (dk, ddk, dddk) = (rows.dkappa[i], ddkappa[i], dddkappa[i]);
        let gi = dk * e;
        let dgi = (ddk + dk * dk) * e;
        let ddgi = (dddk + 3. * dk * ddk + dk * dk * dk) * e;

        let mut r = dk.abs();
        if gi != 0. {
            r = r.max((dgi / gi).abs());
        }
        if dgi != 0. {
            r = r.max((ddgi / dgi).abs());
        }

        exp_m_kappa.push(e);
        g.push(gi);
        dg.push(dgi);
        ddg.push(ddgi);
        rate.push(r);
    }

    type T = ThermoQuantity;
    table.set_column(T::Xe, &rows.xe)?;
    table.set_column(T::Dkappa, &rows.dkappa)?;
    table.set_column(T::Ddkappa, &ddkappa)?;
    table.set_column(T::Dddkappa, &dddkappa)?;
    table.set_column(T::ExpMKappa, &exp_m_kappa)?;
    table.set_column(T::G, &g)?;
    table.set_column(T::Dg, &dg)?;
    table.set_column(T::Ddg, &ddg)?;
    table.set_column(T::Tb, &rows.tb)?;
    table.set_column(T::Cb2, &rows.cb2)?;
    table.set_column(T::Dcb2, &rows.dcb2)?;
    table.set_column(T::Rate, &rate)?;

    let scalars = recombination_scalars(
        table.z(),
        &g,
        &dg,
        precision,
        background,
    )?;

    info!(
        "thermodynamics: {} rows, kappa(z_max) = {:.4e}, z_rec = {:.2}, eta_rec = {:.3} Mpc, rs_rec = {:.3} Mpc",
        n,
        kappa[n - 1],
        scalars.z_visibility_max,
        scalars.conformal_time_at_recombination,
        scalars.sound_horizon_at_recombination
    );
    if let Some(row) = junction_row {
        debug!("thermodynamics: recombination rows start at row {row}");
    }

    Ok(MergedHistory {
        table,
        conformal_time: eta,
        junction_row,
        scalars,
    })
}

/// Root of the linear interpolant through `(x0, y0)` and `(x1, y1)` for the level `level`.
#[inline]
fn linear_crossing(x0: f64, y0: f64, x1: f64, y1: f64, level: f64) -> f64 {
    x0 + (level - y0) * (x1 - x0) / (y1 - y0)
}

/// Visibility peak, free-streaming redshift and background values at the peak.
fn recombination_scalars(
    z: &[f64],
    g: &[f64],
    dg: &[f64],
    precision: &ThermoPrecision,
    background: &dyn Background,
) -> Result<RecombinationScalars, ThermoError> {
    let (z_min, z_max) = (precision.visibility_z_min, precision.visibility_z_max);
    let window: Vec<usize> = (0..z.len())
        .filter(|&i| (z_min..=z_max).contains(&z[i]))
        .collect();
    let peak = window
        .iter()
        .copied()
        .max_by(|&a, &b| g[a].total_cmp(&g[b]))
        .ok_or_else(|| {
            ThermoError::divergence(
                "visibility",
                z_min,
                0.,
                0,
                "no table row inside the recombination window",
            )
        })?;
    if window.first() == Some(&peak) || window.last() == Some(&peak) {
        return Err(ThermoError::divergence(
            "visibility",
            z[peak],
            0.,
            window.len(),
            format!("visibility peak on the edge of [{z_min}, {z_max}]"),
        ));
    }

    // dg changes sign on one side of the maximal row
    let z_visibility_max = [peak - 1, peak]
        .into_iter()
        .find(|&k| dg[k] * dg[k + 1] <= 0. && dg[k] != dg[k + 1])
        .map(|k| linear_crossing(z[k], dg[k], z[k + 1], dg[k + 1], 0.))
        .unwrap_or(z[peak]);

    let level = precision.visibility_threshold_free_streaming * g[peak];
    let z_visibility_free_streaming = (0..peak)
        .rev()
        .find(|&k| g[k] < level)
        .map(|k| linear_crossing(z[k], g[k], z[k + 1], g[k + 1], level))
        .unwrap_or(z[0]);

    let point = background.at_z(z_visibility_max)?;
    Ok(RecombinationScalars {
        z_visibility_max,
        z_visibility_free_streaming,
        conformal_time_at_recombination: point.conformal_time,
        sound_horizon_at_recombination: point.sound_horizon,
    })
}

#[cfg(test)]
mod merge_test {
    use super::*;
    use crate::unit_test_global::{BACKGROUND, PRECISION, RECOMBINATION, REIONIZATION_Z11};
    use approx::assert_relative_eq;

    fn merged(with_reionization: bool) -> MergedHistory {
        merge_and_derive(
            &RECOMBINATION,
            with_reionization.then_some(&*REIONIZATION_Z11),
            &PRECISION,
            &*BACKGROUND,
            IndexRegistry::full(),
        )
        .unwrap()
    }

    #[test]
    fn test_splice() {
        let history = merged(true);
        let reio_rows = REIONIZATION_Z11.table.len();
        assert_eq!(history.junction_row, Some(reio_rows));
        let z = history.table.z();
        assert_eq!(z[0], 0.);
        assert_eq!(z[reio_rows - 1], 15.);
        assert!(z[reio_rows] > 15.);
        assert_eq!(*z.last().unwrap(), 1e4);
        // the recombination rows up to z = 15 are replaced
        assert_eq!(history.table.len(), reio_rows + 2000 - 3);
    }

    #[test]
    fn test_without_reionization() {
        let history = merged(false);
        assert_eq!(history.junction_row, None);
        assert_eq!(history.table.len(), RECOMBINATION.table.len());
        assert_eq!(
            history.table.column(ThermoQuantity::Tb).unwrap(),
            RECOMBINATION
                .table
                .column(RecombinationQuantity::Tb)
                .unwrap()
        );
    }

    #[test]
    fn test_optical_depth_columns() {
        let history = merged(true);
        let table = &history.table;
        let exp_m_kappa = table.column(ThermoQuantity::ExpMKappa).unwrap();
        assert_relative_eq!(exp_m_kappa[0], 1.);
        assert!(exp_m_kappa.windows(2).all(|w| w[1] <= w[0]));
        assert!(exp_m_kappa.iter().all(|&v| (0. ..=1.).contains(&v)));
        // the reionization optical depth is recovered at the start of reionization
        let reio_rows = REIONIZATION_Z11.table.len();
        assert_relative_eq!(
            -exp_m_kappa[reio_rows - 1].ln(),
            REIONIZATION_Z11.optical_depth,
            max_relative = 1e-3
        );
        assert!(exp_m_kappa[table.len() - 1] < 1e-100);
    }

    #[test]
    fn test_visibility_is_normalized() {
        let history = merged(true);
        let g = history.table.column(ThermoQuantity::G).unwrap();
        let eta = &history.conformal_time;
        let integral: f64 = (0..g.len() - 1)
            .map(|i| 0.5 * (g[i] + g[i + 1]) * (eta[i] - eta[i + 1]))
            .sum();
        assert_relative_eq!(integral, 1., epsilon = 1e-2);
    }

    #[test]
    fn test_recombination_scalars() {
        let s = merged(true).scalars;
        assert!(
            s.z_visibility_max > 1050. && s.z_visibility_max < 1120.,
            "z_rec = {}",
            s.z_visibility_max
        );
        assert!(s.z_visibility_free_streaming < s.z_visibility_max);
        assert!(s.z_visibility_free_streaming > 200.);
        assert!(s.conformal_time_at_recombination > 270. && s.conformal_time_at_recombination < 295.);
        assert!(s.sound_horizon_at_recombination > 140. && s.sound_horizon_at_recombination < 150.);
    }

    #[test]
    fn test_visibility_window_from_precision() {
        let merge_with = |z_min: f64, z_max: f64| {
            let precision = ThermoPrecision::builder()
                .recfast_nz0(2000)
                .visibility_window(z_min, z_max)
                .build()
                .unwrap();
            merge_and_derive(
                &RECOMBINATION,
                Some(&*REIONIZATION_Z11),
                &precision,
                &*BACKGROUND,
                IndexRegistry::full(),
            )
        };
        let narrow = merge_with(900., 1300.).unwrap().scalars;
        assert_relative_eq!(
            narrow.z_visibility_max,
            merged(true).scalars.z_visibility_max
        );
        // the peak sits below the window
        assert!(matches!(
            merge_with(1200., 2000.),
            Err(ThermoError::NumericalDivergence { .. })
        ));
    }

    #[test]
    fn test_rate_bounds_scattering_rate() {
        let history = merged(true);
        let rate = history.table.column(ThermoQuantity::Rate).unwrap();
        let dkappa = history.table.column(ThermoQuantity::Dkappa).unwrap();
        assert!(rate.iter().zip(dkappa).all(|(&r, &dk)| r >= dk.abs()));
    }
}
