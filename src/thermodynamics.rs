//! # Thermodynamics context
//!
//! [`ThermoContext`] is the entry point of the crate: it runs the whole pipeline once and then
//! answers interpolated queries at any redshift of the table.
//!
//! ## Pipeline
//!
//! 1. validate [`ThermoParams`] and [`ThermoPrecision`], freeze the [`TableLayouts`];
//! 2. integrate the recombination history ([`crate::recombination`]);
//! 3. build the reionization history if the scheme has one ([`crate::reionization`]);
//! 4. splice and derive the final columns ([`crate::merge`]);
//! 5. tabulate the natural-spline second derivatives of every column over redshift.
//!
//! ## Example
//!
//! ```rust,no_run
//! use cosmotherm::background::lcdm::{LcdmBackground, LcdmParameters};
//! use cosmotherm::indices::ThermoQuantity;
//! use cosmotherm::precision::ThermoPrecision;
//! use cosmotherm::thermo_params::ThermoParams;
//! use cosmotherm::thermodynamics::{InterpolationMode, ThermoContext};
//!
//! let background = LcdmBackground::new(LcdmParameters::default()).unwrap();
//! let thermo =
//!     ThermoContext::new(&ThermoParams::default(), &ThermoPrecision::default(), &background)
//!         .unwrap();
//!
//! let mut last_index = 0;
//! for z in [1000., 1001., 1002.] {
//!     let row = thermo.at_z(z, InterpolationMode::Closeby, &mut last_index).unwrap();
//!     println!("xe({z}) = {}", row.get(ThermoQuantity::Xe).unwrap());
//! }
//! println!("{thermo}");
//! ```
//!
//! ## See also
//!
//! * [`crate::precision::ThermoPrecision`] – numerical knobs.
//! * [`crate::background::Background`] – expansion history consumed by the pipeline.
use std::fmt;

use tracing::debug;

use crate::background::Background;
use crate::constants::{Mpc, Redshift};
use crate::indices::{Column, IndexRegistry, TableLayouts, ThermoQuantity};
use crate::merge::{merge_and_derive, RecombinationScalars, ThermoTable};
use crate::numerics::spline::{bracket_index, closeby_bracket_index, evaluate_in_bracket};
use crate::precision::ThermoPrecision;
use crate::recombination::recombination_with_recfast;
use crate::reionization::reionization_camb;
use crate::thermo_errors::ThermoError;
use crate::thermo_params::{ReionizationScheme, ThermoParams};

/// Rows visited on either side of the cached index before a closeby lookup falls back to a
/// binary search.
const CLOSEBY_MAX_SCAN: usize = 64;

/// How [`ThermoContext::at_z`] locates the table interval of a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InterpolationMode {
    /// Binary search over the whole table.
    #[default]
    Normal,
    /// Local scan from the index of the previous query, for sequences of nearby redshifts.
    Closeby,
}

/// Reionization outcome kept by the context.
#[derive(Debug, Clone, Copy, PartialEq)]
struct ReionizationSummary {
    redshift: Redshift,
    optical_depth: f64,
}

/// Thermodynamics tables of one cosmology, ready for interpolation.
#[derive(Debug, Clone)]
pub struct ThermoContext {
    table: ThermoTable,
    /// `d²(column)/dz²`, same layout as `table`.
    splines: ThermoTable,
    scalars: RecombinationScalars,
    conformal_time_initial: Mpc,
    electron_density_today: f64,
    reionization: Option<ReionizationSummary>,
    junction_row: Option<usize>,
}

/// Interpolated values of every column at one redshift.
#[derive(Debug, Clone, PartialEq)]
pub struct ThermoRow<'a> {
    layout: &'a IndexRegistry<ThermoQuantity>,
    z: Redshift,
    values: Vec<f64>,
}

impl ThermoRow<'_> {
    /// Redshift of the row.
    pub fn z(&self) -> Redshift {
        self.z
    }

    /// Value of `quantity`.
    pub fn get(&self, quantity: ThermoQuantity) -> Result<f64, ThermoError> {
        Ok(self.values[self.layout.offset(quantity)?])
    }

    /// Value of the quantity called `name`, e.g. `"exp_m_kappa"`.
    pub fn get_by_name(&self, name: &str) -> Result<f64, ThermoError> {
        Ok(self.values[self.layout.offset_by_name(name)?])
    }

    /// Values in column order of the layout.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// `(name, value)` pairs in column order.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, f64)> + '_ {
        self.layout
            .columns()
            .iter()
            .zip(&self.values)
            .map(|(q, &v)| (q.name(), v))
    }
}

impl ThermoContext {
    /// Run the thermodynamics pipeline.
    ///
    /// Arguments
    /// -----------------
    /// * `params`: CMB temperature, helium fraction and reionization scheme.
    /// * `precision`: numerical knobs, validated again here.
    /// * `background`: expansion history covering at least `[0, recfast_z_initial]`.
    ///
    /// Return
    /// ----------
    /// * The context, or the first [`ThermoError`] raised by a stage. No partial table is
    ///   ever returned.
    pub fn new(
        params: &ThermoParams,
        precision: &ThermoPrecision,
        background: &dyn Background,
    ) -> Result<Self, ThermoError> {
        params.validate()?;
        precision.validate()?;
        let layouts = TableLayouts::for_scheme(&params.reionization)?;

        let recombination =
            recombination_with_recfast(params, precision, background, layouts.recombination)?;

        let reionization = match (params.reionization, layouts.reionization) {
            (ReionizationScheme::Camb(input), Some(layout)) => Some(reionization_camb(
                input,
                precision,
                background,
                &recombination,
                layout,
            )?),
            _ => None,
        };

        let merged = merge_and_derive(
            &recombination,
            reionization.as_ref(),
            precision,
            background,
            layouts.thermo,
        )?;
        let splines = merged.table.spline_second_derivatives()?;
        debug!(
            "thermodynamics: spline table built for {} columns",
            merged.table.layout().width()
        );

        Ok(ThermoContext {
            conformal_time_initial: merged.conformal_time.last().copied().unwrap_or(0.),
            electron_density_today: recombination.coefficients.n_now,
            reionization: reionization.map(|r| ReionizationSummary {
                redshift: r.parameters.z_reio,
                optical_depth: r.optical_depth,
            }),
            junction_row: merged.junction_row,
            scalars: merged.scalars,
            table: merged.table,
            splines,
        })
    }

    /// Interpolate every column at redshift `z`.
    ///
    /// Arguments
    /// -----------------
    /// * `z`: redshift inside the table.
    /// * `mode`: how the table interval is located.
    /// * `last_index`: interval of the previous query; updated with the interval of this one.
    ///
    /// Return
    /// ----------
    /// * The interpolated [`ThermoRow`], or [`ThermoError::OutOfRangeQuery`] if `z` is outside
    ///   the table. Values are never extrapolated.
    pub fn at_z(
        &self,
        z: Redshift,
        mode: InterpolationMode,
        last_index: &mut usize,
    ) -> Result<ThermoRow<'_>, ThermoError> {
        let grid = self.table.z();
        let bracket = match mode {
            InterpolationMode::Normal => bracket_index(grid, z),
            InterpolationMode::Closeby => {
                closeby_bracket_index(grid, z, *last_index, CLOSEBY_MAX_SCAN)
            }
        };
        let i = bracket.ok_or_else(|| {
            let (z_min, z_max) = self.z_range();
            ThermoError::OutOfRangeQuery { z, z_min, z_max }
        })?;
        *last_index = i;

        let layout = self.table.layout();
        let values = (0..layout.width())
            .map(|offset| {
                let y = self.table.column_by_offset(offset).unwrap_or_default();
                let ddy = self.splines.column_by_offset(offset).unwrap_or_default();
                evaluate_in_bracket(grid, y, ddy, i, z)
            })
            .collect();
        Ok(ThermoRow { layout, z, values })
    }

    /// Consume the context and free its tables.
    pub fn release(self) {
        debug!("thermodynamics: releasing {} rows", self.table.len());
    }

    /// Tabulated redshift range `(z_min, z_max)`.
    pub fn z_range(&self) -> (Redshift, Redshift) {
        let z = self.table.z();
        (z.first().copied().unwrap_or(0.), z.last().copied().unwrap_or(0.))
    }

    /// Merged table, increasing in redshift.
    pub fn table(&self) -> &ThermoTable {
        &self.table
    }

    /// Spline second derivatives of every column over redshift.
    pub fn spline_table(&self) -> &ThermoTable {
        &self.splines
    }

    /// Redshift of the maximum of the visibility function.
    pub fn z_visibility_max(&self) -> Redshift {
        self.scalars.z_visibility_max
    }

    /// Redshift below which the visibility function stays under
    /// `visibility_threshold_free_streaming` times its peak.
    pub fn z_visibility_free_streaming(&self) -> Redshift {
        self.scalars.z_visibility_free_streaming
    }

    /// Conformal time at the visibility peak, in Mpc.
    pub fn conformal_time_at_recombination(&self) -> Mpc {
        self.scalars.conformal_time_at_recombination
    }

    /// Comoving sound horizon at the visibility peak, in Mpc.
    pub fn sound_horizon_at_recombination(&self) -> Mpc {
        self.scalars.sound_horizon_at_recombination
    }

    /// Conformal time of the earliest tabulated row, in Mpc.
    pub fn conformal_time_initial(&self) -> Mpc {
        self.conformal_time_initial
    }

    /// Hydrogen nuclei per m³ today, free and bound electrons alike.
    pub fn electron_density_today(&self) -> f64 {
        self.electron_density_today
    }

    /// Reionization midpoint redshift, `None` without reionization.
    pub fn reionization_redshift(&self) -> Option<Redshift> {
        self.reionization.map(|r| r.redshift)
    }

    /// Reionization optical depth, `None` without reionization.
    pub fn reionization_optical_depth(&self) -> Option<f64> {
        self.reionization.map(|r| r.optical_depth)
    }

    /// First row of the merged table taken from the recombination history.
    pub fn junction_row(&self) -> Option<usize> {
        self.junction_row
    }
}

impl fmt::Display for ThermoContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (z_min, z_max) = self.z_range();
        writeln!(
            f,
            "ThermoContext: {} rows on z ∈ [{z_min}, {z_max}]",
            self.table.len()
        )?;
        writeln!(
            f,
            "  recombination: z_rec = {:.4}, eta_rec = {:.4} Mpc, rs_rec = {:.4} Mpc",
            self.z_visibility_max(),
            self.conformal_time_at_recombination(),
            self.sound_horizon_at_recombination()
        )?;
        writeln!(
            f,
            "  free streaming below z = {:.4}",
            self.z_visibility_free_streaming()
        )?;
        match self.reionization {
            Some(r) => write!(
                f,
                "  reionization: z_reio = {:.4}, tau_reio = {:.6}",
                r.redshift, r.optical_depth
            ),
            None => write!(f, "  reionization: none"),
        }
    }
}

#[cfg(test)]
mod thermodynamics_test {
    use super::*;
    use crate::thermo_params::ReionizationInput;
    use crate::unit_test_global::{BACKGROUND, PRECISION};
    use approx::assert_relative_eq;
    use std::sync::LazyLock;

    static CONTEXT: LazyLock<ThermoContext> = LazyLock::new(|| {
        ThermoContext::new(&ThermoParams::default(), &PRECISION, &*BACKGROUND).unwrap()
    });

    #[test]
    fn test_nodes_are_reproduced() {
        let thermo = &*CONTEXT;
        let table = thermo.table();
        let mut last_index = 0;
        for row in [0, 17, table.len() / 2, table.len() - 1] {
            let z = table.z()[row];
            let values = thermo
                .at_z(z, InterpolationMode::Normal, &mut last_index)
                .unwrap();
            for (offset, &v) in values.values().iter().enumerate() {
                assert_relative_eq!(v, table.values()[(row, offset)], max_relative = 1e-12);
            }
        }
    }

    #[test]
    fn test_closeby_matches_normal() {
        let thermo = &*CONTEXT;
        let mut normal_index = 0;
        let mut closeby_index = 0;
        for i in 0..400 {
            let z = 900. + 0.73 * i as f64;
            let a = thermo
                .at_z(z, InterpolationMode::Normal, &mut normal_index)
                .unwrap();
            let b = thermo
                .at_z(z, InterpolationMode::Closeby, &mut closeby_index)
                .unwrap();
            assert_eq!(a, b);
            assert_eq!(normal_index, closeby_index);
        }
        // a jump far away falls back to the binary search
        let far = thermo
            .at_z(5000., InterpolationMode::Closeby, &mut closeby_index)
            .unwrap();
        assert_eq!(far.z(), 5000.);
        assert_eq!(
            far,
            thermo
                .at_z(5000., InterpolationMode::Normal, &mut normal_index)
                .unwrap()
        );
    }

    #[test]
    fn test_lookup_by_name() {
        let thermo = &*CONTEXT;
        let row = thermo
            .at_z(1100., InterpolationMode::Normal, &mut 0)
            .unwrap();
        assert_eq!(row.get_by_name("g").unwrap(), row.get(ThermoQuantity::G).unwrap());
        assert_eq!(
            row.get_by_name("kappa"),
            Err(ThermoError::UnknownQuantity("kappa".into()))
        );
        assert_eq!(row.iter().count(), 12);
    }

    #[test]
    fn test_out_of_range() {
        let thermo = &*CONTEXT;
        let mut last_index = 3;
        for z in [-1e-3, 1e4 + 1., f64::NAN] {
            assert!(matches!(
                thermo.at_z(z, InterpolationMode::Closeby, &mut last_index),
                Err(ThermoError::OutOfRangeQuery { .. })
            ));
        }
        assert_eq!(last_index, 3);
    }

    #[test]
    fn test_scalars() {
        let thermo = &*CONTEXT;
        assert_eq!(thermo.reionization_redshift(), Some(11.));
        assert!(thermo.junction_row().is_some());
        assert!(thermo.conformal_time_initial() > 0.);
        assert!(thermo.conformal_time_initial() < thermo.conformal_time_at_recombination());
        assert!(thermo.electron_density_today() > 0.18 && thermo.electron_density_today() < 0.2);
        let display = format!("{thermo}");
        assert!(display.contains("z_reio = 11.0000"));
    }

    #[test]
    fn test_without_reionization() {
        let precision = ThermoPrecision::builder().recfast_nz0(1000).build().unwrap();
        let params = ThermoParams {
            reionization: ReionizationScheme::None,
            ..ThermoParams::default()
        };
        let thermo = ThermoContext::new(&params, &precision, &*BACKGROUND).unwrap();
        assert_eq!(thermo.reionization_optical_depth(), None);
        assert_eq!(thermo.junction_row(), None);
        let row = thermo.at_z(0., InterpolationMode::Normal, &mut 0).unwrap();
        assert!(row.get(ThermoQuantity::Xe).unwrap() < 1e-3);
        thermo.release();
    }

    #[test]
    fn test_invalid_inputs_are_rejected() {
        let params = ThermoParams {
            reionization: ReionizationScheme::Camb(ReionizationInput::Redshift(60.)),
            ..ThermoParams::default()
        };
        assert!(matches!(
            ThermoContext::new(&params, &PRECISION, &*BACKGROUND),
            Err(ThermoError::ConfigurationError(_))
        ));

        let mut precision = ThermoPrecision::default();
        precision.recfast_nz0 = 1;
        assert!(matches!(
            ThermoContext::new(&ThermoParams::default(), &precision, &*BACKGROUND),
            Err(ThermoError::ConfigurationError(_))
        ));
    }
}
