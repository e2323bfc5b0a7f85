//! CAMB-like reionization profile with closed-form derivatives.
//!
//! Hydrogen (and the first helium ionization) follows a smooth step in `(1+z)^exponent`
//! centered on `z_reio`; the second helium ionization is a smooth step in `z` centered on
//! `helium_fullreio_redshift`. Above `z_start` the profile is frozen at the recombination value.
use crate::constants::Redshift;
use crate::indices::RecombinationQuantity;
use crate::numerics::smoothstep::reionization_step;
use crate::precision::ThermoPrecision;
use crate::recombination::recfast::RecfastCoefficients;
use crate::recombination::RecombinationTable;
use crate::thermo_errors::ThermoError;

/// Ionization fraction and its first two redshift derivatives at one redshift.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct XeProfile {
    pub xe: f64,
    pub dxe_dz: f64,
    pub d2xe_dz2: f64,
}

/// Shape parameters of one reionization history.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReionizationParameters {
    /// Midpoint redshift of hydrogen reionization.
    pub z_reio: Redshift,
    /// Redshift above which the recombination history is kept untouched.
    pub z_start: Redshift,
    /// Recombination `x_e` at `z_start`.
    pub xe_before: f64,
    /// Hydrogen and singly ionized helium, `1 + f_He`.
    pub xe_after: f64,
    pub exponent: f64,
    pub width: f64,
    /// Extra electrons per hydrogen nucleus once helium is doubly ionized, `f_He`.
    pub helium_fullreio_fraction: f64,
    pub helium_fullreio_redshift: Redshift,
    pub helium_fullreio_width: f64,
}

impl ReionizationParameters {
    /// Profile parameters for a reionization redshift.
    ///
    /// Arguments
    /// -----------------
    /// * `z_reio`: midpoint of hydrogen reionization, `>= 0`.
    /// * `precision`: shape of the steps and largest start redshift.
    /// * `coefficients`: provides `f_He`.
    /// * `recombination`: history used to fix `xe_before`.
    ///
    /// Return
    /// ----------
    /// * The parameters, or [`ThermoError::ConfigurationError`] if the start redshift
    ///   `z_reio + start_factor · width` is above `reionization_z_start_max`.
    pub fn new(
        z_reio: Redshift,
        precision: &ThermoPrecision,
        coefficients: &RecfastCoefficients,
        recombination: &RecombinationTable,
    ) -> Result<Self, ThermoError> {
        let z_start = z_reio + precision.reionization_start_factor * precision.reionization_width;
        if !(z_reio >= 0. && z_start <= precision.reionization_z_start_max) {
            return Err(ThermoError::ConfigurationError(format!(
                "reionization starts at z = {z_start}, above reionization_z_start_max = {}",
                precision.reionization_z_start_max
            )));
        }
        Ok(ReionizationParameters {
            z_reio,
            z_start,
            xe_before: interpolate_column(recombination, RecombinationQuantity::Xe, z_start)?,
            xe_after: 1. + coefficients.f_he,
            exponent: precision.reionization_exponent,
            width: precision.reionization_width,
            helium_fullreio_fraction: coefficients.f_he,
            helium_fullreio_redshift: precision.helium_fullreio_redshift,
            helium_fullreio_width: precision.helium_fullreio_width,
        })
    }

    /// Free electrons per hydrogen nucleus and its redshift derivatives.
    pub fn xe(&self, z: Redshift) -> XeProfile {
        if z > self.z_start {
            return XeProfile {
                xe: self.xe_before,
                dxe_dz: 0.,
                d2xe_dz2: 0.,
            };
        }

        let e = self.exponent;
        let norm = e * (1. + self.z_reio).powf(e - 1.) * self.width;
        let u = ((1. + self.z_reio).powf(e) - (1. + z).powf(e)) / norm;
        let du = -e * (1. + z).powf(e - 1.) / norm;
        let ddu = -e * (e - 1.) * (1. + z).powf(e - 2.) / norm;
        let (s, ds, dds) = reionization_step(u);
        let jump = self.xe_after - self.xe_before;

        let w_he = self.helium_fullreio_width;
        let (s_he, ds_he, dds_he) = reionization_step((self.helium_fullreio_redshift - z) / w_he);
        let f = self.helium_fullreio_fraction;

        XeProfile {
            xe: jump * s + self.xe_before + f * s_he,
            dxe_dz: jump * ds * du - f * ds_he / w_he,
            d2xe_dz2: jump * (dds * du * du + ds * ddu) + f * dds_he / (w_he * w_he),
        }
    }
}

/// Linear interpolation of a recombination column at `z`.
pub(crate) fn interpolate_column(
    recombination: &RecombinationTable,
    quantity: RecombinationQuantity,
    z: Redshift,
) -> Result<f64, ThermoError> {
    let grid = recombination.z();
    let values = recombination.column(quantity)?;
    let above = grid.partition_point(|&v| v <= z);
    if above == 0 || above >= grid.len() {
        return Err(ThermoError::OutOfRangeQuery {
            z,
            z_min: grid.first().copied().unwrap_or(f64::NAN),
            z_max: grid.last().copied().unwrap_or(f64::NAN),
        });
    }
    let (i, j) = (above - 1, above);
    let t = (z - grid[i]) / (grid[j] - grid[i]);
    Ok(values[i] + t * (values[j] - values[i]))
}

#[cfg(test)]
mod profile_test {
    use super::*;
    use approx::assert_relative_eq;

    fn parameters() -> ReionizationParameters {
        ReionizationParameters {
            z_reio: 11.,
            z_start: 15.,
            xe_before: 2e-4,
            xe_after: 1.08,
            exponent: 1.5,
            width: 0.5,
            helium_fullreio_fraction: 0.08,
            helium_fullreio_redshift: 3.5,
            helium_fullreio_width: 0.5,
        }
    }

    #[test]
    fn test_limits() {
        let p = parameters();
        assert_eq!(p.xe(16.).xe, 2e-4);
        assert_relative_eq!(p.xe(15.).xe, 2e-4);
        assert_relative_eq!(p.xe(7.).xe, 1.08);
        assert_relative_eq!(p.xe(0.).xe, 1.16);
        // midpoint of the hydrogen step
        assert_relative_eq!(p.xe(11.).xe, 0.5 * (1.08 + 2e-4));
    }

    #[test]
    fn test_derivatives_match_finite_differences() {
        let p = parameters();
        let h = 1e-5;
        for z in [3.3, 3.7, 10.6, 11., 11.4] {
            let profile = p.xe(z);
            let dxe = (p.xe(z + h).xe - p.xe(z - h).xe) / (2. * h);
            let ddxe = (p.xe(z + h).dxe_dz - p.xe(z - h).dxe_dz) / (2. * h);
            assert_relative_eq!(profile.dxe_dz, dxe, max_relative = 1e-5);
            assert_relative_eq!(profile.d2xe_dz2, ddxe, epsilon = 1e-4, max_relative = 1e-4);
        }
    }

    #[test]
    fn test_profile_decreases_with_redshift() {
        let p = parameters();
        let xe: Vec<f64> = (0..=300).map(|i| p.xe(i as f64 * 0.05).xe).collect();
        assert!(xe.windows(2).all(|w| w[1] <= w[0]));
        assert!(xe.iter().all(|&v| v > 0. && v <= 1.16 + 1e-12));
    }
}
