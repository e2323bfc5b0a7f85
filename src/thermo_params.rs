//! # Physical inputs of the thermodynamics pipeline
//!
//! [`ThermoParams`] groups the cosmological inputs that are specific to the thermal history:
//! CMB temperature today, primordial helium mass fraction and the reionization scheme. The
//! expansion history itself is supplied separately by a [`crate::background::Background`].
//!
//! The reionization scheme is a tagged variant: [`ReionizationScheme::None`] skips the
//! reionization stage, [`ReionizationScheme::Camb`] selects the CAMB-like smooth-step profile
//! driven either by the reionization redshift or by the optical depth ([`ReionizationInput`]).
use serde::{Deserialize, Serialize};

use crate::constants::{Kelvin, NOT4, TCMB_BIG, TCMB_SMALL, YHE_BIG, YHE_SMALL};
use crate::thermo_errors::ThermoError;

/// What fixes the CAMB-like reionization profile.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReionizationInput {
    /// Midpoint redshift of hydrogen reionization.
    Redshift(f64),
    /// Thomson optical depth to reionization; the redshift is found by root search.
    OpticalDepth(f64),
}

/// Reionization parametrization.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "scheme", content = "input", rename_all = "snake_case")]
pub enum ReionizationScheme {
    /// Recombination history down to z = 0, no reionization.
    None,
    /// CAMB-like smooth step in `(1+z)^exponent` plus helium full reionization.
    Camb(ReionizationInput),
}

/// Physical inputs of one thermodynamics run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThermoParams {
    /// CMB temperature today in K.
    pub t_cmb: Kelvin,
    /// Primordial helium mass fraction `Y_He`.
    pub y_he: f64,
    pub reionization: ReionizationScheme,
}

impl Default for ThermoParams {
    fn default() -> Self {
        ThermoParams {
            t_cmb: 2.7255,
            y_he: 0.25,
            reionization: ReionizationScheme::Camb(ReionizationInput::Redshift(11.)),
        }
    }
}

impl ThermoParams {
    /// Build and validate a set of inputs.
    ///
    /// Arguments
    /// -----------------
    /// * `t_cmb`: CMB temperature today in K, within `[2.7, 2.8]`.
    /// * `y_he`: primordial helium mass fraction, within `[0.01, 0.5]`.
    /// * `reionization`: reionization scheme.
    ///
    /// Return
    /// ----------
    /// * The inputs, or [`ThermoError::ConfigurationError`] naming the offending value.
    pub fn new(
        t_cmb: Kelvin,
        y_he: f64,
        reionization: ReionizationScheme,
    ) -> Result<Self, ThermoError> {
        let params = ThermoParams {
            t_cmb,
            y_he,
            reionization,
        };
        params.validate()?;
        Ok(params)
    }

    /// Check the hard physical bounds of the inputs.
    pub fn validate(&self) -> Result<(), ThermoError> {
        if !(TCMB_SMALL..=TCMB_BIG).contains(&self.t_cmb) {
            return Err(ThermoError::ConfigurationError(format!(
                "T_cmb = {} K is outside [{TCMB_SMALL}, {TCMB_BIG}] K",
                self.t_cmb
            )));
        }
        if !(YHE_SMALL..=YHE_BIG).contains(&self.y_he) {
            return Err(ThermoError::ConfigurationError(format!(
                "Y_He = {} is outside [{YHE_SMALL}, {YHE_BIG}]",
                self.y_he
            )));
        }
        match self.reionization {
            ReionizationScheme::None => {}
            ReionizationScheme::Camb(ReionizationInput::Redshift(z_reio)) => {
                if !(z_reio.is_finite() && z_reio >= 0.) {
                    return Err(ThermoError::ConfigurationError(format!(
                        "reionization redshift must be finite and >= 0, got {z_reio}"
                    )));
                }
            }
            ReionizationScheme::Camb(ReionizationInput::OpticalDepth(tau)) => {
                if !(tau.is_finite() && tau > 0.) {
                    return Err(ThermoError::ConfigurationError(format!(
                        "reionization optical depth must be finite and > 0, got {tau}"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Helium to hydrogen number ratio, `f_He = Y_He / (not4 (1 − Y_He))`.
    pub fn f_he(&self) -> f64 {
        self.y_he / (NOT4 * (1. - self.y_he))
    }
}
