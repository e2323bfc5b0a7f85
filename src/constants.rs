//! # Constants and type definitions for cosmotherm
//!
//! This module centralizes the **physical constants**, the **RECFAST atomic constants** and the
//! **hard limits** imposed on cosmological inputs. Everything here is immutable: engines read the
//! values by reference, nothing is mutated process-wide.
//!
//! ## Overview
//!
//! - SI physical constants (speed of light, Planck and Boltzmann constants, masses, Thomson cross-section)
//! - Unit conversions (Mpc ↔ m)
//! - RECFAST 1.4 wavenumbers, Einstein coefficients and fitting constants
//! - Accepted ranges for the CMB temperature and the primordial helium fraction
//! - Type aliases used across the crate

// -------------------------------------------------------------------------------------------------
// Physical constants and unit conversions
// -------------------------------------------------------------------------------------------------

/// π
pub const PI: f64 = std::f64::consts::PI;

/// Speed of light in m/s
pub const C_LIGHT: f64 = 2.997_924_58e8;

/// Newton constant in m³/kg/s²
pub const G_NEWTON: f64 = 6.674_28e-11;

/// Planck constant in J·s
pub const H_PLANCK: f64 = 6.626_068_96e-34;

/// Boltzmann constant in J/K
pub const K_BOLTZMANN: f64 = 1.380_650_4e-23;

/// Stefan-Boltzmann constant in W/m²/K⁴
pub const SIGMA_B: f64 = 2. * PI * PI * PI * PI * PI * K_BOLTZMANN * K_BOLTZMANN * K_BOLTZMANN
    * K_BOLTZMANN
    / 15.
    / H_PLANCK
    / H_PLANCK
    / H_PLANCK
    / C_LIGHT
    / C_LIGHT;

/// One megaparsec in meters
pub const MPC_OVER_M: f64 = 3.085_677_581_282e22;

/// Electron mass in kg
pub const M_E: f64 = 9.109_382_15e-31;

/// Proton mass in kg
pub const M_P: f64 = 1.672_621_637e-27;

/// Hydrogen atom mass in kg
pub const M_H: f64 = 1.673_575e-27;

/// Helium to hydrogen mass ratio
pub const NOT4: f64 = 3.9715;

/// Thomson cross-section in m²
pub const SIGMA_THOMSON: f64 = 6.652_461_6e-29;

// -------------------------------------------------------------------------------------------------
// RECFAST atomic constants
// -------------------------------------------------------------------------------------------------

/// Two-photon decay rate of hydrogen 2s in 1/s
pub const LAMBDA_H: f64 = 8.224_580_9;
/// Two-photon decay rate of helium 2s in 1/s
pub const LAMBDA_HE: f64 = 51.3;
/// Hydrogen ionization wavenumber in 1/m
pub const L_H_ION: f64 = 1.096_787_737e7;
/// Hydrogen Lyman-α wavenumber in 1/m
pub const L_H_ALPHA: f64 = 8.225_916_453e6;
/// HeI ionization wavenumber in 1/m
pub const L_HE1_ION: f64 = 1.983_107_72e7;
/// HeII ionization wavenumber in 1/m
pub const L_HE2_ION: f64 = 4.389_088_863e7;
/// HeI 2s wavenumber in 1/m
pub const L_HE_2S: f64 = 1.662_774_34e7;
/// HeI 2p wavenumber in 1/m
pub const L_HE_2P: f64 = 1.711_348_91e7;
/// HeI singlet 2p Einstein coefficient in 1/s
pub const A2P_S: f64 = 1.798_287e9;
/// HeI triplet 2p Einstein coefficient in 1/s
pub const A2P_T: f64 = 177.58;
/// HeI triplet 2p wavenumber in 1/m
pub const L_HE_2PT: f64 = 1.690_871_466e7;
/// HeI triplet 2s wavenumber in 1/m
pub const L_HE_2ST: f64 = 1.598_559_752_6e7;
/// Ionization wavenumber of the HeI 2s triplet in 1/m
pub const L_HE2ST_ION: f64 = 3.845_469_384_5e6;
/// Cross-section of the HeI singlet 2p transition in m²
pub const SIGMA_HE_2PS: f64 = 1.436_289e-22;
/// Cross-section of the HeI triplet 2p transition in m²
pub const SIGMA_HE_2PT: f64 = 1.484_872e-22;

/// Pequignot, Petitjean & Boisson fit for the hydrogen case-B recombination coefficient
pub const A_PPB: f64 = 4.309;
pub const B_PPB: f64 = -0.6166;
pub const C_PPB: f64 = 0.6703;
pub const D_PPB: f64 = 0.5300;

/// Verner & Ferland fit for the helium singlet recombination coefficient
pub const A_VF: f64 = 1.803_017_740_859_57e-17; // 10^-16.744
pub const B_VF: f64 = 0.711;
pub const T_0: f64 = 2.999_998_240_459_423; // 10^0.477121
pub const T_1: f64 = 130_016.957_803_329; // 10^5.114

/// Helium triplet recombination fit
pub const A_TRIP: f64 = 4.943_106_869_868_343_5e-17; // 10^-16.306
pub const B_TRIP: f64 = 0.761;

/// Argument above which the helium Boltzmann factor is capped
pub const HE_BOLTZ_CAP: f64 = 680.;

// -------------------------------------------------------------------------------------------------
// Limits imposed on input parameters and on the recombination epoch
// -------------------------------------------------------------------------------------------------

/// Maximal CMB temperature today in K
pub const TCMB_BIG: f64 = 2.8;
/// Minimal CMB temperature today in K
pub const TCMB_SMALL: f64 = 2.7;
/// Maximal primordial helium fraction
pub const YHE_BIG: f64 = 0.5;
/// Minimal primordial helium fraction
pub const YHE_SMALL: f64 = 0.01;

// -------------------------------------------------------------------------------------------------
// Type aliases
// -------------------------------------------------------------------------------------------------

/// Redshift (dimensionless)
pub type Redshift = f64;
/// Temperature in Kelvin
pub type Kelvin = f64;
/// Comoving length or conformal time in Mpc (c = 1)
pub type Mpc = f64;
/// Inverse comoving length (rates in conformal time) in 1/Mpc
pub type InvMpc = f64;
