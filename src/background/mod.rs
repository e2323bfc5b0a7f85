//! # Cosmological background
//!
//! The thermodynamics pipeline only needs a handful of background quantities as functions of
//! redshift: the Hubble rate and its first two redshift derivatives, the baryon and photon
//! densities, the conformal time and the comoving sound horizon. They are exposed through the
//! [`Background`] trait so that any background solver can drive the pipeline.
//!
//! ## Overview
//!
//! - [`Background`]: the read-only interface consumed by the recombination, reionization and
//!   merge stages,
//! - [`BackgroundPoint`]: one evaluation of the background at a given redshift,
//! - [`lcdm::LcdmBackground`]: a flat ΛCDM model with photons and massless neutrinos, used as
//!   the reference background of the crate and in the tests.
//!
//! ## Units
//!
//! Distances and times are in Mpc (c = 1), rates in 1/Mpc and densities in 1/Mpc² with the
//! normalization `H² = Σ ρ` of a flat universe.
//!
//! ## See also
//!
//! * [`crate::thermodynamics::ThermoContext::new`] – consumes a `&dyn Background`.
use crate::constants::{InvMpc, Mpc, Redshift};
use crate::thermo_errors::ThermoError;

pub mod lcdm;

/// Background quantities at a single redshift.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackgroundPoint {
    /// Scale factor, `a = 1 / (1 + z)`.
    pub a: f64,
    /// Hubble rate `H` in 1/Mpc.
    pub hubble: InvMpc,
    /// `dH/dz` in 1/Mpc.
    pub dhubble_dz: InvMpc,
    /// `d²H/dz²` in 1/Mpc.
    pub d2hubble_dz2: InvMpc,
    /// Baryon density in 1/Mpc².
    pub rho_b: f64,
    /// Photon density in 1/Mpc².
    pub rho_g: f64,
    /// Conformal time `η` in Mpc.
    pub conformal_time: Mpc,
    /// Comoving sound horizon of the photon-baryon fluid in Mpc.
    pub sound_horizon: Mpc,
}

/// Read-only cosmological background.
///
/// Implementors must be shareable between threads; the thermodynamics pipeline itself only
/// borrows the background for the duration of [`crate::thermodynamics::ThermoContext::new`].
pub trait Background: Send + Sync {
    /// Evaluate every background quantity at redshift `z`.
    ///
    /// Return
    /// ----------
    /// * The background point, or [`ThermoError::OutOfRangeQuery`] if `z` is outside the
    ///   range covered by the background.
    fn at_z(&self, z: Redshift) -> Result<BackgroundPoint, ThermoError>;

    /// Hubble rate today, `H0`, in 1/Mpc.
    fn hubble_today(&self) -> InvMpc;

    /// Baryon density parameter today, `Ω_b`.
    fn omega0_b(&self) -> f64;

    /// Hubble rate at redshift `z`, in 1/Mpc.
    ///
    /// The default goes through [`Background::at_z`]; implementors with a closed form should
    /// override it, it is called at every right-hand side evaluation of the recombination ODE.
    fn hubble(&self, z: Redshift) -> Result<InvMpc, ThermoError> {
        Ok(self.at_z(z)?.hubble)
    }
}
