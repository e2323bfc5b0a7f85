//! # Flat ΛCDM reference background
//!
//! A minimal background made of baryons, cold dark matter, photons, massless neutrinos and a
//! cosmological constant closing the budget (`Ω_Λ = 1 − Ω_m − Ω_r`).
//!
//! ## Overview
//!
//! * `H(z)` and its first two redshift derivatives are analytic.
//! * Conformal time `η(a) = ∫ da / (a² H)` and the sound horizon `r_s(a) = ∫ c_s dη` are
//!   tabulated once at construction on a uniform `ln a` grid with the trapezoidal rule, starting
//!   from the radiation-dominated solution `η = a / (H0 √Ω_r)` at `a = 10⁻¹⁴`. Queries interpolate
//!   the tables with a natural cubic spline.
//!
//! ## Example
//!
//! ```rust,no_run
//! use cosmotherm::background::lcdm::{LcdmBackground, LcdmParameters};
//! use cosmotherm::background::Background;
//!
//! let background = LcdmBackground::new(LcdmParameters::default()).unwrap();
//! let point = background.at_z(1100.0).unwrap();
//! println!("eta(z = 1100) = {} Mpc", point.conformal_time);
//! ```
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Background, BackgroundPoint};
use crate::constants::{InvMpc, Redshift, C_LIGHT, G_NEWTON, MPC_OVER_M, PI, SIGMA_B};
use crate::numerics::spline::{CubicSpline, SplineBoundary};
use crate::thermo_errors::ThermoError;

/// Smallest tabulated scale factor.
const A_MIN: f64 = 1e-14;
/// Number of nodes of the `ln a` tables.
const N_LN_A: usize = 5000;
/// Hubble rate for `h = 1`, in km/s/Mpc.
const H100_KM_S_MPC: f64 = 100.;

/// Physical inputs of [`LcdmBackground`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LcdmParameters {
    /// Reduced Hubble constant, `H0 = 100 h km/s/Mpc`.
    pub h: f64,
    /// Physical baryon density `Ω_b h²`.
    pub omega_b: f64,
    /// Physical cold dark matter density `Ω_cdm h²`.
    pub omega_cdm: f64,
    /// CMB temperature today in K.
    pub t_cmb: f64,
    /// Effective number of massless neutrino species.
    pub n_eff: f64,
}

impl Default for LcdmParameters {
    fn default() -> Self {
        LcdmParameters {
            h: 0.67556,
            omega_b: 0.022032,
            omega_cdm: 0.12038,
            t_cmb: 2.7255,
            n_eff: 3.046,
        }
    }
}

/// Flat ΛCDM background with tabulated conformal time and sound horizon.
#[derive(Debug, Clone)]
pub struct LcdmBackground {
    params: LcdmParameters,
    h0: InvMpc,
    omega0_b: f64,
    omega0_g: f64,
    omega0_r: f64,
    omega0_m: f64,
    omega0_lambda: f64,
    conformal_time: CubicSpline,
    sound_horizon: CubicSpline,
}

impl LcdmBackground {
    /// Build the background and tabulate its integrated quantities.
    ///
    /// Arguments
    /// -----------------
    /// * `params`: physical inputs.
    ///
    /// Return
    /// ----------
    /// * The background, or [`ThermoError::ConfigurationError`] when an input is out of its
    ///   physical range or when matter and radiation alone exceed the critical density.
    pub fn new(params: LcdmParameters) -> Result<Self, ThermoError> {
        let positive = |v: f64| v > 0.;
        if !(positive(params.h) && params.h <= 2.) {
            return Err(ThermoError::ConfigurationError(format!(
                "h must be in (0, 2], got {}",
                params.h
            )));
        }
        if !positive(params.omega_b) || !(params.omega_cdm >= 0.) {
            return Err(ThermoError::ConfigurationError(
                "omega_b must be > 0 and omega_cdm >= 0".into(),
            ));
        }
        if !positive(params.t_cmb) || !(params.n_eff >= 0.) {
            return Err(ThermoError::ConfigurationError(
                "t_cmb must be > 0 and n_eff >= 0".into(),
            ));
        }

        let h0 = params.h * H100_KM_S_MPC * 1e3 / C_LIGHT;
        let h0_si = h0 * C_LIGHT / MPC_OVER_M;
        let rho_crit_energy = 3. * h0_si * h0_si * C_LIGHT * C_LIGHT / (8. * PI * G_NEWTON);
        let rho_g_energy = 4. * SIGMA_B / C_LIGHT * params.t_cmb.powi(4);

        let h2 = params.h * params.h;
        let omega0_g = rho_g_energy / rho_crit_energy;
        let omega0_ur = params.n_eff * 7. / 8. * (4f64 / 11.).powf(4. / 3.) * omega0_g;
        let omega0_r = omega0_g + omega0_ur;
        let omega0_b = params.omega_b / h2;
        let omega0_m = (params.omega_b + params.omega_cdm) / h2;
        let omega0_lambda = 1. - omega0_m - omega0_r;
        if omega0_lambda < 0. {
            return Err(ThermoError::ConfigurationError(format!(
                "matter and radiation exceed the critical density (Omega_Lambda = {omega0_lambda:.4})"
            )));
        }

        let r_over_a = 3. * omega0_b / (4. * omega0_g);
        let (conformal_time, sound_horizon) =
            tabulate_integrals(h0, [omega0_r, omega0_m, omega0_lambda], r_over_a)?;

        let background = LcdmBackground {
            params,
            h0,
            omega0_b,
            omega0_g,
            omega0_r,
            omega0_m,
            omega0_lambda,
            conformal_time,
            sound_horizon,
        };

        debug!(
            "LCDM background: H0 = {:.6e} 1/Mpc, Omega_r = {:.4e}, Omega_m = {:.4}, Omega_Lambda = {:.4}",
            h0, omega0_r, omega0_m, omega0_lambda
        );
        Ok(background)
    }

    /// Physical inputs of this background.
    pub fn parameters(&self) -> &LcdmParameters {
        &self.params
    }

    /// Largest redshift covered by the conformal-time table.
    pub fn z_max(&self) -> Redshift {
        1. / A_MIN - 1.
    }

    /// Dimensionless `E² = H² / H0²` at `x = 1 + z`.
    #[inline]
    fn e2(&self, x: f64) -> f64 {
        e2([self.omega0_r, self.omega0_m, self.omega0_lambda], x)
    }

    fn check_range(&self, z: Redshift) -> Result<(), ThermoError> {
        let z_max = self.z_max();
        if !(z >= 0. && z <= z_max) {
            return Err(ThermoError::OutOfRangeQuery {
                z,
                z_min: 0.,
                z_max,
            });
        }
        Ok(())
    }
}

#[inline]
fn e2([omega_r, omega_m, omega_lambda]: [f64; 3], x: f64) -> f64 {
    omega_r * x.powi(4) + omega_m * x.powi(3) + omega_lambda
}

/// Tabulate `η(ln a)` and `r_s(ln a)` with the trapezoidal rule.
///
/// `r_over_a` is the baryon-to-photon momentum density ratio `R = 3ρ_b / (4ρ_γ)` divided by `a`.
fn tabulate_integrals(
    h0: InvMpc,
    omegas: [f64; 3],
    r_over_a: f64,
) -> Result<(CubicSpline, CubicSpline), ThermoError> {
    let ln_a_min = A_MIN.ln();
    let step = -ln_a_min / (N_LN_A - 1) as f64;
    let ln_a: Vec<f64> = (0..N_LN_A)
        .map(|i| {
            if i == N_LN_A - 1 {
                0.
            } else {
                ln_a_min + i as f64 * step
            }
        })
        .collect();

    // dη/d(ln a) and dr_s/d(ln a)
    let integrands = |lna: f64| {
        let a = lna.exp();
        let deta = 1. / (a * h0 * e2(omegas, 1. / a).sqrt());
        let cs = 1. / (3. * (1. + r_over_a * a)).sqrt();
        (deta, cs * deta)
    };

    let eta_start = A_MIN / (h0 * omegas[0].sqrt());
    let mut eta = Vec::with_capacity(N_LN_A);
    let mut rs = Vec::with_capacity(N_LN_A);
    eta.push(eta_start);
    rs.push(eta_start / 3f64.sqrt());

    let (mut deta_prev, mut drs_prev) = integrands(ln_a[0]);
    for i in 1..N_LN_A {
        let h = ln_a[i] - ln_a[i - 1];
        let (deta, drs) = integrands(ln_a[i]);
        eta.push(eta[i - 1] + 0.5 * h * (deta + deta_prev));
        rs.push(rs[i - 1] + 0.5 * h * (drs + drs_prev));
        deta_prev = deta;
        drs_prev = drs;
    }

    Ok((
        CubicSpline::new(ln_a.clone(), eta, SplineBoundary::Natural)?,
        CubicSpline::new(ln_a, rs, SplineBoundary::Natural)?,
    ))
}

impl Background for LcdmBackground {
    fn at_z(&self, z: Redshift) -> Result<BackgroundPoint, ThermoError> {
        self.check_range(z)?;
        let x = 1. + z;
        let h0_2 = self.h0 * self.h0;
        let hubble = self.h0 * self.e2(x).sqrt();
        let dhubble_dz =
            h0_2 * (4. * self.omega0_r * x.powi(3) + 3. * self.omega0_m * x * x) / (2. * hubble);
        let d2hubble_dz2 = (h0_2 * (12. * self.omega0_r * x * x + 6. * self.omega0_m * x) / 2.
            - dhubble_dz * dhubble_dz)
            / hubble;

        let ln_a = -z.ln_1p();
        Ok(BackgroundPoint {
            a: 1. / x,
            hubble,
            dhubble_dz,
            d2hubble_dz2,
            rho_b: h0_2 * self.omega0_b * x.powi(3),
            rho_g: h0_2 * self.omega0_g * x.powi(4),
            conformal_time: self.conformal_time.evaluate(ln_a)?,
            sound_horizon: self.sound_horizon.evaluate(ln_a)?,
        })
    }

    fn hubble_today(&self) -> InvMpc {
        self.h0
    }

    fn omega0_b(&self) -> f64 {
        self.omega0_b
    }

    fn hubble(&self, z: Redshift) -> Result<InvMpc, ThermoError> {
        self.check_range(z)?;
        Ok(self.h0 * self.e2(1. + z).sqrt())
    }
}

impl fmt::Display for LcdmBackground {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "LcdmBackground(h={:.5}, omega_b={:.5}, omega_cdm={:.5}, T_cmb={:.4}K, N_eff={:.3}, Omega_Lambda={:.4})",
            self.params.h,
            self.params.omega_b,
            self.params.omega_cdm,
            self.params.t_cmb,
            self.params.n_eff,
            self.omega0_lambda
        )
    }
}
