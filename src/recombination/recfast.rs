//! # RECFAST 1.4 rate law
//!
//! Closed-form effective three-level atom for hydrogen and helium, as in RECFAST 1.4, with the
//! optional helium singlet/triplet corrections selected by `recfast_heswitch`:
//!
//! | heswitch | helium corrections |
//! |---|---|
//! | 0 | none (Peebles K factor only) |
//! | 1 | singlet 2¹P escape probability (Sobolev) |
//! | 2 | + continuum opacity of H on the singlet line |
//! | 3 | + triplet 2³P channel (Sobolev only) |
//! | 5 | triplet without continuum opacity |
//! | 6 | all corrections |
//!
//! [`RecfastCoefficients`] holds the constants derived once per run from the inputs;
//! [`RecfastSystem`] borrows them with the background for the duration of one integration and
//! implements the right-hand side `d(x_H, x_He, T_mat)/dz`.
use nalgebra::Vector3;

use crate::background::Background;
use crate::constants::*;
use crate::numerics::ode::OdeSystem;
use crate::precision::ThermoPrecision;
use crate::thermo_errors::ThermoError;
use crate::thermo_params::ThermoParams;

/// Constants of the RECFAST rate law for one set of inputs.
#[derive(Debug, Clone, PartialEq)]
pub struct RecfastCoefficients {
    /// `ΔB / k_B` for hydrogen (ionization minus Lyman-α energy), in K.
    pub cdb: f64,
    /// `ΔB / k_B` for HeI (ionization minus 2s energy), in K.
    pub cdb_he: f64,
    /// Hydrogen ionization energy over `k_B`, in K.
    pub cb1: f64,
    /// HeI ionization energy over `k_B`, in K.
    pub cb1_he1: f64,
    /// HeII ionization energy over `k_B`, in K.
    pub cb1_he2: f64,
    /// `2π m_e k_B / h²`, in 1/(K m²).
    pub cr: f64,
    /// Peebles K factor constant for hydrogen, `λ_α³ / 8π`.
    pub ck: f64,
    /// Peebles K factor constant for helium, `λ_He³ / 8π`.
    pub ck_he: f64,
    /// Lyman-α energy over `k_B`, in K.
    pub cl: f64,
    /// HeI 2s energy over `k_B`, in K.
    pub cl_he: f64,
    /// Compton coupling constant `(8/3) σ_T a_rad / (m_e c)`.
    pub ct: f64,
    /// HeI 2p–2s energy difference over `k_B`, in K.
    pub bfact: f64,
    /// Hydrogen fudge factor.
    pub fu: f64,
    /// Helium fudge factor.
    pub fudge_he: f64,
    /// Tight coupling threshold on `t_Thomson / t_Hubble`.
    pub h_frac: f64,
    /// CMB temperature today, in K.
    pub t_now: f64,
    /// Hydrogen number density today, in 1/m³.
    pub n_now: f64,
    /// Helium to hydrogen number ratio.
    pub f_he: f64,
    /// Primordial helium mass fraction.
    pub y_he: f64,
    /// Hubble rate today in 1/s.
    pub h0_si: f64,
    pub heswitch: u8,
    pub x_he0_trigger2: f64,
    pub x_h0_trigger2: f64,
}

impl RecfastCoefficients {
    /// Derive the rate-law constants.
    ///
    /// Arguments
    /// -----------------
    /// * `params`: CMB temperature and helium fraction (assumed validated).
    /// * `precision`: fudge factors, helium switch and regime thresholds.
    /// * `background`: provides `H0` and `Ω_b`.
    pub fn new(
        params: &ThermoParams,
        precision: &ThermoPrecision,
        background: &dyn Background,
    ) -> Self {
        let hc_over_k = H_PLANCK * C_LIGHT / K_BOLTZMANN;
        let lambda_alpha = 1. / L_H_ALPHA;
        let lambda_alpha_he = 1. / L_HE_2P;
        let h0_si = background.hubble_today() * C_LIGHT / MPC_OVER_M;
        let a_rad = 4. * SIGMA_B / C_LIGHT;

        RecfastCoefficients {
            cdb: hc_over_k * (L_H_ION - L_H_ALPHA),
            cdb_he: hc_over_k * (L_HE1_ION - L_HE_2S),
            cb1: hc_over_k * L_H_ION,
            cb1_he1: hc_over_k * L_HE1_ION,
            cb1_he2: hc_over_k * L_HE2_ION,
            cr: 2. * PI * (M_E / H_PLANCK) * (K_BOLTZMANN / H_PLANCK),
            ck: lambda_alpha.powi(3) / (8. * PI),
            ck_he: lambda_alpha_he.powi(3) / (8. * PI),
            cl: hc_over_k / lambda_alpha,
            cl_he: hc_over_k * L_HE_2S,
            ct: (8. / 3.) * (SIGMA_THOMSON / (M_E * C_LIGHT)) * a_rad,
            bfact: hc_over_k * (L_HE_2P - L_HE_2S),
            fu: precision.recfast_fudge_h,
            fudge_he: precision.recfast_fudge_he,
            h_frac: precision.recfast_h_frac,
            t_now: params.t_cmb,
            n_now: 3. * h0_si * h0_si * background.omega0_b() * (1. - params.y_he)
                / (8. * PI * G_NEWTON * M_H),
            f_he: params.f_he(),
            y_he: params.y_he,
            h0_si,
            heswitch: precision.recfast_heswitch,
            x_he0_trigger2: precision.recfast_x_he0_trigger2,
            x_h0_trigger2: precision.recfast_x_h0_trigger2,
        }
    }

    /// Free electrons per hydrogen nucleus when every atom is fully ionized.
    #[inline]
    pub fn xe_fully_ionized(&self) -> f64 {
        1. + 2. * self.f_he
    }

    /// `exp(1.5 ln(CR T_now / (1+z)) − binding / (T_now (1+z))) / N_now`, the right-hand side
    /// of the Saha equations with radiation temperature.
    #[inline]
    fn saha_rhs(&self, z: f64, binding: f64) -> f64 {
        (1.5 * (self.cr * self.t_now / (1. + z)).ln() - binding / (self.t_now * (1. + z))).exp()
            / self.n_now
    }

    /// Total `x_e` from the HeIII ⇌ HeII Saha equilibrium (hydrogen fully ionized).
    pub fn saha_he2(&self, z: f64) -> f64 {
        let rhs = self.saha_rhs(z, self.cb1_he2);
        let b = rhs - 1. - self.f_he;
        0.5 * ((b * b + 4. * (1. + 2. * self.f_he) * rhs).sqrt() - b)
    }

    /// Total `x_e` from the HeII ⇌ HeI Saha equilibrium (hydrogen fully ionized).
    pub fn saha_he1(&self, z: f64) -> f64 {
        let rhs = 4. * self.saha_rhs(z, self.cb1_he1);
        let b = rhs - 1.;
        0.5 * ((b * b + 4. * (1. + self.f_he) * rhs).sqrt() - b)
    }

    /// Hydrogen ionization fraction from the Saha equilibrium.
    pub fn saha_h(&self, z: f64) -> f64 {
        let rhs = self.saha_rhs(z, self.cb1);
        // 0.5 (sqrt(rhs² + 4 rhs) - rhs), written to avoid cancellation at large rhs
        2. / (1. + (1. + 4. / rhs).sqrt())
    }

    /// Thomson scattering rate `dκ/dη = (1+z)² N_now x_e σ_T`, in 1/Mpc.
    #[inline]
    pub fn dkappa(&self, z: f64, xe: f64) -> f64 {
        (1. + z) * (1. + z) * self.n_now * xe * SIGMA_THOMSON * MPC_OVER_M
    }

    /// Squared baryon sound speed (c = 1).
    ///
    /// `dtb_dz` is the redshift derivative of the baryon temperature. The value is negative
    /// while `Tb` grows faster than `a³`, which Compton heating does at reionization.
    #[inline]
    pub fn sound_speed_squared(&self, z: f64, xe: f64, tb: f64, dtb_dz: f64) -> f64 {
        K_BOLTZMANN / (C_LIGHT * C_LIGHT * M_H)
            * (1. + (1. / NOT4 - 1.) * self.y_he + xe * (1. - self.y_he))
            * tb
            * (1. + (1. + z) * dtb_dz / (3. * tb))
    }

    /// `dT_mat/dz` from Compton heating and adiabatic cooling.
    ///
    /// Arguments
    /// -----------------
    /// * `z`: redshift.
    /// * `x`: free electrons per hydrogen nucleus.
    /// * `tmat`: matter temperature in K.
    /// * `hubble_si`: Hubble rate at `z` in 1/s.
    pub fn temperature_derivative(&self, z: f64, x: f64, tmat: f64, hubble_si: f64) -> f64 {
        let trad = self.t_now * (1. + z);
        let trad4 = trad.powi(4);
        let time_thomson = (1. + x + self.f_he) / (self.ct * trad4 * x);
        let time_hubble = 2. / (3. * self.h0_si * (1. + z).powf(1.5));
        if time_thomson < self.h_frac * time_hubble {
            tmat / (1. + z)
        } else {
            self.ct * trad4 * x / (1. + x + self.f_he) * (tmat - trad) / (hubble_si * (1. + z))
                + 2. * tmat / (1. + z)
        }
    }
}

/// Right-hand side of the RECFAST system for one integration call.
///
/// State: `y = (x_H, x_He, T_mat)`, independent variable: redshift.
pub struct RecfastSystem<'a> {
    coefficients: &'a RecfastCoefficients,
    background: &'a dyn Background,
}

/// Case-B recombination rate fits evaluated at one matter temperature.
struct Rates {
    rdown: f64,
    rup: f64,
    rdown_he: f64,
    rup_he: f64,
    rdown_trip: f64,
    rup_trip: f64,
}

impl<'a> RecfastSystem<'a> {
    pub fn new(coefficients: &'a RecfastCoefficients, background: &'a dyn Background) -> Self {
        RecfastSystem {
            coefficients,
            background,
        }
    }

    fn rates(&self, tmat: f64) -> Rates {
        let c = self.coefficients;
        let t4 = tmat / 1e4;
        let rdown = 1e-19 * A_PPB * t4.powf(B_PPB) / (1. + C_PPB * t4.powf(D_PPB));
        let saha_factor = (c.cr * tmat).powf(1.5);
        let rup = rdown * saha_factor * (-c.cdb / tmat).exp();

        let sq_0 = (tmat / T_0).sqrt();
        let sq_1 = (tmat / T_1).sqrt();
        let rdown_he = A_VF / (sq_0 * (1. + sq_0).powf(1. - B_VF) * (1. + sq_1).powf(1. + B_VF));
        let rup_he = 4. * rdown_he * saha_factor * (-c.cdb_he / tmat).exp();

        let rdown_trip =
            A_TRIP / (sq_0 * (1. + sq_0).powf(1. - B_TRIP) * (1. + sq_1).powf(1. + B_TRIP));
        let hc_over_kt = H_PLANCK * C_LIGHT / (K_BOLTZMANN * tmat);
        let rup_trip = rdown_trip * (-hc_over_kt * L_HE2ST_ION).exp() * saha_factor * 4. / 3.;

        Rates {
            rdown,
            rup,
            rdown_he,
            rup_he,
            rdown_trip,
            rup_trip,
        }
    }

    /// Doppler-broadened optical depth parameter of a helium line, used with the continuum
    /// opacity correction.
    fn gamma_2p(&self, x_h: f64, x_he: f64, tmat: f64, a2p: f64, sigma: f64, wavenumber: f64) -> f64 {
        let c = self.coefficients;
        let doppler = C_LIGHT
            * wavenumber
            * (2. * K_BOLTZMANN * tmat / (M_H * NOT4 * C_LIGHT * C_LIGHT)).sqrt();
        3. * a2p * c.f_he * (1. - x_he) * C_LIGHT * C_LIGHT
            / (PI.sqrt() * sigma * 8. * PI * doppler * (1. - x_h))
            / (C_LIGHT * wavenumber).powi(2)
    }
}

impl OdeSystem<3> for RecfastSystem<'_> {
    fn rhs(&self, z: f64, y: &Vector3<f64>) -> Result<Vector3<f64>, ThermoError> {
        let c = self.coefficients;
        let (x_h, x_he, tmat) = (y[0], y[1], y[2]);
        let x = x_h + c.f_he * x_he;

        let n = c.n_now * (1. + z).powi(3);
        let n_he = c.f_he * n;
        let hz = self.background.hubble(z)? * C_LIGHT / MPC_OVER_M;

        let r = self.rates(tmat);
        let k = c.ck / hz;

        // helium corrections only while helium is partially recombined
        let heflag = if x_he < 5e-9 || x_he > c.x_he0_trigger2 {
            0
        } else {
            c.heswitch
        };

        let mut k_he = c.ck_he / hz;
        let mut cfhe_t = 0.;
        if heflag > 0 {
            let tau_he_s = A2P_S * c.ck_he * 3. * n_he * (1. - x_he) / hz;
            let p_he_s = (1. - (-tau_he_s).exp()) / tau_he_s;
            k_he = 1. / (A2P_S * p_he_s * 3. * n_he * (1. - x_he));

            if (heflag == 2 || heflag >= 5) && x_h < 0.9999999 {
                let gamma_2ps = self.gamma_2p(x_h, x_he, tmat, A2P_S, SIGMA_HE_2PS, L_HE_2P);
                let (pb, qb) = (0.36, c.fudge_he);
                let a_hcon = A2P_S / (1. + pb * gamma_2ps.powf(qb));
                k_he = 1. / ((A2P_S * p_he_s + a_hcon) * 3. * n_he * (1. - x_he));
            }

            if heflag >= 3 {
                let tau_he_t =
                    A2P_T * n_he * (1. - x_he) * 3. / (8. * PI * hz * L_HE_2PT.powi(3));
                let p_he_t = (1. - (-tau_he_t).exp()) / tau_he_t;
                let cl_pst = H_PLANCK * C_LIGHT * (L_HE_2PT - L_HE_2ST) / K_BOLTZMANN;
                let rate_t = if heflag == 3 || heflag == 5 || x_h >= 0.99999 {
                    A2P_T * p_he_t
                } else {
                    let gamma_2pt =
                        self.gamma_2p(x_h, x_he, tmat, A2P_T, SIGMA_HE_2PT, L_HE_2PT);
                    let (pb, qb) = (0.66, 0.9);
                    let a_hcon = A2P_T / (1. + pb * gamma_2pt.powf(qb)) / 3.;
                    A2P_T * p_he_t + a_hcon
                };
                let raw = rate_t * (-cl_pst / tmat).exp();
                cfhe_t = raw / (r.rup_trip + raw);
            }
        }

        // hydrogen, frozen while it is still in Saha equilibrium
        let dx_h = if x_h > c.x_h0_trigger2 {
            0.
        } else {
            let net_h = x * x_h * n * r.rdown - r.rup * (1. - x_h) * (-c.cl / tmat).exp();
            let k_lambda = k * LAMBDA_H * n * (1. - x_h);
            net_h * (1. + k_lambda)
                / (hz * (1. + z) * (1. / c.fu + k_lambda / c.fu + k * r.rup * n * (1. - x_h)))
        };

        // helium
        let dx_he = if x_he < 1e-15 {
            0.
        } else {
            let he_boltz = (c.bfact / tmat).min(HE_BOLTZ_CAP).exp();
            let k_he_n = k_he * n_he * (1. - x_he) * he_boltz;
            let singlet = (x * x_he * n * r.rdown_he
                - r.rup_he * (1. - x_he) * (-c.cl_he / tmat).exp())
                * (1. + k_he_n * LAMBDA_HE)
                / (hz * (1. + z) * (1. + k_he_n * (LAMBDA_HE + r.rup_he)));
            let triplet = if heflag >= 3 {
                let hc_over_kt = H_PLANCK * C_LIGHT / (K_BOLTZMANN * tmat);
                (x * x_he * n * r.rdown_trip
                    - (1. - x_he) * 3. * r.rup_trip * (-hc_over_kt * L_HE_2ST).exp())
                    * cfhe_t
                    / (hz * (1. + z))
            } else {
                0.
            };
            singlet + triplet
        };

        let dtmat = c.temperature_derivative(z, x, tmat, hz);

        Ok(Vector3::new(dx_h, dx_he, dtmat))
    }
}

#[cfg(test)]
mod recfast_test {
    use super::*;
    use crate::background::lcdm::{LcdmBackground, LcdmParameters};
    use crate::thermo_params::ReionizationScheme;
    use approx::assert_relative_eq;

    fn coefficients() -> (RecfastCoefficients, LcdmBackground) {
        let background = LcdmBackground::new(LcdmParameters::default()).unwrap();
        let params = ThermoParams::new(2.7255, 0.25, ReionizationScheme::None).unwrap();
        let coefficients =
            RecfastCoefficients::new(&params, &ThermoPrecision::default(), &background);
        (coefficients, background)
    }

    #[test]
    fn test_derived_constants() {
        let (c, _) = coefficients();
        // hydrogen ionization energy 13.6 eV
        assert_relative_eq!(c.cb1, 157_807., max_relative = 1e-3);
        assert_relative_eq!(c.cdb, 0.25 * c.cb1, max_relative = 1e-3);
        // ~0.19 hydrogen atoms per m³ today for omega_b = 0.022
        assert!(c.n_now > 0.18 && c.n_now < 0.20);
        assert_relative_eq!(c.f_he, 0.25 / (NOT4 * 0.75));
    }

    #[test]
    fn test_saha_limits() {
        let (c, _) = coefficients();
        assert_relative_eq!(c.saha_he2(9000.), c.xe_fully_ionized(), max_relative = 1e-3);
        assert_relative_eq!(c.saha_he1(4000.), 1. + c.f_he, max_relative = 1e-3);
        assert!(c.saha_he1(1500.) < 1. + 1e-3);
        assert_relative_eq!(c.saha_h(2000.), 1., max_relative = 1e-3);
        assert!(c.saha_h(1000.) < 0.1);
    }

    #[test]
    fn test_scattering_rate_today() {
        let (c, _) = coefficients();
        // n_e σ_T for a fully ionized universe today, in 1/Mpc
        let expected = c.n_now * SIGMA_THOMSON * MPC_OVER_M;
        assert_relative_eq!(c.dkappa(0., 1.), expected);
        assert_relative_eq!(c.dkappa(1., 1.), 4. * expected);
    }

    #[test]
    fn test_sound_speed_of_coupled_plasma() {
        let (c, _) = coefficients();
        let z = 3000.;
        let tb = c.t_now * (1. + z);
        let cb2 = c.sound_speed_squared(z, 1., tb, c.t_now);
        let mu_inv = 1. + (1. / NOT4 - 1.) * c.y_he + (1. - c.y_he);
        assert_relative_eq!(
            cb2,
            K_BOLTZMANN / (C_LIGHT * C_LIGHT * M_H) * mu_inv * tb * 4. / 3.,
            max_relative = 1e-12
        );
    }

    #[test]
    fn test_rhs_is_finite_across_regimes() {
        let (c, background) = coefficients();
        let system = RecfastSystem::new(&c, &background);
        let states = [
            (3000., Vector3::new(1., 0.9, c.t_now * 3001.)),
            (1500., Vector3::new(0.99, 1e-3, c.t_now * 1501.)),
            (1100., Vector3::new(0.2, 1e-10, c.t_now * 1101.)),
            (100., Vector3::new(3e-4, 0., 0.5)),
        ];
        for (z, y) in states {
            let dy = system.rhs(z, &y).unwrap();
            assert!(dy.iter().all(|v| v.is_finite()), "z = {z}: {dy:?}");
        }
        // recombination lowers x_H with decreasing z, so dx_H/dz > 0
        let dy = system
            .rhs(1100., &Vector3::new(0.2, 1e-10, c.t_now * 1101.))
            .unwrap();
        assert!(dy[0] > 0.);
    }

    #[test]
    fn test_hydrogen_frozen_above_trigger() {
        let (c, background) = coefficients();
        let system = RecfastSystem::new(&c, &background);
        for (z, x_h) in [(2900., 1.), (2000., 0.9999), (1600., c.x_h0_trigger2 + 1e-4)] {
            let y = Vector3::new(x_h, 1e-4, c.t_now * (1. + z));
            let dy = system.rhs(z, &y).unwrap();
            assert_eq!(dy[0], 0., "z = {z}, x_H = {x_h}");
        }
        let below = system
            .rhs(1500., &Vector3::new(c.x_h0_trigger2 - 1e-3, 1e-4, c.t_now * 1501.))
            .unwrap();
        assert!(below[0] != 0.);
    }
}
