#![allow(dead_code)]

use std::sync::LazyLock;

use cosmotherm::background::lcdm::{LcdmBackground, LcdmParameters};
use cosmotherm::background::Background;
use cosmotherm::indices::ThermoQuantity;
use cosmotherm::precision::ThermoPrecision;
use cosmotherm::thermo_params::{ReionizationInput, ReionizationScheme, ThermoParams};
use cosmotherm::thermodynamics::ThermoContext;
use rand::rngs::StdRng;
use rand::Rng;

pub static BACKGROUND: LazyLock<LcdmBackground> =
    LazyLock::new(|| LcdmBackground::new(LcdmParameters::default()).unwrap());

/// Fiducial run: default precision, reionization at z = 11.
pub static FIDUCIAL: LazyLock<ThermoContext> = LazyLock::new(|| {
    ThermoContext::new(
        &ThermoParams::default(),
        &ThermoPrecision::default(),
        &*BACKGROUND,
    )
    .unwrap()
});

/// Recombination grid of 5 units of redshift, enough for the structural checks.
pub fn coarse_precision() -> ThermoPrecision {
    ThermoPrecision::builder().recfast_nz0(2000).build().unwrap()
}

/// A random cosmology around the fiducial one, with a random reionization input.
pub fn random_cosmology(rng: &mut StdRng) -> (LcdmBackground, ThermoParams) {
    let background = LcdmBackground::new(LcdmParameters {
        h: rng.random_range(0.62..0.74),
        omega_b: rng.random_range(0.020..0.024),
        omega_cdm: rng.random_range(0.10..0.14),
        t_cmb: 2.7255,
        n_eff: 3.046,
    })
    .unwrap();
    let input = if rng.random_bool(0.5) {
        ReionizationInput::Redshift(rng.random_range(6.0..15.0))
    } else {
        ReionizationInput::OpticalDepth(rng.random_range(0.04..0.09))
    };
    let params = ThermoParams::new(
        2.7255,
        rng.random_range(0.22..0.28),
        ReionizationScheme::Camb(input),
    )
    .unwrap();
    (background, params)
}

/// `∫ g dη` over the whole table, trapezoid rule on the table rows.
pub fn visibility_integral(thermo: &ThermoContext, background: &dyn Background) -> f64 {
    let table = thermo.table();
    let g = table.column(ThermoQuantity::G).unwrap();
    let eta: Vec<f64> = table
        .z()
        .iter()
        .map(|&z| background.at_z(z).unwrap().conformal_time)
        .collect();
    (0..g.len() - 1)
        .map(|i| 0.5 * (g[i] + g[i + 1]) * (eta[i] - eta[i + 1]))
        .sum()
}
