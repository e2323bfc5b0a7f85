pub mod background;
pub mod constants;
pub mod indices;
pub mod merge;
pub mod numerics;
pub mod precision;
pub mod recombination;
pub mod reionization;
pub mod table;
pub mod thermo_errors;
pub mod thermo_params;
pub mod thermodynamics;

#[cfg(test)]
pub(crate) mod unit_test_global {
    use std::sync::LazyLock;

    use crate::{
        background::lcdm::{LcdmBackground, LcdmParameters},
        indices::IndexRegistry,
        precision::ThermoPrecision,
        recombination::{recombination_with_recfast, RecombinationHistory},
        reionization::{reionization_camb, ReionizationHistory},
        thermo_params::{ReionizationInput, ReionizationScheme, ThermoParams},
    };

    pub(crate) static BACKGROUND: LazyLock<LcdmBackground> =
        LazyLock::new(|| LcdmBackground::new(LcdmParameters::default()).unwrap());

    /// Coarse recombination grid, 5 units of redshift per step.
    pub(crate) static PRECISION: LazyLock<ThermoPrecision> =
        LazyLock::new(|| ThermoPrecision::builder().recfast_nz0(2000).build().unwrap());

    pub(crate) static RECOMBINATION: LazyLock<RecombinationHistory> = LazyLock::new(|| {
        let params = ThermoParams::new(2.7255, 0.25, ReionizationScheme::None).unwrap();
        recombination_with_recfast(&params, &PRECISION, &*BACKGROUND, IndexRegistry::full())
            .unwrap()
    });

    pub(crate) static REIONIZATION_Z11: LazyLock<ReionizationHistory> = LazyLock::new(|| {
        reionization_camb(
            ReionizationInput::Redshift(11.),
            &PRECISION,
            &*BACKGROUND,
            &RECOMBINATION,
            IndexRegistry::full(),
        )
        .unwrap()
    });
}
