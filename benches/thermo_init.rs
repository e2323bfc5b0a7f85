use criterion::{black_box, criterion_group, criterion_main, Criterion};

use cosmotherm::background::lcdm::{LcdmBackground, LcdmParameters};
use cosmotherm::precision::ThermoPrecision;
use cosmotherm::thermo_params::{ReionizationInput, ReionizationScheme, ThermoParams};
use cosmotherm::thermodynamics::ThermoContext;

fn bench_init(c: &mut Criterion) {
    let background = LcdmBackground::new(LcdmParameters::default()).unwrap();
    let precision = ThermoPrecision::default();

    let by_redshift = ThermoParams::default();
    c.bench_function("thermo_init/reionization_redshift", |b| {
        b.iter(|| ThermoContext::new(black_box(&by_redshift), &precision, &background).unwrap())
    });

    // the optical depth input adds the root search over the reionization redshift
    let by_optical_depth = ThermoParams {
        reionization: ReionizationScheme::Camb(ReionizationInput::OpticalDepth(0.066)),
        ..ThermoParams::default()
    };
    c.bench_function("thermo_init/reionization_optical_depth", |b| {
        b.iter(|| {
            ThermoContext::new(black_box(&by_optical_depth), &precision, &background).unwrap()
        })
    });
}

criterion_group!(
    name = benches;
    config = Criterion::default()
        .sample_size(10)
        .measurement_time(std::time::Duration::from_secs(20));
    targets = bench_init
);
criterion_main!(benches);
