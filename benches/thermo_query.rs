use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use cosmotherm::background::lcdm::{LcdmBackground, LcdmParameters};
use cosmotherm::indices::ThermoQuantity;
use cosmotherm::precision::ThermoPrecision;
use cosmotherm::thermo_params::ThermoParams;
use cosmotherm::thermodynamics::{InterpolationMode, ThermoContext};

fn bench_queries(c: &mut Criterion) {
    let background = LcdmBackground::new(LcdmParameters::default()).unwrap();
    let thermo =
        ThermoContext::new(&ThermoParams::default(), &ThermoPrecision::default(), &background)
            .unwrap();
    let (_, z_max) = thermo.z_range();

    // a perturbation code walks the table from early to late times
    let sequential: Vec<f64> = (0..10_000)
        .map(|i| z_max * (1. - i as f64 / 10_000.))
        .collect();

    for (label, mode) in [
        ("normal", InterpolationMode::Normal),
        ("closeby", InterpolationMode::Closeby),
    ] {
        c.bench_function(&format!("thermo_query/sequential_{label}"), |b| {
            b.iter(|| {
                let mut last_index = 0;
                let mut acc = 0.;
                for &z in &sequential {
                    let row = thermo.at_z(black_box(z), mode, &mut last_index).unwrap();
                    acc += row.get(ThermoQuantity::G).unwrap();
                }
                acc
            })
        });
    }

    let mut rng = StdRng::seed_from_u64(0xC0FFEE);
    c.bench_function("thermo_query/random_normal", |b| {
        b.iter_batched(
            || {
                // Pre-generate inputs to keep the RNG out of the timed section
                (0..10_000)
                    .map(|_| rng.random_range(0.0..z_max))
                    .collect::<Vec<f64>>()
            },
            |cases| {
                let mut last_index = 0;
                for z in cases {
                    let row = thermo
                        .at_z(z, InterpolationMode::Normal, &mut last_index)
                        .unwrap();
                    black_box(row.get(ThermoQuantity::ExpMKappa).unwrap());
                }
            },
            BatchSize::LargeInput,
        )
    });
}

criterion_group!(
    name = benches;
    config = Criterion::default();
    targets = bench_queries
);
criterion_main!(benches);
