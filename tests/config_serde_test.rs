use cosmotherm::background::lcdm::LcdmParameters;
use cosmotherm::precision::ThermoPrecision;
use cosmotherm::thermo_params::{ReionizationInput, ReionizationScheme, ThermoParams};

#[test]
fn test_precision_round_trip() {
    let precision = ThermoPrecision::builder()
        .recfast_nz0(5000)
        .recfast_heswitch(3)
        .reionization_optical_depth_tol(1e-5)
        .build()
        .unwrap();
    let json = serde_json::to_string(&precision).unwrap();
    let back: ThermoPrecision = serde_json::from_str(&json).unwrap();
    assert_eq!(back, precision);
}

#[test]
fn test_partial_precision_uses_defaults() {
    let precision: ThermoPrecision =
        serde_json::from_str(r#"{ "recfast_nz0": 4000, "ode_rtol": 1e-5 }"#).unwrap();
    assert_eq!(precision.recfast_nz0, 4000);
    assert_eq!(precision.ode_rtol, 1e-5);
    assert_eq!(precision.recfast_fudge_h, ThermoPrecision::default().recfast_fudge_h);
    assert!(precision.validate().is_ok());

    // deserialization does not validate; the pipeline does
    let broken: ThermoPrecision =
        serde_json::from_str(r#"{ "reionization_min_step": 1.0 }"#).unwrap();
    assert!(broken.validate().is_err());
}

#[test]
fn test_reionization_scheme_format() {
    let params = ThermoParams::new(
        2.7255,
        0.24,
        ReionizationScheme::Camb(ReionizationInput::OpticalDepth(0.066)),
    )
    .unwrap();
    let json = serde_json::to_value(params).unwrap();
    assert_eq!(
        json["reionization"],
        serde_json::json!({ "scheme": "camb", "input": { "optical_depth": 0.066 } })
    );
    let back: ThermoParams = serde_json::from_value(json).unwrap();
    assert_eq!(back, params);

    let none: ThermoParams = serde_json::from_str(
        r#"{ "t_cmb": 2.7255, "y_he": 0.25, "reionization": { "scheme": "none" } }"#,
    )
    .unwrap();
    assert_eq!(none.reionization, ReionizationScheme::None);
}

#[test]
fn test_background_parameters_round_trip() {
    let params = LcdmParameters {
        h: 0.7,
        ..LcdmParameters::default()
    };
    let json = serde_json::to_string(&params).unwrap();
    assert_eq!(serde_json::from_str::<LcdmParameters>(&json).unwrap(), params);
}
