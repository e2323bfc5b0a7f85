use thiserror::Error;

/// Errors raised while building or querying the thermodynamics tables.
///
/// Every variant is fatal to the current run: the pipeline never continues with a partial table.
#[derive(Error, Debug)]
pub enum ThermoError {
    #[error("Invalid thermodynamics configuration: {0}")]
    ConfigurationError(String),

    #[error("Unknown thermodynamics quantity: {0}")]
    UnknownQuantity(String),

    #[error("Quantity requested twice in the same table layout: {0}")]
    DuplicateQuantity(String),

    #[error(
        "Numerical divergence during {stage} at z = {redshift:.6e} (last step = {step:.3e}, iterations = {iterations}): {reason}"
    )]
    NumericalDivergence {
        stage: &'static str,
        redshift: f64,
        step: f64,
        iterations: usize,
        reason: String,
    },

    #[error(
        "Reionization optical depth {target} cannot be reached: admissible range is [{tau_min:.6}, {tau_max:.6}]"
    )]
    UnreachableOpticalDepth {
        target: f64,
        tau_min: f64,
        tau_max: f64,
    },

    #[error("Redshift table is not strictly monotone at row {row}: {previous} followed by {current}")]
    MonotonicityViolation {
        row: usize,
        previous: f64,
        current: f64,
    },

    #[error("Redshift {z} is outside the tabulated range [{z_min}, {z_max}]")]
    OutOfRangeQuery { z: f64, z_min: f64, z_max: f64 },

    #[error("ROOTS finding error: {0}")]
    RootFindingError(#[from] roots::SearchError),
}

impl ThermoError {
    pub(crate) fn divergence(
        stage: &'static str,
        redshift: f64,
        step: f64,
        iterations: usize,
        reason: impl Into<String>,
    ) -> Self {
        ThermoError::NumericalDivergence {
            stage,
            redshift,
            step,
            iterations,
            reason: reason.into(),
        }
    }
}

impl PartialEq for ThermoError {
    fn eq(&self, other: &Self) -> bool {
        use ThermoError::*;
        match (self, other) {
            (ConfigurationError(a), ConfigurationError(b)) => a == b,
            (UnknownQuantity(a), UnknownQuantity(b)) => a == b,
            (DuplicateQuantity(a), DuplicateQuantity(b)) => a == b,
            (RootFindingError(a), RootFindingError(b)) => a == b,

            // Diagnostics carry floating point context: same variant and same stage is enough
            (NumericalDivergence { stage: a, .. }, NumericalDivergence { stage: b, .. }) => a == b,
            (UnreachableOpticalDepth { .. }, UnreachableOpticalDepth { .. }) => true,
            (MonotonicityViolation { row: a, .. }, MonotonicityViolation { row: b, .. }) => a == b,
            (OutOfRangeQuery { .. }, OutOfRangeQuery { .. }) => true,

            _ => false,
        }
    }
}
