//! # Cubic splines on tabulated data
//!
//! Second-derivative tables for cubic-spline interpolation, built with the classic tridiagonal
//! sweep, plus the companion operations needed by the thermodynamics pipeline:
//!
//! - [`second_derivatives`] – spline second derivatives with natural or estimated-slope ends,
//! - [`node_derivatives`] – first derivative of the spline at every node,
//! - [`running_integral`] – cumulative integral of the spline from the first node,
//! - [`bracket_index`] / [`closeby_bracket_index`] – interval lookup for increasing abscissas,
//! - [`evaluate_in_bracket`] – spline value inside a known interval.
//!
//! The abscissa only has to be **strictly monotone**: the tridiagonal construction, the
//! node derivatives and the quadrature work unchanged on decreasing grids (the thermodynamics
//! table is increasing in redshift and therefore decreasing in conformal time).
use itertools::Itertools;

use crate::thermo_errors::ThermoError;

/// Boundary condition closing the tridiagonal spline system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplineBoundary {
    /// Zero second derivative at both ends.
    Natural,
    /// First derivative at each end estimated from the parabola through the three outermost nodes.
    EstimatedDerivative,
}

/// Check that `x` is strictly increasing or strictly decreasing.
///
/// Return
/// ----------
/// * `Ok(())`, or [`ThermoError::MonotonicityViolation`] pointing at the first offending row.
pub fn check_strictly_monotone(x: &[f64]) -> Result<(), ThermoError> {
    if x.len() < 2 {
        return Ok(());
    }
    let increasing = x[1] > x[0];
    for (row, (&previous, &current)) in x.iter().tuple_windows().enumerate() {
        let ordered = if increasing {
            current > previous
        } else {
            current < previous
        };
        if !ordered {
            return Err(ThermoError::MonotonicityViolation {
                row: row + 1,
                previous,
                current,
            });
        }
    }
    Ok(())
}

/// Slope at `x[0]` of the parabola through `(x[0], y[0])`, `(x[1], y[1])`, `(x[2], y[2])`.
fn parabola_slope(x: [f64; 3], y: [f64; 3]) -> f64 {
    let d1 = x[1] - x[0];
    let d2 = x[2] - x[0];
    (d2 * d2 * (y[1] - y[0]) - d1 * d1 * (y[2] - y[0])) / (d2 * d1 * (x[2] - x[1]))
}

/// Compute the spline second derivatives of `y(x)`.
///
/// Arguments
/// -----------------
/// * `x`: strictly monotone abscissa.
/// * `y`: ordinates, same length as `x`.
/// * `boundary`: end conditions of the spline.
///
/// Return
/// ----------
/// * The vector of `d²y/dx²` at every node, or
///   [`ThermoError::MonotonicityViolation`] if `x` is not strictly monotone, or
///   [`ThermoError::ConfigurationError`] if the table is too short or lengths differ.
pub fn second_derivatives(
    x: &[f64],
    y: &[f64],
    boundary: SplineBoundary,
) -> Result<Vec<f64>, ThermoError> {
    let n = x.len();
    if y.len() != n {
        return Err(ThermoError::ConfigurationError(format!(
            "spline abscissa and ordinate lengths differ ({n} vs {})",
            y.len()
        )));
    }
    let min_len = match boundary {
        SplineBoundary::Natural => 2,
        SplineBoundary::EstimatedDerivative => 3,
    };
    if n < min_len {
        return Err(ThermoError::ConfigurationError(format!(
            "at least {min_len} nodes are needed to build a spline, got {n}"
        )));
    }
    check_strictly_monotone(x)?;

    let mut ddy = vec![0.0; n];
    let mut u = vec![0.0; n];

    if boundary == SplineBoundary::EstimatedDerivative {
        let dy_first = parabola_slope([x[0], x[1], x[2]], [y[0], y[1], y[2]]);
        ddy[0] = -0.5;
        u[0] = (3. / (x[1] - x[0])) * ((y[1] - y[0]) / (x[1] - x[0]) - dy_first);
    }

    // Forward sweep
    for i in 1..n - 1 {
        let sig = (x[i] - x[i - 1]) / (x[i + 1] - x[i - 1]);
        let p = sig * ddy[i - 1] + 2.;
        ddy[i] = (sig - 1.) / p;
        let slope_jump =
            (y[i + 1] - y[i]) / (x[i + 1] - x[i]) - (y[i] - y[i - 1]) / (x[i] - x[i - 1]);
        u[i] = (6. * slope_jump / (x[i + 1] - x[i - 1]) - sig * u[i - 1]) / p;
    }

    let (qn, un) = match boundary {
        SplineBoundary::Natural => (0., 0.),
        SplineBoundary::EstimatedDerivative => {
            let dy_last = parabola_slope(
                [x[n - 1], x[n - 2], x[n - 3]],
                [y[n - 1], y[n - 2], y[n - 3]],
            );
            let h = x[n - 1] - x[n - 2];
            (0.5, (3. / h) * (dy_last - (y[n - 1] - y[n - 2]) / h))
        }
    };
    ddy[n - 1] = (un - qn * u[n - 2]) / (qn * ddy[n - 2] + 1.);

    // Back substitution
    for k in (0..n - 1).rev() {
        ddy[k] = ddy[k] * ddy[k + 1] + u[k];
    }

    Ok(ddy)
}

/// First derivative of the spline at every node.
pub fn node_derivatives(x: &[f64], y: &[f64], ddy: &[f64]) -> Vec<f64> {
    let n = x.len();
    let mut dy = Vec::with_capacity(n);
    for i in 0..n - 1 {
        let h = x[i + 1] - x[i];
        dy.push((y[i + 1] - y[i]) / h - h * (2. * ddy[i] + ddy[i + 1]) / 6.);
    }
    let h = x[n - 1] - x[n - 2];
    dy.push((y[n - 1] - y[n - 2]) / h + h * (ddy[n - 2] + 2. * ddy[n - 1]) / 6.);
    dy
}

/// Running integral `∫_{x[0]}^{x[i]} y dx` of the spline, one value per node.
///
/// Each interval contributes `h (y_i + y_{i+1}) / 2 − h³ (y''_i + y''_{i+1}) / 24`, which is the
/// exact integral of the cubic piece. The accumulation is a sequential prefix sum.
pub fn running_integral(x: &[f64], y: &[f64], ddy: &[f64]) -> Vec<f64> {
    let mut acc = 0.0;
    let mut out = Vec::with_capacity(x.len());
    out.push(0.0);
    for i in 0..x.len() - 1 {
        acc += interval_integral(x[i + 1] - x[i], [y[i], y[i + 1]], [ddy[i], ddy[i + 1]]);
        out.push(acc);
    }
    out
}

/// Exact integral of one cubic spline piece of width `h`.
#[inline]
pub fn interval_integral(h: f64, y: [f64; 2], ddy: [f64; 2]) -> f64 {
    h * (y[0] + y[1]) / 2. - h * h * h * (ddy[0] + ddy[1]) / 24.
}

/// Index `i` such that `x[i] <= value <= x[i + 1]` for a strictly increasing `x`.
///
/// Return
/// ----------
/// * `None` if `value` is outside `[x[0], x[n-1]]` or not a number.
pub fn bracket_index(x: &[f64], value: f64) -> Option<usize> {
    let n = x.len();
    if n < 2 || !(value >= x[0] && value <= x[n - 1]) {
        return None;
    }
    let above = x.partition_point(|&v| v <= value);
    Some(above.saturating_sub(1).min(n - 2))
}

/// Same as [`bracket_index`], starting a local scan from a previously returned index.
///
/// At most `max_scan` intervals are visited on either side of `start`; if the bracket was not
/// met the function falls back to the binary search.
pub fn closeby_bracket_index(x: &[f64], value: f64, start: usize, max_scan: usize) -> Option<usize> {
    let n = x.len();
    if n < 2 || !(value >= x[0] && value <= x[n - 1]) {
        return None;
    }
    let mut i = start.min(n - 2);
    for _ in 0..=max_scan {
        if value < x[i] {
            if i == 0 {
                break;
            }
            i -= 1;
        } else if value > x[i + 1] {
            if i + 2 >= n {
                break;
            }
            i += 1;
        } else {
            return Some(i);
        }
    }
    bracket_index(x, value)
}

/// Value of the spline at `value`, inside the interval `[x[i], x[i+1]]`.
#[inline]
pub fn evaluate_in_bracket(x: &[f64], y: &[f64], ddy: &[f64], i: usize, value: f64) -> f64 {
    let h = x[i + 1] - x[i];
    let a = (x[i + 1] - value) / h;
    let b = (value - x[i]) / h;
    a * y[i] + b * y[i + 1] + ((a * a * a - a) * ddy[i] + (b * b * b - b) * ddy[i + 1]) * h * h / 6.
}

/// A cubic spline over a strictly increasing abscissa.
#[derive(Debug, Clone)]
pub struct CubicSpline {
    x: Vec<f64>,
    y: Vec<f64>,
    ddy: Vec<f64>,
}

impl CubicSpline {
    /// Build the spline of `y(x)` with the chosen end conditions.
    pub fn new(x: Vec<f64>, y: Vec<f64>, boundary: SplineBoundary) -> Result<Self, ThermoError> {
        if x.len() >= 2 && x[1] < x[0] {
            return Err(ThermoError::MonotonicityViolation {
                row: 1,
                previous: x[0],
                current: x[1],
            });
        }
        let ddy = second_derivatives(&x, &y, boundary)?;
        Ok(Self { x, y, ddy })
    }

    /// Tabulated range of the abscissa.
    pub fn domain(&self) -> (f64, f64) {
        (self.x[0], self.x[self.x.len() - 1])
    }

    /// Evaluate the spline, refusing to extrapolate.
    pub fn evaluate(&self, value: f64) -> Result<f64, ThermoError> {
        let (lo, hi) = self.domain();
        let i = bracket_index(&self.x, value).ok_or(ThermoError::OutOfRangeQuery {
            z: value,
            z_min: lo,
            z_max: hi,
        })?;
        Ok(evaluate_in_bracket(&self.x, &self.y, &self.ddy, i, value))
    }
}

#[cfg(test)]
mod spline_test {
    use super::*;
    use approx::assert_relative_eq;

    fn grid(n: usize, lo: f64, hi: f64) -> Vec<f64> {
        (0..n)
            .map(|i| lo + (hi - lo) * i as f64 / (n - 1) as f64)
            .collect()
    }

    #[test]
    fn test_spline_passes_through_data_points() {
        let x = vec![1.0, 2.0, 3.5, 4.0, 5.0];
        let y = vec![2.0, 3.0, 5.0, 4.0, 1.0];
        let spline = CubicSpline::new(x.clone(), y.clone(), SplineBoundary::Natural).unwrap();
        for (xi, yi) in x.iter().zip(y.iter()) {
            assert_eq!(spline.evaluate(*xi).unwrap(), *yi);
        }
    }

    #[test]
    fn test_natural_ends_are_zero() {
        let x = grid(20, 0., 3.);
        let y: Vec<f64> = x.iter().map(|v| v.sin()).collect();
        let ddy = second_derivatives(&x, &y, SplineBoundary::Natural).unwrap();
        assert_eq!(ddy[0], 0.);
        assert_eq!(ddy[19], 0.);
    }

    #[test]
    fn test_estimated_derivative_reproduces_parabola_curvature() {
        // a parabola is reproduced exactly when the end slopes are estimated from parabolas
        let x = grid(15, -1., 2.);
        let y: Vec<f64> = x.iter().map(|v| 3. * v * v - v + 2.).collect();
        let ddy = second_derivatives(&x, &y, SplineBoundary::EstimatedDerivative).unwrap();
        for value in ddy {
            assert_relative_eq!(value, 6., epsilon = 1e-9);
        }
    }

    #[test]
    fn test_decreasing_abscissa() {
        let x: Vec<f64> = grid(50, 0., 2.).into_iter().rev().collect();
        let y: Vec<f64> = x.iter().map(|v| v.exp()).collect();
        let ddy = second_derivatives(&x, &y, SplineBoundary::EstimatedDerivative).unwrap();
        let dy = node_derivatives(&x, &y, &ddy);
        for (xi, dyi) in x.iter().zip(&dy) {
            assert_relative_eq!(*dyi, xi.exp(), max_relative = 1e-3);
        }
        for (xi, ddyi) in x.iter().zip(&ddy).skip(5).take(40) {
            assert_relative_eq!(*ddyi, xi.exp(), max_relative = 1e-3);
        }
        // integral from x = 2 down to x = 0 is -(e² - 1)
        let integral = running_integral(&x, &y, &ddy);
        assert_relative_eq!(integral[49], -(2f64.exp() - 1.), max_relative = 1e-6);
    }

    #[test]
    fn test_non_monotone_abscissa_is_rejected() {
        let x = vec![0., 1., 1., 2.];
        let y = vec![0., 1., 2., 3.];
        let err = second_derivatives(&x, &y, SplineBoundary::Natural).unwrap_err();
        assert_eq!(
            err,
            ThermoError::MonotonicityViolation {
                row: 2,
                previous: 1.,
                current: 1.
            }
        );
    }

    #[test]
    fn test_bracket_lookup() {
        let x = grid(11, 0., 10.);
        assert_eq!(bracket_index(&x, 0.), Some(0));
        assert_eq!(bracket_index(&x, 10.), Some(9));
        assert_eq!(bracket_index(&x, 4.5), Some(4));
        assert_eq!(bracket_index(&x, 4.), Some(4));
        assert_eq!(bracket_index(&x, -1e-9), None);
        assert_eq!(bracket_index(&x, f64::NAN), None);
        assert_eq!(closeby_bracket_index(&x, 5.5, 4, 4), Some(5));
        assert_eq!(closeby_bracket_index(&x, 0.5, 9, 2), Some(0));
        assert_eq!(closeby_bracket_index(&x, 11., 9, 2), None);
    }

    #[test]
    fn test_evaluate_out_of_range() {
        let spline = CubicSpline::new(grid(5, 0., 1.), vec![0.; 5], SplineBoundary::Natural).unwrap();
        assert!(matches!(
            spline.evaluate(1.5),
            Err(ThermoError::OutOfRangeQuery { .. })
        ));
    }
}
