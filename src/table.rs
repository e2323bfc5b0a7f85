//! # Redshift-ordered column tables
//!
//! [`ColumnTable`] stores one row per redshift (strictly increasing) and one column per quantity
//! of an [`IndexRegistry`]. Values live in a column-major [`nalgebra::DMatrix`], so a whole
//! column is a contiguous slice that can be handed to the spline routines as is.
//!
//! The Spline Builder is [`ColumnTable::spline_second_derivatives`]: it returns a table of the
//! same shape holding `d²(column)/dz²` with natural boundary conditions.
use nalgebra::DMatrix;

use crate::indices::{Column, IndexRegistry};
use crate::numerics::spline::{check_strictly_monotone, second_derivatives, SplineBoundary};
use crate::thermo_errors::ThermoError;

/// Table of quantities `Q` sampled on a strictly increasing redshift grid.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnTable<Q: Column> {
    layout: IndexRegistry<Q>,
    z: Vec<f64>,
    values: DMatrix<f64>,
}

impl<Q: Column> ColumnTable<Q> {
    /// Zero-filled table on the redshift grid `z`.
    ///
    /// Return
    /// ----------
    /// * The table, or [`ThermoError::MonotonicityViolation`] if `z` is not strictly increasing.
    pub fn new(layout: IndexRegistry<Q>, z: Vec<f64>) -> Result<Self, ThermoError> {
        check_strictly_monotone(&z)?;
        if z.len() >= 2 && z[1] < z[0] {
            return Err(ThermoError::MonotonicityViolation {
                row: 1,
                previous: z[0],
                current: z[1],
            });
        }
        let values = DMatrix::zeros(z.len(), layout.width());
        Ok(ColumnTable { layout, z, values })
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.z.len()
    }

    pub fn is_empty(&self) -> bool {
        self.z.is_empty()
    }

    /// Column layout of the table.
    pub fn layout(&self) -> &IndexRegistry<Q> {
        &self.layout
    }

    /// Redshift of every row.
    pub fn z(&self) -> &[f64] {
        &self.z
    }

    fn column_at(&self, offset: usize) -> &[f64] {
        let n = self.len();
        &self.values.as_slice()[offset * n..(offset + 1) * n]
    }

    /// Values of `quantity` on every row.
    pub fn column(&self, quantity: Q) -> Result<&[f64], ThermoError> {
        let offset = self.layout.offset(quantity)?;
        Ok(self.column_at(offset))
    }

    /// Column at a raw offset of the layout.
    pub fn column_by_offset(&self, offset: usize) -> Option<&[f64]> {
        (offset < self.layout.width()).then(|| self.column_at(offset))
    }

    /// Overwrite the column of `quantity`.
    pub fn set_column(&mut self, quantity: Q, values: &[f64]) -> Result<(), ThermoError> {
        let offset = self.layout.offset(quantity)?;
        if values.len() != self.len() {
            return Err(ThermoError::ConfigurationError(format!(
                "column {} has {} values for {} rows",
                quantity.name(),
                values.len(),
                self.len()
            )));
        }
        self.values.column_mut(offset).copy_from_slice(values);
        Ok(())
    }

    /// Value of `quantity` on `row`.
    pub fn value(&self, row: usize, quantity: Q) -> Result<f64, ThermoError> {
        let offset = self.layout.offset(quantity)?;
        self.values
            .get((row, offset))
            .copied()
            .ok_or(ThermoError::OutOfRangeQuery {
                z: row as f64,
                z_min: 0.,
                z_max: self.len().saturating_sub(1) as f64,
            })
    }

    /// Raw matrix of values, one row per redshift.
    pub fn values(&self) -> &DMatrix<f64> {
        &self.values
    }

    /// Natural cubic-spline second derivatives over redshift of every column.
    ///
    /// Return
    /// ----------
    /// * A table with the same layout and grid holding `d²(column)/dz²`, or
    ///   [`ThermoError::MonotonicityViolation`] if the redshift grid is not strictly monotone.
    pub fn spline_second_derivatives(&self) -> Result<Self, ThermoError> {
        check_strictly_monotone(&self.z)?;
        let mut ddy = DMatrix::zeros(self.len(), self.layout.width());
        for offset in 0..self.layout.width() {
            let column = second_derivatives(&self.z, self.column_at(offset), SplineBoundary::Natural)?;
            ddy.column_mut(offset).copy_from_slice(&column);
        }
        Ok(ColumnTable {
            layout: self.layout.clone(),
            z: self.z.clone(),
            values: ddy,
        })
    }
}

#[cfg(test)]
mod table_test {
    use super::*;
    use crate::indices::RecombinationQuantity;
    use approx::assert_relative_eq;

    fn layout() -> IndexRegistry<RecombinationQuantity> {
        IndexRegistry::full()
    }

    #[test]
    fn test_columns_round_trip() {
        let mut table = ColumnTable::new(layout(), vec![0., 1., 2.]).unwrap();
        table
            .set_column(RecombinationQuantity::Tb, &[3., 4., 5.])
            .unwrap();
        assert_eq!(table.column(RecombinationQuantity::Tb).unwrap(), &[3., 4., 5.]);
        assert_eq!(table.column(RecombinationQuantity::Xe).unwrap(), &[0., 0., 0.]);
        assert_eq!(table.value(1, RecombinationQuantity::Tb).unwrap(), 4.);
        assert!(table.value(3, RecombinationQuantity::Tb).is_err());
    }

    #[test]
    fn test_rejects_bad_grid() {
        let err = ColumnTable::new(layout(), vec![0., 2., 1.]).unwrap_err();
        assert_eq!(
            err,
            ThermoError::MonotonicityViolation {
                row: 2,
                previous: 2.,
                current: 1.
            }
        );
        assert!(ColumnTable::new(layout(), vec![2., 1., 0.]).is_err());
    }

    #[test]
    fn test_wrong_column_length() {
        let mut table = ColumnTable::new(layout(), vec![0., 1.]).unwrap();
        assert!(matches!(
            table.set_column(RecombinationQuantity::Xe, &[1.]),
            Err(ThermoError::ConfigurationError(_))
        ));
    }

    #[test]
    fn test_spline_second_derivatives_of_a_parabola() {
        let z: Vec<f64> = (0..30).map(|i| i as f64 * 0.1).collect();
        let mut table = ColumnTable::new(layout(), z.clone()).unwrap();
        let parabola: Vec<f64> = z.iter().map(|v| v * v).collect();
        table.set_column(RecombinationQuantity::Xe, &parabola).unwrap();
        let ddy = table.spline_second_derivatives().unwrap();
        let column = ddy.column(RecombinationQuantity::Xe).unwrap();
        assert_eq!(column[0], 0.);
        assert_eq!(column[29], 0.);
        // far from the natural ends the curvature of z² is recovered
        assert_relative_eq!(column[15], 2., epsilon = 1e-3);
    }
}
