//! Least-squares regression of continuation values on basis functions.
//!
//! Continuation values at each inventory grid point of a period are
//! regressed on the same design matrix, so the QR factorisation is computed
//! once per period and only the cheap triangular solve repeats per grid
//! point.

use nalgebra::{DMatrix, DVector};

use storage_core::basis::BasisFunction;
use storage_core::sim::SpotSims;
use storage_core::types::time::Period;

use crate::error::LsmcError;

/// Fills `design` (simulations x basis functions) from one period's
/// simulation data.
pub(crate) fn populate_design_matrix<P: Period>(
    design: &mut DMatrix<f64>,
    period: P,
    sims: &SpotSims<P>,
    basis: &[BasisFunction],
    column_buffer: &mut Vec<f64>,
) -> Result<(), LsmcError> {
    let spot_row = sims
        .spot_prices(period)
        .ok_or_else(|| LsmcError::InvalidInput(format!("no simulated prices for {}", period)))?;
    let factor_rows = sims
        .factor_rows(period)
        .ok_or_else(|| LsmcError::InvalidInput(format!("no simulated factors for {}", period)))?;

    let num_sims = spot_row.len();
    column_buffer.resize(num_sims, 0.0);
    for (col, basis_fn) in basis.iter().enumerate() {
        basis_fn(&factor_rows, spot_row, column_buffer);
        for (row, &value) in column_buffer.iter().enumerate() {
            design[(row, col)] = value;
        }
    }
    Ok(())
}

/// Thin QR factorisation of a design matrix, reusable across regression
/// targets.
pub(crate) struct RegressionFit {
    q_transpose: DMatrix<f64>,
    r: DMatrix<f64>,
}

impl RegressionFit {
    /// Factorises `design` once. The matrix must have at least as many rows
    /// (simulations) as columns (basis functions).
    pub(crate) fn factorize(design: &DMatrix<f64>) -> Result<Self, LsmcError> {
        if design.nrows() < design.ncols() {
            return Err(LsmcError::InvalidInput(format!(
                "{} simulations cannot support {} basis functions",
                design.nrows(),
                design.ncols()
            )));
        }
        let qr = design.clone().qr();
        let q = qr.q();
        let r = qr.r();
        Ok(RegressionFit {
            q_transpose: q.transpose(),
            r,
        })
    }

    /// Ordinary least-squares coefficients for target `y`:
    /// `R^-1 (Q^T y)`.
    pub(crate) fn coefficients(&self, y: &[f64]) -> Result<DVector<f64>, LsmcError> {
        let rank_deficient = || {
            LsmcError::InvalidInput(
                "regression design matrix is rank deficient; check the basis functions for \
                 collinearity"
                    .into(),
            )
        };
        let diagonal = self.r.diagonal();
        let max_diag = diagonal.amax();
        if max_diag == 0.0 || diagonal.iter().any(|d| d.abs() < max_diag * 1e-12) {
            return Err(rank_deficient());
        }
        let projected = &self.q_transpose * DVector::from_column_slice(y);
        self.r
            .solve_upper_triangular(&projected)
            .ok_or_else(rank_deficient)
    }
}

/// Fitted values `design * coefficients`, one per simulation.
pub(crate) fn fitted_values(design: &DMatrix<f64>, coefficients: &DVector<f64>) -> Vec<f64> {
    let fitted = design * coefficients;
    fitted.as_slice().to_vec()
}
