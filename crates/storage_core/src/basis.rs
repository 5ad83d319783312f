//! Regression basis functions.
//!
//! A basis function fills one column of the regression design matrix from
//! the simulated factor rows and spot price row of a period. Functions are
//! boxed closures so callers can mix the stock monomials below with
//! arbitrary custom features.

/// Fills `out` (one value per simulation) from `factor_rows` (one slice per
/// stochastic factor) and `spot_row`.
pub type BasisFunction = Box<dyn Fn(&[&[f64]], &[f64], &mut [f64]) + Send + Sync>;

/// The constant 1. Conventionally the first basis function, making column 0
/// of the design matrix the intercept.
pub fn ones() -> BasisFunction {
    Box::new(|_factors, _spot, out| out.fill(1.0))
}

/// The spot price raised to `power`.
pub fn spot_price_power(power: u32) -> BasisFunction {
    Box::new(move |_factors, spot, out| {
        for (o, &s) in out.iter_mut().zip(spot) {
            *o = s.powi(power as i32);
        }
    })
}

/// Factor `factor_index` raised to `power`. The factor index must be valid
/// for the simulation data the regression runs on.
pub fn factor_power(factor_index: usize, power: u32) -> BasisFunction {
    Box::new(move |factors, _spot, out| {
        for (o, &x) in out.iter_mut().zip(factors[factor_index]) {
            *o = x.powi(power as i32);
        }
    })
}

/// Product of factor powers times a spot price power, e.g.
/// `monomial(&[(0, 1), (1, 2)], 1)` is `x0 * x1^2 * spot`.
pub fn monomial(factor_powers: &[(usize, u32)], spot_power: u32) -> BasisFunction {
    let factor_powers = factor_powers.to_vec();
    Box::new(move |factors, spot, out| {
        out.fill(1.0);
        for &(factor_index, power) in &factor_powers {
            for (o, &x) in out.iter_mut().zip(factors[factor_index]) {
                *o *= x.powi(power as i32);
            }
        }
        if spot_power > 0 {
            for (o, &s) in out.iter_mut().zip(spot) {
                *o *= s.powi(spot_power as i32);
            }
        }
    })
}

/// Intercept plus powers `1..=max_power` of each factor: the standard
/// polynomial basis for an LSMC regression.
pub fn factor_polynomials(num_factors: usize, max_power: u32) -> Vec<BasisFunction> {
    let mut basis = vec![ones()];
    for factor_index in 0..num_factors {
        for power in 1..=max_power {
            basis.push(factor_power(factor_index, power));
        }
    }
    basis
}
