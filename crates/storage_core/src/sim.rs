//! Simulated spot price data consumed by the valuation.

use crate::panel::Panel;
use crate::types::error::SimDataError;
use crate::types::time::Period;

/// Spot price simulations plus the stochastic factors that drove them, in
/// period-by-simulation panel layout.
///
/// The valuation's pathwise deltas assume each simulated spot price is the
/// forward price for the period multiplied by a mean-one stochastic
/// multiplier, so the derivative of spot with respect to forward is
/// spot / forward. Simulators feeding this type must respect that form.
#[derive(Clone, Debug)]
pub struct SpotSims<P: Period> {
    spot: Panel<P>,
    factors: Vec<Panel<P>>,
}

impl<P: Period> SpotSims<P> {
    /// Assembles simulation data, checking that every factor panel matches
    /// the spot panel's start period and dimensions.
    pub fn new(spot: Panel<P>, factors: Vec<Panel<P>>) -> Result<Self, SimDataError> {
        if spot.is_empty() {
            return Err(SimDataError::InvalidInput(
                "spot panel has no simulations".into(),
            ));
        }
        for (i, factor) in factors.iter().enumerate() {
            if factor.start() != spot.start()
                || factor.num_rows() != spot.num_rows()
                || factor.num_cols() != spot.num_cols()
            {
                return Err(SimDataError::InconsistentPanels(format!(
                    "factor panel {} does not match the spot panel layout",
                    i
                )));
            }
        }
        Ok(SpotSims { spot, factors })
    }

    pub fn num_sims(&self) -> usize {
        self.spot.num_cols()
    }

    pub fn num_factors(&self) -> usize {
        self.factors.len()
    }

    /// First simulated period.
    pub fn start(&self) -> Option<P> {
        self.spot.start()
    }

    /// Last simulated period.
    pub fn end(&self) -> Option<P> {
        self.spot.end()
    }

    /// Whether every period in `from..=to` is simulated.
    pub fn covers(&self, from: P, to: P) -> bool {
        self.spot.covers(from, to)
    }

    /// Simulated spot prices for `period`, one per simulation.
    pub fn spot_prices(&self, period: P) -> Option<&[f64]> {
        self.spot.row_for_period(period)
    }

    /// Simulated values of factor `factor_index` for `period`.
    pub fn factor_values(&self, factor_index: usize, period: P) -> Option<&[f64]> {
        self.factors.get(factor_index)?.row_for_period(period)
    }

    /// All factor rows for `period`, in factor order.
    pub fn factor_rows(&self, period: P) -> Option<Vec<&[f64]>> {
        self.factors
            .iter()
            .map(|panel| panel.row_for_period(period))
            .collect()
    }

    pub fn spot_panel(&self) -> &Panel<P> {
        &self.spot
    }

    pub fn factor_panels(&self) -> &[Panel<P>] {
        &self.factors
    }
}
