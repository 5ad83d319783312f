//! Valuation outputs.

use std::ops::BitOr;

use storage_core::panel::Panel;
use storage_core::series::{DoubleSeries, TimeSeries};
use storage_core::types::time::Period;

/// Expected (average across simulations) storage operation in one period.
#[derive(Copy, Clone, Debug, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StorageProfile {
    /// Expected inventory at the start of the period.
    pub inventory: f64,
    /// Expected net injection (positive) or withdrawal (negative) volume.
    pub inject_withdraw_volume: f64,
    /// Expected commodity consumed as fuel.
    pub cmdty_consumed: f64,
    /// Expected inventory lost over the period.
    pub inventory_loss: f64,
    /// Expected discounted cash flows generated in the period.
    pub period_pv: f64,
}

/// Marginal trigger prices at the expected inventory of one period:
/// the spot prices at which the first unit of injection or withdrawal
/// becomes optimal.
#[derive(Copy, Clone, Debug, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TriggerPrices {
    /// Maximum feasible injection volume, when injection is feasible.
    pub max_inject_volume: Option<f64>,
    /// Price above which maximum injection is optimal.
    pub max_inject_trigger_price: Option<f64>,
    /// Maximum feasible withdrawal volume, when withdrawal is feasible.
    pub max_withdraw_volume: Option<f64>,
    /// Price below which maximum withdrawal is optimal.
    pub max_withdraw_trigger_price: Option<f64>,
}

/// One point of a trigger price curve: the price making `volume` the
/// optimal decision.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TriggerPricePoint {
    /// Net decision volume, positive for injection.
    pub volume: f64,
    /// Spot price at which the volume becomes optimal.
    pub price: f64,
}

/// Trigger price curves for one period, from small volumes up to the
/// feasible maximum on each side.
#[derive(Clone, Debug, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TriggerVolumeProfiles {
    /// Injection curve, ascending in volume.
    pub inject: Vec<TriggerPricePoint>,
    /// Withdrawal curve, from least to most withdrawal.
    pub withdraw: Vec<TriggerPricePoint>,
}

/// Selects which per-simulation panels a valuation returns.
///
/// Panels are large (periods x simulations), so callers opt in to the ones
/// they need; the rest come back empty. Combine flags with `|`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SimDataReturned(u16);

impl SimDataReturned {
    /// Return no per-simulation panels.
    pub const NONE: SimDataReturned = SimDataReturned(0);
    /// Simulated spot prices of the regression sample.
    pub const REGRESSION_SPOT: SimDataReturned = SimDataReturned(1);
    /// Simulated spot prices of the valuation sample.
    pub const VALUATION_SPOT: SimDataReturned = SimDataReturned(1 << 1);
    /// Factor values of the regression sample.
    pub const REGRESSION_FACTORS: SimDataReturned = SimDataReturned(1 << 2);
    /// Factor values of the valuation sample.
    pub const VALUATION_FACTORS: SimDataReturned = SimDataReturned(1 << 3);
    /// Inventory per period and simulation.
    pub const INVENTORY: SimDataReturned = SimDataReturned(1 << 4);
    /// Net decision volume per period and simulation.
    pub const INJECT_WITHDRAW_VOLUME: SimDataReturned = SimDataReturned(1 << 5);
    /// Commodity consumed per period and simulation.
    pub const CMDTY_CONSUMED: SimDataReturned = SimDataReturned(1 << 6);
    /// Inventory loss per period and simulation.
    pub const INVENTORY_LOSS: SimDataReturned = SimDataReturned(1 << 7);
    /// Net market volume per period and simulation.
    pub const NET_VOLUME: SimDataReturned = SimDataReturned(1 << 8);
    /// Discounted cash flow per period and simulation.
    pub const PERIOD_PV: SimDataReturned = SimDataReturned(1 << 9);
    /// Every panel.
    pub const ALL: SimDataReturned = SimDataReturned((1 << 10) - 1);

    /// Whether every flag in `other` is set in `self`.
    pub fn contains(self, other: SimDataReturned) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for SimDataReturned {
    type Output = SimDataReturned;

    fn bitor(self, other: SimDataReturned) -> SimDataReturned {
        SimDataReturned(self.0 | other.0)
    }
}

/// Full results of an LSMC storage valuation.
///
/// Periods in series and panels run from the first active period (the later
/// of the valuation period and storage start) to the storage end period.
/// Panels not requested via [`SimDataReturned`] are empty.
#[derive(Clone, Debug)]
pub struct LsmcResults<P: Period> {
    /// Storage NPV: the average discounted value across valuation
    /// simulations.
    pub npv: f64,
    /// Monte Carlo standard error of the NPV.
    pub standard_error: f64,
    /// Sensitivity of the NPV to each period's forward price.
    pub deltas: DoubleSeries<P>,
    /// Monte Carlo standard error of each delta.
    pub delta_standard_errors: DoubleSeries<P>,
    /// Expected inventory, volumes and value per period.
    pub expected_profile: TimeSeries<P, StorageProfile>,
    /// Marginal trigger prices per period.
    pub trigger_prices: TimeSeries<P, TriggerPrices>,
    /// Trigger price curves per period.
    pub trigger_volume_profiles: TimeSeries<P, TriggerVolumeProfiles>,
    /// Discounted storage value per valuation simulation.
    pub pv_by_sim: Vec<f64>,
    /// Spot price panel of the regression sample, when requested.
    pub regression_spot_sims: Panel<P>,
    /// Spot price panel of the valuation sample, when requested.
    pub valuation_spot_sims: Panel<P>,
    /// Factor panels of the regression sample, when requested.
    pub regression_factor_sims: Vec<Panel<P>>,
    /// Factor panels of the valuation sample, when requested.
    pub valuation_factor_sims: Vec<Panel<P>>,
    /// Inventory panel, when requested.
    pub inventory_by_sim: Panel<P>,
    /// Decision volume panel, when requested.
    pub inject_withdraw_volume_by_sim: Panel<P>,
    /// Consumed commodity panel, when requested.
    pub cmdty_consumed_by_sim: Panel<P>,
    /// Inventory loss panel, when requested.
    pub inventory_loss_by_sim: Panel<P>,
    /// Net market volume panel, when requested.
    pub net_volume_by_sim: Panel<P>,
    /// Discounted cash flow panel, when requested.
    pub period_pv_by_sim: Panel<P>,
}

impl<P: Period> LsmcResults<P> {
    fn zero_valued() -> Self {
        LsmcResults {
            npv: 0.0,
            standard_error: 0.0,
            deltas: TimeSeries::empty(),
            delta_standard_errors: TimeSeries::empty(),
            expected_profile: TimeSeries::empty(),
            trigger_prices: TimeSeries::empty(),
            trigger_volume_profiles: TimeSeries::empty(),
            pv_by_sim: Vec::new(),
            regression_spot_sims: Panel::empty(),
            valuation_spot_sims: Panel::empty(),
            regression_factor_sims: Vec::new(),
            valuation_factor_sims: Vec::new(),
            inventory_by_sim: Panel::empty(),
            inject_withdraw_volume_by_sim: Panel::empty(),
            cmdty_consumed_by_sim: Panel::empty(),
            inventory_loss_by_sim: Panel::empty(),
            net_volume_by_sim: Panel::empty(),
            period_pv_by_sim: Panel::empty(),
        }
    }

    /// Zero-valued results for a contract whose end period has passed.
    pub(crate) fn expired() -> Self {
        Self::zero_valued()
    }

    /// Degenerate results for a valuation exactly at the end period:
    /// a deterministic NPV and nothing else.
    pub(crate) fn end_period(npv: f64) -> Self {
        LsmcResults {
            npv,
            ..Self::zero_valued()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sim_data_flags_combine_and_contain() {
        let flags = SimDataReturned::INVENTORY | SimDataReturned::PERIOD_PV;
        assert!(flags.contains(SimDataReturned::INVENTORY));
        assert!(flags.contains(SimDataReturned::PERIOD_PV));
        assert!(!flags.contains(SimDataReturned::NET_VOLUME));
        assert!(SimDataReturned::ALL.contains(flags));
        assert!(flags.contains(SimDataReturned::NONE));
    }
}
