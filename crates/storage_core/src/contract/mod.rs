//! Storage facility contracts.
//!
//! [`StorageContract`] is the interface the valuation layer prices against:
//! per-period inventory limits, inventory-dependent injection/withdrawal
//! rates, operating costs as dated cash flows, commodity consumed or lost,
//! and the value of inventory left at the end of the contract.
//! [`CmdtyStorage`] is the concrete implementation built from constant or
//! ratcheted rate constraints.

mod cmdty_storage;
mod ratchet;

pub use cmdty_storage::{CmdtyStorage, CmdtyStorageBuilder, SettleDateRule};
pub use ratchet::{RatchetPoint, RatchetSchedule};

use crate::cashflow::CashFlow;
use crate::types::error::ContractError;
use crate::types::time::Period;

/// Allowed net injection (positive) and withdrawal (negative) rates for one
/// period at one inventory level.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct InjectWithdrawRange {
    min_rate: f64,
    max_rate: f64,
}

impl InjectWithdrawRange {
    pub fn new(min_rate: f64, max_rate: f64) -> Result<Self, ContractError> {
        if !(min_rate <= max_rate) {
            return Err(ContractError::InvalidValue {
                field: "inject_withdraw_range",
                message: format!("min rate {} exceeds max rate {}", min_rate, max_rate),
            });
        }
        Ok(InjectWithdrawRange { min_rate, max_rate })
    }

    /// Most negative allowed rate (maximum withdrawal).
    pub fn min_rate(&self) -> f64 {
        self.min_rate
    }

    /// Most positive allowed rate (maximum injection).
    pub fn max_rate(&self) -> f64 {
        self.max_rate
    }
}

/// A commodity storage facility as seen by the valuation.
///
/// Volumes follow the net-of-consumption convention: decision volumes change
/// inventory directly, while any commodity consumed as fuel is purchased in
/// the market on top of the decision volume.
pub trait StorageContract<P: Period>: Sync {
    /// First period in which the facility can be used.
    fn start_period(&self) -> P;

    /// Last period of the contract. No decisions are taken in this period;
    /// inventory arriving here is valued by [`terminal_value`].
    ///
    /// [`terminal_value`]: StorageContract::terminal_value
    fn end_period(&self) -> P;

    /// Whether all inventory must be cleared by the end period.
    fn must_be_empty_at_end(&self) -> bool;

    /// Allowed injection/withdrawal rates in `period` at `inventory`.
    fn inject_withdraw_range(&self, period: P, inventory: f64) -> InjectWithdrawRange;

    /// Minimum allowed inventory in `period`.
    fn min_inventory(&self, period: P) -> f64;

    /// Maximum allowed inventory in `period`.
    fn max_inventory(&self, period: P) -> f64;

    /// Cost cash flows (positive amounts) for injecting `volume` (> 0)
    /// in `period` starting from `inventory`.
    fn injection_cost(&self, period: P, inventory: f64, volume: f64) -> Vec<CashFlow>;

    /// Cost cash flows (positive amounts) for withdrawing `volume` (> 0)
    /// in `period` starting from `inventory`.
    fn withdrawal_cost(&self, period: P, inventory: f64, volume: f64) -> Vec<CashFlow>;

    /// Commodity volume consumed (e.g. as compressor fuel) when injecting
    /// `volume` (> 0).
    fn consumed_on_inject(&self, period: P, inventory: f64, volume: f64) -> f64;

    /// Commodity volume consumed when withdrawing `volume` (> 0).
    fn consumed_on_withdraw(&self, period: P, inventory: f64, volume: f64) -> f64;

    /// Fraction of inventory lost over `period`.
    fn inventory_percent_loss(&self, period: P) -> f64;

    /// Cost cash flows (positive amounts) of holding `inventory` over
    /// `period`.
    fn inventory_cost(&self, period: P, inventory: f64) -> Vec<CashFlow>;

    /// Value of `inventory` remaining at the end period given the spot
    /// price then. Zero when the facility must be empty.
    fn terminal_value(&self, spot_price: f64, inventory: f64) -> f64;

    /// Highest inventory in `period` from which next period's range
    /// `[next_min, next_max]` remains reachable.
    fn inventory_space_upper_bound(&self, period: P, next_min: f64, next_max: f64) -> f64;

    /// Lowest inventory in `period` from which next period's range
    /// `[next_min, next_max]` remains reachable.
    fn inventory_space_lower_bound(&self, period: P, next_min: f64, next_max: f64) -> f64;
}
