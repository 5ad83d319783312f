//! Concrete storage contract with a validating builder.

use crate::cashflow::CashFlow;
use crate::math::{bisect_lower_boundary, bisect_upper_boundary};
use crate::types::error::ContractError;
use crate::types::time::{Date, Period};

use super::ratchet::RatchetSchedule;
use super::{InjectWithdrawRange, StorageContract};

/// Maps a delivery period to the date its associated cash flow settles.
pub type SettleDateRule<P> = Box<dyn Fn(P) -> Date + Send + Sync>;

enum RateSpec<P: Period> {
    Constant {
        range: InjectWithdrawRange,
        min_inventory: f64,
        max_inventory: f64,
    },
    Ratchets(RatchetSchedule<P>),
}

enum TerminalCondition {
    MustBeEmpty,
    Value(Box<dyn Fn(f64, f64) -> f64 + Send + Sync>),
}

/// A commodity storage facility with constant or ratcheted rate constraints,
/// per-unit operating costs, percentage fuel consumption and inventory loss.
///
/// Construct with [`CmdtyStorage::builder`].
///
/// # Examples
///
/// ```
/// use storage_core::contract::{CmdtyStorage, StorageContract};
/// use storage_core::types::time::Date;
///
/// let start = Date::from_ymd(2024, 4, 1).unwrap();
/// let end = Date::from_ymd(2025, 4, 1).unwrap();
/// let storage = CmdtyStorage::builder(start, end)
///     .constant_inject_withdraw_range(-850.0, 625.0)
///     .min_inventory(0.0)
///     .max_inventory(52_500.0)
///     .per_unit_injection_cost(1.25)
///     .per_unit_withdrawal_cost(0.93)
///     .must_be_empty_at_end()
///     .build()
///     .unwrap();
/// assert!(storage.must_be_empty_at_end());
/// assert_eq!(storage.max_inventory(start), 52_500.0);
/// ```
pub struct CmdtyStorage<P: Period> {
    start: P,
    end: P,
    rates: RateSpec<P>,
    injection_cost_rate: f64,
    injection_cost_settle: SettleDateRule<P>,
    withdrawal_cost_rate: f64,
    withdrawal_cost_settle: SettleDateRule<P>,
    inventory_cost_rate: f64,
    pct_consumed_on_inject: f64,
    pct_consumed_on_withdraw: f64,
    pct_inventory_loss: f64,
    terminal: TerminalCondition,
}

impl<P: Period> CmdtyStorage<P> {
    pub fn builder(start: P, end: P) -> CmdtyStorageBuilder<P> {
        CmdtyStorageBuilder::new(start, end)
    }
}

impl<P: Period> StorageContract<P> for CmdtyStorage<P> {
    fn start_period(&self) -> P {
        self.start
    }

    fn end_period(&self) -> P {
        self.end
    }

    fn must_be_empty_at_end(&self) -> bool {
        matches!(self.terminal, TerminalCondition::MustBeEmpty)
    }

    fn inject_withdraw_range(&self, period: P, inventory: f64) -> InjectWithdrawRange {
        match &self.rates {
            RateSpec::Constant { range, .. } => *range,
            RateSpec::Ratchets(schedule) => schedule.range_at(period, inventory),
        }
    }

    fn min_inventory(&self, period: P) -> f64 {
        match &self.rates {
            RateSpec::Constant { min_inventory, .. } => *min_inventory,
            RateSpec::Ratchets(schedule) => schedule.min_inventory(period),
        }
    }

    fn max_inventory(&self, period: P) -> f64 {
        match &self.rates {
            RateSpec::Constant { max_inventory, .. } => *max_inventory,
            RateSpec::Ratchets(schedule) => schedule.max_inventory(period),
        }
    }

    fn injection_cost(&self, period: P, _inventory: f64, volume: f64) -> Vec<CashFlow> {
        if self.injection_cost_rate == 0.0 {
            return Vec::new();
        }
        vec![CashFlow::new(
            (self.injection_cost_settle)(period),
            self.injection_cost_rate * volume,
        )]
    }

    fn withdrawal_cost(&self, period: P, _inventory: f64, volume: f64) -> Vec<CashFlow> {
        if self.withdrawal_cost_rate == 0.0 {
            return Vec::new();
        }
        vec![CashFlow::new(
            (self.withdrawal_cost_settle)(period),
            self.withdrawal_cost_rate * volume,
        )]
    }

    fn consumed_on_inject(&self, _period: P, _inventory: f64, volume: f64) -> f64 {
        self.pct_consumed_on_inject * volume
    }

    fn consumed_on_withdraw(&self, _period: P, _inventory: f64, volume: f64) -> f64 {
        self.pct_consumed_on_withdraw * volume
    }

    fn inventory_percent_loss(&self, _period: P) -> f64 {
        self.pct_inventory_loss
    }

    fn inventory_cost(&self, period: P, inventory: f64) -> Vec<CashFlow> {
        if self.inventory_cost_rate == 0.0 {
            return Vec::new();
        }
        vec![CashFlow::new(
            period.first_day(),
            self.inventory_cost_rate * inventory,
        )]
    }

    fn terminal_value(&self, spot_price: f64, inventory: f64) -> f64 {
        match &self.terminal {
            TerminalCondition::MustBeEmpty => 0.0,
            TerminalCondition::Value(f) => f(spot_price, inventory),
        }
    }

    fn inventory_space_upper_bound(&self, period: P, _next_min: f64, next_max: f64) -> f64 {
        let keep = 1.0 - self.pct_inventory_loss;
        match &self.rates {
            RateSpec::Constant {
                range,
                min_inventory,
                max_inventory,
            } => {
                let unconstrained = (next_max - range.min_rate()) / keep;
                unconstrained.min(*max_inventory).max(*min_inventory)
            }
            RateSpec::Ratchets(schedule) => {
                let min_inv = schedule.min_inventory(period);
                let max_inv = schedule.max_inventory(period);
                // highest inventory from which max withdrawal still reaches next_max
                bisect_upper_boundary(min_inv, max_inv, |inv| {
                    inv * keep + schedule.range_at(period, inv).min_rate() <= next_max
                })
            }
        }
    }

    fn inventory_space_lower_bound(&self, period: P, next_min: f64, _next_max: f64) -> f64 {
        let keep = 1.0 - self.pct_inventory_loss;
        match &self.rates {
            RateSpec::Constant {
                range,
                min_inventory,
                max_inventory,
            } => {
                let unconstrained = (next_min - range.max_rate()) / keep;
                unconstrained.max(*min_inventory).min(*max_inventory)
            }
            RateSpec::Ratchets(schedule) => {
                let min_inv = schedule.min_inventory(period);
                let max_inv = schedule.max_inventory(period);
                // lowest inventory from which max injection still reaches next_min
                bisect_lower_boundary(min_inv, max_inv, |inv| {
                    inv * keep + schedule.range_at(period, inv).max_rate() >= next_min
                })
            }
        }
    }
}

/// Builder for [`CmdtyStorage`], validating on `build()`.
pub struct CmdtyStorageBuilder<P: Period> {
    start: P,
    end: P,
    constant_range: Option<InjectWithdrawRange>,
    ratchets: Option<RatchetSchedule<P>>,
    min_inventory: Option<f64>,
    max_inventory: Option<f64>,
    injection_cost_rate: f64,
    injection_cost_settle: Option<SettleDateRule<P>>,
    withdrawal_cost_rate: f64,
    withdrawal_cost_settle: Option<SettleDateRule<P>>,
    inventory_cost_rate: f64,
    pct_consumed_on_inject: f64,
    pct_consumed_on_withdraw: f64,
    pct_inventory_loss: f64,
    terminal: Option<TerminalCondition>,
    rates_error: Option<ContractError>,
}

impl<P: Period> CmdtyStorageBuilder<P> {
    fn new(start: P, end: P) -> Self {
        CmdtyStorageBuilder {
            start,
            end,
            constant_range: None,
            ratchets: None,
            min_inventory: None,
            max_inventory: None,
            injection_cost_rate: 0.0,
            injection_cost_settle: None,
            withdrawal_cost_rate: 0.0,
            withdrawal_cost_settle: None,
            inventory_cost_rate: 0.0,
            pct_consumed_on_inject: 0.0,
            pct_consumed_on_withdraw: 0.0,
            pct_inventory_loss: 0.0,
            terminal: None,
            rates_error: None,
        }
    }

    /// Constant withdrawal (negative) and injection (positive) rates,
    /// independent of inventory. Requires `min_inventory`/`max_inventory`.
    pub fn constant_inject_withdraw_range(mut self, min_rate: f64, max_rate: f64) -> Self {
        match InjectWithdrawRange::new(min_rate, max_rate) {
            Ok(range) => self.constant_range = Some(range),
            Err(e) => self.rates_error = Some(e),
        }
        self
    }

    /// Inventory-varying rates from a ratchet schedule. The pinned inventory
    /// range doubles as the facility's inventory limits.
    pub fn ratchets(mut self, schedule: RatchetSchedule<P>) -> Self {
        self.ratchets = Some(schedule);
        self
    }

    pub fn min_inventory(mut self, min_inventory: f64) -> Self {
        self.min_inventory = Some(min_inventory);
        self
    }

    pub fn max_inventory(mut self, max_inventory: f64) -> Self {
        self.max_inventory = Some(max_inventory);
        self
    }

    /// Injection cost per unit of decision volume, settling on the period's
    /// first day.
    pub fn per_unit_injection_cost(self, cost_rate: f64) -> Self {
        self.per_unit_injection_cost_with_settle(cost_rate, Box::new(|p: P| p.first_day()))
    }

    /// Injection cost per unit, settling on the date given by `settle_rule`.
    pub fn per_unit_injection_cost_with_settle(
        mut self,
        cost_rate: f64,
        settle_rule: SettleDateRule<P>,
    ) -> Self {
        self.injection_cost_rate = cost_rate;
        self.injection_cost_settle = Some(settle_rule);
        self
    }

    /// Withdrawal cost per unit of decision volume, settling on the period's
    /// first day.
    pub fn per_unit_withdrawal_cost(self, cost_rate: f64) -> Self {
        self.per_unit_withdrawal_cost_with_settle(cost_rate, Box::new(|p: P| p.first_day()))
    }

    /// Withdrawal cost per unit, settling on the date given by `settle_rule`.
    pub fn per_unit_withdrawal_cost_with_settle(
        mut self,
        cost_rate: f64,
        settle_rule: SettleDateRule<P>,
    ) -> Self {
        self.withdrawal_cost_rate = cost_rate;
        self.withdrawal_cost_settle = Some(settle_rule);
        self
    }

    /// Cost per unit of inventory held, charged each period on its first
    /// day.
    pub fn per_unit_inventory_cost(mut self, cost_rate: f64) -> Self {
        self.inventory_cost_rate = cost_rate;
        self
    }

    /// Fraction of injected volume consumed as fuel, purchased on top of
    /// the decision volume.
    pub fn percent_consumed_on_inject(mut self, pct: f64) -> Self {
        self.pct_consumed_on_inject = pct;
        self
    }

    /// Fraction of withdrawn volume consumed as fuel.
    pub fn percent_consumed_on_withdraw(mut self, pct: f64) -> Self {
        self.pct_consumed_on_withdraw = pct;
        self
    }

    /// Fraction of inventory lost per period.
    pub fn percent_inventory_loss(mut self, pct: f64) -> Self {
        self.pct_inventory_loss = pct;
        self
    }

    /// Inventory must be zero by the end period.
    pub fn must_be_empty_at_end(mut self) -> Self {
        self.terminal = Some(TerminalCondition::MustBeEmpty);
        self
    }

    /// Inventory left at the end period is worth
    /// `value(spot_price, inventory)`.
    pub fn terminal_inventory_value(
        mut self,
        value: impl Fn(f64, f64) -> f64 + Send + Sync + 'static,
    ) -> Self {
        self.terminal = Some(TerminalCondition::Value(Box::new(value)));
        self
    }

    pub fn build(self) -> Result<CmdtyStorage<P>, ContractError> {
        if let Some(e) = self.rates_error {
            return Err(e);
        }
        if self.end <= self.start {
            return Err(ContractError::InvalidValue {
                field: "end",
                message: format!(
                    "end period {} must be after start period {}",
                    self.end, self.start
                ),
            });
        }
        for (pct, field) in [
            (self.pct_consumed_on_inject, "percent_consumed_on_inject"),
            (self.pct_consumed_on_withdraw, "percent_consumed_on_withdraw"),
        ] {
            if !(0.0..1.0).contains(&pct) {
                return Err(ContractError::InvalidValue {
                    field,
                    message: format!("{} is not a fraction in [0, 1)", pct),
                });
            }
        }
        if !(0.0..1.0).contains(&self.pct_inventory_loss) {
            return Err(ContractError::InvalidValue {
                field: "percent_inventory_loss",
                message: format!("{} is not a fraction in [0, 1)", self.pct_inventory_loss),
            });
        }

        let rates = match (self.constant_range, self.ratchets) {
            (Some(_), Some(_)) => {
                return Err(ContractError::InvalidValue {
                    field: "rates",
                    message: "both constant rates and ratchets were set".into(),
                })
            }
            (Some(range), None) => {
                let min_inventory = self
                    .min_inventory
                    .ok_or(ContractError::MissingField("min_inventory"))?;
                let max_inventory = self
                    .max_inventory
                    .ok_or(ContractError::MissingField("max_inventory"))?;
                if min_inventory < 0.0 || max_inventory < min_inventory {
                    return Err(ContractError::InvalidValue {
                        field: "min_inventory",
                        message: format!(
                            "inventory limits [{}, {}] are not non-negative ascending",
                            min_inventory, max_inventory
                        ),
                    });
                }
                RateSpec::Constant {
                    range,
                    min_inventory,
                    max_inventory,
                }
            }
            (None, Some(schedule)) => {
                if schedule.first_period() > self.start {
                    return Err(ContractError::InvalidRatchets(format!(
                        "first schedule entry at {} is after the storage start {}",
                        schedule.first_period(),
                        self.start
                    )));
                }
                RateSpec::Ratchets(schedule)
            }
            (None, None) => return Err(ContractError::MissingField("inject_withdraw_rates")),
        };

        let terminal = self
            .terminal
            .ok_or(ContractError::MissingField("terminal_condition"))?;

        Ok(CmdtyStorage {
            start: self.start,
            end: self.end,
            rates,
            injection_cost_rate: self.injection_cost_rate,
            injection_cost_settle: self
                .injection_cost_settle
                .unwrap_or_else(|| Box::new(|p: P| p.first_day())),
            withdrawal_cost_rate: self.withdrawal_cost_rate,
            withdrawal_cost_settle: self
                .withdrawal_cost_settle
                .unwrap_or_else(|| Box::new(|p: P| p.first_day())),
            inventory_cost_rate: self.inventory_cost_rate,
            pct_consumed_on_inject: self.pct_consumed_on_inject,
            pct_consumed_on_withdraw: self.pct_consumed_on_withdraw,
            pct_inventory_loss: self.pct_inventory_loss,
            terminal,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::RatchetPoint;
    use approx::assert_relative_eq;

    fn day(month: u32, d: u32) -> Date {
        Date::from_ymd(2024, month, d).unwrap()
    }

    fn simple_storage() -> CmdtyStorage<Date> {
        CmdtyStorage::builder(day(1, 1), day(12, 31))
            .constant_inject_withdraw_range(-850.0, 625.0)
            .min_inventory(0.0)
            .max_inventory(52_500.0)
            .per_unit_injection_cost(1.25)
            .per_unit_withdrawal_cost(0.93)
            .must_be_empty_at_end()
            .build()
            .unwrap()
    }

    #[test]
    fn builder_requires_rates_limits_and_terminal() {
        let missing_rates = CmdtyStorage::builder(day(1, 1), day(12, 31))
            .must_be_empty_at_end()
            .build();
        assert!(matches!(
            missing_rates,
            Err(ContractError::MissingField("inject_withdraw_rates"))
        ));

        let missing_terminal = CmdtyStorage::builder(day(1, 1), day(12, 31))
            .constant_inject_withdraw_range(-1.0, 1.0)
            .min_inventory(0.0)
            .max_inventory(10.0)
            .build();
        assert!(matches!(
            missing_terminal,
            Err(ContractError::MissingField("terminal_condition"))
        ));

        let missing_max = CmdtyStorage::builder(day(1, 1), day(12, 31))
            .constant_inject_withdraw_range(-1.0, 1.0)
            .min_inventory(0.0)
            .must_be_empty_at_end()
            .build();
        assert!(matches!(
            missing_max,
            Err(ContractError::MissingField("max_inventory"))
        ));
    }

    #[test]
    fn builder_rejects_inverted_periods_and_rates() {
        assert!(CmdtyStorage::builder(day(2, 1), day(1, 1))
            .constant_inject_withdraw_range(-1.0, 1.0)
            .min_inventory(0.0)
            .max_inventory(10.0)
            .must_be_empty_at_end()
            .build()
            .is_err());

        assert!(CmdtyStorage::builder(day(1, 1), day(2, 1))
            .constant_inject_withdraw_range(1.0, -1.0)
            .min_inventory(0.0)
            .max_inventory(10.0)
            .must_be_empty_at_end()
            .build()
            .is_err());
    }

    #[test]
    fn costs_settle_on_first_day_by_default() {
        let storage = simple_storage();
        let flows = storage.injection_cost(day(6, 15), 100.0, 200.0);
        assert_eq!(flows.len(), 1);
        assert_eq!(flows[0].date, day(6, 15));
        assert_relative_eq!(flows[0].amount, 250.0, epsilon = 1e-12);

        let flows = storage.withdrawal_cost(day(6, 15), 100.0, 200.0);
        assert_relative_eq!(flows[0].amount, 186.0, epsilon = 1e-12);
    }

    #[test]
    fn custom_settle_rule_is_used() {
        let storage = CmdtyStorage::builder(day(1, 1), day(12, 31))
            .constant_inject_withdraw_range(-1.0, 1.0)
            .min_inventory(0.0)
            .max_inventory(10.0)
            .per_unit_injection_cost_with_settle(2.0, Box::new(|p: Date| p.add_days(20)))
            .must_be_empty_at_end()
            .build()
            .unwrap();
        let flows = storage.injection_cost(day(6, 1), 0.0, 1.0);
        assert_eq!(flows[0].date, day(6, 21));
    }

    #[test]
    fn zero_cost_rate_produces_no_cash_flows() {
        let storage = CmdtyStorage::builder(day(1, 1), day(12, 31))
            .constant_inject_withdraw_range(-1.0, 1.0)
            .min_inventory(0.0)
            .max_inventory(10.0)
            .must_be_empty_at_end()
            .build()
            .unwrap();
        assert!(storage.injection_cost(day(6, 1), 0.0, 1.0).is_empty());
        assert!(storage.inventory_cost(day(6, 1), 5.0).is_empty());
    }

    #[test]
    fn consumed_volumes_are_percentages_of_decision() {
        let storage = CmdtyStorage::builder(day(1, 1), day(12, 31))
            .constant_inject_withdraw_range(-850.0, 625.0)
            .min_inventory(0.0)
            .max_inventory(52_500.0)
            .percent_consumed_on_inject(0.01)
            .percent_consumed_on_withdraw(0.015)
            .must_be_empty_at_end()
            .build()
            .unwrap();
        assert_relative_eq!(
            storage.consumed_on_inject(day(6, 1), 0.0, 200.0),
            2.0,
            epsilon = 1e-12
        );
        assert_relative_eq!(
            storage.consumed_on_withdraw(day(6, 1), 0.0, 200.0),
            3.0,
            epsilon = 1e-12
        );
    }

    #[test]
    fn terminal_value_zero_when_must_be_empty() {
        let storage = simple_storage();
        assert_eq!(storage.terminal_value(50.0, 1000.0), 0.0);

        let with_terminal = CmdtyStorage::builder(day(1, 1), day(12, 31))
            .constant_inject_withdraw_range(-1.0, 1.0)
            .min_inventory(0.0)
            .max_inventory(10.0)
            .terminal_inventory_value(|price, inv| price * inv)
            .build()
            .unwrap();
        assert!(!with_terminal.must_be_empty_at_end());
        assert_eq!(with_terminal.terminal_value(50.0, 4.0), 200.0);
    }

    #[test]
    fn constant_rate_inventory_space_bounds() {
        let storage = simple_storage();
        // from inventory x, max withdrawal reaches x - 850
        let upper = storage.inventory_space_upper_bound(day(6, 1), 0.0, 1000.0);
        assert_relative_eq!(upper, 1850.0, epsilon = 1e-9);
        // clamped by the physical maximum
        let upper_clamped = storage.inventory_space_upper_bound(day(6, 1), 0.0, 52_400.0);
        assert_relative_eq!(upper_clamped, 52_500.0, epsilon = 1e-9);

        let lower = storage.inventory_space_lower_bound(day(6, 1), 1000.0, 52_500.0);
        assert_relative_eq!(lower, 375.0, epsilon = 1e-9);
        let lower_clamped = storage.inventory_space_lower_bound(day(6, 1), 500.0, 52_500.0);
        assert_relative_eq!(lower_clamped, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn ratchet_inventory_space_bounds_match_constant_equivalent() {
        // two-pin schedule with identical rates at both pins behaves like
        // constant rates
        let schedule = RatchetSchedule::new(vec![(
            day(1, 1),
            vec![
                RatchetPoint::new(0.0, -850.0, 625.0),
                RatchetPoint::new(52_500.0, -850.0, 625.0),
            ],
        )])
        .unwrap();
        let ratcheted = CmdtyStorage::builder(day(1, 1), day(12, 31))
            .ratchets(schedule)
            .must_be_empty_at_end()
            .build()
            .unwrap();
        let constant = simple_storage();

        let upper_r = ratcheted.inventory_space_upper_bound(day(6, 1), 0.0, 1000.0);
        let upper_c = constant.inventory_space_upper_bound(day(6, 1), 0.0, 1000.0);
        assert_relative_eq!(upper_r, upper_c, epsilon = 1e-6);

        let lower_r = ratcheted.inventory_space_lower_bound(day(6, 1), 1000.0, 52_500.0);
        let lower_c = constant.inventory_space_lower_bound(day(6, 1), 1000.0, 52_500.0);
        assert_relative_eq!(lower_r, lower_c, epsilon = 1e-6);
    }

    #[test]
    fn ratchet_schedule_must_start_at_or_before_contract() {
        let schedule = RatchetSchedule::new(vec![(
            day(2, 1),
            vec![
                RatchetPoint::new(0.0, -1.0, 1.0),
                RatchetPoint::new(10.0, -1.0, 1.0),
            ],
        )])
        .unwrap();
        let result = CmdtyStorage::builder(day(1, 1), day(12, 31))
            .ratchets(schedule)
            .must_be_empty_at_end()
            .build();
        assert!(matches!(result, Err(ContractError::InvalidRatchets(_))));
    }
}
