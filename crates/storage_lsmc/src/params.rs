//! Valuation parameters and their validating builder.

use storage_core::basis::BasisFunction;
use storage_core::contract::StorageContract;
use storage_core::grid::GridCalc;
use storage_core::series::DoubleSeries;
use storage_core::sim::SpotSims;
use storage_core::types::time::{Date, Period};

use crate::error::{CancellationToken, LsmcError};
use crate::results::SimDataReturned;

/// Default absolute tolerance for snapping small inventory constraint
/// breaches.
pub const DEFAULT_NUMERICAL_TOLERANCE: f64 = 1e-10;

/// Default share of reported progress attributed to the backward induction
/// pass.
pub const DEFAULT_BACKWARD_PROGRESS_SHARE: f64 = 0.66;

/// Default number of volumes per side in the trigger price curves.
pub const DEFAULT_NUM_TRIGGER_VOLUMES: usize = 10;

/// Produces a fresh set of spot price simulations on demand.
///
/// The valuation calls one generator for the regression sample and an
/// independent one for the valuation sample; the two must not share random
/// draws or the regression's selection bias leaks into the price.
pub type SimGenerator<'a, P> = Box<dyn Fn() -> Result<SpotSims<P>, LsmcError> + Sync + 'a>;

/// All inputs to an LSMC storage valuation. Build with
/// [`LsmcParams::builder`].
pub struct LsmcParams<'a, P: Period, S: StorageContract<P>> {
    pub(crate) current_period: P,
    pub(crate) inventory: f64,
    pub(crate) storage: &'a S,
    pub(crate) forward_curve: &'a DoubleSeries<P>,
    pub(crate) settle_date_rule: &'a (dyn Fn(P) -> Date + Sync),
    pub(crate) discount_factors: &'a (dyn Fn(Date, Date) -> f64 + Sync),
    pub(crate) grid_calc: &'a dyn GridCalc,
    pub(crate) basis_functions: Vec<BasisFunction>,
    pub(crate) regression_sims: SimGenerator<'a, P>,
    pub(crate) valuation_sims: SimGenerator<'a, P>,
    pub(crate) numerical_tolerance: f64,
    pub(crate) num_extra_decisions: usize,
    pub(crate) discount_deltas: bool,
    pub(crate) antithetic: bool,
    pub(crate) sim_data_returned: SimDataReturned,
    pub(crate) num_trigger_volumes: usize,
    pub(crate) backward_progress_share: f64,
    pub(crate) cancellation: CancellationToken,
    pub(crate) on_progress: Option<Box<dyn Fn(f64) + Send + Sync + 'a>>,
}

impl<'a, P: Period, S: StorageContract<P>> LsmcParams<'a, P, S> {
    /// Starts building parameters from the mandatory market inputs.
    pub fn builder(
        current_period: P,
        inventory: f64,
        storage: &'a S,
        forward_curve: &'a DoubleSeries<P>,
    ) -> LsmcParamsBuilder<'a, P, S> {
        LsmcParamsBuilder {
            current_period,
            inventory,
            storage,
            forward_curve,
            settle_date_rule: None,
            discount_factors: None,
            grid_calc: None,
            basis_functions: Vec::new(),
            regression_sims: None,
            valuation_sims: None,
            numerical_tolerance: DEFAULT_NUMERICAL_TOLERANCE,
            num_extra_decisions: 0,
            discount_deltas: false,
            antithetic: false,
            sim_data_returned: SimDataReturned::NONE,
            num_trigger_volumes: DEFAULT_NUM_TRIGGER_VOLUMES,
            backward_progress_share: DEFAULT_BACKWARD_PROGRESS_SHARE,
            cancellation: CancellationToken::new(),
            on_progress: None,
        }
    }
}

/// Builder for [`LsmcParams`], validating on `build()`.
pub struct LsmcParamsBuilder<'a, P: Period, S: StorageContract<P>> {
    current_period: P,
    inventory: f64,
    storage: &'a S,
    forward_curve: &'a DoubleSeries<P>,
    settle_date_rule: Option<&'a (dyn Fn(P) -> Date + Sync)>,
    discount_factors: Option<&'a (dyn Fn(Date, Date) -> f64 + Sync)>,
    grid_calc: Option<&'a dyn GridCalc>,
    basis_functions: Vec<BasisFunction>,
    regression_sims: Option<SimGenerator<'a, P>>,
    valuation_sims: Option<SimGenerator<'a, P>>,
    numerical_tolerance: f64,
    num_extra_decisions: usize,
    discount_deltas: bool,
    antithetic: bool,
    sim_data_returned: SimDataReturned,
    num_trigger_volumes: usize,
    backward_progress_share: f64,
    cancellation: CancellationToken,
    on_progress: Option<Box<dyn Fn(f64) + Send + Sync + 'a>>,
}

impl<'a, P: Period, S: StorageContract<P>> LsmcParamsBuilder<'a, P, S> {
    /// Maps each period to the settlement date of its commodity cash flows.
    pub fn settle_date_rule(mut self, rule: &'a (dyn Fn(P) -> Date + Sync)) -> Self {
        self.settle_date_rule = Some(rule);
        self
    }

    /// Discount factor function from present date to cash flow date.
    pub fn discount_factors(mut self, discount: &'a (dyn Fn(Date, Date) -> f64 + Sync)) -> Self {
        self.discount_factors = Some(discount);
        self
    }

    /// Inventory grid used by the backward induction.
    pub fn grid_calc(mut self, grid_calc: &'a dyn GridCalc) -> Self {
        self.grid_calc = Some(grid_calc);
        self
    }

    /// Regression basis functions. Put [`storage_core::basis::ones`] first
    /// so the design matrix has an intercept column.
    pub fn basis_functions(mut self, basis_functions: Vec<BasisFunction>) -> Self {
        self.basis_functions = basis_functions;
        self
    }

    /// Generator of the regression simulation sample.
    pub fn regression_sims(
        mut self,
        generator: impl Fn() -> Result<SpotSims<P>, LsmcError> + Sync + 'a,
    ) -> Self {
        self.regression_sims = Some(Box::new(generator));
        self
    }

    /// Generator of the valuation simulation sample, independent of the
    /// regression sample.
    pub fn valuation_sims(
        mut self,
        generator: impl Fn() -> Result<SpotSims<P>, LsmcError> + Sync + 'a,
    ) -> Self {
        self.valuation_sims = Some(Box::new(generator));
        self
    }

    /// Absolute tolerance for snapping small constraint breaches.
    pub fn numerical_tolerance(mut self, tolerance: f64) -> Self {
        self.numerical_tolerance = tolerance;
        self
    }

    /// Extra evenly-spaced decisions on each side of zero.
    pub fn num_extra_decisions(mut self, num_extra_decisions: usize) -> Self {
        self.num_extra_decisions = num_extra_decisions;
        self
    }

    /// Whether deltas are discounted to the valuation date.
    pub fn discount_deltas(mut self, discount_deltas: bool) -> Self {
        self.discount_deltas = discount_deltas;
        self
    }

    /// Whether simulations arrive in antithetic pairs, tightening the
    /// standard error estimate.
    pub fn antithetic(mut self, antithetic: bool) -> Self {
        self.antithetic = antithetic;
        self
    }

    /// Which per-simulation panels the results include.
    pub fn sim_data_returned(mut self, sim_data_returned: SimDataReturned) -> Self {
        self.sim_data_returned = sim_data_returned;
        self
    }

    /// Number of volumes per side in the trigger price curves.
    pub fn num_trigger_volumes(mut self, num_trigger_volumes: usize) -> Self {
        self.num_trigger_volumes = num_trigger_volumes;
        self
    }

    /// Share of reported progress attributed to the backward pass.
    pub fn backward_progress_share(mut self, share: f64) -> Self {
        self.backward_progress_share = share;
        self
    }

    /// Token polled for cooperative cancellation.
    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Callback receiving monotone progress fractions in `[0, 1]`.
    pub fn on_progress(mut self, callback: impl Fn(f64) + Send + Sync + 'a) -> Self {
        self.on_progress = Some(Box::new(callback));
        self
    }

    /// Validates settings and the presence of every required input.
    pub fn build(self) -> Result<LsmcParams<'a, P, S>, LsmcError> {
        if !self.inventory.is_finite() {
            return Err(LsmcError::InvalidInput(format!(
                "starting inventory {} is not finite",
                self.inventory
            )));
        }
        if !(self.numerical_tolerance > 0.0) || !self.numerical_tolerance.is_finite() {
            return Err(LsmcError::InvalidInput(format!(
                "numerical tolerance must be positive and finite, got {}",
                self.numerical_tolerance
            )));
        }
        if !(self.backward_progress_share > 0.0 && self.backward_progress_share < 1.0) {
            return Err(LsmcError::InvalidInput(format!(
                "backward progress share must lie strictly between 0 and 1, got {}",
                self.backward_progress_share
            )));
        }
        if self.num_trigger_volumes == 0 {
            return Err(LsmcError::InvalidInput(
                "num_trigger_volumes must be positive".into(),
            ));
        }
        if self.basis_functions.is_empty() {
            return Err(LsmcError::InvalidInput(
                "at least one regression basis function is required".into(),
            ));
        }

        let settle_date_rule = self
            .settle_date_rule
            .ok_or_else(|| LsmcError::InvalidInput("settle_date_rule was not set".into()))?;
        let discount_factors = self
            .discount_factors
            .ok_or_else(|| LsmcError::InvalidInput("discount_factors was not set".into()))?;
        let grid_calc = self
            .grid_calc
            .ok_or_else(|| LsmcError::InvalidInput("grid_calc was not set".into()))?;
        let regression_sims = self
            .regression_sims
            .ok_or_else(|| LsmcError::InvalidInput("regression_sims was not set".into()))?;
        let valuation_sims = self
            .valuation_sims
            .ok_or_else(|| LsmcError::InvalidInput("valuation_sims was not set".into()))?;

        Ok(LsmcParams {
            current_period: self.current_period,
            inventory: self.inventory,
            storage: self.storage,
            forward_curve: self.forward_curve,
            settle_date_rule,
            discount_factors,
            grid_calc,
            basis_functions: self.basis_functions,
            regression_sims,
            valuation_sims,
            numerical_tolerance: self.numerical_tolerance,
            num_extra_decisions: self.num_extra_decisions,
            discount_deltas: self.discount_deltas,
            antithetic: self.antithetic,
            sim_data_returned: self.sim_data_returned,
            num_trigger_volumes: self.num_trigger_volumes,
            backward_progress_share: self.backward_progress_share,
            cancellation: self.cancellation,
            on_progress: self.on_progress,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storage_core::basis;
    use storage_core::contract::CmdtyStorage;
    use storage_core::discount::act365_const_rate;
    use storage_core::grid::FixedSpacingGridCalc;
    use storage_core::panel::Panel;
    use storage_core::series::TimeSeries;

    fn day(d: i32) -> Date {
        Date::from_ymd(2024, 1, 1).unwrap().offset(d)
    }

    fn dummy_sims() -> SpotSims<Date> {
        SpotSims::new(Panel::zeros(day(1), 1, 2), vec![Panel::zeros(day(1), 1, 2)]).unwrap()
    }

    #[test]
    fn builder_defaults_and_validation() {
        let storage = CmdtyStorage::builder(day(0), day(10))
            .constant_inject_withdraw_range(-1.0, 1.0)
            .min_inventory(0.0)
            .max_inventory(10.0)
            .must_be_empty_at_end()
            .build()
            .unwrap();
        let forward_curve = TimeSeries::from_fn(day(0), day(10), |_| 50.0);
        let settle = |p: Date| p;
        let discount = act365_const_rate(0.0);
        let grid_calc = FixedSpacingGridCalc::new(1.0).unwrap();

        let params = LsmcParams::builder(day(0), 0.0, &storage, &forward_curve)
            .settle_date_rule(&settle)
            .discount_factors(&discount)
            .grid_calc(&grid_calc)
            .basis_functions(vec![basis::ones()])
            .regression_sims(|| Ok(dummy_sims()))
            .valuation_sims(|| Ok(dummy_sims()))
            .build()
            .unwrap();
        assert_eq!(params.numerical_tolerance, DEFAULT_NUMERICAL_TOLERANCE);
        assert_eq!(
            params.backward_progress_share,
            DEFAULT_BACKWARD_PROGRESS_SHARE
        );
        assert_eq!(params.num_trigger_volumes, DEFAULT_NUM_TRIGGER_VOLUMES);

        // missing simulation generators
        let missing = LsmcParams::builder(day(0), 0.0, &storage, &forward_curve)
            .settle_date_rule(&settle)
            .discount_factors(&discount)
            .grid_calc(&grid_calc)
            .basis_functions(vec![basis::ones()])
            .build();
        assert!(matches!(missing, Err(LsmcError::InvalidInput(_))));

        // empty basis
        let empty_basis = LsmcParams::builder(day(0), 0.0, &storage, &forward_curve)
            .settle_date_rule(&settle)
            .discount_factors(&discount)
            .grid_calc(&grid_calc)
            .regression_sims(|| Ok(dummy_sims()))
            .valuation_sims(|| Ok(dummy_sims()))
            .build();
        assert!(matches!(empty_basis, Err(LsmcError::InvalidInput(_))));

        // out-of-domain settings
        let bad_share = LsmcParams::builder(day(0), 0.0, &storage, &forward_curve)
            .settle_date_rule(&settle)
            .discount_factors(&discount)
            .grid_calc(&grid_calc)
            .basis_functions(vec![basis::ones()])
            .regression_sims(|| Ok(dummy_sims()))
            .valuation_sims(|| Ok(dummy_sims()))
            .backward_progress_share(1.0)
            .build();
        assert!(matches!(bad_share, Err(LsmcError::InvalidInput(_))));
    }
}
