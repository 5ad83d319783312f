//! The least-squares Monte Carlo valuation engine.
//!
//! Valuation runs in two passes over the periods from the first active
//! period to the storage end:
//!
//! 1. **Backward induction** on the regression simulation sample. Starting
//!    from terminal inventory values, each period regresses next period's
//!    simulated storage values on the basis functions to estimate
//!    continuation values, and picks the best decision per simulation and
//!    inventory grid point. The regression only *selects* the decision; the
//!    value carried backward swaps the fitted continuation for the
//!    simulated one, which removes the foresight bias a fitted value would
//!    otherwise leak into the price.
//! 2. **Forward simulation** on an independent valuation sample. The saved
//!    regression coefficients are applied to the fresh sample's prices, and
//!    each simulation walks its own inventory path taking the decision the
//!    fitted continuation values favour. Cash flows accumulate into the
//!    NPV, pathwise deltas, per-period profiles and trigger prices.

use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;

use storage_core::cashflow::CashFlow;
use storage_core::contract::StorageContract;
use storage_core::discount::Discounter;
use storage_core::math::{bisect_grid, interpolation_weight, max_value_and_index};
use storage_core::panel::Panel;
use storage_core::series::TimeSeries;
use storage_core::types::time::{Date, Period};

use crate::decision::{bang_bang_decision_set, decision_cost_npv, volume_consumed};
use crate::error::LsmcError;
use crate::inventory_space::calculate_inventory_space;
use crate::params::LsmcParams;
use crate::progress::ProgressReporter;
use crate::regression::{fitted_values, populate_design_matrix, RegressionFit};
use crate::results::{LsmcResults, SimDataReturned, StorageProfile};
use crate::trigger::calculate_trigger_prices;

/// Continuation values at next period's inventory grid points.
enum Continuation {
    /// One expected value per grid point, used when the decision period is
    /// the valuation period and its price carries no uncertainty.
    Deterministic(Vec<f64>),
    /// Fitted values per grid point and simulation.
    Regressed(Vec<Vec<f64>>),
}

impl Continuation {
    fn at(&self, grid_idx: usize, sim_idx: usize) -> f64 {
        match self {
            Continuation::Deterministic(values) => values[grid_idx],
            Continuation::Regressed(values) => values[grid_idx][sim_idx],
        }
    }

    fn average(&self, grid_idx: usize) -> f64 {
        match self {
            Continuation::Deterministic(values) => values[grid_idx],
            Continuation::Regressed(values) => mean(&values[grid_idx]),
        }
    }

    fn interpolate(
        &self,
        inventory: f64,
        grid: &[f64],
        sim_idx: usize,
        tolerance: f64,
    ) -> Result<f64, LsmcError> {
        let (lower, upper) = bracket(grid, inventory, tolerance)?;
        if lower == upper {
            return Ok(self.at(lower, sim_idx));
        }
        let weight = interpolation_weight(grid[lower], grid[upper], inventory);
        Ok((1.0 - weight) * self.at(lower, sim_idx) + weight * self.at(upper, sim_idx))
    }

    fn interpolate_average(
        &self,
        inventory: f64,
        grid: &[f64],
        tolerance: f64,
    ) -> Result<f64, LsmcError> {
        let (lower, upper) = bracket(grid, inventory, tolerance)?;
        if lower == upper {
            return Ok(self.average(lower));
        }
        let weight = interpolation_weight(grid[lower], grid[upper], inventory);
        Ok((1.0 - weight) * self.average(lower) + weight * self.average(upper))
    }
}

fn bracket(grid: &[f64], inventory: f64, tolerance: f64) -> Result<(usize, usize), LsmcError> {
    bisect_grid(grid, inventory, tolerance).map_err(|e| {
        LsmcError::InvalidInput(format!(
            "inventory after decision falls outside the feasible grid: {}",
            e
        ))
    })
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn sample_std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let sum_squares: f64 = values.iter().map(|v| (v - m) * (v - m)).sum();
    (sum_squares / (values.len() - 1) as f64).sqrt()
}

/// Monte Carlo standard error of the mean of `pv_by_sim`.
///
/// With antithetic simulations, adjacent pairs are negatively correlated so
/// the plain estimator overstates the error; averaging each pair first
/// restores independence. An odd trailing simulation counts as its own
/// pair.
fn npv_standard_error(pv_by_sim: &[f64], antithetic: bool) -> f64 {
    if antithetic {
        let pair_means: Vec<f64> = pv_by_sim.chunks(2).map(mean).collect();
        sample_std_dev(&pair_means) / (pair_means.len() as f64).sqrt()
    } else {
        sample_std_dev(pv_by_sim) / (pv_by_sim.len() as f64).sqrt()
    }
}

/// Values a storage contract by least-squares Monte Carlo.
///
/// Returns zero-valued results for an expired contract, and the
/// deterministic terminal value when the valuation period is the end period
/// itself. Otherwise both simulation samples are generated, the backward
/// and forward passes run, and the results hold the NPV, its standard
/// error, deltas, expected profiles, trigger prices and any per-simulation
/// panels requested through [`SimDataReturned`].
///
/// Progress reported through the parameters' callback is monotone in
/// `[0, 1]` and finishes on exactly 1.0. Cancellation is polled at period
/// boundaries in both passes.
pub fn lsmc_value<P: Period, S: StorageContract<P>>(
    params: &LsmcParams<'_, P, S>,
) -> Result<LsmcResults<P>, LsmcError> {
    let mut progress = ProgressReporter::new(params.on_progress.as_deref());
    params.cancellation.check()?;

    if params.inventory < 0.0 {
        return Err(LsmcError::InvalidInput(format!(
            "inventory cannot be negative, got {}",
            params.inventory
        )));
    }

    let storage = params.storage;
    let current = params.current_period;
    let end = storage.end_period();

    if current > end {
        progress.finish();
        return Ok(LsmcResults::expired());
    }
    if current == end {
        if storage.must_be_empty_at_end() {
            if params.inventory > 0.0 {
                return Err(LsmcError::InfeasibleConstraints(
                    "the facility must be empty at its end period but inventory remains".into(),
                ));
            }
            progress.finish();
            return Ok(LsmcResults::expired());
        }
        let spot = *params.forward_curve.get(current).ok_or_else(|| {
            LsmcError::InvalidInput(format!("forward curve has no price for {}", current))
        })?;
        let npv = storage.terminal_value(spot, params.inventory);
        progress.finish();
        return Ok(LsmcResults::end_period(npv));
    }

    let inventory_space = calculate_inventory_space(storage, params.inventory, current)?;
    let start_active = storage.start_period().max(current);
    if !params.forward_curve.covers(start_active, end) {
        return Err(LsmcError::InvalidInput(format!(
            "forward curve must cover every period from {} to {}",
            start_active, end
        )));
    }

    let num_periods = (end.offset_from(start_active) + 1) as usize;
    let periods: Vec<P> = (0..num_periods)
        .map(|i| start_active.offset(i as i32))
        .collect();

    tracing::info!(%start_active, %end, num_periods, "generating regression simulation sample");
    let regression_sims = (params.regression_sims)()?;
    if !regression_sims.covers(start_active, end) {
        return Err(LsmcError::InvalidInput(format!(
            "regression simulations must cover every period from {} to {}",
            start_active, end
        )));
    }
    let num_sims = regression_sims.num_sims();

    let discount: &dyn Fn(Date, Date) -> f64 = params.discount_factors;
    let discounter = Discounter::new(current.first_day(), discount);

    // grids[i] holds the inventory grid for periods[i]; filled backwards
    let mut grids: Vec<Vec<f64>> = vec![Vec::new(); num_periods];
    let end_range = inventory_space[end];
    grids[num_periods - 1] = params.grid_calc.grid_points(end_range.min, end_range.max);

    // terminal storage values per end-grid point and simulation
    let end_spot_prices = regression_sims
        .spot_prices(end)
        .ok_or_else(|| LsmcError::InvalidInput(format!("no simulated prices for {}", end)))?;
    let mut storage_actual_next: Vec<Vec<f64>> = grids[num_periods - 1]
        .iter()
        .map(|&inventory| {
            end_spot_prices
                .iter()
                .map(|&price| storage.terminal_value(price, inventory))
                .collect()
        })
        .collect();

    let num_basis = params.basis_functions.len();
    let mut design = DMatrix::zeros(num_sims, num_basis);
    let mut column_buffer = Vec::new();

    // coefficients keyed by the regressor period's index; the target is
    // that period's next-period continuation value
    let mut regress_coeffs: Vec<Vec<DVector<f64>>> = vec![Vec::new(); num_periods];
    let mut current_continuation: Vec<f64> = Vec::new();

    tracing::info!("starting backward induction");
    let back_step = params.backward_progress_share / (num_periods - 1) as f64;
    let mut progress_fraction = 0.0;

    for period_idx in (0..num_periods - 1).rev() {
        let period = periods[period_idx];
        let (head, tail) = grids.split_at_mut(period_idx + 1);
        let next_grid: &[f64] = &tail[0];

        // continuation values seen from this period, per next-grid point
        let storage_regress_next: Vec<Vec<f64>> = if period == current {
            // the current period's price is known, so expected continuation
            // values are plain averages over simulations
            current_continuation = storage_actual_next.iter().map(|v| mean(v)).collect();
            current_continuation
                .iter()
                .map(|&expected| vec![expected; num_sims])
                .collect()
        } else {
            populate_design_matrix(
                &mut design,
                period,
                &regression_sims,
                &params.basis_functions,
                &mut column_buffer,
            )?;
            let fit = RegressionFit::factorize(&design)?;
            let mut coeffs_by_grid = Vec::with_capacity(next_grid.len());
            let mut fitted_by_grid = Vec::with_capacity(next_grid.len());
            for target in &storage_actual_next {
                let coeffs = fit.coefficients(target)?;
                fitted_by_grid.push(fitted_values(&design, &coeffs));
                coeffs_by_grid.push(coeffs);
            }
            regress_coeffs[period_idx] = coeffs_by_grid;
            fitted_by_grid
        };

        let grid: Vec<f64> = if period_idx == 0 {
            vec![params.inventory]
        } else {
            let range = inventory_space[period];
            params.grid_calc.grid_points(range.min, range.max)
        };
        let next_range = inventory_space[periods[period_idx + 1]];

        let df_settle = discounter.factor((params.settle_date_rule)(period));

        let current_prices;
        let sim_prices: &[f64] = if period == current {
            current_prices = vec![params.forward_curve[period]; num_sims];
            &current_prices
        } else {
            regression_sims.spot_prices(period).ok_or_else(|| {
                LsmcError::InvalidInput(format!("no simulated prices for {}", period))
            })?
        };

        let mut storage_values_this: Vec<Vec<f64>> = Vec::with_capacity(grid.len());
        for &inventory in &grid {
            let range = storage.inject_withdraw_range(period, inventory);
            let inventory_loss = storage.inventory_percent_loss(period) * inventory;
            let decision_set = bang_bang_decision_set(
                range,
                inventory,
                inventory_loss,
                next_range.min,
                next_range.max,
                params.numerical_tolerance,
                params.num_extra_decisions,
            )?;
            let inventory_cost_npv = CashFlow::npv(&storage.inventory_cost(period, inventory), |d| {
                discounter.factor(d)
            });

            // per-decision quantities shared across simulations
            let mut cost_npvs = Vec::with_capacity(decision_set.len());
            let mut consumed_volumes = Vec::with_capacity(decision_set.len());
            let mut brackets = Vec::with_capacity(decision_set.len());
            for &volume in &decision_set {
                cost_npvs.push(decision_cost_npv(storage, period, inventory, volume, &discounter));
                consumed_volumes.push(volume_consumed(storage, period, inventory, volume));
                let inventory_after = inventory + volume - inventory_loss;
                let (lower, upper) = bracket(next_grid, inventory_after, params.numerical_tolerance)?;
                let weight = if lower == upper {
                    0.0
                } else {
                    interpolation_weight(next_grid[lower], next_grid[upper], inventory_after)
                };
                brackets.push((lower, upper, weight));
            }

            let values_by_sim: Vec<f64> = (0..num_sims)
                .into_par_iter()
                .map(|sim_idx| {
                    let price = sim_prices[sim_idx];
                    let mut best_total = f64::NEG_INFINITY;
                    let mut best_decision = 0usize;
                    for decision_idx in 0..decision_set.len() {
                        let volume = decision_set[decision_idx];
                        let (lower, upper, weight) = brackets[decision_idx];
                        let regress_continuation = (1.0 - weight)
                            * storage_regress_next[lower][sim_idx]
                            + weight * storage_regress_next[upper][sim_idx];
                        let immediate = -(volume + consumed_volumes[decision_idx])
                            * price
                            * df_settle
                            - cost_npvs[decision_idx];
                        let total = immediate + regress_continuation - inventory_cost_npv;
                        if total > best_total {
                            best_total = total;
                            best_decision = decision_idx;
                        }
                    }
                    // the fitted continuation only selected the decision;
                    // carry the simulated continuation backward
                    let (lower, upper, weight) = brackets[best_decision];
                    let regress = (1.0 - weight) * storage_regress_next[lower][sim_idx]
                        + weight * storage_regress_next[upper][sim_idx];
                    let actual = (1.0 - weight) * storage_actual_next[lower][sim_idx]
                        + weight * storage_actual_next[upper][sim_idx];
                    best_total - regress + actual
                })
                .collect();
            storage_values_this.push(values_by_sim);
        }

        head[period_idx] = grid;
        storage_actual_next = storage_values_this;

        progress_fraction += back_step;
        progress.report(progress_fraction);
        params.cancellation.check()?;
    }

    let backward_npv = mean(&storage_actual_next[0]);
    tracing::info!(backward_npv, "completed backward induction");

    tracing::info!("generating valuation simulation sample");
    let valuation_sims = (params.valuation_sims)()?;
    if !valuation_sims.covers(start_active, end) {
        return Err(LsmcError::InvalidInput(format!(
            "valuation simulations must cover every period from {} to {}",
            start_active, end
        )));
    }
    if valuation_sims.num_sims() != num_sims {
        return Err(LsmcError::InvalidInput(format!(
            "valuation sample has {} simulations but the regression sample has {}",
            valuation_sims.num_sims(),
            num_sims
        )));
    }

    let flags = params.sim_data_returned;
    let panel_if = |flag: SimDataReturned| {
        if flags.contains(flag) {
            Panel::zeros(start_active, num_periods, num_sims)
        } else {
            Panel::empty()
        }
    };
    let mut inventory_by_sim = panel_if(SimDataReturned::INVENTORY);
    let mut inject_withdraw_volume_by_sim = panel_if(SimDataReturned::INJECT_WITHDRAW_VOLUME);
    let mut cmdty_consumed_by_sim = panel_if(SimDataReturned::CMDTY_CONSUMED);
    let mut inventory_loss_by_sim = panel_if(SimDataReturned::INVENTORY_LOSS);
    let mut net_volume_by_sim = panel_if(SimDataReturned::NET_VOLUME);
    let mut period_pv_by_sim = panel_if(SimDataReturned::PERIOD_PV);

    let mut pv_by_sim = vec![0.0; num_sims];
    let mut deltas = vec![0.0; num_periods];
    let mut delta_standard_errors = vec![0.0; num_periods];
    let mut profiles = vec![StorageProfile::default(); num_periods];
    let mut trigger_prices_by_period = Vec::with_capacity(num_periods - 1);
    let mut trigger_profiles_by_period = Vec::with_capacity(num_periods - 1);

    let mut inventories = vec![params.inventory; num_sims];
    let mut next_inventories = vec![0.0; num_sims];
    let mut immediate_pvs: Vec<f64> = Vec::new();
    let mut consumed_buffer: Vec<f64> = Vec::new();
    let mut totals: Vec<f64> = Vec::new();

    tracing::info!("starting forward decision pass");
    let forward_step = (1.0 - params.backward_progress_share) / num_periods as f64;

    for period_idx in 0..num_periods - 1 {
        let period = periods[period_idx];
        let next_grid: &[f64] = &grids[period_idx + 1];

        let continuation = if period == current {
            Continuation::Deterministic(current_continuation.clone())
        } else {
            populate_design_matrix(
                &mut design,
                period,
                &valuation_sims,
                &params.basis_functions,
                &mut column_buffer,
            )?;
            Continuation::Regressed(
                regress_coeffs[period_idx]
                    .iter()
                    .map(|coeffs| fitted_values(&design, coeffs))
                    .collect(),
            )
        };

        let df_settle = discounter.factor((params.settle_date_rule)(period));
        let df_deltas = if params.discount_deltas { df_settle } else { 1.0 };

        let current_prices;
        let sim_prices: &[f64] = if period == current {
            current_prices = vec![params.forward_curve[period]; num_sims];
            &current_prices
        } else {
            valuation_sims.spot_prices(period).ok_or_else(|| {
                LsmcError::InvalidInput(format!("no simulated prices for {}", period))
            })?
        };

        let next_range = inventory_space[periods[period_idx + 1]];
        let forward_price = params.forward_curve[period];

        if flags.contains(SimDataReturned::INVENTORY) {
            inventory_by_sim.row_mut(period_idx).copy_from_slice(&inventories);
        }

        let mut sum_volume = 0.0;
        let mut sum_consumed = 0.0;
        let mut sum_loss = 0.0;
        let mut sum_pv = 0.0;
        let mut sum_delta = 0.0;
        let mut sum_delta_squared = 0.0;

        for sim_idx in 0..num_sims {
            let price = sim_prices[sim_idx];
            let inventory = inventories[sim_idx];
            let range = storage.inject_withdraw_range(period, inventory);
            let inventory_loss = storage.inventory_percent_loss(period) * inventory;
            let decision_set = bang_bang_decision_set(
                range,
                inventory,
                inventory_loss,
                next_range.min,
                next_range.max,
                params.numerical_tolerance,
                params.num_extra_decisions,
            )?;
            let inventory_cost_npv = CashFlow::npv(&storage.inventory_cost(period, inventory), |d| {
                discounter.factor(d)
            });

            immediate_pvs.clear();
            consumed_buffer.clear();
            totals.clear();
            for &volume in &decision_set {
                let consumed = volume_consumed(storage, period, inventory, volume);
                let cost_npv = decision_cost_npv(storage, period, inventory, volume, &discounter);
                let immediate =
                    -(volume + consumed) * price * df_settle - cost_npv - inventory_cost_npv;
                let inventory_after = inventory + volume - inventory_loss;
                let total = immediate
                    + continuation.interpolate(
                        inventory_after,
                        next_grid,
                        sim_idx,
                        params.numerical_tolerance,
                    )?;
                totals.push(total);
                immediate_pvs.push(immediate);
                consumed_buffer.push(consumed);
            }
            let (_, best_decision) = max_value_and_index(&totals);

            let volume = decision_set[best_decision];
            let consumed = consumed_buffer[best_decision];
            let immediate_pv = immediate_pvs[best_decision];
            next_inventories[sim_idx] = inventory + volume - inventory_loss;

            // pathwise delta: simulated spot is forward times a stochastic
            // multiplier, so d(spot)/d(forward) is spot / forward
            let payoff_derivative = -(volume + consumed) * price / forward_price * df_deltas;
            sum_delta += payoff_derivative;
            sum_delta_squared += payoff_derivative * payoff_derivative;

            sum_volume += volume;
            sum_consumed += consumed;
            sum_loss += inventory_loss;
            sum_pv += immediate_pv;
            pv_by_sim[sim_idx] += immediate_pv;

            if flags.contains(SimDataReturned::INJECT_WITHDRAW_VOLUME) {
                inject_withdraw_volume_by_sim.row_mut(period_idx)[sim_idx] = volume;
            }
            if flags.contains(SimDataReturned::CMDTY_CONSUMED) {
                cmdty_consumed_by_sim.row_mut(period_idx)[sim_idx] = consumed;
            }
            if flags.contains(SimDataReturned::INVENTORY_LOSS) {
                inventory_loss_by_sim.row_mut(period_idx)[sim_idx] = inventory_loss;
            }
            if flags.contains(SimDataReturned::NET_VOLUME) {
                net_volume_by_sim.row_mut(period_idx)[sim_idx] = -volume - consumed;
            }
            if flags.contains(SimDataReturned::PERIOD_PV) {
                period_pv_by_sim.row_mut(period_idx)[sim_idx] = immediate_pv;
            }
        }

        let n = num_sims as f64;
        let expected_inventory = mean(&inventories);
        profiles[period_idx] = StorageProfile {
            inventory: expected_inventory,
            inject_withdraw_volume: sum_volume / n,
            cmdty_consumed: sum_consumed / n,
            inventory_loss: sum_loss / n,
            period_pv: sum_pv / n,
        };
        deltas[period_idx] = sum_delta / n;
        let delta_variance = (sum_delta_squared - sum_delta * sum_delta / n) / (n - 1.0);
        delta_standard_errors[period_idx] = (delta_variance.max(0.0) / n).sqrt();

        let average_continuation = |inventory_after: f64| {
            continuation.interpolate_average(inventory_after, next_grid, params.numerical_tolerance)
        };
        let (trigger_prices, trigger_profile) = calculate_trigger_prices(
            storage,
            period,
            expected_inventory,
            next_range.min,
            next_range.max,
            df_settle,
            &discounter,
            &average_continuation,
            params.numerical_tolerance,
            params.num_extra_decisions,
            params.num_trigger_volumes,
        )?;
        trigger_prices_by_period.push(trigger_prices);
        trigger_profiles_by_period.push(trigger_profile);

        std::mem::swap(&mut inventories, &mut next_inventories);
        progress_fraction += forward_step;
        progress.report(progress_fraction);
        params.cancellation.check()?;
    }

    if flags.contains(SimDataReturned::INVENTORY) {
        inventory_by_sim
            .row_mut(num_periods - 1)
            .copy_from_slice(&inventories);
    }

    // inventory arriving at the end period is valued at the simulated spot
    let mut end_period_pv = 0.0;
    if !storage.must_be_empty_at_end() {
        let end_prices = valuation_sims
            .spot_prices(end)
            .ok_or_else(|| LsmcError::InvalidInput(format!("no simulated prices for {}", end)))?;
        let mut sum_terminal = 0.0;
        for sim_idx in 0..num_sims {
            let terminal = storage.terminal_value(end_prices[sim_idx], inventories[sim_idx]);
            sum_terminal += terminal;
            pv_by_sim[sim_idx] += terminal;
            if flags.contains(SimDataReturned::PERIOD_PV) {
                period_pv_by_sim.row_mut(num_periods - 1)[sim_idx] = terminal;
            }
        }
        end_period_pv = sum_terminal / num_sims as f64;
    }
    profiles[num_periods - 1] = StorageProfile {
        inventory: mean(&inventories),
        inject_withdraw_volume: 0.0,
        cmdty_consumed: 0.0,
        inventory_loss: 0.0,
        period_pv: end_period_pv,
    };

    let npv = mean(&pv_by_sim);
    let standard_error = npv_standard_error(&pv_by_sim, params.antithetic);
    tracing::info!(npv, standard_error, "completed forward decision pass");

    let results = LsmcResults {
        npv,
        standard_error,
        deltas: TimeSeries::new(start_active, deltas),
        delta_standard_errors: TimeSeries::new(start_active, delta_standard_errors),
        expected_profile: TimeSeries::new(start_active, profiles),
        trigger_prices: TimeSeries::new(start_active, trigger_prices_by_period),
        trigger_volume_profiles: TimeSeries::new(start_active, trigger_profiles_by_period),
        pv_by_sim,
        regression_spot_sims: if flags.contains(SimDataReturned::REGRESSION_SPOT) {
            regression_sims.spot_panel().clone()
        } else {
            Panel::empty()
        },
        valuation_spot_sims: if flags.contains(SimDataReturned::VALUATION_SPOT) {
            valuation_sims.spot_panel().clone()
        } else {
            Panel::empty()
        },
        regression_factor_sims: if flags.contains(SimDataReturned::REGRESSION_FACTORS) {
            regression_sims.factor_panels().to_vec()
        } else {
            Vec::new()
        },
        valuation_factor_sims: if flags.contains(SimDataReturned::VALUATION_FACTORS) {
            valuation_sims.factor_panels().to_vec()
        } else {
            Vec::new()
        },
        inventory_by_sim,
        inject_withdraw_volume_by_sim,
        cmdty_consumed_by_sim,
        inventory_loss_by_sim,
        net_volume_by_sim,
        period_pv_by_sim,
    };
    progress.finish();
    Ok(results)
}
