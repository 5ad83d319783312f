//! End-to-end valuation tests on small facilities whose optimal policies
//! are known, plus checks of the engine's operational surface: progress,
//! cancellation and per-simulation data panels.

use std::sync::Mutex;

use approx::assert_relative_eq;
use storage_core::basis;
use storage_core::contract::CmdtyStorage;
use storage_core::discount::act365_const_rate;
use storage_core::grid::FixedSpacingGridCalc;
use storage_core::series::{DoubleSeries, TimeSeries};
use storage_core::types::time::{Date, Period};
use storage_lsmc::{lsmc_value, CancellationToken, LsmcError, LsmcParams, SimDataReturned};
use storage_sim::OneFactorSpotSimulator;

fn day(d: i32) -> Date {
    Date::from_ymd(2024, 3, 1).unwrap().offset(d)
}

fn settle(period: Date) -> Date {
    period.first_day()
}

fn flat_series(start: Date, end: Date, value: f64) -> DoubleSeries<Date> {
    TimeSeries::from_fn(start, end, |_| value)
}

#[test]
fn expired_contract_values_to_zero() {
    let storage = CmdtyStorage::builder(day(0), day(5))
        .constant_inject_withdraw_range(-10.0, 10.0)
        .min_inventory(0.0)
        .max_inventory(100.0)
        .must_be_empty_at_end()
        .build()
        .unwrap();
    let forward = flat_series(day(0), day(5), 50.0);
    let discount = act365_const_rate(0.0);
    let grid = FixedSpacingGridCalc::new(10.0).unwrap();
    let settle_rule = settle;

    let reported = Mutex::new(Vec::new());
    let params = LsmcParams::builder(day(6), 0.0, &storage, &forward)
        .settle_date_rule(&settle_rule)
        .discount_factors(&discount)
        .grid_calc(&grid)
        .basis_functions(vec![basis::ones()])
        .regression_sims(|| Err(LsmcError::InvalidInput("should not simulate".into())))
        .valuation_sims(|| Err(LsmcError::InvalidInput("should not simulate".into())))
        .on_progress(|fraction| reported.lock().unwrap().push(fraction))
        .build()
        .unwrap();

    let results = lsmc_value(&params).unwrap();
    assert_eq!(results.npv, 0.0);
    assert_eq!(results.standard_error, 0.0);
    assert!(results.deltas.is_empty());
    assert!(results.expected_profile.is_empty());
    assert_eq!(*reported.lock().unwrap(), vec![1.0]);
}

#[test]
fn end_period_valuation_is_the_terminal_value() {
    let storage = CmdtyStorage::builder(day(0), day(5))
        .constant_inject_withdraw_range(-10.0, 10.0)
        .min_inventory(0.0)
        .max_inventory(100.0)
        .terminal_inventory_value(|price, inventory| price * inventory)
        .build()
        .unwrap();
    let forward = flat_series(day(0), day(5), 40.0);
    let discount = act365_const_rate(0.0);
    let grid = FixedSpacingGridCalc::new(10.0).unwrap();
    let settle_rule = settle;

    let params = LsmcParams::builder(day(5), 25.0, &storage, &forward)
        .settle_date_rule(&settle_rule)
        .discount_factors(&discount)
        .grid_calc(&grid)
        .basis_functions(vec![basis::ones()])
        .regression_sims(|| Err(LsmcError::InvalidInput("should not simulate".into())))
        .valuation_sims(|| Err(LsmcError::InvalidInput("should not simulate".into())))
        .build()
        .unwrap();

    let results = lsmc_value(&params).unwrap();
    assert_relative_eq!(results.npv, 1000.0, epsilon = 1e-12);
}

#[test]
fn end_period_with_leftover_inventory_that_must_clear_is_an_error() {
    let storage = CmdtyStorage::builder(day(0), day(5))
        .constant_inject_withdraw_range(-10.0, 10.0)
        .min_inventory(0.0)
        .max_inventory(100.0)
        .must_be_empty_at_end()
        .build()
        .unwrap();
    let forward = flat_series(day(0), day(5), 40.0);
    let discount = act365_const_rate(0.0);
    let grid = FixedSpacingGridCalc::new(10.0).unwrap();
    let settle_rule = settle;

    let params = LsmcParams::builder(day(5), 5.0, &storage, &forward)
        .settle_date_rule(&settle_rule)
        .discount_factors(&discount)
        .grid_calc(&grid)
        .basis_functions(vec![basis::ones()])
        .regression_sims(|| Err(LsmcError::InvalidInput("should not simulate".into())))
        .valuation_sims(|| Err(LsmcError::InvalidInput("should not simulate".into())))
        .build()
        .unwrap();

    assert!(matches!(
        lsmc_value(&params),
        Err(LsmcError::InfeasibleConstraints(_))
    ));
}

/// Rates pinned at -10 force full withdrawal of 30 units over three
/// periods, making the value deterministic: 30 units sold at 50.
fn forced_withdrawal_params_value(sim_data: SimDataReturned) -> storage_lsmc::LsmcResults<Date> {
    let storage = CmdtyStorage::builder(day(0), day(3))
        .constant_inject_withdraw_range(-10.0, -10.0)
        .min_inventory(0.0)
        .max_inventory(100.0)
        .must_be_empty_at_end()
        .build()
        .unwrap();
    let forward = flat_series(day(0), day(3), 50.0);
    let vols = flat_series(day(0), day(3), 0.0);
    let discount = act365_const_rate(0.0);
    let grid = FixedSpacingGridCalc::new(10.0).unwrap();
    let settle_rule = settle;

    let regression_sim = OneFactorSpotSimulator::new(0.0, vols.clone(), 16, 11, false).unwrap();
    let valuation_sim = OneFactorSpotSimulator::new(0.0, vols, 16, 12, false).unwrap();

    let params = LsmcParams::builder(day(0), 30.0, &storage, &forward)
        .settle_date_rule(&settle_rule)
        .discount_factors(&discount)
        .grid_calc(&grid)
        .basis_functions(vec![basis::ones()])
        .regression_sims(|| {
            regression_sim
                .simulate(day(-1), day(0), day(3), &forward)
                .map_err(|e| LsmcError::InvalidInput(e.to_string()))
        })
        .valuation_sims(|| {
            valuation_sim
                .simulate(day(-1), day(0), day(3), &forward)
                .map_err(|e| LsmcError::InvalidInput(e.to_string()))
        })
        .sim_data_returned(sim_data)
        .build()
        .unwrap();

    lsmc_value(&params).unwrap()
}

#[test]
fn forced_withdrawal_has_deterministic_value_and_deltas() {
    let results = forced_withdrawal_params_value(SimDataReturned::NONE);

    assert_relative_eq!(results.npv, 1500.0, epsilon = 1e-9);
    assert_eq!(results.standard_error, 0.0);
    for period_offset in 0..3 {
        assert_relative_eq!(results.deltas[day(period_offset)], 10.0, epsilon = 1e-9);
        assert_relative_eq!(
            results.delta_standard_errors[day(period_offset)],
            0.0,
            epsilon = 1e-9
        );
        let profile = &results.expected_profile[day(period_offset)];
        assert_relative_eq!(
            profile.inventory,
            30.0 - 10.0 * period_offset as f64,
            epsilon = 1e-9
        );
        assert_relative_eq!(profile.inject_withdraw_volume, -10.0, epsilon = 1e-9);
        assert_relative_eq!(profile.period_pv, 500.0, epsilon = 1e-9);
        // a single forced decision leaves nothing to trigger
        let triggers = &results.trigger_prices[day(period_offset)];
        assert_eq!(triggers.max_inject_volume, None);
        assert_eq!(triggers.max_withdraw_volume, None);
    }
    let final_profile = &results.expected_profile[day(3)];
    assert_relative_eq!(final_profile.inventory, 0.0, epsilon = 1e-9);
    assert_eq!(final_profile.period_pv, 0.0);
    assert_eq!(results.pv_by_sim.len(), 16);
    for pv in &results.pv_by_sim {
        assert_relative_eq!(*pv, 1500.0, epsilon = 1e-9);
    }
}

#[test]
fn requested_panels_are_populated_and_do_not_change_the_value() {
    let without = forced_withdrawal_params_value(SimDataReturned::NONE);
    let with = forced_withdrawal_params_value(SimDataReturned::ALL);

    assert_eq!(without.npv, with.npv);
    assert!(without.inventory_by_sim.is_empty());
    assert!(without.period_pv_by_sim.is_empty());
    assert!(without.regression_spot_sims.is_empty());

    assert_eq!(with.inventory_by_sim.num_rows(), 4);
    assert_eq!(with.inventory_by_sim.num_cols(), 16);
    for (row, expected) in [(0, 30.0), (1, 20.0), (2, 10.0), (3, 0.0)] {
        for &inventory in with.inventory_by_sim.row(row) {
            assert_relative_eq!(inventory, expected, epsilon = 1e-9);
        }
    }
    for row in 0..3 {
        for &volume in with.inject_withdraw_volume_by_sim.row(row) {
            assert_relative_eq!(volume, -10.0, epsilon = 1e-9);
        }
        for &net in with.net_volume_by_sim.row(row) {
            assert_relative_eq!(net, 10.0, epsilon = 1e-9);
        }
        for &pv in with.period_pv_by_sim.row(row) {
            assert_relative_eq!(pv, 500.0, epsilon = 1e-9);
        }
    }
    assert_eq!(with.regression_spot_sims.num_rows(), 4);
    assert_eq!(with.valuation_spot_sims.num_cols(), 16);
    assert_eq!(with.regression_factor_sims.len(), 1);
}

#[test]
fn single_decision_period_prices_the_forward_spread() {
    // inject up to 20 at 40 today, hold to the end period worth spot (50)
    // per unit, at one currency unit per unit injection cost
    let storage = CmdtyStorage::builder(day(0), day(1))
        .constant_inject_withdraw_range(0.0, 20.0)
        .min_inventory(0.0)
        .max_inventory(100.0)
        .per_unit_injection_cost(1.0)
        .terminal_inventory_value(|price, inventory| price * inventory)
        .build()
        .unwrap();
    let forward = TimeSeries::new(day(0), vec![40.0, 50.0]);
    let vols = flat_series(day(0), day(1), 0.0);
    let discount = act365_const_rate(0.0);
    let grid = FixedSpacingGridCalc::new(5.0).unwrap();
    let settle_rule = settle;

    let regression_sim = OneFactorSpotSimulator::new(0.0, vols.clone(), 16, 21, false).unwrap();
    let valuation_sim = OneFactorSpotSimulator::new(0.0, vols, 16, 22, false).unwrap();

    let params = LsmcParams::builder(day(0), 0.0, &storage, &forward)
        .settle_date_rule(&settle_rule)
        .discount_factors(&discount)
        .grid_calc(&grid)
        .basis_functions(vec![basis::ones()])
        .regression_sims(|| {
            regression_sim
                .simulate(day(-1), day(0), day(1), &forward)
                .map_err(|e| LsmcError::InvalidInput(e.to_string()))
        })
        .valuation_sims(|| {
            valuation_sim
                .simulate(day(-1), day(0), day(1), &forward)
                .map_err(|e| LsmcError::InvalidInput(e.to_string()))
        })
        .build()
        .unwrap();

    let results = lsmc_value(&params).unwrap();

    // inject 20: -20 * 40 - 20 + 20 * 50 = 180
    assert_relative_eq!(results.npv, 180.0, epsilon = 1e-9);
    assert_relative_eq!(results.deltas[day(0)], -20.0, epsilon = 1e-9);
    let profile = &results.expected_profile[day(0)];
    assert_relative_eq!(profile.inject_withdraw_volume, 20.0, epsilon = 1e-9);
    let final_profile = &results.expected_profile[day(1)];
    assert_relative_eq!(final_profile.inventory, 20.0, epsilon = 1e-9);
    assert_relative_eq!(final_profile.period_pv, 1000.0, epsilon = 1e-9);

    // continuation is worth 50 per unit and injection costs 1 per unit, so
    // every inject volume triggers at 49
    let triggers = &results.trigger_prices[day(0)];
    assert_eq!(triggers.max_inject_volume, Some(20.0));
    assert_relative_eq!(triggers.max_inject_trigger_price.unwrap(), 49.0, epsilon = 1e-9);
    assert_eq!(triggers.max_withdraw_volume, None);
    let curve = &results.trigger_volume_profiles[day(0)].inject;
    assert_eq!(curve.len(), 10);
    assert_relative_eq!(curve[0].volume, 2.0, epsilon = 1e-9);
    assert_eq!(curve[9].volume, 20.0);
    for point in curve {
        assert_relative_eq!(point.price, 49.0, epsilon = 1e-9);
    }
}

#[test]
fn seasonal_spread_is_captured_close_to_intrinsic() {
    // cheap commodity in the first two periods, expensive afterwards;
    // the intrinsic play injects 20 at 30 and withdraws it at 60
    let storage = CmdtyStorage::builder(day(0), day(4))
        .constant_inject_withdraw_range(-10.0, 10.0)
        .min_inventory(0.0)
        .max_inventory(20.0)
        .must_be_empty_at_end()
        .build()
        .unwrap();
    let forward = TimeSeries::from_fn(day(0), day(4), |p| if p < day(2) { 30.0 } else { 60.0 });
    let vols = flat_series(day(0), day(4), 0.2);
    let discount = act365_const_rate(0.05);
    let grid = FixedSpacingGridCalc::new(2.0).unwrap();
    let settle_rule = settle;

    let regression_sim = OneFactorSpotSimulator::new(4.0, vols.clone(), 512, 31, true).unwrap();
    let valuation_sim = OneFactorSpotSimulator::new(4.0, vols, 512, 32, true).unwrap();

    let params = LsmcParams::builder(day(0), 0.0, &storage, &forward)
        .settle_date_rule(&settle_rule)
        .discount_factors(&discount)
        .grid_calc(&grid)
        .basis_functions(basis::factor_polynomials(1, 2))
        .regression_sims(|| {
            regression_sim
                .simulate(day(-1), day(0), day(4), &forward)
                .map_err(|e| LsmcError::InvalidInput(e.to_string()))
        })
        .valuation_sims(|| {
            valuation_sim
                .simulate(day(-1), day(0), day(4), &forward)
                .map_err(|e| LsmcError::InvalidInput(e.to_string()))
        })
        .antithetic(true)
        .build()
        .unwrap();

    let results = lsmc_value(&params).unwrap();

    // intrinsic is 600 before discounting; low daily variance keeps the
    // stochastic value close to it
    assert!(results.npv > 500.0 && results.npv < 750.0, "npv {}", results.npv);
    assert!(results.standard_error >= 0.0 && results.standard_error < 50.0);

    // roughly full injection while cheap, full withdrawal while expensive
    let inject_delta = results.deltas[day(0)] + results.deltas[day(1)];
    let withdraw_delta = results.deltas[day(2)] + results.deltas[day(3)];
    assert!(inject_delta < -15.0 && inject_delta > -21.0, "inject delta {}", inject_delta);
    assert!(withdraw_delta > 15.0 && withdraw_delta < 21.0, "withdraw delta {}", withdraw_delta);

    assert_eq!(results.expected_profile.len(), 5);
    assert_eq!(results.trigger_prices.len(), 4);
    assert_eq!(results.pv_by_sim.len(), 512);
}

#[test]
fn one_period_before_expiry_npv_and_delta_are_deterministic() {
    // valued one period before expiry, the only decision period carries the
    // known forward price, so withdrawing everything is a pure cash
    // identity: inventory * price - withdrawal cost * inventory
    let storage = CmdtyStorage::builder(day(0), day(5))
        .constant_inject_withdraw_range(-30.0, 30.0)
        .min_inventory(0.0)
        .max_inventory(100.0)
        .per_unit_withdrawal_cost(0.8)
        .must_be_empty_at_end()
        .build()
        .unwrap();
    let forward = flat_series(day(0), day(5), 47.5);
    let vols = flat_series(day(0), day(5), 0.4);
    let discount = act365_const_rate(0.0);
    let grid = FixedSpacingGridCalc::new(10.0).unwrap();
    let settle_rule = settle;

    let regression_sim = OneFactorSpotSimulator::new(0.0, vols.clone(), 64, 61, false).unwrap();
    let valuation_sim = OneFactorSpotSimulator::new(0.0, vols, 64, 62, false).unwrap();

    let params = LsmcParams::builder(day(4), 25.0, &storage, &forward)
        .settle_date_rule(&settle_rule)
        .discount_factors(&discount)
        .grid_calc(&grid)
        .basis_functions(vec![basis::ones()])
        .regression_sims(|| {
            regression_sim
                .simulate(day(3), day(4), day(5), &forward)
                .map_err(|e| LsmcError::InvalidInput(e.to_string()))
        })
        .valuation_sims(|| {
            valuation_sim
                .simulate(day(3), day(4), day(5), &forward)
                .map_err(|e| LsmcError::InvalidInput(e.to_string()))
        })
        .build()
        .unwrap();

    let results = lsmc_value(&params).unwrap();

    assert_relative_eq!(results.npv, 25.0 * 47.5 - 0.8 * 25.0, epsilon = 1e-9);
    assert_relative_eq!(results.deltas[day(4)], 25.0, epsilon = 1e-9);
    assert_eq!(results.standard_error, 0.0);
    assert_relative_eq!(
        results.expected_profile[day(4)].inject_withdraw_volume,
        -25.0,
        epsilon = 1e-9
    );
}

#[test]
fn standard_error_tracks_dispersion_across_seeds() {
    // a fixed policy sells 10 units at next period's simulated price, so
    // repeated valuations with fresh valuation samples scatter with the
    // dispersion the reported standard error estimates
    let storage = CmdtyStorage::builder(day(0), day(2))
        .constant_inject_withdraw_range(-10.0, 10.0)
        .min_inventory(0.0)
        .max_inventory(20.0)
        .must_be_empty_at_end()
        .build()
        .unwrap();
    let forward = TimeSeries::new(day(0), vec![50.0, 55.0, 55.0]);
    let vols = flat_series(day(0), day(2), 0.3);
    let discount = act365_const_rate(0.0);
    let grid = FixedSpacingGridCalc::new(5.0).unwrap();
    let settle_rule = settle;

    let regression_sim = OneFactorSpotSimulator::new(0.0, vols.clone(), 256, 71, false).unwrap();

    let mut npvs = Vec::new();
    let mut standard_errors = Vec::new();
    for seed in 0..16u64 {
        let valuation_sim =
            OneFactorSpotSimulator::new(0.0, vols.clone(), 256, 1000 + seed, false).unwrap();
        let params = LsmcParams::builder(day(0), 0.0, &storage, &forward)
            .settle_date_rule(&settle_rule)
            .discount_factors(&discount)
            .grid_calc(&grid)
            .basis_functions(basis::factor_polynomials(1, 1))
            .regression_sims(|| {
                regression_sim
                    .simulate(day(-1), day(0), day(2), &forward)
                    .map_err(|e| LsmcError::InvalidInput(e.to_string()))
            })
            .valuation_sims(|| {
                valuation_sim
                    .simulate(day(-1), day(0), day(2), &forward)
                    .map_err(|e| LsmcError::InvalidInput(e.to_string()))
            })
            .build()
            .unwrap();
        let results = lsmc_value(&params).unwrap();
        npvs.push(results.npv);
        standard_errors.push(results.standard_error);
    }

    let mean_npv = npvs.iter().sum::<f64>() / npvs.len() as f64;
    let empirical_sd = (npvs.iter().map(|npv| (npv - mean_npv).powi(2)).sum::<f64>()
        / (npvs.len() - 1) as f64)
        .sqrt();
    let mean_se = standard_errors.iter().sum::<f64>() / standard_errors.len() as f64;

    assert!(mean_se > 0.0);
    let ratio = mean_se / empirical_sd;
    assert!(ratio > 0.5 && ratio < 2.0, "ratio {}", ratio);
}

#[test]
fn cancelled_token_stops_the_valuation() {
    let storage = CmdtyStorage::builder(day(0), day(3))
        .constant_inject_withdraw_range(-10.0, 10.0)
        .min_inventory(0.0)
        .max_inventory(100.0)
        .must_be_empty_at_end()
        .build()
        .unwrap();
    let forward = flat_series(day(0), day(3), 50.0);
    let vols = flat_series(day(0), day(3), 0.1);
    let discount = act365_const_rate(0.0);
    let grid = FixedSpacingGridCalc::new(10.0).unwrap();
    let settle_rule = settle;

    let regression_sim = OneFactorSpotSimulator::new(0.0, vols.clone(), 16, 41, false).unwrap();
    let valuation_sim = OneFactorSpotSimulator::new(0.0, vols, 16, 42, false).unwrap();

    let token = CancellationToken::new();
    token.cancel();

    let params = LsmcParams::builder(day(0), 0.0, &storage, &forward)
        .settle_date_rule(&settle_rule)
        .discount_factors(&discount)
        .grid_calc(&grid)
        .basis_functions(vec![basis::ones()])
        .regression_sims(|| {
            regression_sim
                .simulate(day(-1), day(0), day(3), &forward)
                .map_err(|e| LsmcError::InvalidInput(e.to_string()))
        })
        .valuation_sims(|| {
            valuation_sim
                .simulate(day(-1), day(0), day(3), &forward)
                .map_err(|e| LsmcError::InvalidInput(e.to_string()))
        })
        .cancellation(token)
        .build()
        .unwrap();

    assert!(matches!(lsmc_value(&params), Err(LsmcError::Cancelled)));
}

#[test]
fn progress_is_monotone_and_finishes_at_one() {
    let storage = CmdtyStorage::builder(day(0), day(3))
        .constant_inject_withdraw_range(-10.0, -10.0)
        .min_inventory(0.0)
        .max_inventory(100.0)
        .must_be_empty_at_end()
        .build()
        .unwrap();
    let forward = flat_series(day(0), day(3), 50.0);
    let vols = flat_series(day(0), day(3), 0.0);
    let discount = act365_const_rate(0.0);
    let grid = FixedSpacingGridCalc::new(10.0).unwrap();
    let settle_rule = settle;

    let regression_sim = OneFactorSpotSimulator::new(0.0, vols.clone(), 16, 51, false).unwrap();
    let valuation_sim = OneFactorSpotSimulator::new(0.0, vols, 16, 52, false).unwrap();

    let reported = Mutex::new(Vec::new());
    let params = LsmcParams::builder(day(0), 30.0, &storage, &forward)
        .settle_date_rule(&settle_rule)
        .discount_factors(&discount)
        .grid_calc(&grid)
        .basis_functions(vec![basis::ones()])
        .regression_sims(|| {
            regression_sim
                .simulate(day(-1), day(0), day(3), &forward)
                .map_err(|e| LsmcError::InvalidInput(e.to_string()))
        })
        .valuation_sims(|| {
            valuation_sim
                .simulate(day(-1), day(0), day(3), &forward)
                .map_err(|e| LsmcError::InvalidInput(e.to_string()))
        })
        .on_progress(|fraction| reported.lock().unwrap().push(fraction))
        .build()
        .unwrap();

    lsmc_value(&params).unwrap();
    drop(params);

    let reported = reported.into_inner().unwrap();
    assert!(!reported.is_empty());
    assert!(reported.windows(2).all(|pair| pair[0] <= pair[1]));
    assert_eq!(*reported.last().unwrap(), 1.0);
}
