//! Trigger price calculation.
//!
//! A trigger price answers the operational question "at what spot price
//! does moving a given volume become optimal?". For each forward period the
//! engine evaluates it at the expected inventory: the price at which the
//! value of moving the volume, net of costs and consumed commodity, equals
//! the change in expected continuation value relative to the best
//! do-little alternative.

use storage_core::contract::StorageContract;
use storage_core::discount::Discounter;
use storage_core::types::time::Period;

use crate::decision::{bang_bang_decision_set, decision_cost_npv, volume_consumed};
use crate::error::LsmcError;
use crate::results::{TriggerPricePoint, TriggerPrices, TriggerVolumeProfiles};

/// Expected continuation value as a function of next period's inventory.
pub(crate) type AverageContinuation<'a> = dyn Fn(f64) -> Result<f64, LsmcError> + 'a;

/// The do-nothing (or closest feasible to it) decision the trigger prices
/// are measured against.
struct Alternative {
    volume: f64,
    continuation: f64,
    cost_npv: f64,
    consumed: f64,
}

impl Alternative {
    fn evaluate<P: Period, S: StorageContract<P>>(
        storage: &S,
        period: P,
        expected_inventory: f64,
        inventory_loss: f64,
        volume: f64,
        average_continuation: &AverageContinuation<'_>,
        discounter: &Discounter<'_>,
    ) -> Result<Self, LsmcError> {
        let inventory_after = expected_inventory + volume - inventory_loss;
        Ok(Alternative {
            volume,
            continuation: average_continuation(inventory_after)?,
            cost_npv: decision_cost_npv(storage, period, expected_inventory, volume, discounter),
            consumed: volume_consumed(storage, period, expected_inventory, volume),
        })
    }
}

/// Trigger prices and trigger price curves for one period, evaluated at the
/// expected inventory.
///
/// Curves are only produced on a side where the feasible extreme exceeds
/// the alternative: forced decisions (the whole set on one side of zero
/// with no choice to make) have no meaningful trigger.
#[allow(clippy::too_many_arguments)]
pub(crate) fn calculate_trigger_prices<P: Period, S: StorageContract<P>>(
    storage: &S,
    period: P,
    expected_inventory: f64,
    next_min: f64,
    next_max: f64,
    df_settle: f64,
    discounter: &Discounter<'_>,
    average_continuation: &AverageContinuation<'_>,
    tolerance: f64,
    num_extra_decisions: usize,
    num_trigger_volumes: usize,
) -> Result<(TriggerPrices, TriggerVolumeProfiles), LsmcError> {
    let inventory_loss = storage.inventory_percent_loss(period) * expected_inventory;
    let range = storage.inject_withdraw_range(period, expected_inventory);
    let decision_set = bang_bang_decision_set(
        range,
        expected_inventory,
        inventory_loss,
        next_min,
        next_max,
        tolerance,
        num_extra_decisions,
    )?;

    let mut prices = TriggerPrices::default();
    let mut inject = Vec::new();
    let mut withdraw = Vec::new();

    // decision set is ascending, so the extremes sit at the ends
    let max_inject_volume = decision_set[decision_set.len() - 1];
    if max_inject_volume > 0.0 {
        // usually zero, but the smallest forced injection when injection
        // cannot be avoided
        let alternative_volume = decision_set
            .iter()
            .copied()
            .find(|&volume| volume >= 0.0)
            .unwrap_or(max_inject_volume);
        if max_inject_volume > alternative_volume {
            let alternative = Alternative::evaluate(
                storage,
                period,
                expected_inventory,
                inventory_loss,
                alternative_volume,
                average_continuation,
                discounter,
            )?;
            for volume in
                inject_trigger_volumes(max_inject_volume, alternative_volume, num_trigger_volumes)
            {
                let price = trigger_price(
                    storage,
                    period,
                    expected_inventory,
                    inventory_loss,
                    volume,
                    &alternative,
                    df_settle,
                    average_continuation,
                    discounter,
                )?;
                inject.push(TriggerPricePoint { volume, price });
            }
            prices.max_inject_volume = Some(max_inject_volume);
            prices.max_inject_trigger_price = inject.last().map(|point| point.price);
        }
    }

    let max_withdraw_volume = decision_set[0];
    if max_withdraw_volume < 0.0 {
        // usually zero, but the smallest forced withdrawal when withdrawal
        // cannot be avoided
        let alternative_volume = decision_set
            .iter()
            .rev()
            .copied()
            .find(|&volume| volume <= 0.0)
            .unwrap_or(max_withdraw_volume);
        if max_withdraw_volume < alternative_volume {
            let alternative = Alternative::evaluate(
                storage,
                period,
                expected_inventory,
                inventory_loss,
                alternative_volume,
                average_continuation,
                discounter,
            )?;
            for volume in withdraw_trigger_volumes(
                max_withdraw_volume,
                alternative_volume,
                num_trigger_volumes,
            ) {
                let price = trigger_price(
                    storage,
                    period,
                    expected_inventory,
                    inventory_loss,
                    volume,
                    &alternative,
                    df_settle,
                    average_continuation,
                    discounter,
                )?;
                withdraw.push(TriggerPricePoint { volume, price });
            }
            prices.max_withdraw_volume = Some(max_withdraw_volume);
            prices.max_withdraw_trigger_price = withdraw.last().map(|point| point.price);
        }
    }

    Ok((prices, TriggerVolumeProfiles { inject, withdraw }))
}

/// The spot price at which moving `volume` has the same value as the
/// alternative decision: the continuation value change net of cost changes,
/// spread over the extra volume bought or sold at settlement.
#[allow(clippy::too_many_arguments)]
fn trigger_price<P: Period, S: StorageContract<P>>(
    storage: &S,
    period: P,
    expected_inventory: f64,
    inventory_loss: f64,
    volume: f64,
    alternative: &Alternative,
    df_settle: f64,
    average_continuation: &AverageContinuation<'_>,
    discounter: &Discounter<'_>,
) -> Result<f64, LsmcError> {
    let inventory_after = expected_inventory + volume - inventory_loss;
    let continuation_change = average_continuation(inventory_after)? - alternative.continuation;
    let excess_volume = volume - alternative.volume;
    let cost_change = decision_cost_npv(storage, period, expected_inventory, volume, discounter)
        - alternative.cost_npv;
    let consumed_change =
        volume_consumed(storage, period, expected_inventory, volume) - alternative.consumed;
    Ok((continuation_change - cost_change) / (df_settle * (excess_volume + consumed_change)))
}

/// Evenly spaced injection volumes from just above the alternative up to the
/// maximum. The final entry is the exact maximum, free of accumulated
/// floating point error.
fn inject_trigger_volumes(max_volume: f64, alternative_volume: f64, num_volumes: usize) -> Vec<f64> {
    let increment = (max_volume - alternative_volume) / num_volumes as f64;
    let mut volumes: Vec<f64> = (1..num_volumes)
        .map(|i| alternative_volume + i as f64 * increment)
        .collect();
    volumes.push(max_volume);
    volumes
}

/// Evenly spaced withdrawal volumes from just below the alternative down to
/// the (most negative) maximum, which is the exact final entry.
fn withdraw_trigger_volumes(
    max_volume: f64,
    alternative_volume: f64,
    num_volumes: usize,
) -> Vec<f64> {
    let increment = (alternative_volume - max_volume) / num_volumes as f64;
    let mut volumes: Vec<f64> = (1..num_volumes)
        .map(|i| alternative_volume - i as f64 * increment)
        .collect();
    volumes.push(max_volume);
    volumes
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use storage_core::contract::CmdtyStorage;
    use storage_core::discount::act365_const_rate;
    use storage_core::types::time::{Date, Period as _};

    fn day(d: i32) -> Date {
        Date::from_ymd(2024, 6, 1).unwrap().offset(d)
    }

    fn storage() -> CmdtyStorage<Date> {
        CmdtyStorage::builder(day(0), day(30))
            .constant_inject_withdraw_range(-40.0, 25.0)
            .min_inventory(0.0)
            .max_inventory(200.0)
            .terminal_inventory_value(|_, _| 0.0)
            .build()
            .unwrap()
    }

    #[test]
    fn volume_ladders_end_on_exact_extremes() {
        let inject = inject_trigger_volumes(25.0, 0.0, 10);
        assert_eq!(inject.len(), 10);
        assert_relative_eq!(inject[0], 2.5, epsilon = 1e-12);
        assert_eq!(inject[9], 25.0);

        let withdraw = withdraw_trigger_volumes(-40.0, 0.0, 10);
        assert_eq!(withdraw.len(), 10);
        assert_relative_eq!(withdraw[0], -4.0, epsilon = 1e-12);
        assert_eq!(withdraw[9], -40.0);
        // from least to most withdrawal
        assert!(withdraw.windows(2).all(|pair| pair[1] < pair[0]));
    }

    #[test]
    fn linear_continuation_gives_flat_trigger_curves() {
        // continuation worth 50 per unit of inventory, costless storage:
        // every inject volume triggers at exactly 50
        let storage = storage();
        let discount = act365_const_rate(0.0);
        let discount_fn: &dyn Fn(Date, Date) -> f64 = &discount;
        let discounter = Discounter::new(day(0), discount_fn);
        let continuation = |inventory: f64| Ok(50.0 * inventory);

        let (prices, profiles) = calculate_trigger_prices(
            &storage,
            day(0),
            100.0,
            0.0,
            200.0,
            1.0,
            &discounter,
            &continuation,
            1e-10,
            0,
            10,
        )
        .unwrap();

        assert_eq!(prices.max_inject_volume, Some(25.0));
        assert_eq!(prices.max_withdraw_volume, Some(-40.0));
        assert_relative_eq!(prices.max_inject_trigger_price.unwrap(), 50.0, epsilon = 1e-9);
        assert_relative_eq!(
            prices.max_withdraw_trigger_price.unwrap(),
            50.0,
            epsilon = 1e-9
        );
        for point in profiles.inject.iter().chain(&profiles.withdraw) {
            assert_relative_eq!(point.price, 50.0, epsilon = 1e-9);
        }
        assert_eq!(profiles.inject.len(), 10);
        assert_eq!(profiles.withdraw.len(), 10);
    }

    #[test]
    fn concave_continuation_orders_trigger_prices() {
        // diminishing marginal value of inventory: larger injections need
        // lower purchase prices, larger withdrawals need higher sale prices
        let storage = storage();
        let discount = act365_const_rate(0.0);
        let discount_fn: &dyn Fn(Date, Date) -> f64 = &discount;
        let discounter = Discounter::new(day(0), discount_fn);
        let continuation = |inventory: f64| Ok(2000.0 * (1.0 + inventory).ln());

        let (_, profiles) = calculate_trigger_prices(
            &storage,
            day(0),
            100.0,
            0.0,
            200.0,
            1.0,
            &discounter,
            &continuation,
            1e-10,
            0,
            10,
        )
        .unwrap();

        assert!(profiles
            .inject
            .windows(2)
            .all(|pair| pair[1].price < pair[0].price));
        assert!(profiles
            .withdraw
            .windows(2)
            .all(|pair| pair[1].price > pair[0].price));
    }

    #[test]
    fn forced_single_decision_has_no_triggers() {
        // rates pinned at -10 leave a single forced decision
        let storage = CmdtyStorage::builder(day(0), day(30))
            .constant_inject_withdraw_range(-10.0, -10.0)
            .min_inventory(0.0)
            .max_inventory(200.0)
            .terminal_inventory_value(|_, _| 0.0)
            .build()
            .unwrap();
        let discount = act365_const_rate(0.0);
        let discount_fn: &dyn Fn(Date, Date) -> f64 = &discount;
        let discounter = Discounter::new(day(0), discount_fn);
        let continuation = |_: f64| Ok(0.0);

        let (prices, profiles) = calculate_trigger_prices(
            &storage,
            day(0),
            100.0,
            0.0,
            200.0,
            1.0,
            &discounter,
            &continuation,
            1e-10,
            0,
            10,
        )
        .unwrap();

        assert_eq!(prices, TriggerPrices::default());
        assert!(profiles.inject.is_empty());
        assert!(profiles.withdraw.is_empty());
    }
}
