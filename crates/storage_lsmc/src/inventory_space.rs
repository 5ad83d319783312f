//! Feasible inventory range per period.

use storage_core::contract::StorageContract;
use storage_core::series::TimeSeries;
use storage_core::types::time::Period;

use crate::error::LsmcError;

/// Bounds on feasible inventory in one period.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct InventoryRange {
    /// Lowest feasible inventory.
    pub min: f64,
    /// Highest feasible inventory.
    pub max: f64,
}

/// Calculates the feasible inventory range for every period after the
/// current one, up to and including the storage end period.
///
/// The range is the intersection of a forward sweep (what inventory levels
/// are reachable from the starting inventory given rate limits, losses and
/// physical bounds) and a backward sweep (what levels can still reach a
/// valid terminal state, empty if the contract demands it). An empty
/// intersection in any period means the contract's constraints cannot be
/// satisfied and is a hard error.
pub fn calculate_inventory_space<P: Period, S: StorageContract<P>>(
    storage: &S,
    starting_inventory: f64,
    current_period: P,
) -> Result<TimeSeries<P, InventoryRange>, LsmcError> {
    if current_period > storage.end_period() {
        return Err(LsmcError::InvalidInput(
            "storage contract has expired".into(),
        ));
    }

    let start_active = storage.start_period().max(current_period);
    let num_periods = storage.end_period().offset_from(start_active);
    if num_periods < 1 {
        return Err(LsmcError::InvalidInput(
            "no periods remain before the storage end".into(),
        ));
    }
    let num_periods = num_periods as usize;

    // forward sweep from the starting inventory
    let mut forward_min = vec![0.0; num_periods];
    let mut forward_max = vec![0.0; num_periods];
    let mut min_inventory = starting_inventory;
    let mut max_inventory = starting_inventory;
    for i in 0..num_periods {
        let period = start_active.offset(i as i32);
        let next_period = period.next();
        let pct_loss = storage.inventory_percent_loss(period);

        let min_rate = storage.inject_withdraw_range(period, min_inventory).min_rate();
        min_inventory = (min_inventory - pct_loss * min_inventory + min_rate)
            .max(storage.min_inventory(next_period));
        forward_min[i] = min_inventory;

        let max_rate = storage.inject_withdraw_range(period, max_inventory).max_rate();
        max_inventory = (max_inventory - pct_loss * max_inventory + max_rate)
            .min(storage.max_inventory(next_period));
        forward_max[i] = max_inventory;
    }

    // backward sweep from the terminal bounds
    let mut backward_min = vec![0.0; num_periods];
    let mut backward_max = vec![0.0; num_periods];
    let end = storage.end_period();
    if storage.must_be_empty_at_end() {
        backward_min[num_periods - 1] = 0.0;
        backward_max[num_periods - 1] = 0.0;
    } else {
        backward_min[num_periods - 1] = storage.min_inventory(end);
        backward_max[num_periods - 1] = storage.max_inventory(end);
    }
    let mut period = end;
    for i in (0..num_periods - 1).rev() {
        period = period.previous();
        backward_max[i] =
            storage.inventory_space_upper_bound(period, backward_min[i + 1], backward_max[i + 1]);
        backward_min[i] =
            storage.inventory_space_lower_bound(period, backward_min[i + 1], backward_max[i + 1]);
    }

    // intersect, failing hard on an empty range
    let mut ranges = Vec::with_capacity(num_periods);
    for i in 0..num_periods {
        let min = forward_min[i].max(backward_min[i]);
        let max = forward_max[i].min(backward_max[i]);
        if min > max {
            return Err(LsmcError::InfeasibleConstraints(format!(
                "empty inventory range [{}, {}] at {}",
                min,
                max,
                start_active.offset(i as i32 + 1)
            )));
        }
        ranges.push(InventoryRange { min, max });
    }

    Ok(TimeSeries::new(start_active.next(), ranges))
}
