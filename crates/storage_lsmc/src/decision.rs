//! Bang-bang decision set construction.

use storage_core::cashflow::CashFlow;
use storage_core::contract::{InjectWithdrawRange, StorageContract};
use storage_core::discount::Discounter;
use storage_core::types::time::Period;

use crate::error::LsmcError;

/// Candidate injection/withdrawal volumes for one period at one inventory
/// level, ascending from most withdrawal to most injection.
///
/// The core of the set is bang-bang: the extreme withdrawal and injection
/// volumes, each clamped so next period's inventory stays within
/// `[next_min, next_max]` after the period's inventory loss. A zero decision
/// is included whenever it keeps inventory feasible. Rate limits that leave
/// next period's bounds breached by no more than `tolerance` snap to the
/// bound; larger breaches are an error.
///
/// `num_extra_decisions` adds that many evenly-spaced volumes between each
/// end of the set and zero (or between the two extremes when zero is not
/// representable), for facilities where interior decisions can be optimal.
pub fn bang_bang_decision_set(
    range: InjectWithdrawRange,
    inventory: f64,
    inventory_loss: f64,
    next_min: f64,
    next_max: f64,
    tolerance: f64,
    num_extra_decisions: usize,
) -> Result<Vec<f64>, LsmcError> {
    if next_min > next_max {
        return Err(LsmcError::InvalidInput(format!(
            "next period inventory bounds are inverted: [{}, {}]",
            next_min, next_max
        )));
    }

    let inventory_after_loss = inventory - inventory_loss;

    let inventory_after_max_withdrawal = range.min_rate() + inventory_after_loss;
    let withdrawal_rate = if inventory_after_max_withdrawal > next_max {
        // even maximum withdrawal leaves too much inventory
        if inventory_after_max_withdrawal - next_max < tolerance {
            next_max - inventory_after_loss
        } else {
            return Err(LsmcError::InfeasibleConstraints(format!(
                "maximum withdrawal leaves inventory {} above the next period maximum {}",
                inventory_after_max_withdrawal, next_max
            )));
        }
    } else if inventory_after_max_withdrawal > next_min {
        range.min_rate()
    } else {
        // constrained withdrawal, possibly flipping to forced injection
        next_min - inventory_after_loss
    };

    let inventory_after_max_injection = range.max_rate() + inventory_after_loss;
    let injection_rate = if inventory_after_max_injection < next_min {
        // even maximum injection leaves too little inventory
        if next_min - inventory_after_max_injection < tolerance {
            next_min - inventory_after_loss
        } else {
            return Err(LsmcError::InfeasibleConstraints(format!(
                "maximum injection leaves inventory {} below the next period minimum {}",
                inventory_after_max_injection, next_min
            )));
        }
    } else if inventory_after_max_injection < next_max {
        range.max_rate()
    } else {
        // constrained injection, possibly flipping to forced withdrawal
        next_max - inventory_after_loss
    };

    let mut decisions;
    if withdrawal_rate >= 0.0 || injection_rate <= 0.0 {
        // zero lies outside the representable interval
        decisions = Vec::with_capacity(num_extra_decisions + 2);
        decisions.push(withdrawal_rate);
        push_interior(&mut decisions, withdrawal_rate, injection_rate, num_extra_decisions);
        decisions.push(injection_rate);
    } else {
        decisions = Vec::with_capacity(2 * num_extra_decisions + 3);
        decisions.push(withdrawal_rate);
        push_interior(&mut decisions, withdrawal_rate, 0.0, num_extra_decisions);
        decisions.push(0.0);
        push_interior(&mut decisions, 0.0, injection_rate, num_extra_decisions);
        decisions.push(injection_rate);
    }
    Ok(decisions)
}

fn push_interior(decisions: &mut Vec<f64>, min: f64, max: f64, num_extra: usize) {
    let increment = (max - min) / (num_extra as f64 + 1.0);
    for i in 0..num_extra {
        decisions.push(min + (i as f64 + 1.0) * increment);
    }
}

/// Present value of the operating cost cash flows of one decision. Positive
/// volumes price as injections, others as withdrawals.
pub(crate) fn decision_cost_npv<P: Period, S: StorageContract<P>>(
    storage: &S,
    period: P,
    inventory: f64,
    volume: f64,
    discounter: &Discounter<'_>,
) -> f64 {
    let cash_flows = if volume > 0.0 {
        storage.injection_cost(period, inventory, volume)
    } else {
        storage.withdrawal_cost(period, inventory, -volume)
    };
    CashFlow::npv(&cash_flows, |date| discounter.factor(date))
}

/// Commodity volume consumed, e.g. as compressor fuel, by one decision.
pub(crate) fn volume_consumed<P: Period, S: StorageContract<P>>(
    storage: &S,
    period: P,
    inventory: f64,
    volume: f64,
) -> f64 {
    if volume > 0.0 {
        storage.consumed_on_inject(period, inventory, volume)
    } else {
        storage.consumed_on_withdraw(period, inventory, -volume)
    }
}
