//! Inventory-dependent (ratcheted) injection and withdrawal constraints.

use crate::math::interpolate_linear;
use crate::types::error::ContractError;
use crate::types::time::Period;

use super::InjectWithdrawRange;

/// One pin of a ratchet curve: the allowed rates at a specific inventory.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RatchetPoint {
    pub inventory: f64,
    pub min_rate: f64,
    pub max_rate: f64,
}

impl RatchetPoint {
    pub fn new(inventory: f64, min_rate: f64, max_rate: f64) -> Self {
        RatchetPoint {
            inventory,
            min_rate,
            max_rate,
        }
    }
}

/// Piecewise-linear rate constraints varying by inventory level, with the
/// curve in force switching at scheduled periods.
///
/// Each schedule entry applies from its period until the next entry's
/// period. Rates between pins are linearly interpolated; inventories outside
/// the pinned range clamp to the end pins. The pinned inventory range also
/// defines the facility's min/max inventory while the entry is in force.
#[derive(Clone, Debug)]
pub struct RatchetSchedule<P: Period> {
    // ascending by period; first entry at or before the contract start
    entries: Vec<(P, Vec<RatchetPoint>)>,
}

impl<P: Period> RatchetSchedule<P> {
    pub fn new(mut entries: Vec<(P, Vec<RatchetPoint>)>) -> Result<Self, ContractError> {
        if entries.is_empty() {
            return Err(ContractError::InvalidRatchets(
                "schedule has no entries".into(),
            ));
        }
        entries.sort_by_key(|(period, _)| *period);
        for (period, points) in &entries {
            if points.len() < 2 {
                return Err(ContractError::InvalidRatchets(format!(
                    "entry at {} needs at least two inventory pins",
                    period
                )));
            }
            for pair in points.windows(2) {
                if pair[1].inventory <= pair[0].inventory {
                    return Err(ContractError::InvalidRatchets(format!(
                        "entry at {} has non-ascending inventory pins",
                        period
                    )));
                }
            }
            for point in points {
                if point.min_rate > point.max_rate {
                    return Err(ContractError::InvalidRatchets(format!(
                        "entry at {} has min rate above max rate at inventory {}",
                        period, point.inventory
                    )));
                }
            }
        }
        for pair in entries.windows(2) {
            if pair[1].0 == pair[0].0 {
                return Err(ContractError::InvalidRatchets(format!(
                    "duplicate schedule entry at {}",
                    pair[0].0
                )));
            }
        }
        Ok(RatchetSchedule { entries })
    }

    /// The period the first ratchet curve comes into force.
    pub fn first_period(&self) -> P {
        self.entries[0].0
    }

    fn active_points(&self, period: P) -> &[RatchetPoint] {
        let idx = self
            .entries
            .iter()
            .rposition(|(entry_period, _)| *entry_period <= period)
            .unwrap_or(0);
        &self.entries[idx].1
    }

    /// Allowed rates at `inventory` in `period`.
    pub fn range_at(&self, period: P, inventory: f64) -> InjectWithdrawRange {
        let points = self.active_points(period);
        let first = points[0];
        let last = points[points.len() - 1];
        let (min_rate, max_rate) = if inventory <= first.inventory {
            (first.min_rate, first.max_rate)
        } else if inventory >= last.inventory {
            (last.min_rate, last.max_rate)
        } else {
            let upper = points
                .iter()
                .position(|p| p.inventory >= inventory)
                .unwrap_or(points.len() - 1);
            let (a, b) = (points[upper - 1], points[upper]);
            (
                interpolate_linear(a.inventory, a.min_rate, b.inventory, b.min_rate, inventory),
                interpolate_linear(a.inventory, a.max_rate, b.inventory, b.max_rate, inventory),
            )
        };
        // pins are validated so min <= max holds after interpolation
        InjectWithdrawRange { min_rate, max_rate }
    }

    /// Lowest pinned inventory in `period`.
    pub fn min_inventory(&self, period: P) -> f64 {
        self.active_points(period)[0].inventory
    }

    /// Highest pinned inventory in `period`.
    pub fn max_inventory(&self, period: P) -> f64 {
        let points = self.active_points(period);
        points[points.len() - 1].inventory
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::time::Date;
    use approx::assert_relative_eq;

    fn day(month: u32, d: u32) -> Date {
        Date::from_ymd(2024, month, d).unwrap()
    }

    fn schedule() -> RatchetSchedule<Date> {
        RatchetSchedule::new(vec![
            (
                day(1, 1),
                vec![
                    RatchetPoint::new(0.0, -100.0, 50.0),
                    RatchetPoint::new(1000.0, -200.0, 30.0),
                    RatchetPoint::new(2000.0, -300.0, 10.0),
                ],
            ),
            (
                day(3, 1),
                vec![
                    RatchetPoint::new(0.0, -150.0, 60.0),
                    RatchetPoint::new(2000.0, -350.0, 20.0),
                ],
            ),
        ])
        .unwrap()
    }

    #[test]
    fn interpolates_between_pins() {
        let range = schedule().range_at(day(1, 15), 500.0);
        assert_relative_eq!(range.min_rate(), -150.0, epsilon = 1e-12);
        assert_relative_eq!(range.max_rate(), 40.0, epsilon = 1e-12);
    }

    #[test]
    fn clamps_outside_pinned_inventory() {
        let sched = schedule();
        assert_eq!(sched.range_at(day(1, 15), -10.0).max_rate(), 50.0);
        assert_eq!(sched.range_at(day(1, 15), 5000.0).min_rate(), -300.0);
    }

    #[test]
    fn later_entry_takes_over_at_its_period() {
        let sched = schedule();
        assert_eq!(sched.range_at(day(2, 28), 0.0).max_rate(), 50.0);
        assert_eq!(sched.range_at(day(3, 1), 0.0).max_rate(), 60.0);
        assert_eq!(sched.range_at(day(12, 31), 0.0).max_rate(), 60.0);
    }

    #[test]
    fn pinned_inventory_bounds() {
        let sched = schedule();
        assert_eq!(sched.min_inventory(day(1, 15)), 0.0);
        assert_eq!(sched.max_inventory(day(1, 15)), 2000.0);
    }

    #[test]
    fn rejects_invalid_schedules() {
        assert!(RatchetSchedule::<Date>::new(vec![]).is_err());
        assert!(RatchetSchedule::new(vec![(
            day(1, 1),
            vec![RatchetPoint::new(0.0, -1.0, 1.0)],
        )])
        .is_err());
        assert!(RatchetSchedule::new(vec![(
            day(1, 1),
            vec![
                RatchetPoint::new(100.0, -1.0, 1.0),
                RatchetPoint::new(100.0, -1.0, 1.0),
            ],
        )])
        .is_err());
        assert!(RatchetSchedule::new(vec![(
            day(1, 1),
            vec![
                RatchetPoint::new(0.0, 2.0, 1.0),
                RatchetPoint::new(100.0, -1.0, 1.0),
            ],
        )])
        .is_err());
    }
}
