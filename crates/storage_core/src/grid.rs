//! Inventory grid construction.

use crate::contract::StorageContract;
use crate::types::error::GridError;
use crate::types::time::Period;

/// Produces the discrete inventory levels the backward induction values at,
/// for one period's feasible inventory range.
pub trait GridCalc: Sync {
    /// Strictly ascending grid covering `[min_inventory, max_inventory]`,
    /// including both end points. A collapsed range yields a single point.
    fn grid_points(&self, min_inventory: f64, max_inventory: f64) -> Vec<f64>;
}

/// Grid with a fixed spacing between points.
///
/// Points step up from the range minimum; the maximum is always included as
/// the final point.
///
/// # Examples
///
/// ```
/// use storage_core::grid::{FixedSpacingGridCalc, GridCalc};
///
/// let grid_calc = FixedSpacingGridCalc::new(100.0).unwrap();
/// assert_eq!(grid_calc.grid_points(0.0, 250.0), vec![0.0, 100.0, 200.0, 250.0]);
/// ```
#[derive(Clone, Debug)]
pub struct FixedSpacingGridCalc {
    spacing: f64,
}

impl FixedSpacingGridCalc {
    pub fn new(spacing: f64) -> Result<Self, GridError> {
        if !(spacing > 0.0) || !spacing.is_finite() {
            return Err(GridError::InvalidParameter(format!(
                "spacing must be positive and finite, got {}",
                spacing
            )));
        }
        Ok(FixedSpacingGridCalc { spacing })
    }

    /// Spacing giving roughly `num_points` grid points over the facility's
    /// global inventory range.
    pub fn for_num_points<P: Period>(
        storage: &impl StorageContract<P>,
        num_points: usize,
    ) -> Result<Self, GridError> {
        if num_points < 2 {
            return Err(GridError::InvalidParameter(format!(
                "num_points must be at least 2, got {}",
                num_points
            )));
        }
        let mut global_min = f64::INFINITY;
        let mut global_max = f64::NEG_INFINITY;
        let start = storage.start_period();
        let num_periods = storage.end_period().offset_from(start) + 1;
        for i in 0..num_periods {
            let period = start.offset(i);
            global_min = global_min.min(storage.min_inventory(period));
            global_max = global_max.max(storage.max_inventory(period));
        }
        if !(global_max > global_min) {
            return Err(GridError::InvalidParameter(format!(
                "facility inventory range [{}, {}] is degenerate",
                global_min, global_max
            )));
        }
        Self::new((global_max - global_min) / (num_points as f64 - 1.0))
    }

    pub fn spacing(&self) -> f64 {
        self.spacing
    }
}

impl GridCalc for FixedSpacingGridCalc {
    fn grid_points(&self, min_inventory: f64, max_inventory: f64) -> Vec<f64> {
        let range = max_inventory - min_inventory;
        if range <= 0.0 {
            return vec![min_inventory];
        }
        let num_steps = (range / self.spacing).floor() as usize;
        let mut points = Vec::with_capacity(num_steps + 2);
        for i in 0..=num_steps {
            points.push(min_inventory + i as f64 * self.spacing);
        }
        // include the top of the range unless the last step already hit it
        let last = points[points.len() - 1];
        if max_inventory - last > self.spacing * 1e-12 {
            points.push(max_inventory);
        } else {
            let last_idx = points.len() - 1;
            points[last_idx] = max_inventory;
        }
        points
    }
}
