//! Numerical helpers shared by the valuation layer.

use thiserror::Error;

/// Errors from grid bracketing.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BracketError {
    #[error("value {value} is below the bottom of the grid ({bottom}) by more than the tolerance")]
    BelowGrid { value: f64, bottom: f64 },

    #[error("value {value} is above the top of the grid ({top}) by more than the tolerance")]
    AboveGrid { value: f64, top: f64 },
}

/// Whether two values are equal to within an absolute tolerance.
#[inline]
pub fn equal_within_tol(a: f64, b: f64, tolerance: f64) -> bool {
    (a - b).abs() <= tolerance
}

/// Brackets `value` on a strictly ascending `grid` by binary search.
///
/// Returns the pair of adjacent indices `(lower, upper)` whose grid values
/// bracket `value`. When `value` sits on a grid point to within `tolerance`
/// both indices are equal. Values beyond either end of the grid by more than
/// `tolerance` are an error; breaches within the tolerance snap to the end
/// point. `grid` must be non-empty and strictly ascending.
pub fn bisect_grid(
    grid: &[f64],
    value: f64,
    tolerance: f64,
) -> Result<(usize, usize), BracketError> {
    let last = grid.len() - 1;
    if value < grid[0] {
        return if equal_within_tol(value, grid[0], tolerance) {
            Ok((0, 0))
        } else {
            Err(BracketError::BelowGrid {
                value,
                bottom: grid[0],
            })
        };
    }
    if value > grid[last] {
        return if equal_within_tol(value, grid[last], tolerance) {
            Ok((last, last))
        } else {
            Err(BracketError::AboveGrid {
                value,
                top: grid[last],
            })
        };
    }

    let mut lower = 0;
    let mut upper = last;
    while upper - lower > 1 {
        let mid = (lower + upper) / 2;
        if equal_within_tol(grid[mid], value, tolerance) {
            return Ok((mid, mid));
        }
        if grid[mid] > value {
            upper = mid;
        } else {
            lower = mid;
        }
    }
    if equal_within_tol(grid[lower], value, tolerance) {
        return Ok((lower, lower));
    }
    if equal_within_tol(grid[upper], value, tolerance) {
        return Ok((upper, upper));
    }
    Ok((lower, upper))
}

/// Linear interpolation through `(x1, y1)` and `(x2, y2)` evaluated at `x`.
#[inline]
pub fn interpolate_linear(x1: f64, y1: f64, x2: f64, y2: f64, x: f64) -> f64 {
    y1 + (y2 - y1) / (x2 - x1) * (x - x1)
}

/// The interpolation weight of the upper point when `x` lies between `x1`
/// and `x2`, so `y = (1 - w) * y1 + w * y2`.
#[inline]
pub fn interpolation_weight(x1: f64, x2: f64, x: f64) -> f64 {
    (x - x1) / (x2 - x1)
}

/// Largest `x` in `[lo, hi]` satisfying `pred`, assuming `pred` holds at
/// `lo` and is monotone (true below some boundary, false above).
pub fn bisect_upper_boundary(mut lo: f64, mut hi: f64, pred: impl Fn(f64) -> bool) -> f64 {
    if pred(hi) {
        return hi;
    }
    for _ in 0..100 {
        let mid = 0.5 * (lo + hi);
        if pred(mid) {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    lo
}

/// Smallest `x` in `[lo, hi]` satisfying `pred`, assuming `pred` holds at
/// `hi` and is monotone (false below some boundary, true above).
pub fn bisect_lower_boundary(mut lo: f64, mut hi: f64, pred: impl Fn(f64) -> bool) -> f64 {
    if pred(lo) {
        return lo;
    }
    for _ in 0..100 {
        let mid = 0.5 * (lo + hi);
        if pred(mid) {
            hi = mid;
        } else {
            lo = mid;
        }
    }
    hi
}

/// Maximum value and its index in a non-empty slice.
pub fn max_value_and_index(values: &[f64]) -> (f64, usize) {
    let mut max = values[0];
    let mut max_idx = 0;
    for (i, &v) in values.iter().enumerate().skip(1) {
        if v > max {
            max = v;
            max_idx = i;
        }
    }
    (max, max_idx)
}
