//! Period-by-simulation data panels.
//!
//! A `Panel` is a flat row-major `f64` buffer with one row per delivery
//! period and one column per simulation. Keeping each period's simulated
//! values contiguous lets the valuation loops work on plain slices without
//! per-element indirection.

use crate::types::time::Period;

/// Row-major (period x simulation) matrix keyed by a start period.
///
/// Row `i` holds the simulated values for period `start.offset(i)`.
///
/// # Examples
///
/// ```
/// use storage_core::panel::Panel;
/// use storage_core::types::time::{Date, Period};
///
/// let start = Date::from_ymd(2024, 1, 1).unwrap();
/// let mut panel = Panel::zeros(start, 2, 3);
/// panel.row_mut(1)[2] = 7.0;
/// assert_eq!(panel.row_for_period(start.offset(1)), Some(&[0.0, 0.0, 7.0][..]));
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct Panel<P: Period> {
    start: Option<P>,
    num_rows: usize,
    num_cols: usize,
    data: Vec<f64>,
}

impl<P: Period> Panel<P> {
    /// A zero-filled panel with `num_rows` periods from `start` and
    /// `num_cols` simulations.
    pub fn zeros(start: P, num_rows: usize, num_cols: usize) -> Self {
        Panel {
            start: Some(start),
            num_rows,
            num_cols,
            data: vec![0.0; num_rows * num_cols],
        }
    }

    /// The empty panel, used when a caller did not request this output.
    pub fn empty() -> Self {
        Panel {
            start: None,
            num_rows: 0,
            num_cols: 0,
            data: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Number of period rows.
    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    /// Number of simulation columns.
    pub fn num_cols(&self) -> usize {
        self.num_cols
    }

    /// First period covered, `None` for the empty panel.
    pub fn start(&self) -> Option<P> {
        self.start
    }

    /// Last period covered, `None` for the empty panel.
    pub fn end(&self) -> Option<P> {
        self.start
            .filter(|_| self.num_rows > 0)
            .map(|s| s.offset(self.num_rows as i32 - 1))
    }

    /// The values for the `row`-th period.
    ///
    /// # Panics
    /// Panics when `row >= num_rows()`.
    pub fn row(&self, row: usize) -> &[f64] {
        &self.data[row * self.num_cols..(row + 1) * self.num_cols]
    }

    /// Mutable values for the `row`-th period.
    ///
    /// # Panics
    /// Panics when `row >= num_rows()`.
    pub fn row_mut(&mut self, row: usize) -> &mut [f64] {
        &mut self.data[row * self.num_cols..(row + 1) * self.num_cols]
    }

    /// The values for `period`, `None` when the period is outside the panel.
    pub fn row_for_period(&self, period: P) -> Option<&[f64]> {
        let start = self.start?;
        let idx = period.offset_from(start);
        if idx < 0 || idx as usize >= self.num_rows {
            return None;
        }
        Some(self.row(idx as usize))
    }

    /// Whether every period in `from..=to` has a row in the panel.
    pub fn covers(&self, from: P, to: P) -> bool {
        self.row_for_period(from).is_some() && self.row_for_period(to).is_some()
    }
}
