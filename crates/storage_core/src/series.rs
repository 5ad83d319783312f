//! Contiguous period-indexed time series.
//!
//! The container behind forward curves, inventory spaces, delta profiles and
//! every other per-period output of the valuation. Values are stored densely
//! from a start period, so lookup is an integer offset rather than a map
//! probe.

use std::ops::Index;

use crate::types::time::Period;

/// A dense time series indexed by delivery period.
///
/// Periods are contiguous from `start()`; there are no gaps. An empty series
/// has no start period and no values.
///
/// # Examples
///
/// ```
/// use storage_core::series::TimeSeries;
/// use storage_core::types::time::{Date, Period};
///
/// let start = Date::from_ymd(2024, 1, 1).unwrap();
/// let series = TimeSeries::from_fn(start, start.offset(2), |p| (p - start) as f64);
/// assert_eq!(series.len(), 3);
/// assert_eq!(series[start.offset(2)], 2.0);
/// assert_eq!(series.get(start.offset(3)), None);
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct TimeSeries<P: Period, V> {
    start: Option<P>,
    values: Vec<V>,
}

/// A time series of f64 values, e.g. a forward curve of per-period prices.
pub type DoubleSeries<P> = TimeSeries<P, f64>;

impl<P: Period, V> TimeSeries<P, V> {
    /// Creates a series starting at `start` with one value per consecutive
    /// period.
    pub fn new(start: P, values: Vec<V>) -> Self {
        if values.is_empty() {
            return Self::empty();
        }
        TimeSeries {
            start: Some(start),
            values,
        }
    }

    /// Creates a series covering `start..=end` populated by `f`.
    pub fn from_fn(start: P, end: P, mut f: impl FnMut(P) -> V) -> Self {
        let num_periods = end.offset_from(start) + 1;
        if num_periods <= 0 {
            return Self::empty();
        }
        let values = (0..num_periods).map(|i| f(start.offset(i))).collect();
        TimeSeries {
            start: Some(start),
            values,
        }
    }

    /// The empty series.
    pub fn empty() -> Self {
        TimeSeries {
            start: None,
            values: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// First period covered, `None` for the empty series.
    pub fn start(&self) -> Option<P> {
        self.start
    }

    /// Last period covered, `None` for the empty series.
    pub fn end(&self) -> Option<P> {
        self.start.map(|s| s.offset(self.values.len() as i32 - 1))
    }

    /// Value at `period`, `None` when the period is outside the series.
    pub fn get(&self, period: P) -> Option<&V> {
        let start = self.start?;
        let idx = period.offset_from(start);
        if idx < 0 {
            return None;
        }
        self.values.get(idx as usize)
    }

    /// Whether every period in `from..=to` lies inside the series.
    pub fn covers(&self, from: P, to: P) -> bool {
        self.get(from).is_some() && self.get(to).is_some()
    }

    /// The raw values in period order.
    pub fn values(&self) -> &[V] {
        &self.values
    }

    /// Iterates `(period, value)` pairs in period order.
    pub fn iter(&self) -> impl Iterator<Item = (P, &V)> + '_ {
        self.start.into_iter().flat_map(move |start| {
            self.values
                .iter()
                .enumerate()
                .map(move |(i, v)| (start.offset(i as i32), v))
        })
    }
}

impl<P: Period, V> Index<P> for TimeSeries<P, V> {
    type Output = V;

    /// # Panics
    /// Panics when `period` is outside the series. Use [`TimeSeries::get`]
    /// for fallible lookup.
    fn index(&self, period: P) -> &V {
        match self.get(period) {
            Some(v) => v,
            None => panic!("period {} outside time series", period),
        }
    }
}
