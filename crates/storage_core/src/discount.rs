//! Discount factor construction and memoisation.
//!
//! Valuations discount every cash flow to a single present date, so the
//! engine wraps the caller's discount function in a [`Discounter`] that
//! caches factors per cash flow date. Contracts settle on a handful of
//! distinct dates per period, which makes the cache hit rate very high.

use std::cell::RefCell;
use std::collections::HashMap;

use crate::types::time::Date;

/// Builds an ACT/365 continuously-compounded discount function for a flat
/// interest rate.
///
/// Cash flows on or before the present date are not discounted (factor 1),
/// matching the convention that same-day settlement carries no funding
/// cost.
///
/// # Examples
///
/// ```
/// use storage_core::discount::act365_const_rate;
/// use storage_core::types::time::Date;
///
/// let discount = act365_const_rate(0.05);
/// let present = Date::from_ymd(2024, 1, 1).unwrap();
/// let in_a_year = Date::from_ymd(2025, 1, 1).unwrap();
/// let df = discount(present, in_a_year);
/// assert!((df - (-0.05f64 * 366.0 / 365.0).exp()).abs() < 1e-12);
/// assert_eq!(discount(present, present), 1.0);
/// ```
pub fn act365_const_rate(rate: f64) -> impl Fn(Date, Date) -> f64 + Copy {
    move |present: Date, cash_flow: Date| {
        if cash_flow <= present {
            1.0
        } else {
            let year_fraction = (cash_flow - present) as f64 / 365.0;
            (-rate * year_fraction).exp()
        }
    }
}

/// Memoising wrapper around a discount function, fixed to one present date.
pub struct Discounter<'a> {
    present: Date,
    discount: &'a dyn Fn(Date, Date) -> f64,
    cache: RefCell<HashMap<Date, f64>>,
}

impl<'a> Discounter<'a> {
    pub fn new(present: Date, discount: &'a dyn Fn(Date, Date) -> f64) -> Self {
        Discounter {
            present,
            discount,
            cache: RefCell::new(HashMap::new()),
        }
    }

    /// The date cash flows are discounted to.
    pub fn present(&self) -> Date {
        self.present
    }

    /// Discount factor from `cash_flow_date` to the present date.
    pub fn factor(&self, cash_flow_date: Date) -> f64 {
        let mut cache = self.cache.borrow_mut();
        *cache
            .entry(cash_flow_date)
            .or_insert_with(|| (self.discount)(self.present, cash_flow_date))
    }
}
