//! Dated cash flow value type.

use crate::types::time::Date;

/// A single cash amount paid or received on a date.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CashFlow {
    pub date: Date,
    pub amount: f64,
}

impl CashFlow {
    pub fn new(date: Date, amount: f64) -> Self {
        CashFlow { date, amount }
    }

    /// Present value of a set of cash flows under `discount`, a map from
    /// cash flow date to discount factor.
    pub fn npv(flows: &[CashFlow], mut discount: impl FnMut(Date) -> f64) -> f64 {
        flows.iter().map(|cf| cf.amount * discount(cf.date)).sum()
    }
}
