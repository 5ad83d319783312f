//! # storage_core: Foundation Types for Commodity Storage Valuation
//!
//! The bottom layer of the workspace, providing:
//! - Time types: `Date`, `Month` and the `Period` trait (`types::time`)
//! - Period-indexed series and simulation panels (`series`, `panel`)
//! - Cash flows and discounting (`cashflow`, `discount`)
//! - The storage contract model (`contract`)
//! - Inventory grids (`grid`), simulation data (`sim`) and regression basis
//!   functions (`basis`)
//!
//! storage_core has no dependency on the simulation or valuation layers;
//! external dependencies are limited to chrono, thiserror and (optionally)
//! serde.
//!
//! ## Usage Examples
//!
//! ```rust
//! use storage_core::contract::{CmdtyStorage, StorageContract};
//! use storage_core::series::TimeSeries;
//! use storage_core::types::time::{Date, Period};
//!
//! let start = Date::from_ymd(2024, 4, 1).unwrap();
//! let end = Date::from_ymd(2025, 4, 1).unwrap();
//!
//! let storage = CmdtyStorage::builder(start, end)
//!     .constant_inject_withdraw_range(-850.0, 625.0)
//!     .min_inventory(0.0)
//!     .max_inventory(52_500.0)
//!     .must_be_empty_at_end()
//!     .build()
//!     .unwrap();
//!
//! let forward_curve = TimeSeries::from_fn(start, end, |_| 53.5);
//! assert_eq!(forward_curve[storage.end_period()], 53.5);
//! ```
//!
//! ## Feature Flags
//!
//! - `serde`: serialisation derives for the plain value types

#![warn(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod basis;
pub mod cashflow;
pub mod contract;
pub mod discount;
pub mod grid;
pub mod math;
pub mod panel;
pub mod series;
pub mod sim;
pub mod types;

pub use cashflow::CashFlow;
pub use panel::Panel;
pub use series::{DoubleSeries, TimeSeries};
pub use sim::SpotSims;
pub use types::time::{Date, Month, Period};
