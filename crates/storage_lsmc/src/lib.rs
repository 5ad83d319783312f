//! Least-squares Monte Carlo valuation of commodity storage.
//!
//! Storage contracts are a string of daily (or monthly) decisions: inject,
//! withdraw or do nothing, constrained by inventory-dependent rates and
//! capacity. This crate values them by the Longstaff-Schwartz method: a
//! backward induction on one simulation sample estimates continuation
//! values by regression on basis functions, and a forward pass on an
//! independent sample exercises the resulting policy to produce the NPV,
//! its standard error, pathwise deltas, expected operation profiles and
//! trigger prices.
//!
//! The entry point is [`lsmc_value`], driven by an [`LsmcParams`] built
//! against any [`storage_core::contract::StorageContract`]. Simulated
//! prices arrive through [`storage_core::sim::SpotSims`]; any simulator
//! whose spot prices are the forward price times a mean-one multiplier can
//! feed the valuation.

#![warn(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod decision;
pub mod engine;
pub mod error;
pub mod inventory_space;
pub mod params;
mod progress;
mod regression;
pub mod results;
mod trigger;

pub use engine::lsmc_value;
pub use error::{CancellationToken, LsmcError};
pub use inventory_space::{calculate_inventory_space, InventoryRange};
pub use params::{LsmcParams, LsmcParamsBuilder};
pub use results::{
    LsmcResults, SimDataReturned, StorageProfile, TriggerPricePoint, TriggerPrices,
    TriggerVolumeProfiles,
};
