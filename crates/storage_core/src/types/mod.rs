//! Core type definitions: dates, delivery periods and error types.

pub mod error;
pub mod time;

pub use error::{ContractError, DateError, GridError, SimDataError};
pub use time::{Date, Month, Period};
