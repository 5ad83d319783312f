//! Error types for the core layer.

use thiserror::Error;

/// Errors from constructing or parsing dates and periods.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DateError {
    /// The year/month/day combination does not form a valid calendar date.
    #[error("invalid date: {year:04}-{month:02}-{day:02}")]
    InvalidDate { year: i32, month: u32, day: u32 },

    /// The month component is outside 1..=12.
    #[error("invalid month number: {0}")]
    InvalidMonth(u32),

    /// Failed to parse from string representation.
    #[error("date parse error: {0}")]
    ParseError(String),
}

/// Errors from building or querying a storage contract.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ContractError {
    /// A required builder field was never set.
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    /// A field was set to a value outside its valid domain.
    #[error("invalid value for {field}: {message}")]
    InvalidValue {
        field: &'static str,
        message: String,
    },

    /// Ratchet schedule is empty, unsorted, or has non-ascending inventory pins.
    #[error("invalid ratchet schedule: {0}")]
    InvalidRatchets(String),
}

/// Errors from inventory grid construction.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GridError {
    /// Grid spacing or point count out of domain.
    #[error("invalid grid parameter: {0}")]
    InvalidParameter(String),
}

/// Errors from assembling simulation data.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimDataError {
    /// Spot and factor panels disagree on dimensions or start period.
    #[error("inconsistent simulation panels: {0}")]
    InconsistentPanels(String),

    /// The simulation input is outside its valid domain.
    #[error("invalid simulation input: {0}")]
    InvalidInput(String),
}
