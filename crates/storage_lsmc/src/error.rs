//! Valuation errors and cooperative cancellation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Errors from an LSMC storage valuation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LsmcError {
    /// The facility's constraints leave no feasible inventory trajectory.
    #[error("inventory constraints cannot be fulfilled: {0}; raising the numerical tolerance may help")]
    InfeasibleConstraints(String),

    /// An input to the valuation is invalid or inconsistent.
    #[error("invalid valuation input: {0}")]
    InvalidInput(String),

    /// The calculation was cancelled via its [`CancellationToken`].
    #[error("valuation cancelled")]
    Cancelled,
}

/// Shared flag for cancelling a running valuation from another thread.
///
/// The engine polls the token at period boundaries in both the backward and
/// forward passes, returning [`LsmcError::Cancelled`] promptly after the
/// flag is raised. Clones share the same flag.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// A fresh, un-raised token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Raises the flag. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    /// Whether the flag has been raised.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Errors with [`LsmcError::Cancelled`] when the flag is raised.
    pub fn check(&self) -> Result<(), LsmcError> {
        if self.is_cancelled() {
            Err(LsmcError::Cancelled)
        } else {
            Ok(())
        }
    }
}
