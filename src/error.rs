// Error taxonomy for the leave balance core
//
// Expected failures (insufficient balance, missing records, bad input) are
// explicit Err values the caller can match on. Storage failures come through
// as Persistence. Nothing here is fatal to the process and nothing is
// retried inside the core; retry policy belongs to the caller.

use thiserror::Error;

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, BalanceError>;

#[derive(Debug, Error)]
pub enum BalanceError {
    /// An id or natural key was referenced that storage does not hold
    #[error("balance not found: {0}")]
    NotFound(String),

    /// Deduct request exceeds the remaining days (or no balance exists)
    #[error("insufficient balance: remaining {remaining}, requested {requested}")]
    InsufficientBalance { remaining: f64, requested: f64 },

    /// A merge or duplicate-deletion step failed mid-resolution; the
    /// surrounding transaction was rolled back
    #[error("conflict resolution failed: {0}")]
    ConflictResolution(String),

    /// Underlying storage call failed
    #[error("persistence error: {0}")]
    Persistence(#[from] rusqlite::Error),

    /// Malformed or logically invalid balance (negative quantities,
    /// non-positive day counts, over-credit)
    #[error("validation error: {0}")]
    Validation(String),
}

impl BalanceError {
    pub fn not_found(what: impl Into<String>) -> Self {
        BalanceError::NotFound(what.into())
    }

    pub fn insufficient(remaining: f64, requested: f64) -> Self {
        BalanceError::InsufficientBalance {
            remaining,
            requested,
        }
    }
}
