//! Domain Error Types
//!
//! Request-level rule violations, checked before a transfer reaches the store.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum DomainError {
    /// Invalid amount (zero, negative, or exceeds limit)
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Unsupported currency: {0}")]
    UnsupportedCurrency(String),

    /// Transfer to same account
    #[error("Cannot transfer to the same account")]
    SameAccountTransfer,

    /// Account currency differs from the requested one
    #[error("Account {account_id} currency mismatch: {actual} vs {expected}")]
    CurrencyMismatch {
        account_id: i64,
        expected: String,
        actual: String,
    },
}

impl From<super::AmountError> for DomainError {
    fn from(err: super::AmountError) -> Self {
        DomainError::InvalidAmount(err.to_string())
    }
}
