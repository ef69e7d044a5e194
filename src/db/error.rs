//! Store Errors
//!
//! Error types for ledger accessor and transaction operations.

use sqlx::error::ErrorKind;

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in the store
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Transaction could not be started or committed, or the driver lost its connection
    #[error("Connection failure: {0}")]
    Connection(#[source] sqlx::Error),

    /// A write was rejected by a store constraint
    #[error("Constraint violation ({constraint}): {message}")]
    ConstraintViolation { constraint: String, message: String },

    /// A single-row read or update matched no row
    #[error("Row not found")]
    NotFound,

    /// Rollback failed after an earlier failure; both are kept
    #[error("tx err: {tx_err}, rb err: {rb_err}")]
    Rollback {
        tx_err: Box<StoreError>,
        rb_err: Box<StoreError>,
    },

    /// The caller cancelled before commit
    #[error("Transaction cancelled before commit")]
    Cancelled,

    /// Any other database error
    #[error("Database error: {0}")]
    Database(#[source] sqlx::Error),
}

impl StoreError {
    /// Wrap an original failure together with the rollback failure it caused
    pub fn rollback(tx_err: StoreError, rb_err: StoreError) -> Self {
        Self::Rollback {
            tx_err: Box::new(tx_err),
            rb_err: Box::new(rb_err),
        }
    }

    /// Check if this error is a constraint violation
    pub fn is_constraint_violation(&self) -> bool {
        matches!(self, StoreError::ConstraintViolation { .. })
    }

    /// Check if this error is (or was triggered by) a cancellation
    pub fn is_cancelled(&self) -> bool {
        match self {
            StoreError::Cancelled => true,
            StoreError::Rollback { tx_err, .. } => tx_err.is_cancelled(),
            _ => false,
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StoreError::NotFound,
            sqlx::Error::Database(db_err) => match db_err.kind() {
                ErrorKind::UniqueViolation
                | ErrorKind::ForeignKeyViolation
                | ErrorKind::NotNullViolation
                | ErrorKind::CheckViolation => StoreError::ConstraintViolation {
                    constraint: db_err.constraint().unwrap_or("unknown").to_string(),
                    message: db_err.message().to_string(),
                },
                _ => StoreError::Database(sqlx::Error::Database(db_err)),
            },
            err @ (sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::Protocol(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed) => StoreError::Connection(err),
            err => StoreError::Database(err),
        }
    }
}
