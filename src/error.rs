//! Error handling module
//!
//! Centralized error types and HTTP response conversion.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::db::StoreError;

/// Application-wide Result type
pub type AppResult<T> = Result<T, AppError>;

/// Constraint that keeps account balances from going negative
const BALANCE_CONSTRAINT: &str = "accounts_balance_nonnegative";

/// Application error types
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // Client errors (4xx)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Account not found: {0}")]
    AccountNotFound(i64),

    // Domain errors
    #[error(transparent)]
    Domain(#[from] crate::domain::DomainError),

    // Store errors, classified on conversion to a response
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl AppError {
    /// Map a missing row on `account_id` to `AccountNotFound`, pass everything else through
    pub fn from_account_lookup(account_id: i64, err: StoreError) -> Self {
        match err {
            StoreError::NotFound => AppError::AccountNotFound(account_id),
            other => AppError::Store(other),
        }
    }
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code, details) = match &self {
            // 400 Bad Request
            AppError::InvalidRequest(msg) => {
                (StatusCode::BAD_REQUEST, "invalid_request", Some(msg.clone()))
            }

            // 404 Not Found
            AppError::AccountNotFound(id) => {
                (StatusCode::NOT_FOUND, "account_not_found", Some(id.to_string()))
            }

            AppError::Domain(domain_err) => {
                use crate::domain::DomainError;
                match domain_err {
                    DomainError::InvalidAmount(msg) => {
                        (StatusCode::BAD_REQUEST, "invalid_amount", Some(msg.clone()))
                    }
                    DomainError::UnsupportedCurrency(code) => {
                        (StatusCode::BAD_REQUEST, "unsupported_currency", Some(code.clone()))
                    }
                    DomainError::SameAccountTransfer => {
                        (StatusCode::BAD_REQUEST, "same_account_transfer", None)
                    }
                    DomainError::CurrencyMismatch { .. } => {
                        (StatusCode::BAD_REQUEST, "currency_mismatch", Some(domain_err.to_string()))
                    }
                }
            }

            AppError::Store(store_err) => match store_err {
                StoreError::NotFound => (StatusCode::NOT_FOUND, "not_found", None),
                StoreError::ConstraintViolation { constraint, .. }
                    if constraint == BALANCE_CONSTRAINT =>
                {
                    (StatusCode::BAD_REQUEST, "insufficient_balance", None)
                }
                StoreError::ConstraintViolation { constraint, .. } => {
                    (StatusCode::CONFLICT, "constraint_violation", Some(constraint.clone()))
                }
                StoreError::Cancelled => {
                    (StatusCode::SERVICE_UNAVAILABLE, "cancelled", None)
                }
                StoreError::Connection(e) => {
                    tracing::error!("Database connection error: {:?}", e);
                    (StatusCode::SERVICE_UNAVAILABLE, "database_unavailable", None)
                }
                StoreError::Rollback { .. } | StoreError::Database(_) => {
                    tracing::error!("Database error: {}", store_err);
                    (StatusCode::INTERNAL_SERVER_ERROR, "database_error", None)
                }
            },
        };

        let body = ErrorResponse {
            error: self.to_string(),
            error_code: error_code.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}
