//! bank_ledger Library
//!
//! Double-entry ledger over PostgreSQL. The core is [`db::Store::transfer_tx`]:
//! a transfer record, two entries and two balance updates applied in one
//! transaction, with row locks always taken in ascending account-id order.

pub mod api;
pub mod config;
pub mod db;
pub mod domain;
pub mod error;

pub use config::Config;
pub use db::{SqlStore, Store, StoreError, StoreResult, TransferTxParams, TransferTxResult};
pub use domain::{Amount, AmountError, Currency, DomainError, OperationContext};
pub use error::{AppError, AppResult};
