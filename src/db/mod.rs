//! Database module
//!
//! Ledger accessor, transaction scope runner and the transfer transaction.

mod error;
pub mod models;
mod querier;
mod queries;
pub mod schema;
mod store;
pub mod transfer;
pub mod tx;

pub use error::{StoreError, StoreResult};
pub use models::{Account, Entry, Transfer};
pub use querier::Querier;
pub use queries::Queries;
pub use store::{SqlStore, Store};
pub use transfer::{TransferTxParams, TransferTxResult};
pub use tx::{exec_tx, Transactional, TxBegin};
