//! Domain module
//!
//! Validated request primitives. The store trusts its callers; these types
//! are where the callers do their checking.

pub mod amount;
pub mod context;
pub mod currency;
pub mod error;

pub use amount::{Amount, AmountError};
pub use context::OperationContext;
pub use currency::Currency;
pub use error::DomainError;
