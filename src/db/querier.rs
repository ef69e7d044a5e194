//! Ledger accessor interface
//!
//! Single-row CRUD operations on accounts, entries and transfers. Every call
//! runs against whatever connection or transaction the implementor is bound to.

use async_trait::async_trait;

use super::models::{
    Account, AddAccountBalanceParams, CreateAccountParams, CreateEntryParams,
    CreateTransferParams, Entry, ListAccountsParams, ListEntriesParams, ListTransfersParams,
    Transfer, UpdateAccountParams,
};
use super::StoreResult;

#[async_trait]
pub trait Querier: Send {
    // accounts
    async fn create_account(&mut self, arg: CreateAccountParams) -> StoreResult<Account>;
    async fn get_account(&mut self, id: i64) -> StoreResult<Account>;
    /// Reads the account and holds its row lock until the transaction ends.
    async fn get_account_for_update(&mut self, id: i64) -> StoreResult<Account>;
    async fn list_accounts(&mut self, arg: ListAccountsParams) -> StoreResult<Vec<Account>>;
    async fn update_account(&mut self, arg: UpdateAccountParams) -> StoreResult<Account>;
    /// Atomically adds `arg.amount` to the balance and returns the new row.
    async fn add_account_balance(&mut self, arg: AddAccountBalanceParams) -> StoreResult<Account>;
    async fn delete_account(&mut self, id: i64) -> StoreResult<()>;

    // entries
    async fn create_entry(&mut self, arg: CreateEntryParams) -> StoreResult<Entry>;
    async fn get_entry(&mut self, id: i64) -> StoreResult<Entry>;
    async fn list_entries(&mut self, arg: ListEntriesParams) -> StoreResult<Vec<Entry>>;

    // transfers
    async fn create_transfer(&mut self, arg: CreateTransferParams) -> StoreResult<Transfer>;
    async fn get_transfer(&mut self, id: i64) -> StoreResult<Transfer>;
    async fn list_transfers(&mut self, arg: ListTransfersParams) -> StoreResult<Vec<Transfer>>;
}
