//! Store
//!
//! The capability surface handed to callers: every accessor operation plus
//! the transfer transaction.

use async_trait::async_trait;
use sqlx::pool::PoolConnection;
use sqlx::{PgPool, Postgres};
use tokio_util::sync::CancellationToken;

use super::models::{
    Account, AddAccountBalanceParams, CreateAccountParams, CreateEntryParams,
    CreateTransferParams, Entry, ListAccountsParams, ListEntriesParams, ListTransfersParams,
    Transfer, UpdateAccountParams,
};
use super::transfer::{self, TransferTxParams, TransferTxResult};
use super::{Querier, Queries, StoreError, StoreResult};

/// Row CRUD plus transactional transfers.
///
/// `Querier` methods take `&mut self` so the same trait can be bound to an open
/// transaction. The account methods here take `&self`: each call runs on its own
/// autocommit connection, so a shared store handle is enough.
#[async_trait]
pub trait Store: Querier + Sync {
    async fn open_account(&self, arg: CreateAccountParams) -> StoreResult<Account>;

    async fn find_account(&self, id: i64) -> StoreResult<Account>;

    async fn find_accounts(&self, arg: ListAccountsParams) -> StoreResult<Vec<Account>>;

    /// Move `arg.amount` from one account to another atomically.
    ///
    /// Not idempotent: each call creates a new transfer and applies its deltas again.
    async fn transfer_tx(
        &self,
        cancel: &CancellationToken,
        arg: TransferTxParams,
    ) -> StoreResult<TransferTxResult>;
}

/// PostgreSQL-backed store
#[derive(Debug, Clone)]
pub struct SqlStore {
    pool: PgPool,
}

impl SqlStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Accessor bound to a pooled connection in autocommit mode
    async fn queries(&self) -> StoreResult<Queries<PoolConnection<Postgres>>> {
        let conn = self.pool.acquire().await.map_err(StoreError::Connection)?;
        Ok(Queries::new(conn))
    }
}

#[async_trait]
impl Store for SqlStore {
    async fn open_account(&self, arg: CreateAccountParams) -> StoreResult<Account> {
        self.queries().await?.create_account(arg).await
    }

    async fn find_account(&self, id: i64) -> StoreResult<Account> {
        self.queries().await?.get_account(id).await
    }

    async fn find_accounts(&self, arg: ListAccountsParams) -> StoreResult<Vec<Account>> {
        self.queries().await?.list_accounts(arg).await
    }

    async fn transfer_tx(
        &self,
        cancel: &CancellationToken,
        arg: TransferTxParams,
    ) -> StoreResult<TransferTxResult> {
        transfer::transfer_tx(&self.pool, cancel, arg).await
    }
}

#[async_trait]
impl Querier for SqlStore {
    async fn create_account(&mut self, arg: CreateAccountParams) -> StoreResult<Account> {
        self.queries().await?.create_account(arg).await
    }

    async fn get_account(&mut self, id: i64) -> StoreResult<Account> {
        self.queries().await?.get_account(id).await
    }

    async fn get_account_for_update(&mut self, id: i64) -> StoreResult<Account> {
        self.queries().await?.get_account_for_update(id).await
    }

    async fn list_accounts(&mut self, arg: ListAccountsParams) -> StoreResult<Vec<Account>> {
        self.queries().await?.list_accounts(arg).await
    }

    async fn update_account(&mut self, arg: UpdateAccountParams) -> StoreResult<Account> {
        self.queries().await?.update_account(arg).await
    }

    async fn add_account_balance(&mut self, arg: AddAccountBalanceParams) -> StoreResult<Account> {
        self.queries().await?.add_account_balance(arg).await
    }

    async fn delete_account(&mut self, id: i64) -> StoreResult<()> {
        self.queries().await?.delete_account(id).await
    }

    async fn create_entry(&mut self, arg: CreateEntryParams) -> StoreResult<Entry> {
        self.queries().await?.create_entry(arg).await
    }

    async fn get_entry(&mut self, id: i64) -> StoreResult<Entry> {
        self.queries().await?.get_entry(id).await
    }

    async fn list_entries(&mut self, arg: ListEntriesParams) -> StoreResult<Vec<Entry>> {
        self.queries().await?.list_entries(arg).await
    }

    async fn create_transfer(&mut self, arg: CreateTransferParams) -> StoreResult<Transfer> {
        self.queries().await?.create_transfer(arg).await
    }

    async fn get_transfer(&mut self, id: i64) -> StoreResult<Transfer> {
        self.queries().await?.get_transfer(id).await
    }

    async fn list_transfers(&mut self, arg: ListTransfersParams) -> StoreResult<Vec<Transfer>> {
        self.queries().await?.list_transfers(arg).await
    }
}
