//! Common test utilities
//!
//! `MemoryStore` is an in-memory ledger that behaves like the PostgreSQL store
//! where the transfer transaction can observe it: per-row locks held until
//! commit or rollback, writes invisible to others until commit, the
//! non-negative balance check and foreign keys. It also supports failure
//! injection and records the order of balance updates.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use futures::future::BoxFuture;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tokio::sync::{Mutex as RowLock, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;

use bank_ledger::db::models::{
    Account, AddAccountBalanceParams, CreateAccountParams, CreateEntryParams,
    CreateTransferParams, Entry, ListAccountsParams, ListEntriesParams, ListTransfersParams,
    Transfer, UpdateAccountParams,
};
use bank_ledger::db::{
    exec_tx, schema, transfer, Querier, Store, StoreError, StoreResult, Transactional, TxBegin,
};
use bank_ledger::{TransferTxParams, TransferTxResult};

pub const BALANCE_CONSTRAINT: &str = "accounts_balance_nonnegative";

#[derive(Default)]
struct Tables {
    accounts: BTreeMap<i64, Account>,
    entries: BTreeMap<i64, Entry>,
    transfers: BTreeMap<i64, Transfer>,
}

#[derive(Default)]
struct Shared {
    tables: Mutex<Tables>,
    row_locks: Mutex<HashMap<i64, Arc<RowLock<()>>>>,
    next_id: AtomicI64,
    fail_write: Mutex<Option<usize>>,
    fail_rollback: Mutex<bool>,
    balance_updates: Mutex<Vec<i64>>,
    commits: AtomicI64,
    rollbacks: AtomicI64,
}

/// In-memory store with row locking and failure injection
#[derive(Clone, Default)]
pub struct MemoryStore {
    shared: Arc<Shared>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a committed account directly
    pub fn seed_account(&self, owner: &str, balance: i64, currency: &str) -> Account {
        let account = Account {
            id: self.shared.next_id.fetch_add(1, Ordering::SeqCst) + 1,
            owner: owner.to_string(),
            balance,
            currency: currency.to_string(),
            created_at: Utc::now(),
        };
        self.shared
            .tables
            .lock()
            .unwrap()
            .accounts
            .insert(account.id, account.clone());
        account
    }

    /// Committed balance of an account
    pub fn balance(&self, id: i64) -> i64 {
        self.shared.tables.lock().unwrap().accounts[&id].balance
    }

    pub fn entry_count(&self) -> usize {
        self.shared.tables.lock().unwrap().entries.len()
    }

    pub fn transfer_count(&self) -> usize {
        self.shared.tables.lock().unwrap().transfers.len()
    }

    /// Committed entries, in insertion order
    pub fn entries(&self) -> Vec<Entry> {
        self.shared.tables.lock().unwrap().entries.values().cloned().collect()
    }

    /// Make the nth write (1-based) of the next transaction fail
    pub fn fail_nth_write(&self, n: usize) {
        *self.shared.fail_write.lock().unwrap() = Some(n);
    }

    /// Make the rollback of the next transaction fail
    pub fn fail_next_rollback(&self) {
        *self.shared.fail_rollback.lock().unwrap() = true;
    }

    /// Account ids passed to `add_account_balance`, in call order
    pub fn balance_updates(&self) -> Vec<i64> {
        self.shared.balance_updates.lock().unwrap().clone()
    }

    pub fn clear_balance_updates(&self) {
        self.shared.balance_updates.lock().unwrap().clear();
    }

    pub fn commits(&self) -> i64 {
        self.shared.commits.load(Ordering::SeqCst)
    }

    pub fn rollbacks(&self) -> i64 {
        self.shared.rollbacks.load(Ordering::SeqCst)
    }

    async fn autocommit<T, F>(&self, f: F) -> StoreResult<T>
    where
        T: Send,
        F: for<'q> FnOnce(&'q mut MemoryTx) -> BoxFuture<'q, StoreResult<T>> + Send,
    {
        exec_tx(self, &CancellationToken::new(), f).await
    }
}

/// One open transaction against a `MemoryStore`
pub struct MemoryTx {
    shared: Arc<Shared>,
    accounts: HashMap<i64, Account>,
    deleted: HashSet<i64>,
    entries: Vec<Entry>,
    transfers: Vec<Transfer>,
    locks: HashMap<i64, OwnedMutexGuard<()>>,
    writes: usize,
    fail_write: Option<usize>,
    fail_rollback: bool,
}

fn injected_failure() -> StoreError {
    StoreError::Database(sqlx::Error::Protocol("injected failure".to_string()))
}

fn constraint(name: &str) -> StoreError {
    StoreError::ConstraintViolation {
        constraint: name.to_string(),
        message: format!("violates constraint \"{}\"", name),
    }
}

impl MemoryTx {
    fn next_id(&self) -> i64 {
        self.shared.next_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn write(&mut self) -> StoreResult<()> {
        self.writes += 1;
        if self.fail_write == Some(self.writes) {
            return Err(injected_failure());
        }
        Ok(())
    }

    /// Take the row lock on `id` and keep it until the transaction ends
    async fn lock_row(&mut self, id: i64) {
        if self.locks.contains_key(&id) {
            return;
        }
        let lock = {
            let mut locks = self.shared.row_locks.lock().unwrap();
            locks.entry(id).or_default().clone()
        };
        let guard = lock.lock_owned().await;
        self.locks.insert(id, guard);
    }

    fn current_account(&self, id: i64) -> Option<Account> {
        if self.deleted.contains(&id) {
            return None;
        }
        self.accounts
            .get(&id)
            .cloned()
            .or_else(|| self.shared.tables.lock().unwrap().accounts.get(&id).cloned())
    }

    fn all_accounts(&self) -> Vec<Account> {
        let mut merged: BTreeMap<i64, Account> = self.shared.tables.lock().unwrap().accounts.clone();
        merged.extend(self.accounts.iter().map(|(id, a)| (*id, a.clone())));
        merged
            .into_values()
            .filter(|a| !self.deleted.contains(&a.id))
            .collect()
    }

    fn all_entries(&self) -> Vec<Entry> {
        let mut entries: Vec<Entry> =
            self.shared.tables.lock().unwrap().entries.values().cloned().collect();
        entries.extend(self.entries.iter().cloned());
        entries
    }

    fn all_transfers(&self) -> Vec<Transfer> {
        let mut transfers: Vec<Transfer> =
            self.shared.tables.lock().unwrap().transfers.values().cloned().collect();
        transfers.extend(self.transfers.iter().cloned());
        transfers
    }

    fn stage_balance(&mut self, mut account: Account, balance: i64) -> StoreResult<Account> {
        if balance < 0 {
            return Err(constraint(BALANCE_CONSTRAINT));
        }
        account.balance = balance;
        self.accounts.insert(account.id, account.clone());
        Ok(account)
    }
}

fn page<T>(rows: Vec<T>, limit: i64, offset: i64) -> Vec<T> {
    rows.into_iter()
        .skip(offset.max(0) as usize)
        .take(limit.max(0) as usize)
        .collect()
}

#[async_trait]
impl Querier for MemoryTx {
    async fn create_account(&mut self, arg: CreateAccountParams) -> StoreResult<Account> {
        self.write()?;
        if arg.balance < 0 {
            return Err(constraint(BALANCE_CONSTRAINT));
        }
        let account = Account {
            id: self.next_id(),
            owner: arg.owner,
            balance: arg.balance,
            currency: arg.currency,
            created_at: Utc::now(),
        };
        self.accounts.insert(account.id, account.clone());
        Ok(account)
    }

    async fn get_account(&mut self, id: i64) -> StoreResult<Account> {
        self.current_account(id).ok_or(StoreError::NotFound)
    }

    async fn get_account_for_update(&mut self, id: i64) -> StoreResult<Account> {
        self.lock_row(id).await;
        self.current_account(id).ok_or(StoreError::NotFound)
    }

    async fn list_accounts(&mut self, arg: ListAccountsParams) -> StoreResult<Vec<Account>> {
        Ok(page(self.all_accounts(), arg.limit, arg.offset))
    }

    async fn update_account(&mut self, arg: UpdateAccountParams) -> StoreResult<Account> {
        self.write()?;
        self.lock_row(arg.id).await;
        let account = self.current_account(arg.id).ok_or(StoreError::NotFound)?;
        self.stage_balance(account, arg.balance)
    }

    async fn add_account_balance(&mut self, arg: AddAccountBalanceParams) -> StoreResult<Account> {
        self.shared.balance_updates.lock().unwrap().push(arg.id);
        self.write()?;
        self.lock_row(arg.id).await;
        // Give concurrent transactions a chance to interleave while the lock is held.
        tokio::task::yield_now().await;
        let account = self.current_account(arg.id).ok_or(StoreError::NotFound)?;
        let balance = account.balance + arg.amount;
        self.stage_balance(account, balance)
    }

    async fn delete_account(&mut self, id: i64) -> StoreResult<()> {
        self.write()?;
        self.lock_row(id).await;
        if self.current_account(id).is_none() {
            return Err(StoreError::NotFound);
        }
        if self.all_entries().iter().any(|e| e.account_id == id) {
            return Err(constraint("entries_account_id_fkey"));
        }
        self.accounts.remove(&id);
        self.deleted.insert(id);
        Ok(())
    }

    async fn create_entry(&mut self, arg: CreateEntryParams) -> StoreResult<Entry> {
        self.write()?;
        if self.current_account(arg.account_id).is_none() {
            return Err(constraint("entries_account_id_fkey"));
        }
        let entry = Entry {
            id: self.next_id(),
            account_id: arg.account_id,
            amount: arg.amount,
            created_at: Utc::now(),
        };
        self.entries.push(entry.clone());
        tokio::task::yield_now().await;
        Ok(entry)
    }

    async fn get_entry(&mut self, id: i64) -> StoreResult<Entry> {
        self.all_entries()
            .into_iter()
            .find(|e| e.id == id)
            .ok_or(StoreError::NotFound)
    }

    async fn list_entries(&mut self, arg: ListEntriesParams) -> StoreResult<Vec<Entry>> {
        let rows = self
            .all_entries()
            .into_iter()
            .filter(|e| e.account_id == arg.account_id)
            .collect();
        Ok(page(rows, arg.limit, arg.offset))
    }

    async fn create_transfer(&mut self, arg: CreateTransferParams) -> StoreResult<Transfer> {
        self.write()?;
        if self.current_account(arg.from_account_id).is_none() {
            return Err(constraint("transfers_from_account_id_fkey"));
        }
        if self.current_account(arg.to_account_id).is_none() {
            return Err(constraint("transfers_to_account_id_fkey"));
        }
        if arg.amount <= 0 {
            return Err(constraint("transfers_amount_positive"));
        }
        let transfer = Transfer {
            id: self.next_id(),
            from_account_id: arg.from_account_id,
            to_account_id: arg.to_account_id,
            amount: arg.amount,
            created_at: Utc::now(),
        };
        self.transfers.push(transfer.clone());
        Ok(transfer)
    }

    async fn get_transfer(&mut self, id: i64) -> StoreResult<Transfer> {
        self.all_transfers()
            .into_iter()
            .find(|t| t.id == id)
            .ok_or(StoreError::NotFound)
    }

    async fn list_transfers(&mut self, arg: ListTransfersParams) -> StoreResult<Vec<Transfer>> {
        let rows = self
            .all_transfers()
            .into_iter()
            .filter(|t| t.from_account_id == arg.from_account_id || t.to_account_id == arg.to_account_id)
            .collect();
        Ok(page(rows, arg.limit, arg.offset))
    }
}

#[async_trait]
impl Transactional for MemoryTx {
    async fn commit(self) -> StoreResult<()> {
        {
            let mut tables = self.shared.tables.lock().unwrap();
            for id in &self.deleted {
                tables.accounts.remove(id);
            }
            for (id, account) in &self.accounts {
                tables.accounts.insert(*id, account.clone());
            }
            for entry in &self.entries {
                tables.entries.insert(entry.id, entry.clone());
            }
            for transfer in &self.transfers {
                tables.transfers.insert(transfer.id, transfer.clone());
            }
        }
        self.shared.commits.fetch_add(1, Ordering::SeqCst);
        // Row locks are released when `self` drops.
        Ok(())
    }

    async fn rollback(self) -> StoreResult<()> {
        self.shared.rollbacks.fetch_add(1, Ordering::SeqCst);
        if self.fail_rollback {
            return Err(StoreError::Connection(sqlx::Error::PoolClosed));
        }
        Ok(())
    }
}

#[async_trait]
impl TxBegin for MemoryStore {
    type Tx = MemoryTx;

    async fn begin(&self) -> StoreResult<MemoryTx> {
        let fail_write = self.shared.fail_write.lock().unwrap().take();
        let fail_rollback = std::mem::take(&mut *self.shared.fail_rollback.lock().unwrap());
        Ok(MemoryTx {
            shared: Arc::clone(&self.shared),
            accounts: HashMap::new(),
            deleted: HashSet::new(),
            entries: Vec::new(),
            transfers: Vec::new(),
            locks: HashMap::new(),
            writes: 0,
            fail_write,
            fail_rollback,
        })
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn open_account(&self, arg: CreateAccountParams) -> StoreResult<Account> {
        self.autocommit(move |tx| tx.create_account(arg)).await
    }

    async fn find_account(&self, id: i64) -> StoreResult<Account> {
        self.autocommit(move |tx| tx.get_account(id)).await
    }

    async fn find_accounts(&self, arg: ListAccountsParams) -> StoreResult<Vec<Account>> {
        self.autocommit(move |tx| tx.list_accounts(arg)).await
    }

    async fn transfer_tx(
        &self,
        cancel: &CancellationToken,
        arg: TransferTxParams,
    ) -> StoreResult<TransferTxResult> {
        transfer::transfer_tx(self, cancel, arg).await
    }
}

#[async_trait]
impl Querier for MemoryStore {
    async fn create_account(&mut self, arg: CreateAccountParams) -> StoreResult<Account> {
        self.autocommit(move |tx| tx.create_account(arg)).await
    }

    async fn get_account(&mut self, id: i64) -> StoreResult<Account> {
        self.autocommit(move |tx| tx.get_account(id)).await
    }

    async fn get_account_for_update(&mut self, id: i64) -> StoreResult<Account> {
        self.autocommit(move |tx| tx.get_account_for_update(id)).await
    }

    async fn list_accounts(&mut self, arg: ListAccountsParams) -> StoreResult<Vec<Account>> {
        self.autocommit(move |tx| tx.list_accounts(arg)).await
    }

    async fn update_account(&mut self, arg: UpdateAccountParams) -> StoreResult<Account> {
        self.autocommit(move |tx| tx.update_account(arg)).await
    }

    async fn add_account_balance(&mut self, arg: AddAccountBalanceParams) -> StoreResult<Account> {
        self.autocommit(move |tx| tx.add_account_balance(arg)).await
    }

    async fn delete_account(&mut self, id: i64) -> StoreResult<()> {
        self.autocommit(move |tx| tx.delete_account(id)).await
    }

    async fn create_entry(&mut self, arg: CreateEntryParams) -> StoreResult<Entry> {
        self.autocommit(move |tx| tx.create_entry(arg)).await
    }

    async fn get_entry(&mut self, id: i64) -> StoreResult<Entry> {
        self.autocommit(move |tx| tx.get_entry(id)).await
    }

    async fn list_entries(&mut self, arg: ListEntriesParams) -> StoreResult<Vec<Entry>> {
        self.autocommit(move |tx| tx.list_entries(arg)).await
    }

    async fn create_transfer(&mut self, arg: CreateTransferParams) -> StoreResult<Transfer> {
        self.autocommit(move |tx| tx.create_transfer(arg)).await
    }

    async fn get_transfer(&mut self, id: i64) -> StoreResult<Transfer> {
        self.autocommit(move |tx| tx.get_transfer(id)).await
    }

    async fn list_transfers(&mut self, arg: ListTransfersParams) -> StoreResult<Vec<Transfer>> {
        self.autocommit(move |tx| tx.list_transfers(arg)).await
    }
}

/// Connect to `DATABASE_URL` and apply the bundled schema
pub async fn setup_test_db() -> PgPool {
    dotenvy::dotenv().ok();
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for tests");

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&database_url)
        .await
        .expect("Failed to connect to DB");

    schema::migrate(&pool).await.expect("Failed to apply schema");

    pool
}
