//! PostgreSQL ledger accessor
//!
//! `Queries` binds the accessor to one connection: a pooled connection for
//! autocommit reads and writes, or an open transaction inside a unit of work.

use std::ops::DerefMut;

use async_trait::async_trait;
use sqlx::PgConnection;

use super::models::{
    Account, AddAccountBalanceParams, CreateAccountParams, CreateEntryParams,
    CreateTransferParams, Entry, ListAccountsParams, ListEntriesParams, ListTransfersParams,
    Transfer, UpdateAccountParams,
};
use super::{Querier, StoreError, StoreResult};

/// Ledger accessor bound to a single PostgreSQL connection
#[derive(Debug)]
pub struct Queries<C> {
    conn: C,
}

impl<C> Queries<C>
where
    C: DerefMut<Target = PgConnection> + Send,
{
    /// Bind the accessor to a connection or transaction
    pub fn new(conn: C) -> Self {
        Self { conn }
    }

    /// Release the underlying connection or transaction
    pub fn into_inner(self) -> C {
        self.conn
    }
}

#[async_trait]
impl<C> Querier for Queries<C>
where
    C: DerefMut<Target = PgConnection> + Send,
{
    async fn create_account(&mut self, arg: CreateAccountParams) -> StoreResult<Account> {
        let account = sqlx::query_as::<_, Account>(
            r#"
            INSERT INTO accounts (owner, balance, currency)
            VALUES ($1, $2, $3)
            RETURNING id, owner, balance, currency, created_at
            "#,
        )
        .bind(&arg.owner)
        .bind(arg.balance)
        .bind(&arg.currency)
        .fetch_one(&mut *self.conn)
        .await?;

        Ok(account)
    }

    async fn get_account(&mut self, id: i64) -> StoreResult<Account> {
        let account = sqlx::query_as::<_, Account>(
            r#"
            SELECT id, owner, balance, currency, created_at
            FROM accounts
            WHERE id = $1
            LIMIT 1
            "#,
        )
        .bind(id)
        .fetch_one(&mut *self.conn)
        .await?;

        Ok(account)
    }

    async fn get_account_for_update(&mut self, id: i64) -> StoreResult<Account> {
        // NO KEY UPDATE: does not block the FOR KEY SHARE lock taken by
        // foreign-key checks when entries/transfers reference this row.
        let account = sqlx::query_as::<_, Account>(
            r#"
            SELECT id, owner, balance, currency, created_at
            FROM accounts
            WHERE id = $1
            LIMIT 1
            FOR NO KEY UPDATE
            "#,
        )
        .bind(id)
        .fetch_one(&mut *self.conn)
        .await?;

        Ok(account)
    }

    async fn list_accounts(&mut self, arg: ListAccountsParams) -> StoreResult<Vec<Account>> {
        let accounts = sqlx::query_as::<_, Account>(
            r#"
            SELECT id, owner, balance, currency, created_at
            FROM accounts
            ORDER BY id
            LIMIT $1
            OFFSET $2
            "#,
        )
        .bind(arg.limit)
        .bind(arg.offset)
        .fetch_all(&mut *self.conn)
        .await?;

        Ok(accounts)
    }

    async fn update_account(&mut self, arg: UpdateAccountParams) -> StoreResult<Account> {
        let account = sqlx::query_as::<_, Account>(
            r#"
            UPDATE accounts
            SET balance = $2
            WHERE id = $1
            RETURNING id, owner, balance, currency, created_at
            "#,
        )
        .bind(arg.id)
        .bind(arg.balance)
        .fetch_one(&mut *self.conn)
        .await?;

        Ok(account)
    }

    async fn add_account_balance(&mut self, arg: AddAccountBalanceParams) -> StoreResult<Account> {
        let account = sqlx::query_as::<_, Account>(
            r#"
            UPDATE accounts
            SET balance = balance + $2
            WHERE id = $1
            RETURNING id, owner, balance, currency, created_at
            "#,
        )
        .bind(arg.id)
        .bind(arg.amount)
        .fetch_one(&mut *self.conn)
        .await?;

        Ok(account)
    }

    async fn delete_account(&mut self, id: i64) -> StoreResult<()> {
        let rows_affected = sqlx::query("DELETE FROM accounts WHERE id = $1")
            .bind(id)
            .execute(&mut *self.conn)
            .await?
            .rows_affected();

        if rows_affected == 0 {
            return Err(StoreError::NotFound);
        }

        Ok(())
    }

    async fn create_entry(&mut self, arg: CreateEntryParams) -> StoreResult<Entry> {
        let entry = sqlx::query_as::<_, Entry>(
            r#"
            INSERT INTO entries (account_id, amount)
            VALUES ($1, $2)
            RETURNING id, account_id, amount, created_at
            "#,
        )
        .bind(arg.account_id)
        .bind(arg.amount)
        .fetch_one(&mut *self.conn)
        .await?;

        Ok(entry)
    }

    async fn get_entry(&mut self, id: i64) -> StoreResult<Entry> {
        let entry = sqlx::query_as::<_, Entry>(
            r#"
            SELECT id, account_id, amount, created_at
            FROM entries
            WHERE id = $1
            LIMIT 1
            "#,
        )
        .bind(id)
        .fetch_one(&mut *self.conn)
        .await?;

        Ok(entry)
    }

    async fn list_entries(&mut self, arg: ListEntriesParams) -> StoreResult<Vec<Entry>> {
        let entries = sqlx::query_as::<_, Entry>(
            r#"
            SELECT id, account_id, amount, created_at
            FROM entries
            WHERE account_id = $1
            ORDER BY id
            LIMIT $2
            OFFSET $3
            "#,
        )
        .bind(arg.account_id)
        .bind(arg.limit)
        .bind(arg.offset)
        .fetch_all(&mut *self.conn)
        .await?;

        Ok(entries)
    }

    async fn create_transfer(&mut self, arg: CreateTransferParams) -> StoreResult<Transfer> {
        let transfer = sqlx::query_as::<_, Transfer>(
            r#"
            INSERT INTO transfers (from_account_id, to_account_id, amount)
            VALUES ($1, $2, $3)
            RETURNING id, from_account_id, to_account_id, amount, created_at
            "#,
        )
        .bind(arg.from_account_id)
        .bind(arg.to_account_id)
        .bind(arg.amount)
        .fetch_one(&mut *self.conn)
        .await?;

        Ok(transfer)
    }

    async fn get_transfer(&mut self, id: i64) -> StoreResult<Transfer> {
        let transfer = sqlx::query_as::<_, Transfer>(
            r#"
            SELECT id, from_account_id, to_account_id, amount, created_at
            FROM transfers
            WHERE id = $1
            LIMIT 1
            "#,
        )
        .bind(id)
        .fetch_one(&mut *self.conn)
        .await?;

        Ok(transfer)
    }

    async fn list_transfers(&mut self, arg: ListTransfersParams) -> StoreResult<Vec<Transfer>> {
        let transfers = sqlx::query_as::<_, Transfer>(
            r#"
            SELECT id, from_account_id, to_account_id, amount, created_at
            FROM transfers
            WHERE from_account_id = $1 OR to_account_id = $2
            ORDER BY id
            LIMIT $3
            OFFSET $4
            "#,
        )
        .bind(arg.from_account_id)
        .bind(arg.to_account_id)
        .bind(arg.limit)
        .bind(arg.offset)
        .fetch_all(&mut *self.conn)
        .await?;

        Ok(transfers)
    }
}
