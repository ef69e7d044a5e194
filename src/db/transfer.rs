//! Transfer transaction
//!
//! Moves money between two accounts as one unit of work: a transfer record,
//! a debit and a credit entry, and the two balance updates.
//!
//! Balance updates always lock the lower account id first. Two transfers
//! running in opposite directions over the same pair of accounts therefore
//! acquire row locks in the same order and cannot wait on each other in a cycle.
//!
//! Entry inserts reference `accounts(id)` through a foreign key, which takes a
//! `FOR KEY SHARE` lock on the account row. That mode does not conflict with the
//! `FOR NO KEY UPDATE` lock taken by the balance update, so entry order does not
//! participate in the lock ordering.

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::models::{
    Account, AddAccountBalanceParams, CreateEntryParams, CreateTransferParams, Entry, Transfer,
};
use super::tx::{exec_tx, TxBegin};
use super::{Querier, StoreResult};

/// Input of a transfer transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferTxParams {
    pub from_account_id: i64,
    pub to_account_id: i64,
    pub amount: i64,
}

/// Everything a transfer transaction wrote, in source-then-destination order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferTxResult {
    pub transfer: Transfer,
    pub from_account: Account,
    pub to_account: Account,
    pub from_entry: Entry,
    pub to_entry: Entry,
}

/// A signed delta to apply to one account's balance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BalanceChange {
    pub account_id: i64,
    pub amount: i64,
}

impl TransferTxParams {
    /// Debit applied to the source account
    pub fn debit(&self) -> BalanceChange {
        BalanceChange {
            account_id: self.from_account_id,
            amount: -self.amount,
        }
    }

    /// Credit applied to the destination account
    pub fn credit(&self) -> BalanceChange {
        BalanceChange {
            account_id: self.to_account_id,
            amount: self.amount,
        }
    }

    /// True when the source account is locked before the destination
    pub fn source_locked_first(&self) -> bool {
        self.from_account_id < self.to_account_id
    }

    /// Both balance changes, lower account id first
    pub fn lock_order(&self) -> [BalanceChange; 2] {
        if self.source_locked_first() {
            [self.debit(), self.credit()]
        } else {
            [self.credit(), self.debit()]
        }
    }
}

/// Perform a money transfer from one account to another in one transaction.
///
/// Creates the transfer record, the debit and credit entries, then updates
/// both balances in ascending account-id order. Nothing is persisted unless
/// every step succeeds and the transaction commits.
pub async fn transfer_tx<B>(
    db: &B,
    cancel: &CancellationToken,
    arg: TransferTxParams,
) -> StoreResult<TransferTxResult>
where
    B: TxBegin,
    B::Tx: Querier,
{
    let result = exec_tx(db, cancel, move |q| {
        Box::pin(async move {
            let transfer = q
                .create_transfer(CreateTransferParams {
                    from_account_id: arg.from_account_id,
                    to_account_id: arg.to_account_id,
                    amount: arg.amount,
                })
                .await?;

            let debit = arg.debit();
            let from_entry = q
                .create_entry(CreateEntryParams {
                    account_id: debit.account_id,
                    amount: debit.amount,
                })
                .await?;

            let credit = arg.credit();
            let to_entry = q
                .create_entry(CreateEntryParams {
                    account_id: credit.account_id,
                    amount: credit.amount,
                })
                .await?;

            let [first, second] = arg.lock_order();
            let (first_account, second_account) = add_money(q, first, second).await?;
            let (from_account, to_account) = if arg.source_locked_first() {
                (first_account, second_account)
            } else {
                (second_account, first_account)
            };

            Ok(TransferTxResult {
                transfer,
                from_account,
                to_account,
                from_entry,
                to_entry,
            })
        })
    })
    .await;

    match &result {
        Ok(res) => tracing::debug!(
            transfer_id = res.transfer.id,
            from_account_id = arg.from_account_id,
            to_account_id = arg.to_account_id,
            amount = arg.amount,
            "Transfer committed"
        ),
        Err(e) => tracing::warn!(
            from_account_id = arg.from_account_id,
            to_account_id = arg.to_account_id,
            amount = arg.amount,
            error = %e,
            "Transfer aborted"
        ),
    }

    result
}

/// Apply `first` then `second`, strictly in that order.
///
/// Returns the updated accounts in input order. If `first` fails, `second`
/// is never attempted.
pub async fn add_money<Q>(
    q: &mut Q,
    first: BalanceChange,
    second: BalanceChange,
) -> StoreResult<(Account, Account)>
where
    Q: Querier + ?Sized,
{
    let account1 = q
        .add_account_balance(AddAccountBalanceParams {
            id: first.account_id,
            amount: first.amount,
        })
        .await?;

    let account2 = q
        .add_account_balance(AddAccountBalanceParams {
            id: second.account_id,
            amount: second.amount,
        })
        .await?;

    Ok((account1, account2))
}
