//! Transaction scope runner
//!
//! `exec_tx` opens a transaction, hands a transaction-bound accessor to a
//! unit of work, and commits or rolls back on every exit path.

use async_trait::async_trait;
use futures::future::BoxFuture;
use sqlx::{PgPool, Postgres, Transaction};
use tokio_util::sync::CancellationToken;

use super::{Queries, StoreError, StoreResult};

/// An open transaction that must end in exactly one commit or rollback
#[async_trait]
pub trait Transactional: Send + Sized {
    async fn commit(self) -> StoreResult<()>;
    async fn rollback(self) -> StoreResult<()>;
}

/// Something that can open a transaction and bind an accessor to it
#[async_trait]
pub trait TxBegin: Send + Sync {
    type Tx: Transactional;

    async fn begin(&self) -> StoreResult<Self::Tx>;
}

#[async_trait]
impl TxBegin for PgPool {
    type Tx = Queries<Transaction<'static, Postgres>>;

    async fn begin(&self) -> StoreResult<Self::Tx> {
        let tx = PgPool::begin(self).await.map_err(StoreError::Connection)?;
        Ok(Queries::new(tx))
    }
}

#[async_trait]
impl Transactional for Queries<Transaction<'static, Postgres>> {
    async fn commit(self) -> StoreResult<()> {
        self.into_inner().commit().await?;
        Ok(())
    }

    async fn rollback(self) -> StoreResult<()> {
        self.into_inner().rollback().await?;
        Ok(())
    }
}

/// Run `unit_of_work` inside one database transaction.
///
/// - callback error: rollback, then return the callback error, or a
///   `StoreError::Rollback` carrying both errors if the rollback also failed
/// - callback success: commit; a commit failure is returned as-is
/// - `cancel` fired before commit: the callback is dropped, the transaction
///   is rolled back and `StoreError::Cancelled` is returned
///
/// If this future is itself dropped mid-flight, the sqlx transaction guard
/// rolls the transaction back when it goes out of scope.
///
/// Cancellation drops the client side of an in-flight statement only. A
/// statement the server is still running, for example one waiting on a row
/// lock, keeps the connection busy, and the rollback is sent once that
/// statement finishes. `Cancelled` is returned after the rollback, so a
/// cancel issued while blocked on a lock returns no sooner than the lock
/// holder ends its transaction.
pub async fn exec_tx<B, T, F>(db: &B, cancel: &CancellationToken, unit_of_work: F) -> StoreResult<T>
where
    B: TxBegin,
    T: Send,
    F: for<'q> FnOnce(&'q mut B::Tx) -> BoxFuture<'q, StoreResult<T>> + Send,
{
    if cancel.is_cancelled() {
        return Err(StoreError::Cancelled);
    }

    let mut tx = db.begin().await?;

    let outcome = tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(StoreError::Cancelled),
        result = unit_of_work(&mut tx) => result,
    };

    // Cancellation that lands after the last write but before commit still aborts.
    let outcome = match outcome {
        Ok(_) if cancel.is_cancelled() => Err(StoreError::Cancelled),
        other => other,
    };

    match outcome {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(tx_err) => {
            if let Err(rb_err) = tx.rollback().await {
                tracing::error!(error = %tx_err, rollback_error = %rb_err, "Transaction rollback failed");
                return Err(StoreError::rollback(tx_err, rb_err));
            }
            tracing::debug!(error = %tx_err, "Transaction rolled back");
            Err(tx_err)
        }
    }
}
