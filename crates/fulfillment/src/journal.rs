//! Append-only audit trail of money movements.

use std::sync::Arc;

use common::{OrderId, UserId};
use domain::TransactionLog;
use store::{Store, StoreTx};

use crate::error::Result;

pub struct TransactionJournal<S: Store> {
    store: Arc<S>,
}

impl<S: Store> Clone for TransactionJournal<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: Store> TransactionJournal<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Appends an entry inside the caller's transaction.
    pub async fn record(&self, tx: &mut S::Tx, entry: &TransactionLog) -> Result<()> {
        tracing::debug!(kind = %entry.kind, amount = %entry.amount, "transaction recorded");
        tx.append_transaction(entry).await?;
        Ok(())
    }

    pub async fn for_order(&self, order_id: OrderId) -> Result<Vec<TransactionLog>> {
        Ok(self.store.transactions_for_order(order_id).await?)
    }

    pub async fn for_user(&self, user_id: UserId) -> Result<Vec<TransactionLog>> {
        Ok(self.store.transactions_for_user(user_id).await?)
    }
}
