//! Per-product inventory counters.

use std::sync::Arc;

use chrono::Utc;
use common::{OrderId, ProductId};
use domain::{Stock, StockChangeReason, StockHistory, StockMovement};
use store::{Store, StoreTx};

use crate::error::{FulfillmentError, Result};

/// Owns every change to stock quantities.
///
/// Each successful mutation writes exactly one [`StockHistory`] row in the
/// same transaction. Mutations lock only the affected product's row.
pub struct StockLedger<S: Store> {
    store: Arc<S>,
}

impl<S: Store> Clone for StockLedger<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: Store> StockLedger<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Advisory check against committed stock. Reserves nothing.
    pub async fn has_stock(&self, product_id: &ProductId, quantity: u32) -> Result<bool> {
        Ok(self
            .store
            .get_stock(product_id)
            .await?
            .is_some_and(|stock| stock.can_fulfil(quantity)))
    }

    /// Takes `quantity` units under the row lock.
    ///
    /// Returns `false` without writing anything if the product has no stock
    /// row or fewer units are available. The caller is expected to abort its
    /// transaction.
    #[tracing::instrument(skip(self, tx))]
    pub async fn deduct(
        &self,
        tx: &mut S::Tx,
        product_id: &ProductId,
        quantity: u32,
        reason: StockChangeReason,
        reference: Option<OrderId>,
    ) -> Result<bool> {
        let now = Utc::now();
        let Some(mut stock) = tx.lock_stock(product_id).await? else {
            tracing::warn!("no stock row for product");
            metrics::counter!("stock_deductions_rejected_total").increment(1);
            return Ok(false);
        };

        let Some(movement) = stock.deduct(quantity, now) else {
            tracing::warn!(available = stock.quantity, "insufficient stock");
            metrics::counter!("stock_deductions_rejected_total").increment(1);
            return Ok(false);
        };

        tx.update_stock(&stock).await?;
        tx.append_stock_history(&StockHistory::record(
            product_id.clone(),
            movement,
            reason,
            None,
            reference,
            now,
        ))
        .await?;
        Ok(true)
    }

    /// Puts `quantity` units back under the row lock.
    #[tracing::instrument(skip(self, tx))]
    pub async fn restore(
        &self,
        tx: &mut S::Tx,
        product_id: &ProductId,
        quantity: u32,
        reason: StockChangeReason,
        reference: Option<OrderId>,
    ) -> Result<()> {
        let now = Utc::now();
        let mut stock = tx
            .lock_stock(product_id)
            .await?
            .ok_or_else(|| FulfillmentError::not_found("stock", product_id))?;

        let movement = stock.restock(quantity, now)?;
        tx.update_stock(&stock).await?;
        tx.append_stock_history(&StockHistory::record(
            product_id.clone(),
            movement,
            reason,
            None,
            reference,
            now,
        ))
        .await?;
        Ok(())
    }

    /// Applies a manual correction in its own transaction.
    #[tracing::instrument(skip(self))]
    pub async fn adjust(
        &self,
        product_id: &ProductId,
        delta: i64,
        reason: StockChangeReason,
        notes: Option<String>,
    ) -> Result<Stock> {
        reason.check_adjustment(delta)?;

        let now = Utc::now();
        let mut tx = self.store.begin().await?;
        let mut stock = tx
            .lock_stock(product_id)
            .await?
            .ok_or_else(|| FulfillmentError::not_found("stock", product_id))?;

        let movement = stock.adjust(delta, now)?;
        tx.update_stock(&stock).await?;
        tx.append_stock_history(&StockHistory::record(
            product_id.clone(),
            movement,
            reason,
            notes,
            None,
            now,
        ))
        .await?;
        tx.commit().await?;

        tracing::info!(quantity = stock.quantity, "stock adjusted");
        Ok(stock)
    }

    /// Creates or overwrites a product's stock row.
    #[tracing::instrument(skip(self))]
    pub async fn set_stock(
        &self,
        product_id: &ProductId,
        quantity: u32,
        reorder_level: u32,
    ) -> Result<Stock> {
        let now = Utc::now();
        let mut tx = self.store.begin().await?;

        let (stock, movement) = match tx.lock_stock(product_id).await? {
            Some(mut stock) => {
                let movement = StockMovement {
                    before: stock.quantity,
                    after: quantity,
                };
                stock.quantity = quantity;
                stock.reorder_level = reorder_level;
                stock.updated_at = now;
                tx.update_stock(&stock).await?;
                (stock, movement)
            }
            None => {
                let stock = Stock::new(product_id.clone(), quantity, reorder_level);
                tx.insert_stock(&stock).await?;
                (stock, StockMovement { before: 0, after: quantity })
            }
        };

        tx.append_stock_history(&StockHistory::record(
            product_id.clone(),
            movement,
            StockChangeReason::Adjustment,
            Some("Stock level set".to_string()),
            None,
            now,
        ))
        .await?;
        tx.commit().await?;
        Ok(stock)
    }

    pub async fn stock(&self, product_id: &ProductId) -> Result<Option<Stock>> {
        Ok(self.store.get_stock(product_id).await?)
    }

    /// History rows for a product, oldest first.
    pub async fn history(&self, product_id: &ProductId) -> Result<Vec<StockHistory>> {
        Ok(self.store.stock_history(product_id).await?)
    }

    /// Products at or below their reorder level.
    pub async fn low_stock(&self) -> Result<Vec<Stock>> {
        Ok(self.store.low_stock().await?)
    }
}
