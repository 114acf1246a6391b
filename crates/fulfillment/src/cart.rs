//! Cart mutations.

use std::sync::Arc;

use chrono::Utc;
use common::{ProductId, UserId};
use domain::{Cart, CartError, Product};
use store::{Store, StoreTx};

use crate::error::{FulfillmentError, Result};
use crate::stock::StockLedger;

/// Edits a user's cart under its row lock.
///
/// Quantity changes are checked against committed stock, but nothing is
/// reserved; checkout checks again under the stock row locks.
pub struct CartService<S: Store> {
    store: Arc<S>,
    stock: StockLedger<S>,
}

impl<S: Store> Clone for CartService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            stock: self.stock.clone(),
        }
    }
}

impl<S: Store> CartService<S> {
    pub fn new(store: Arc<S>, stock: StockLedger<S>) -> Self {
        Self { store, stock }
    }

    /// The user's cart, or an empty one if none was saved yet.
    pub async fn get_cart(&self, user_id: UserId) -> Result<Cart> {
        Ok(self
            .store
            .get_cart(user_id)
            .await?
            .unwrap_or_else(|| Cart::new(user_id, Utc::now())))
    }

    #[tracing::instrument(skip(self))]
    pub async fn add_item(
        &self,
        user_id: UserId,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<Cart> {
        let product = self.product(product_id).await?;
        let now = Utc::now();

        let mut tx = self.store.begin().await?;
        let mut cart = tx
            .lock_cart(user_id)
            .await?
            .unwrap_or_else(|| Cart::new(user_id, now));

        let wanted = cart
            .quantity_of(product_id)
            .checked_add(quantity)
            .ok_or_else(|| CartError::QuantityTooLarge {
                product_id: product_id.clone(),
            })?;
        if quantity > 0 {
            self.ensure_stock(product_id, wanted).await?;
        }
        cart.add_item(&product, quantity, now)?;

        tx.save_cart(&cart).await?;
        tx.commit().await?;

        tracing::info!(quantity = wanted, "cart item added");
        Ok(cart)
    }

    /// Sets a line's quantity. Zero removes the line.
    #[tracing::instrument(skip(self))]
    pub async fn update_item(
        &self,
        user_id: UserId,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<Cart> {
        let mut tx = self.store.begin().await?;
        let mut cart = tx
            .lock_cart(user_id)
            .await?
            .ok_or_else(|| FulfillmentError::not_found("cart", user_id))?;

        if quantity > 0 && cart.item(product_id).is_some() {
            self.ensure_stock(product_id, quantity).await?;
        }
        cart.update_item(product_id, quantity, Utc::now())?;

        tx.save_cart(&cart).await?;
        tx.commit().await?;
        Ok(cart)
    }

    #[tracing::instrument(skip(self))]
    pub async fn remove_item(&self, user_id: UserId, product_id: &ProductId) -> Result<Cart> {
        let mut tx = self.store.begin().await?;
        let mut cart = tx
            .lock_cart(user_id)
            .await?
            .ok_or_else(|| FulfillmentError::not_found("cart", user_id))?;

        cart.remove_item(product_id, Utc::now())?;

        tx.save_cart(&cart).await?;
        tx.commit().await?;
        Ok(cart)
    }

    #[tracing::instrument(skip(self))]
    pub async fn clear(&self, user_id: UserId) -> Result<Cart> {
        let now = Utc::now();
        let mut tx = self.store.begin().await?;
        let mut cart = tx
            .lock_cart(user_id)
            .await?
            .unwrap_or_else(|| Cart::new(user_id, now));

        cart.clear(now);

        tx.save_cart(&cart).await?;
        tx.commit().await?;
        Ok(cart)
    }

    async fn product(&self, product_id: &ProductId) -> Result<Product> {
        self.store
            .get_product(product_id)
            .await?
            .ok_or_else(|| FulfillmentError::not_found("product", product_id))
    }

    async fn ensure_stock(&self, product_id: &ProductId, quantity: u32) -> Result<()> {
        if self.stock.has_stock(product_id, quantity).await? {
            Ok(())
        } else {
            tracing::warn!(%product_id, quantity, "cart quantity exceeds stock");
            Err(FulfillmentError::InsufficientStock {
                product_id: product_id.clone(),
                requested: quantity,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use common::{MerchantId, Money};
    use store::InMemoryStore;

    use super::*;
    use crate::ErrorKind;

    struct Fixture {
        carts: CartService<InMemoryStore>,
        stock: StockLedger<InMemoryStore>,
        store: Arc<InMemoryStore>,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        let stock = StockLedger::new(Arc::clone(&store));
        let carts = CartService::new(Arc::clone(&store), stock.clone());

        store
            .upsert_product(&Product::new(
                "SKU-001",
                MerchantId::new(),
                "Widget",
                Money::new(50_000),
            ))
            .await
            .unwrap();
        stock.set_stock(&ProductId::new("SKU-001"), 5, 0).await.unwrap();

        Fixture {
            carts,
            stock,
            store,
        }
    }

    fn sku() -> ProductId {
        ProductId::new("SKU-001")
    }

    #[tokio::test]
    async fn test_add_item_persists_cart() {
        let f = fixture().await;
        let user = UserId::new();

        f.carts.add_item(user, &sku(), 2).await.unwrap();
        let cart = f.carts.add_item(user, &sku(), 1).await.unwrap();

        assert_eq!(cart.items.len(), 1);
        assert_eq!(cart.quantity_of(&sku()), 3);
        assert_eq!(cart.subtotal, Money::new(150_000));
        assert_eq!(cart.tax, Money::new(15_000));
        assert_eq!(f.carts.get_cart(user).await.unwrap(), cart);
    }

    #[tokio::test]
    async fn test_add_item_beyond_stock_fails() {
        let f = fixture().await;
        let user = UserId::new();

        f.carts.add_item(user, &sku(), 4).await.unwrap();
        let err = f.carts.add_item(user, &sku(), 2).await.unwrap_err();

        assert!(matches!(err, FulfillmentError::InsufficientStock { requested: 6, .. }));
        assert_eq!(f.carts.get_cart(user).await.unwrap().quantity_of(&sku()), 4);
    }

    #[tokio::test]
    async fn test_add_item_does_not_reserve() {
        let f = fixture().await;

        f.carts.add_item(UserId::new(), &sku(), 5).await.unwrap();
        f.carts.add_item(UserId::new(), &sku(), 5).await.unwrap();

        assert_eq!(f.stock.stock(&sku()).await.unwrap().unwrap().quantity, 5);
    }

    #[tokio::test]
    async fn test_unknown_and_inactive_products_are_not_found() {
        let f = fixture().await;
        let user = UserId::new();

        let err = f
            .carts
            .add_item(user, &ProductId::new("SKU-404"), 1)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let mut retired = Product::new("SKU-OLD", MerchantId::new(), "Old", Money::new(1));
        retired.is_active = false;
        f.store.upsert_product(&retired).await.unwrap();
        f.stock.set_stock(&retired.id, 5, 0).await.unwrap();

        let err = f.carts.add_item(user, &retired.id, 1).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_zero_quantity_add_is_invalid() {
        let f = fixture().await;
        let err = f.carts.add_item(UserId::new(), &sku(), 0).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_overflowing_line_total_is_invalid() {
        let f = fixture().await;
        let user = UserId::new();
        let pricey = Product::new(
            "SKU-BIG",
            MerchantId::new(),
            "Yacht",
            Money::new(i64::MAX / 2 + 1),
        );
        f.store.upsert_product(&pricey).await.unwrap();
        f.stock.set_stock(&pricey.id, 5, 0).await.unwrap();

        let err = f.carts.add_item(user, &pricey.id, 2).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(f.carts.get_cart(user).await.unwrap().is_empty());

        f.carts.add_item(user, &pricey.id, 1).await.unwrap();
        let err = f.carts.update_item(user, &pricey.id, 3).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(f.carts.get_cart(user).await.unwrap().quantity_of(&pricey.id), 1);
    }

    #[tokio::test]
    async fn test_quantity_past_counter_limit_is_invalid() {
        let f = fixture().await;
        let user = UserId::new();
        f.stock.set_stock(&sku(), u32::MAX, 0).await.unwrap();
        f.carts.add_item(user, &sku(), u32::MAX).await.unwrap();

        let err = f.carts.add_item(user, &sku(), 1).await.unwrap_err();

        assert!(matches!(err, FulfillmentError::Cart(CartError::QuantityTooLarge { .. })));
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(f.carts.get_cart(user).await.unwrap().quantity_of(&sku()), u32::MAX);
    }

    #[tokio::test]
    async fn test_update_to_zero_removes_line() {
        let f = fixture().await;
        let user = UserId::new();
        f.carts.add_item(user, &sku(), 2).await.unwrap();

        let cart = f.carts.update_item(user, &sku(), 3).await.unwrap();
        assert_eq!(cart.quantity_of(&sku()), 3);

        let cart = f.carts.update_item(user, &sku(), 0).await.unwrap();
        assert!(cart.is_empty());
        assert_eq!(cart.total, Money::zero());
    }

    #[tokio::test]
    async fn test_remove_and_clear() {
        let f = fixture().await;
        let user = UserId::new();
        f.carts.add_item(user, &sku(), 1).await.unwrap();

        let err = f
            .carts
            .remove_item(user, &ProductId::new("SKU-404"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let cart = f.carts.clear(user).await.unwrap();
        assert!(cart.is_empty());
        assert!(f.carts.get_cart(user).await.unwrap().is_empty());
    }
}
