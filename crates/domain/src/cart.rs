//! The pre-checkout cart aggregate.

use chrono::{DateTime, Utc};
use common::{CartId, MerchantId, Money, ProductId, UserId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::pricing::{AmountOverflow, tax_for};
use crate::product::Product;

/// Errors that can occur during cart operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CartError {
    /// Quantity must be at least one.
    #[error("Invalid quantity: {quantity} (must be greater than 0)")]
    InvalidQuantity { quantity: u32 },

    /// The line quantity would not fit in a counter.
    #[error("Quantity too large for {product_id}")]
    QuantityTooLarge { product_id: ProductId },

    /// Item not found in cart.
    #[error("Item not found in cart: {product_id}")]
    ItemNotFound { product_id: ProductId },

    /// The product is not for sale.
    #[error("Product is not available: {product_id}")]
    ProductUnavailable { product_id: ProductId },

    #[error(transparent)]
    Amount(#[from] AmountOverflow),
}

/// A line in the cart. The unit price is captured when the product is first
/// added.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub product_id: ProductId,
    pub product_name: String,
    pub merchant_id: MerchantId,
    pub quantity: u32,
    pub unit_price: Money,
    pub subtotal: Money,
}

impl CartItem {
    fn new(product: &Product, quantity: u32) -> Result<Self, AmountOverflow> {
        Ok(Self {
            product_id: product.id.clone(),
            product_name: product.name.clone(),
            merchant_id: product.merchant_id,
            quantity,
            unit_price: product.price,
            subtotal: product.price.multiply(quantity).ok_or(AmountOverflow)?,
        })
    }

    fn with_quantity(&self, quantity: u32) -> Result<Self, AmountOverflow> {
        Ok(Self {
            quantity,
            subtotal: self.unit_price.multiply(quantity).ok_or(AmountOverflow)?,
            ..self.clone()
        })
    }
}

/// A customer's cart. At most one exists per user.
///
/// Every mutating method ends with an explicit [`Cart::recalculate`], so the
/// derived totals are always in step with the lines. A mutation whose totals
/// would overflow is rejected and leaves the cart as it was.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    pub id: CartId,
    pub user_id: UserId,
    pub items: Vec<CartItem>,
    pub subtotal: Money,
    pub tax: Money,
    pub shipping: Money,
    pub discount: Money,
    pub total: Money,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Cart {
    /// Creates an empty cart for a user.
    pub fn new(user_id: UserId, now: DateTime<Utc>) -> Self {
        Self {
            id: CartId::new(),
            user_id,
            items: Vec::new(),
            subtotal: Money::zero(),
            tax: Money::zero(),
            shipping: Money::zero(),
            discount: Money::zero(),
            total: Money::zero(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn item(&self, product_id: &ProductId) -> Option<&CartItem> {
        self.items.iter().find(|item| &item.product_id == product_id)
    }

    /// Quantity of a product currently in the cart, zero if absent.
    pub fn quantity_of(&self, product_id: &ProductId) -> u32 {
        self.item(product_id).map_or(0, |item| item.quantity)
    }

    pub fn total_quantity(&self) -> u64 {
        self.items.iter().map(|item| u64::from(item.quantity)).sum()
    }

    /// Adds `quantity` units of a product.
    ///
    /// If the product is already in the cart its quantity is increased rather
    /// than adding a second line. Returns the resulting line quantity.
    pub fn add_item(
        &mut self,
        product: &Product,
        quantity: u32,
        now: DateTime<Utc>,
    ) -> Result<u32, CartError> {
        if quantity == 0 {
            return Err(CartError::InvalidQuantity { quantity });
        }
        if !product.is_active {
            return Err(CartError::ProductUnavailable {
                product_id: product.id.clone(),
            });
        }

        let mut items = self.items.clone();
        let new_quantity = match items.iter_mut().find(|i| i.product_id == product.id) {
            Some(existing) => {
                let combined = existing.quantity.checked_add(quantity).ok_or_else(|| {
                    CartError::QuantityTooLarge {
                        product_id: product.id.clone(),
                    }
                })?;
                *existing = existing.with_quantity(combined)?;
                combined
            }
            None => {
                items.push(CartItem::new(product, quantity)?);
                quantity
            }
        };

        self.replace_items(items, now)?;
        Ok(new_quantity)
    }

    /// Sets the quantity of an existing line; zero removes the line.
    pub fn update_item(
        &mut self,
        product_id: &ProductId,
        quantity: u32,
        now: DateTime<Utc>,
    ) -> Result<(), CartError> {
        if quantity == 0 {
            return self.remove_item(product_id, now).map(|_| ());
        }

        let mut items = self.items.clone();
        let item = items
            .iter_mut()
            .find(|i| &i.product_id == product_id)
            .ok_or_else(|| CartError::ItemNotFound {
                product_id: product_id.clone(),
            })?;
        *item = item.with_quantity(quantity)?;

        self.replace_items(items, now)
    }

    /// Removes a line, returning it.
    pub fn remove_item(
        &mut self,
        product_id: &ProductId,
        now: DateTime<Utc>,
    ) -> Result<CartItem, CartError> {
        let index = self
            .items
            .iter()
            .position(|i| &i.product_id == product_id)
            .ok_or_else(|| CartError::ItemNotFound {
                product_id: product_id.clone(),
            })?;
        let mut items = self.items.clone();
        let removed = items.remove(index);

        self.replace_items(items, now)?;
        Ok(removed)
    }

    /// Empties the cart.
    pub fn clear(&mut self, now: DateTime<Utc>) {
        self.items.clear();
        self.subtotal = Money::zero();
        self.tax = Money::zero();
        self.shipping = Money::zero();
        self.discount = Money::zero();
        self.total = Money::zero();
        self.touch(now);
    }

    /// Removes and returns every line sold by `merchant_id`, leaving the
    /// other merchants' lines in the cart.
    pub fn take_merchant_lines(
        &mut self,
        merchant_id: MerchantId,
        now: DateTime<Utc>,
    ) -> Result<Vec<CartItem>, CartError> {
        let (taken, kept): (Vec<_>, Vec<_>) = self
            .items
            .iter()
            .cloned()
            .partition(|item| item.merchant_id == merchant_id);
        if taken.is_empty() {
            return Ok(taken);
        }
        if kept.is_empty() {
            self.clear(now);
        } else {
            self.replace_items(kept, now)?;
        }
        Ok(taken)
    }

    /// Recomputes the derived totals from the lines. On overflow nothing is
    /// changed.
    pub fn recalculate(&mut self) -> Result<(), CartError> {
        let subtotal =
            Money::checked_sum(self.items.iter().map(|item| item.subtotal)).ok_or(AmountOverflow)?;
        let tax = tax_for(subtotal)?;
        let total = subtotal
            .checked_add(tax)
            .and_then(|amount| amount.checked_add(self.shipping))
            .and_then(|amount| amount.checked_sub(self.discount))
            .ok_or(AmountOverflow)?;

        self.subtotal = subtotal;
        self.tax = tax;
        self.total = total;
        Ok(())
    }

    fn replace_items(&mut self, items: Vec<CartItem>, now: DateTime<Utc>) -> Result<(), CartError> {
        let previous = std::mem::replace(&mut self.items, items);
        if let Err(err) = self.recalculate() {
            self.items = previous;
            return Err(err);
        }
        self.touch(now);
        Ok(())
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }
}
