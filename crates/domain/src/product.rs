//! Catalog row as seen by the fulfillment core.

use chrono::{DateTime, Utc};
use common::{MerchantId, Money, ProductId};
use serde::{Deserialize, Serialize};

/// A sellable product. The catalog owns these; checkout only reads them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub merchant_id: MerchantId,
    pub name: String,
    pub price: Money,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Product {
    pub fn new(
        id: impl Into<ProductId>,
        merchant_id: MerchantId,
        name: impl Into<String>,
        price: Money,
    ) -> Self {
        Self {
            id: id.into(),
            merchant_id,
            name: name.into(),
            price,
            is_active: true,
            created_at: Utc::now(),
        }
    }
}
