//! Back-office endpoints: products, stock levels and coupons.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::{MerchantId, Money, ProductId};
use domain::{Coupon, CouponKind, Product, Stock, StockChangeReason, StockHistory};
use fulfillment::FulfillmentError;
use serde::Deserialize;
use store::Store;

use crate::AppState;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct ProductRequest {
    pub merchant_id: MerchantId,
    pub name: String,
    pub price: Money,
    #[serde(default = "active")]
    pub is_active: bool,
}

fn active() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct SetStockRequest {
    pub quantity: u32,
    #[serde(default)]
    pub reorder_level: u32,
}

#[derive(Debug, Deserialize)]
pub struct AdjustStockRequest {
    pub delta: i64,
    pub reason: StockChangeReason,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CouponRequest {
    pub code: String,
    pub kind: CouponKind,
    pub value: i64,
    #[serde(default)]
    pub min_purchase: Money,
    pub max_discount: Option<Money>,
    pub usage_limit: Option<u32>,
    pub per_customer_limit: Option<u32>,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
}

impl CouponRequest {
    fn into_coupon(self) -> Result<Coupon, ApiError> {
        if self.code.trim().is_empty() {
            return Err(ApiError::BadRequest("code must not be empty".to_string()));
        }
        if self.value <= 0 || (self.kind == CouponKind::Percentage && self.value > 100) {
            return Err(ApiError::BadRequest(format!(
                "invalid {} coupon value: {}",
                self.kind, self.value
            )));
        }

        let mut coupon = match self.kind {
            CouponKind::Percentage => Coupon::percentage(&self.code, self.value),
            CouponKind::Fixed => Coupon::fixed(&self.code, Money::new(self.value)),
        }
        .with_min_purchase(self.min_purchase)
        .with_validity(self.valid_from, self.valid_until);
        coupon.max_discount = self.max_discount;
        coupon.usage_limit = self.usage_limit;
        coupon.per_customer_limit = self.per_customer_limit;
        Ok(coupon)
    }
}

/// PUT /products/{id}
#[tracing::instrument(skip(state, payload))]
pub async fn upsert_product<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    payload: Result<Json<ProductRequest>, JsonRejection>,
) -> Result<Json<Product>, ApiError> {
    let Json(req) = payload?;
    if req.price.is_negative() {
        return Err(ApiError::BadRequest("price must not be negative".to_string()));
    }

    let mut product = Product::new(id, req.merchant_id, req.name, req.price);
    product.is_active = req.is_active;
    state.fulfillment.upsert_product(&product).await?;
    Ok(Json(product))
}

/// GET /products/{id}/stock
#[tracing::instrument(skip(state))]
pub async fn get_stock<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<Stock>, ApiError> {
    let stock = state
        .fulfillment
        .stock()
        .stock(&ProductId::new(id.as_str()))
        .await?
        .ok_or(FulfillmentError::NotFound { entity: "stock", id })?;
    Ok(Json(stock))
}

/// PUT /products/{id}/stock
#[tracing::instrument(skip(state, payload))]
pub async fn set_stock<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    payload: Result<Json<SetStockRequest>, JsonRejection>,
) -> Result<Json<Stock>, ApiError> {
    let Json(req) = payload?;
    let stock = state
        .fulfillment
        .stock()
        .set_stock(&ProductId::new(id), req.quantity, req.reorder_level)
        .await?;
    Ok(Json(stock))
}

/// POST /products/{id}/stock/adjustments
#[tracing::instrument(skip(state, payload))]
pub async fn adjust_stock<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    payload: Result<Json<AdjustStockRequest>, JsonRejection>,
) -> Result<Json<Stock>, ApiError> {
    let Json(req) = payload?;
    let stock = state
        .fulfillment
        .stock()
        .adjust(&ProductId::new(id), req.delta, req.reason, req.notes)
        .await?;
    Ok(Json(stock))
}

/// GET /products/{id}/stock/history
#[tracing::instrument(skip(state))]
pub async fn stock_history<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<StockHistory>>, ApiError> {
    Ok(Json(
        state
            .fulfillment
            .stock()
            .history(&ProductId::new(id))
            .await?,
    ))
}

/// GET /stock/low
#[tracing::instrument(skip(state))]
pub async fn low_stock<S: Store>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<Json<Vec<Stock>>, ApiError> {
    Ok(Json(state.fulfillment.stock().low_stock().await?))
}

/// POST /coupons
#[tracing::instrument(skip(state, payload))]
pub async fn create_coupon<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    payload: Result<Json<CouponRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Coupon>), ApiError> {
    let Json(req) = payload?;
    let coupon = state
        .fulfillment
        .coupons()
        .create_coupon(req.into_coupon()?)
        .await?;
    Ok((StatusCode::CREATED, Json(coupon)))
}

/// GET /coupons/{code}
#[tracing::instrument(skip(state))]
pub async fn get_coupon<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(code): Path<String>,
) -> Result<Json<Coupon>, ApiError> {
    let coupon = state
        .fulfillment
        .coupons()
        .get_coupon(&code)
        .await?
        .ok_or(FulfillmentError::NotFound {
            entity: "coupon",
            id: code,
        })?;
    Ok(Json(coupon))
}
