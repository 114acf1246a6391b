//! Checkout, order reads and status transitions.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use common::{MerchantId, Money, OrderId, Page, PageRequest};
use domain::{NewOrder, Order, ShippingAddress};
use fulfillment::OrderDetails;
use serde::Deserialize;
use store::{OrderFilter, Store};

use super::Caller;
use crate::AppState;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub merchant_id: MerchantId,
    #[serde(default)]
    pub shipping_cost: Money,
    pub coupon_code: Option<String>,
    pub notes: Option<String>,
    pub shipping_address: Option<ShippingAddress>,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    /// Lists the merchant's orders instead of the caller's.
    pub merchant_id: Option<MerchantId>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ShipRequest {
    pub tracking_number: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CancelRequest {
    pub reason: String,
}

/// POST /orders: checks out the caller's cart.
#[tracing::instrument(skip(state, payload))]
pub async fn create<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Caller(user_id): Caller,
    payload: Result<Json<CheckoutRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<OrderDetails>), ApiError> {
    let Json(req) = payload?;
    let input = NewOrder {
        coupon_code: req.coupon_code.filter(|code| !code.trim().is_empty()),
        shipping_cost: req.shipping_cost,
        notes: req.notes,
        shipping_address: req.shipping_address,
    };

    let details = state
        .fulfillment
        .orders()
        .create_from_cart(user_id, req.merchant_id, input)
        .await?;
    Ok((StatusCode::CREATED, Json(details)))
}

/// GET /orders?page&per_page[&merchant_id]
#[tracing::instrument(skip(state, query))]
pub async fn list<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Caller(user_id): Caller,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<Json<Page<Order>>, ApiError> {
    let Query(query) = query?;
    let filter = match query.merchant_id {
        Some(merchant_id) => OrderFilter::Merchant(merchant_id),
        None => OrderFilter::User(user_id),
    };
    let page = PageRequest::new(
        query.page.unwrap_or(1),
        query.per_page.unwrap_or(PageRequest::DEFAULT_PER_PAGE),
    );

    Ok(Json(
        state.fulfillment.orders().list_orders(filter, page).await?,
    ))
}

/// GET /orders/{id}
#[tracing::instrument(skip(state))]
pub async fn get<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<OrderDetails>, ApiError> {
    let order_id: OrderId = id.parse()?;
    Ok(Json(state.fulfillment.orders().get_order(order_id).await?))
}

/// POST /orders/{id}/confirm
#[tracing::instrument(skip(state))]
pub async fn confirm<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Caller(user_id): Caller,
    Path(id): Path<String>,
) -> Result<Json<Order>, ApiError> {
    let order = state
        .fulfillment
        .orders()
        .confirm(id.parse()?, Some(user_id))
        .await?;
    Ok(Json(order))
}

/// POST /orders/{id}/process
#[tracing::instrument(skip(state))]
pub async fn process<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Caller(user_id): Caller,
    Path(id): Path<String>,
) -> Result<Json<Order>, ApiError> {
    let order = state
        .fulfillment
        .orders()
        .start_processing(id.parse()?, Some(user_id))
        .await?;
    Ok(Json(order))
}

/// POST /orders/{id}/ship, with an optional tracking number body.
#[tracing::instrument(skip(state, payload))]
pub async fn ship<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Caller(user_id): Caller,
    Path(id): Path<String>,
    payload: Option<Json<ShipRequest>>,
) -> Result<Json<Order>, ApiError> {
    let req = payload.map(|Json(req)| req).unwrap_or_default();
    let order = state
        .fulfillment
        .orders()
        .ship(id.parse()?, req.tracking_number, Some(user_id))
        .await?;
    Ok(Json(order))
}

/// POST /orders/{id}/deliver
#[tracing::instrument(skip(state))]
pub async fn deliver<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Caller(user_id): Caller,
    Path(id): Path<String>,
) -> Result<Json<Order>, ApiError> {
    let order = state
        .fulfillment
        .orders()
        .deliver(id.parse()?, Some(user_id))
        .await?;
    Ok(Json(order))
}

/// POST /orders/{id}/complete
#[tracing::instrument(skip(state))]
pub async fn complete<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Caller(user_id): Caller,
    Path(id): Path<String>,
) -> Result<Json<Order>, ApiError> {
    let order = state
        .fulfillment
        .orders()
        .complete(id.parse()?, Some(user_id))
        .await?;
    Ok(Json(order))
}

/// POST /orders/{id}/refund: marks a delivered or completed order refunded.
#[tracing::instrument(skip(state))]
pub async fn refund<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Caller(user_id): Caller,
    Path(id): Path<String>,
) -> Result<Json<Order>, ApiError> {
    let order = state
        .fulfillment
        .orders()
        .mark_refunded(id.parse()?, Some(user_id))
        .await?;
    Ok(Json(order))
}

/// POST /orders/{id}/cancel
#[tracing::instrument(skip(state, payload))]
pub async fn cancel<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Caller(user_id): Caller,
    Path(id): Path<String>,
    payload: Result<Json<CancelRequest>, JsonRejection>,
) -> Result<Json<Order>, ApiError> {
    let order_id: OrderId = id.parse()?;
    let Json(req) = payload?;
    if req.reason.trim().is_empty() {
        return Err(ApiError::BadRequest("reason must not be empty".to_string()));
    }

    let order = state
        .fulfillment
        .orders()
        .cancel(order_id, req.reason, Some(user_id))
        .await?;
    Ok(Json(order))
}
