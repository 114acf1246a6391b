//! Cart endpoints for the calling user.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use common::ProductId;
use domain::Cart;
use serde::Deserialize;
use store::Store;

use super::Caller;
use crate::AppState;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct AddItemRequest {
    pub product_id: String,
    pub quantity: u32,
}

#[derive(Debug, Deserialize)]
pub struct UpdateItemRequest {
    pub quantity: u32,
}

/// GET /cart
#[tracing::instrument(skip(state))]
pub async fn get<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Caller(user_id): Caller,
) -> Result<Json<Cart>, ApiError> {
    Ok(Json(state.fulfillment.carts().get_cart(user_id).await?))
}

/// POST /cart/items
#[tracing::instrument(skip(state, payload))]
pub async fn add_item<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Caller(user_id): Caller,
    payload: Result<Json<AddItemRequest>, JsonRejection>,
) -> Result<Json<Cart>, ApiError> {
    let Json(req) = payload?;
    let product_id = ProductId::new(req.product_id);
    let cart = state
        .fulfillment
        .carts()
        .add_item(user_id, &product_id, req.quantity)
        .await?;
    Ok(Json(cart))
}

/// PUT /cart/items/{product_id}
#[tracing::instrument(skip(state, payload))]
pub async fn update_item<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Caller(user_id): Caller,
    Path(product_id): Path<String>,
    payload: Result<Json<UpdateItemRequest>, JsonRejection>,
) -> Result<Json<Cart>, ApiError> {
    let Json(req) = payload?;
    let cart = state
        .fulfillment
        .carts()
        .update_item(user_id, &ProductId::new(product_id), req.quantity)
        .await?;
    Ok(Json(cart))
}

/// DELETE /cart/items/{product_id}
#[tracing::instrument(skip(state))]
pub async fn remove_item<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Caller(user_id): Caller,
    Path(product_id): Path<String>,
) -> Result<Json<Cart>, ApiError> {
    let cart = state
        .fulfillment
        .carts()
        .remove_item(user_id, &ProductId::new(product_id))
        .await?;
    Ok(Json(cart))
}

/// DELETE /cart
#[tracing::instrument(skip(state))]
pub async fn clear<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Caller(user_id): Caller,
) -> Result<Json<Cart>, ApiError> {
    Ok(Json(state.fulfillment.carts().clear(user_id).await?))
}
