//! Payment endpoints. The gateway itself is outside this service; these
//! record what it reported.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::{Money, OrderId, PaymentId};
use domain::{Payment, PaymentMethod};
use fulfillment::FulfillmentError;
use serde::Deserialize;
use store::Store;

use crate::AppState;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct CreatePaymentRequest {
    pub method: PaymentMethod,
}

#[derive(Debug, Default, Deserialize)]
pub struct CompleteRequest {
    pub gateway_reference: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FailRequest {
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct RefundRequest {
    pub amount: Option<Money>,
    pub reason: String,
}

/// POST /orders/{id}/payment
#[tracing::instrument(skip(state, payload))]
pub async fn create<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    payload: Result<Json<CreatePaymentRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Payment>), ApiError> {
    let order_id: OrderId = id.parse()?;
    let Json(req) = payload?;
    let payment = state
        .fulfillment
        .payments()
        .create_payment(order_id, req.method)
        .await?;
    Ok((StatusCode::CREATED, Json(payment)))
}

/// GET /payments/{id}
#[tracing::instrument(skip(state))]
pub async fn get<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<Payment>, ApiError> {
    let payment_id: PaymentId = id.parse()?;
    let payment = state
        .fulfillment
        .payments()
        .get_payment(payment_id)
        .await?
        .ok_or(FulfillmentError::NotFound {
            entity: "payment",
            id,
        })?;
    Ok(Json(payment))
}

/// POST /payments/{id}/complete
#[tracing::instrument(skip(state, payload))]
pub async fn complete<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    payload: Option<Json<CompleteRequest>>,
) -> Result<Json<Payment>, ApiError> {
    let payment_id: PaymentId = id.parse()?;
    let req = payload.map(|Json(req)| req).unwrap_or_default();
    let payment = state
        .fulfillment
        .payments()
        .mark_as_completed(payment_id, req.gateway_reference)
        .await?;
    Ok(Json(payment))
}

/// POST /payments/{id}/fail
#[tracing::instrument(skip(state, payload))]
pub async fn fail<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    payload: Result<Json<FailRequest>, JsonRejection>,
) -> Result<Json<Payment>, ApiError> {
    let payment_id: PaymentId = id.parse()?;
    let Json(req) = payload?;
    let payment = state
        .fulfillment
        .payments()
        .mark_as_failed(payment_id, req.reason)
        .await?;
    Ok(Json(payment))
}

/// POST /payments/{id}/refund. Without an amount the full payment is refunded.
#[tracing::instrument(skip(state, payload))]
pub async fn refund<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    payload: Result<Json<RefundRequest>, JsonRejection>,
) -> Result<Json<Payment>, ApiError> {
    let payment_id: PaymentId = id.parse()?;
    let Json(req) = payload?;
    let payment = state
        .fulfillment
        .payments()
        .refund(payment_id, req.amount, req.reason)
        .await?;
    Ok(Json(payment))
}
