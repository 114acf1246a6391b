//! Invoice reads and status changes.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use common::{InvoiceId, OrderId};
use domain::{Invoice, TransactionLog};
use fulfillment::FulfillmentError;
use serde::Deserialize;
use store::Store;

use super::Caller;
use crate::AppState;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct CancelRequest {
    pub reason: String,
}

/// GET /invoices/{id}
#[tracing::instrument(skip(state))]
pub async fn get<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<Invoice>, ApiError> {
    let invoice_id: InvoiceId = id.parse()?;
    let invoice = state
        .fulfillment
        .invoices()
        .get_invoice(invoice_id)
        .await?
        .ok_or(FulfillmentError::NotFound {
            entity: "invoice",
            id,
        })?;
    Ok(Json(invoice))
}

/// POST /invoices/{id}/send
#[tracing::instrument(skip(state))]
pub async fn send<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<Invoice>, ApiError> {
    Ok(Json(
        state.fulfillment.invoices().mark_as_sent(id.parse()?).await?,
    ))
}

/// POST /invoices/{id}/pay
#[tracing::instrument(skip(state))]
pub async fn pay<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<Invoice>, ApiError> {
    Ok(Json(
        state.fulfillment.invoices().mark_as_paid(id.parse()?).await?,
    ))
}

/// POST /invoices/{id}/overdue
#[tracing::instrument(skip(state))]
pub async fn overdue<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<Invoice>, ApiError> {
    Ok(Json(
        state
            .fulfillment
            .invoices()
            .mark_as_overdue(id.parse()?)
            .await?,
    ))
}

/// POST /invoices/{id}/cancel
#[tracing::instrument(skip(state, payload))]
pub async fn cancel<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    payload: Result<Json<CancelRequest>, JsonRejection>,
) -> Result<Json<Invoice>, ApiError> {
    let invoice_id: InvoiceId = id.parse()?;
    let Json(req) = payload?;
    Ok(Json(
        state
            .fulfillment
            .invoices()
            .cancel(invoice_id, &req.reason)
            .await?,
    ))
}

/// GET /orders/{id}/transactions
#[tracing::instrument(skip(state))]
pub async fn order_transactions<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<TransactionLog>>, ApiError> {
    let order_id: OrderId = id.parse()?;
    Ok(Json(state.fulfillment.journal().for_order(order_id).await?))
}

/// GET /transactions: the caller's money movements.
#[tracing::instrument(skip(state))]
pub async fn my_transactions<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Caller(user_id): Caller,
) -> Result<Json<Vec<TransactionLog>>, ApiError> {
    Ok(Json(state.fulfillment.journal().for_user(user_id).await?))
}
