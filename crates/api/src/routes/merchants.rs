//! Merchant statistics.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use common::MerchantId;
use fulfillment::MerchantStats;
use store::Store;

use crate::AppState;
use crate::error::ApiError;

/// GET /merchants/{id}/stats
#[tracing::instrument(skip(state))]
pub async fn stats<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<MerchantStats>, ApiError> {
    let merchant_id: MerchantId = id.parse()?;
    Ok(Json(
        state.fulfillment.orders().merchant_stats(merchant_id).await?,
    ))
}
