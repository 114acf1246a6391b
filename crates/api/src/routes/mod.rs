//! Route handlers, one module per resource.

pub mod cart;
pub mod catalog;
pub mod health;
pub mod invoices;
pub mod merchants;
pub mod metrics;
pub mod orders;
pub mod payments;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use common::UserId;

use crate::error::ApiError;

/// Header carrying the authenticated caller, set by the gateway in front of us.
pub const USER_ID_HEADER: &str = "x-user-id";

/// The calling user, read from [`USER_ID_HEADER`].
#[derive(Debug, Clone, Copy)]
pub struct Caller(pub UserId);

impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(USER_ID_HEADER)
            .ok_or_else(|| ApiError::BadRequest(format!("missing {USER_ID_HEADER} header")))?;
        let value = value
            .to_str()
            .map_err(|_| ApiError::BadRequest(format!("invalid {USER_ID_HEADER} header")))?;
        Ok(Caller(value.parse()?))
    }
}
