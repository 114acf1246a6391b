//! API error types with HTTP response mapping.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use common::ParseIdError;
use fulfillment::{ErrorKind, FulfillmentError};
use thiserror::Error;

/// API-level error type that maps to HTTP responses.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed request: bad JSON, bad identifier, missing caller.
    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Fulfillment(#[from] FulfillmentError),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Fulfillment(err) => match err.kind() {
                ErrorKind::Validation => StatusCode::BAD_REQUEST,
                ErrorKind::BusinessRule => StatusCode::UNPROCESSABLE_ENTITY,
                ErrorKind::NotFound => StatusCode::NOT_FOUND,
                ErrorKind::Conflict => StatusCode::CONFLICT,
                ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "internal server error");
        }
        metrics::counter!("http_errors_total", "status" => status.as_u16().to_string())
            .increment(1);

        // Internal details stay in the log.
        let message = if status.is_server_error() {
            "internal server error".to_string()
        } else {
            self.to_string()
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

impl From<ParseIdError> for ApiError {
    fn from(err: ParseIdError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use common::{OrderId, ProductId};

    use super::*;

    #[test]
    fn test_status_follows_error_kind() {
        let cases = [
            (FulfillmentError::Validation("bad".into()), StatusCode::BAD_REQUEST),
            (FulfillmentError::EmptyCart, StatusCode::UNPROCESSABLE_ENTITY),
            (
                FulfillmentError::InsufficientStock {
                    product_id: ProductId::new("SKU-001"),
                    requested: 3,
                },
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                FulfillmentError::NotFound {
                    entity: "order",
                    id: "x".into(),
                },
                StatusCode::NOT_FOUND,
            ),
            (
                FulfillmentError::DuplicatePayment {
                    order_id: OrderId::new(),
                },
                StatusCode::CONFLICT,
            ),
        ];

        for (err, expected) in cases {
            assert_eq!(ApiError::from(err).status(), expected);
        }
    }

    #[test]
    fn test_bad_id_is_bad_request() {
        let err: ApiError = "not-a-uuid".parse::<OrderId>().unwrap_err().into();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }
}
