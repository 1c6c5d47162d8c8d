//! Error responses.
//!
//! Every failure is rendered as `{"error": <code>, "message": <text>}` with
//! the status code of its category.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use kardex_core::inventory::InventoryError;
use kardex_shared::AppError;
use serde_json::json;
use tracing::error;

/// Error returned by every handler.
#[derive(Debug)]
pub struct ApiError {
    error: AppError,
    code: &'static str,
}

impl ApiError {
    /// A 400 response with the generic validation code.
    pub fn validation(message: impl Into<String>) -> Self {
        AppError::Validation(message.into()).into()
    }

    /// The HTTP status this error renders with.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.error.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// Stable error code placed in the response body.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        self.code
    }
}

impl From<AppError> for ApiError {
    fn from(error: AppError) -> Self {
        let code = error.error_code();
        Self { error, code }
    }
}

impl From<InventoryError> for ApiError {
    fn from(err: InventoryError) -> Self {
        let code = err.error_code();
        Self {
            error: err.into(),
            code,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self.error {
            AppError::Database(detail) | AppError::Internal(detail) => {
                error!(code = self.code, error = %detail, "Request failed");
                "An internal error occurred".to_string()
            }
            AppError::NotFound(msg)
            | AppError::Validation(msg)
            | AppError::InsufficientStock(msg)
            | AppError::Concurrency(msg) => msg.clone(),
        };

        (
            status,
            Json(json!({
                "error": self.code,
                "message": message
            })),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kardex_shared::types::{BranchId, ProductId};
    use rstest::rstest;
    use rust_decimal_macros::dec;

    #[rstest]
    #[case(InventoryError::InvalidQuantity(dec!(0)), StatusCode::BAD_REQUEST, "INVALID_QUANTITY")]
    #[case(InventoryError::EmptyPatch, StatusCode::BAD_REQUEST, "EMPTY_UPDATE")]
    #[case(InventoryError::ProductNotFound(ProductId::new(1)), StatusCode::NOT_FOUND, "PRODUCT_NOT_FOUND")]
    #[case(InventoryError::BranchInactive(BranchId::new(1)), StatusCode::NOT_FOUND, "BRANCH_INACTIVE")]
    #[case(
        InventoryError::InsufficientStock {
            product_id: ProductId::new(1),
            branch_id: BranchId::new(1),
            available: dec!(1),
            requested: dec!(2),
        },
        StatusCode::UNPROCESSABLE_ENTITY,
        "INSUFFICIENT_STOCK"
    )]
    #[case(InventoryError::RetriesExhausted { attempts: 3 }, StatusCode::CONFLICT, "CONCURRENCY_CONFLICT")]
    #[case(InventoryError::Persistence("down".into()), StatusCode::INTERNAL_SERVER_ERROR, "PERSISTENCE_ERROR")]
    fn test_inventory_error_status(
        #[case] err: InventoryError,
        #[case] status: StatusCode,
        #[case] code: &str,
    ) {
        let api: ApiError = err.into();
        assert_eq!(api.status(), status);
        assert_eq!(api.code(), code);
        assert_eq!(api.into_response().status(), status);
    }

    #[test]
    fn test_validation_helper() {
        let api = ApiError::validation("bad header");
        assert_eq!(api.status(), StatusCode::BAD_REQUEST);
        assert_eq!(api.code(), "VALIDATION_ERROR");
    }
}
