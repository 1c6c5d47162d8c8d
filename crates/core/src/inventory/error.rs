//! Inventory error types.
//!
//! `InventoryError` carries one variant per concrete failure; [`ErrorKind`]
//! groups them into the categories callers branch on.

use chrono::{DateTime, NaiveDate, Utc};
use kardex_shared::AppError;
use kardex_shared::types::{BranchId, ProductId};
use rust_decimal::Decimal;
use thiserror::Error;

/// Errors raised by a storage backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Serialization failure or deadlock; the transaction may be retried.
    #[error("Transaction conflict: {0}")]
    Conflict(String),

    /// Any other storage failure.
    #[error("Database error: {0}")]
    Database(String),
}

/// Category of an [`InventoryError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input shape or range.
    Validation,
    /// Product, branch or balance missing or inactive.
    NotFound,
    /// A withdrawal or transfer would make stock negative.
    InsufficientStock,
    /// Lock or serialization failure.
    Concurrency,
    /// Unexpected storage failure.
    Persistence,
}

/// Errors that can occur during inventory operations.
#[derive(Debug, Error)]
pub enum InventoryError {
    // ========== Validation Errors ==========
    /// Quantity must be strictly positive, or a count must not be negative.
    #[error("Invalid quantity: {0}")]
    InvalidQuantity(Decimal),

    /// A stock, threshold or price field is negative.
    #[error("{field} cannot be negative, got {value}")]
    NegativeValue {
        /// Field name.
        field: &'static str,
        /// Offending value.
        value: Decimal,
    },

    /// A stock, threshold or price does not fit `NUMERIC(19, 4)`: more than
    /// four decimal places or an absolute value of `10^15` or more.
    #[error("{field} is out of range: {value}")]
    OutOfRange {
        /// Field name.
        field: &'static str,
        /// Offending value.
        value: Decimal,
    },

    /// Applying the movement would push stock past the storable range.
    #[error("Stock of product {product_id} at branch {branch_id} would exceed the storable range")]
    StockOverflow {
        /// Product id.
        product_id: ProductId,
        /// Branch id.
        branch_id: BranchId,
    },

    /// Ledger totals of a product cannot be represented.
    #[error("Ledger totals for product {0} exceed the representable range")]
    ReplayOverflow(ProductId),

    /// Source and destination of a transfer are the same branch.
    #[error("Cannot transfer within the same branch {0}")]
    SameBranchTransfer(BranchId),

    /// A direct update carried no field.
    #[error("Update must change at least one field")]
    EmptyPatch,

    /// Date range runs backwards.
    #[error("Invalid date range: {from} is after {to}")]
    InvalidDateRange {
        /// Start date.
        from: NaiveDate,
        /// End date.
        to: NaiveDate,
    },

    /// Time range runs backwards.
    #[error("Invalid time range: {from} is after {until}")]
    InvalidTimeRange {
        /// Inclusive lower bound.
        from: DateTime<Utc>,
        /// Exclusive upper bound.
        until: DateTime<Utc>,
    },

    /// Logical timestamp lies in the past and backdating is disabled.
    #[error("Backdated movements are not allowed: {0}")]
    BackdatingNotAllowed(DateTime<Utc>),

    /// Logical timestamp lies too far in the future.
    #[error("Movement timestamp is in the future: {0}")]
    TimestampInFuture(DateTime<Utc>),

    // ========== Not Found Errors ==========
    /// Product not found.
    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    /// Product is inactive.
    #[error("Product {0} is inactive")]
    ProductInactive(ProductId),

    /// Branch not found.
    #[error("Branch not found: {0}")]
    BranchNotFound(BranchId),

    /// Branch is inactive.
    #[error("Branch {0} is inactive")]
    BranchInactive(BranchId),

    /// No balance row exists for the pair.
    #[error("No balance for product {product_id} at branch {branch_id}")]
    BalanceNotFound {
        /// Product id.
        product_id: ProductId,
        /// Branch id.
        branch_id: BranchId,
    },

    // ========== Stock Errors ==========
    /// Stock is lower than the requested quantity.
    #[error(
        "Insufficient stock for product {product_id} at branch {branch_id}: available {available}, requested {requested}"
    )]
    InsufficientStock {
        /// Product id.
        product_id: ProductId,
        /// Branch id.
        branch_id: BranchId,
        /// Stock at the time of the check.
        available: Decimal,
        /// Quantity requested.
        requested: Decimal,
    },

    // ========== Concurrency Errors ==========
    /// A single attempt lost a serialization race.
    #[error("Transaction conflict: {0}")]
    Conflict(String),

    /// Every attempt lost a serialization race.
    #[error("Transaction conflict persisted after {attempts} attempts")]
    RetriesExhausted {
        /// Number of attempts made.
        attempts: u32,
    },

    // ========== Persistence Errors ==========
    /// Storage failure.
    #[error("Persistence error: {0}")]
    Persistence(String),
}

impl From<StoreError> for InventoryError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(msg) => Self::Conflict(msg),
            StoreError::Database(msg) => Self::Persistence(msg),
        }
    }
}

impl From<InventoryError> for AppError {
    fn from(err: InventoryError) -> Self {
        let message = err.to_string();
        match err.kind() {
            ErrorKind::Validation => Self::Validation(message),
            ErrorKind::NotFound => Self::NotFound(message),
            ErrorKind::InsufficientStock => Self::InsufficientStock(message),
            ErrorKind::Concurrency => Self::Concurrency(message),
            ErrorKind::Persistence => Self::Database(message),
        }
    }
}

impl InventoryError {
    /// Returns the category of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidQuantity(_)
            | Self::NegativeValue { .. }
            | Self::OutOfRange { .. }
            | Self::StockOverflow { .. }
            | Self::ReplayOverflow(_)
            | Self::SameBranchTransfer(_)
            | Self::EmptyPatch
            | Self::InvalidDateRange { .. }
            | Self::InvalidTimeRange { .. }
            | Self::BackdatingNotAllowed(_)
            | Self::TimestampInFuture(_) => ErrorKind::Validation,
            Self::ProductNotFound(_)
            | Self::ProductInactive(_)
            | Self::BranchNotFound(_)
            | Self::BranchInactive(_)
            | Self::BalanceNotFound { .. } => ErrorKind::NotFound,
            Self::InsufficientStock { .. } => ErrorKind::InsufficientStock,
            Self::Conflict(_) | Self::RetriesExhausted { .. } => ErrorKind::Concurrency,
            Self::Persistence(_) => ErrorKind::Persistence,
        }
    }

    /// Returns the error code for API responses.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidQuantity(_) => "INVALID_QUANTITY",
            Self::NegativeValue { .. } => "NEGATIVE_VALUE",
            Self::OutOfRange { .. } => "VALUE_OUT_OF_RANGE",
            Self::StockOverflow { .. } => "STOCK_OVERFLOW",
            Self::ReplayOverflow(_) => "REPLAY_OVERFLOW",
            Self::SameBranchTransfer(_) => "SAME_BRANCH_TRANSFER",
            Self::EmptyPatch => "EMPTY_UPDATE",
            Self::InvalidDateRange { .. } | Self::InvalidTimeRange { .. } => "INVALID_DATE_RANGE",
            Self::BackdatingNotAllowed(_) => "BACKDATING_NOT_ALLOWED",
            Self::TimestampInFuture(_) => "TIMESTAMP_IN_FUTURE",
            Self::ProductNotFound(_) => "PRODUCT_NOT_FOUND",
            Self::ProductInactive(_) => "PRODUCT_INACTIVE",
            Self::BranchNotFound(_) => "BRANCH_NOT_FOUND",
            Self::BranchInactive(_) => "BRANCH_INACTIVE",
            Self::BalanceNotFound { .. } => "BALANCE_NOT_FOUND",
            Self::InsufficientStock { .. } => "INSUFFICIENT_STOCK",
            Self::Conflict(_) | Self::RetriesExhausted { .. } => "CONCURRENCY_CONFLICT",
            Self::Persistence(_) => "PERSISTENCE_ERROR",
        }
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self.kind() {
            ErrorKind::Validation => 400,
            ErrorKind::NotFound => 404,
            ErrorKind::InsufficientStock => 422,
            ErrorKind::Concurrency => 409,
            ErrorKind::Persistence => 500,
        }
    }

    /// Returns true if another attempt of the same operation may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_error_kinds() {
        assert_eq!(InventoryError::InvalidQuantity(dec!(0)).kind(), ErrorKind::Validation);
        assert_eq!(
            InventoryError::SameBranchTransfer(BranchId::new(1)).kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            InventoryError::BranchInactive(BranchId::new(1)).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            InventoryError::InsufficientStock {
                product_id: ProductId::new(1),
                branch_id: BranchId::new(1),
                available: dec!(10),
                requested: dec!(15),
            }
            .kind(),
            ErrorKind::InsufficientStock
        );
        assert_eq!(
            InventoryError::RetriesExhausted { attempts: 3 }.kind(),
            ErrorKind::Concurrency
        );
        assert_eq!(
            InventoryError::Persistence("boom".into()).kind(),
            ErrorKind::Persistence
        );
    }

    #[test]
    fn test_overflow_errors_are_validation() {
        let err = InventoryError::StockOverflow {
            product_id: ProductId::new(1),
            branch_id: BranchId::new(2),
        };
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(err.error_code(), "STOCK_OVERFLOW");

        let err = InventoryError::ReplayOverflow(ProductId::new(1));
        assert_eq!(err.http_status_code(), 400);
        assert!(!err.is_retryable());

        let err = InventoryError::OutOfRange {
            field: "unit_price",
            value: dec!(0.00001),
        };
        assert_eq!(err.error_code(), "VALUE_OUT_OF_RANGE");
    }

    #[test]
    fn test_http_status_codes() {
        assert_eq!(InventoryError::EmptyPatch.http_status_code(), 400);
        assert_eq!(
            InventoryError::ProductNotFound(ProductId::new(9)).http_status_code(),
            404
        );
        assert_eq!(
            InventoryError::Conflict("40001".into()).http_status_code(),
            409
        );
        assert_eq!(
            InventoryError::Persistence("down".into()).http_status_code(),
            500
        );
    }

    #[test]
    fn test_store_error_conversion() {
        let err: InventoryError = StoreError::Conflict("deadlock".into()).into();
        assert!(err.is_retryable());

        let err: InventoryError = StoreError::Database("gone".into()).into();
        assert!(!err.is_retryable());
        assert_eq!(err.error_code(), "PERSISTENCE_ERROR");
    }

    #[test]
    fn test_exhausted_retries_are_not_retryable() {
        assert!(!InventoryError::RetriesExhausted { attempts: 3 }.is_retryable());
    }

    #[test]
    fn test_error_display() {
        let err = InventoryError::InsufficientStock {
            product_id: ProductId::new(1),
            branch_id: BranchId::new(2),
            available: dec!(10),
            requested: dec!(15),
        };
        assert_eq!(
            err.to_string(),
            "Insufficient stock for product 1 at branch 2: available 10, requested 15"
        );

        let err = InventoryError::NegativeValue {
            field: "stock_minimum",
            value: dec!(-1),
        };
        assert_eq!(err.to_string(), "stock_minimum cannot be negative, got -1");
    }

    #[test]
    fn test_app_error_mapping_keeps_category() {
        let app: AppError = InventoryError::BranchInactive(BranchId::new(3)).into();
        assert_eq!(app.status_code(), 404);

        let app: AppError = InventoryError::RetriesExhausted { attempts: 3 }.into();
        assert_eq!(app.status_code(), 409);
        assert!(app.is_retryable());

        let app: AppError = InventoryError::Persistence("boom".into()).into();
        assert_eq!(app.error_code(), "DATABASE_ERROR");
    }
}
