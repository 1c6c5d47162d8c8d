//! Input rules checked before any transaction is opened.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use super::error::InventoryError;
use super::types::{BalancePatch, LedgerPolicy, MovementDetails};

/// Decimal places kept by the `NUMERIC(19, 4)` columns.
pub const MAX_SCALE: u32 = 4;

/// Integer digits kept by the `NUMERIC(19, 4)` columns.
pub const MAX_INTEGER_DIGITS: u32 = 15;

/// Returns true if `value` is stored by a `NUMERIC(19, 4)` column unchanged.
#[must_use]
pub fn fits_column(value: Decimal) -> bool {
    let bound = Decimal::from(10_u64.pow(MAX_INTEGER_DIGITS));
    value.normalize().scale() <= MAX_SCALE && value.abs() < bound
}

/// Quantities moved by ingest, withdraw and transfer must be strictly positive.
///
/// # Errors
///
/// Returns `InvalidQuantity` for zero, negative or unstorable values.
pub fn require_positive(quantity: Decimal) -> Result<(), InventoryError> {
    if quantity <= Decimal::ZERO || !fits_column(quantity) {
        return Err(InventoryError::InvalidQuantity(quantity));
    }
    Ok(())
}

/// A physical count may be zero but never negative.
///
/// # Errors
///
/// Returns `InvalidQuantity` for negative or unstorable values.
pub fn require_counted(counted_stock: Decimal) -> Result<(), InventoryError> {
    if counted_stock < Decimal::ZERO || !fits_column(counted_stock) {
        return Err(InventoryError::InvalidQuantity(counted_stock));
    }
    Ok(())
}

fn require_non_negative(field: &'static str, value: Decimal) -> Result<(), InventoryError> {
    if value < Decimal::ZERO {
        return Err(InventoryError::NegativeValue { field, value });
    }
    if !fits_column(value) {
        return Err(InventoryError::OutOfRange { field, value });
    }
    Ok(())
}

/// Checks the optional movement metadata.
///
/// # Errors
///
/// Returns `NegativeValue` or `OutOfRange` for a bad unit price.
pub fn validate_details(details: &MovementDetails) -> Result<(), InventoryError> {
    if let Some(price) = details.unit_price {
        require_non_negative("unit_price", price)?;
    }
    Ok(())
}

/// A direct update must carry at least one field and no negative values.
///
/// # Errors
///
/// Returns `EmptyPatch`, `NegativeValue` or `OutOfRange`.
pub fn validate_patch(patch: &BalancePatch) -> Result<(), InventoryError> {
    if patch.is_empty() {
        return Err(InventoryError::EmptyPatch);
    }
    if let Some(stock) = patch.stock {
        require_non_negative("stock", stock)?;
    }
    if let Some(stock_minimum) = patch.stock_minimum {
        require_non_negative("stock_minimum", stock_minimum)?;
    }
    if let Some(Some(price)) = patch.sale_price_override {
        require_non_negative("sale_price_override", price)?;
    }
    Ok(())
}

/// Resolves the logical registration time of a movement.
///
/// Absent timestamps default to `now`. Supplied timestamps within the clock
/// skew of `now` are accepted as-is; earlier ones need `allow_backdating`
/// and later ones are always rejected.
///
/// # Errors
///
/// Returns `BackdatingNotAllowed` or `TimestampInFuture`.
pub fn resolve_recorded_at(
    requested: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    policy: &LedgerPolicy,
) -> Result<DateTime<Utc>, InventoryError> {
    let Some(at) = requested else {
        return Ok(now);
    };
    if at > now + policy.max_clock_skew {
        return Err(InventoryError::TimestampInFuture(at));
    }
    if at < now - policy.max_clock_skew && !policy.allow_backdating {
        return Err(InventoryError::BackdatingNotAllowed(at));
    }
    Ok(at)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rstest::rstest;
    use rust_decimal_macros::dec;

    #[rstest]
    #[case(dec!(0.0001), true)]
    #[case(dec!(10), true)]
    #[case(dec!(0), false)]
    #[case(dec!(-1), false)]
    fn test_require_positive(#[case] quantity: Decimal, #[case] ok: bool) {
        assert_eq!(require_positive(quantity).is_ok(), ok);
    }

    #[rstest]
    #[case(dec!(0.00001), false)]
    #[case(dec!(1.23456), false)]
    #[case(dec!(1.50000), true)]
    #[case(dec!(999999999999999.9999), true)]
    #[case(dec!(1000000000000000), false)]
    #[case(Decimal::MAX, false)]
    fn test_require_positive_storable(#[case] quantity: Decimal, #[case] ok: bool) {
        let result = require_positive(quantity);
        assert_eq!(result.is_ok(), ok);
        if !ok {
            assert!(matches!(result, Err(InventoryError::InvalidQuantity(_))));
        }
    }

    #[rstest]
    #[case(dec!(0), true)]
    #[case(dec!(3), true)]
    #[case(dec!(-0.5), false)]
    #[case(dec!(2.00005), false)]
    #[case(dec!(5000000000000000), false)]
    fn test_require_counted(#[case] counted: Decimal, #[case] ok: bool) {
        assert_eq!(require_counted(counted).is_ok(), ok);
    }

    #[test]
    fn test_empty_patch_rejected() {
        assert!(matches!(
            validate_patch(&BalancePatch::default()),
            Err(InventoryError::EmptyPatch)
        ));
    }

    #[test]
    fn test_negative_patch_fields_rejected() {
        let err = validate_patch(&BalancePatch {
            stock_minimum: Some(dec!(-1)),
            ..BalancePatch::default()
        })
        .unwrap_err();
        assert!(matches!(
            err,
            InventoryError::NegativeValue {
                field: "stock_minimum",
                ..
            }
        ));

        let err = validate_patch(&BalancePatch {
            sale_price_override: Some(Some(dec!(-0.01))),
            ..BalancePatch::default()
        })
        .unwrap_err();
        assert!(matches!(
            err,
            InventoryError::NegativeValue {
                field: "sale_price_override",
                ..
            }
        ));
    }

    #[rstest]
    #[case("stock", dec!(1000000000000000))]
    #[case("stock_minimum", dec!(0.12345))]
    #[case("sale_price_override", dec!(99999999999999999))]
    fn test_unstorable_patch_fields_rejected(#[case] field: &'static str, #[case] value: Decimal) {
        let patch = match field {
            "stock" => BalancePatch::stock(value),
            "stock_minimum" => BalancePatch {
                stock_minimum: Some(value),
                ..BalancePatch::default()
            },
            _ => BalancePatch {
                sale_price_override: Some(Some(value)),
                ..BalancePatch::default()
            },
        };
        let err = validate_patch(&patch).unwrap_err();
        assert!(matches!(err, InventoryError::OutOfRange { field: f, .. } if f == field));
    }

    #[test]
    fn test_unstorable_unit_price_rejected() {
        let details = MovementDetails {
            unit_price: Some(dec!(1000000000000000)),
            ..MovementDetails::default()
        };
        assert!(matches!(
            validate_details(&details),
            Err(InventoryError::OutOfRange {
                field: "unit_price",
                ..
            })
        ));
    }

    #[test]
    fn test_clearing_price_is_a_valid_patch() {
        assert!(validate_patch(&BalancePatch {
            sale_price_override: Some(None),
            ..BalancePatch::default()
        })
        .is_ok());
    }

    #[test]
    fn test_negative_unit_price_rejected() {
        let details = MovementDetails {
            unit_price: Some(dec!(-2)),
            ..MovementDetails::default()
        };
        assert!(validate_details(&details).is_err());
    }

    #[test]
    fn test_recorded_at_defaults_to_now() {
        let now = Utc::now();
        let at = resolve_recorded_at(None, now, &LedgerPolicy::default()).unwrap();
        assert_eq!(at, now);
    }

    #[test]
    fn test_backdating_requires_policy() {
        let now = Utc::now();
        let past = now - Duration::days(3);

        let strict = LedgerPolicy::default();
        assert!(matches!(
            resolve_recorded_at(Some(past), now, &strict),
            Err(InventoryError::BackdatingNotAllowed(_))
        ));

        let lenient = LedgerPolicy {
            allow_backdating: true,
            ..LedgerPolicy::default()
        };
        assert_eq!(resolve_recorded_at(Some(past), now, &lenient).unwrap(), past);
    }

    #[test]
    fn test_small_skew_is_tolerated() {
        let now = Utc::now();
        let policy = LedgerPolicy::default();
        let slightly_behind = now - Duration::seconds(10);
        let slightly_ahead = now + Duration::seconds(10);
        assert!(resolve_recorded_at(Some(slightly_behind), now, &policy).is_ok());
        assert!(resolve_recorded_at(Some(slightly_ahead), now, &policy).is_ok());
    }

    #[test]
    fn test_future_timestamp_rejected_even_with_backdating() {
        let now = Utc::now();
        let policy = LedgerPolicy {
            allow_backdating: true,
            ..LedgerPolicy::default()
        };
        assert!(matches!(
            resolve_recorded_at(Some(now + Duration::hours(1)), now, &policy),
            Err(InventoryError::TimestampInFuture(_))
        ));
    }
}
