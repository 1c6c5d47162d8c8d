//! Property-based tests for historical reconstruction.
//!
//! Feature: inventory-ledger
//! - Property 5: Historical Split Identity
//! - Property 6: Kardex Ends At Closing

use chrono::{DateTime, Duration, TimeZone, Utc};
use proptest::prelude::*;
use rust_decimal::Decimal;

use kardex_shared::types::{ActorId, BranchId, MovementId, ProductId};

use super::replay::{self, HistoryQuery};
use super::types::{MovementEntry, MovementType, NewMovement};

const PRODUCT: ProductId = ProductId::new(1);

fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
}

/// Strategy to generate one ledger row on one of 60 days.
fn movement() -> impl Strategy<Value = (u32, MovementType, i64, i64, Option<i64>, i64)> {
    (
        0u32..60,
        prop_oneof![
            Just(MovementType::Entry),
            Just(MovementType::Exit),
            Just(MovementType::Transfer),
            Just(MovementType::Adjustment),
        ],
        1i64..10_000,
        1i64..=3,
        prop::option::of(1i64..500),
        1i64..=3,
    )
}

fn history() -> impl Strategy<Value = Vec<MovementEntry>> {
    prop::collection::vec(movement(), 0..50).prop_map(|rows| {
        rows.into_iter()
            .enumerate()
            .map(|(i, (day, movement_type, cents, source, price, other))| {
                let at = epoch() + Duration::days(i64::from(day));
                let mut quantity = Decimal::new(cents, 2);
                if movement_type == MovementType::Adjustment && cents % 2 == 0 {
                    quantity = -quantity;
                }
                let destination = (movement_type == MovementType::Transfer)
                    .then(|| if other == source { source % 3 + 1 } else { other });
                MovementEntry::from_new(
                    MovementId::new(i64::try_from(i).unwrap() + 1),
                    at,
                    NewMovement {
                        product_id: PRODUCT,
                        source_branch_id: BranchId::new(source),
                        destination_branch_id: destination.map(BranchId::new),
                        movement_type,
                        quantity,
                        resulting_balance: Decimal::ZERO,
                        destination_resulting_balance: None,
                        unit_price: price.map(|p| Decimal::new(p, 1)),
                        related_document: None,
                        actor_id: ActorId::new(1),
                        authorized: false,
                        authorizer_id: None,
                        note: None,
                        recorded_at: at,
                        external_reference: None,
                    },
                )
            })
            .collect()
    })
}

fn window() -> impl Strategy<Value = (i64, i64)> {
    (0i64..70, 0i64..70).prop_map(|(a, b)| (a.min(b), a.max(b)))
}

fn branch_filter() -> impl Strategy<Value = Option<BranchId>> {
    prop::option::of((1i64..=3).prop_map(BranchId::new))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Feature: inventory-ledger, Property 5: Historical Split Identity
    /// opening + ingress - egress == closing, and closing equals the fold
    /// of every leg before the end of the period.
    #[test]
    fn prop_split_identity(
        entries in history(),
        (start, end) in window(),
        branch_id in branch_filter(),
    ) {
        let from = epoch() + Duration::days(start);
        let until = epoch() + Duration::days(end);
        let query = HistoryQuery::new(PRODUCT, branch_id, from, until).unwrap();
        let stock = replay::reconstruct(&entries, &query, Decimal::TEN).unwrap();

        prop_assert_eq!(
            stock.opening.checked_add(stock.ingress).and_then(|v| v.checked_sub(stock.egress)),
            Some(stock.closing)
        );
        prop_assert!(stock.ingress.quantity >= Decimal::ZERO);
        prop_assert!(stock.egress.quantity >= Decimal::ZERO);
        prop_assert_eq!(
            stock.closing.quantity,
            replay::stock_at(&entries, PRODUCT, branch_id, Some(until)).unwrap()
        );
        prop_assert_eq!(
            stock.opening.quantity,
            replay::stock_at(&entries, PRODUCT, branch_id, Some(from)).unwrap()
        );
    }

    /// Feature: inventory-ledger, Property 5: Historical Split Identity
    /// The aggregated closing is the sum of every branch's closing.
    #[test]
    fn prop_aggregate_is_sum_of_branches(entries in history(), (start, end) in window()) {
        let from = epoch() + Duration::days(start);
        let until = epoch() + Duration::days(end);
        let all = HistoryQuery::new(PRODUCT, None, from, until).unwrap();
        let total = replay::reconstruct(&entries, &all, Decimal::ONE).unwrap().closing;

        let mut sum = replay::Valued::default();
        for id in 1..=3 {
            let query = HistoryQuery::new(PRODUCT, Some(BranchId::new(id)), from, until).unwrap();
            let closing = replay::reconstruct(&entries, &query, Decimal::ONE).unwrap().closing;
            sum = sum.checked_add(closing).unwrap();
        }
        prop_assert_eq!(total, sum);
    }

    /// Feature: inventory-ledger, Property 6: Kardex Ends At Closing
    #[test]
    fn prop_kardex_running_totals(
        entries in history(),
        (start, end) in window(),
        branch_id in branch_filter(),
    ) {
        let from = epoch() + Duration::days(start);
        let until = epoch() + Duration::days(end);
        let query = HistoryQuery::new(PRODUCT, branch_id, from, until).unwrap();
        let report = replay::kardex(&entries, &query, Decimal::TEN).unwrap();

        let mut running = report.summary.opening;
        for row in &report.rows {
            prop_assert!(row.recorded_at >= from && row.recorded_at < until);
            running.quantity += row.ingress - row.egress;
            running.value += row.value;
            prop_assert_eq!(running.quantity, row.running_quantity);
            prop_assert_eq!(running.value, row.running_value);
        }
        prop_assert_eq!(running, report.summary.closing);
    }
}
