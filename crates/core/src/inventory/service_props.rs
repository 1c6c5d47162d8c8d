//! Property-based tests for InventoryService.
//!
//! Feature: inventory-ledger
//! - Property 1: Transfer Conservation
//! - Property 2: Replay Consistency
//! - Property 3: Non-Negative Balances
//! - Property 4: Matching Count Is A No-Op

use proptest::prelude::*;
use rust_decimal::Decimal;
use tokio::runtime::Runtime;

use kardex_shared::types::{ActorId, BranchId, ProductId};

use super::error::InventoryError;
use super::memory::MemoryStore;
use super::replay;
use super::service::InventoryService;
use super::types::{
    Actor, AdjustCommand, BranchInfo, IngestCommand, LedgerPolicy, MovementDetails,
    MovementFilter, ProductInfo, TransferCommand, WithdrawCommand,
};

const PRODUCT: ProductId = ProductId::new(1);
const BRANCHES: [i64; 3] = [1, 2, 3];

#[derive(Debug, Clone)]
enum Op {
    Ingest(i64, Decimal),
    Withdraw(i64, Decimal),
    Transfer(i64, i64, Decimal),
    Adjust(i64, Decimal),
}

/// Strategy to generate quantities from 0.01 to 100.00.
fn quantity() -> impl Strategy<Value = Decimal> {
    (1i64..10_000i64).prop_map(|cents| Decimal::new(cents, 2))
}

/// Strategy to generate counted stock from 0.00 to 100.00.
fn counted() -> impl Strategy<Value = Decimal> {
    (0i64..10_000i64).prop_map(|cents| Decimal::new(cents, 2))
}

fn branch() -> impl Strategy<Value = i64> {
    1i64..=3
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (branch(), quantity()).prop_map(|(b, q)| Op::Ingest(b, q)),
        (branch(), quantity()).prop_map(|(b, q)| Op::Withdraw(b, q)),
        (branch(), branch(), quantity()).prop_map(|(a, b, q)| Op::Transfer(a, b, q)),
        (branch(), counted()).prop_map(|(b, c)| Op::Adjust(b, c)),
    ]
}

fn runtime() -> Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn actor() -> Actor {
    Actor::new(ActorId::new(1))
}

async fn service() -> InventoryService<MemoryStore> {
    let store = MemoryStore::new();
    store
        .put_product(ProductInfo {
            id: PRODUCT,
            code: "P-1".into(),
            name: "Widget".into(),
            sale_price: Decimal::ONE,
            active: true,
        })
        .await;
    for id in BRANCHES {
        store
            .put_branch(BranchInfo {
                id: BranchId::new(id),
                name: format!("Branch {id}"),
                active: true,
            })
            .await;
    }
    InventoryService::new(store, LedgerPolicy::default())
}

async fn stock(svc: &InventoryService<MemoryStore>, branch: i64) -> Decimal {
    svc.get_balance(PRODUCT, BranchId::new(branch))
        .await
        .unwrap()
        .map_or(Decimal::ZERO, |b| b.stock)
}

async fn snapshot(svc: &InventoryService<MemoryStore>) -> Vec<Decimal> {
    let mut out = Vec::with_capacity(BRANCHES.len());
    for id in BRANCHES {
        out.push(stock(svc, id).await);
    }
    out
}

/// Applies one operation; returns the error if it was rejected.
async fn apply(svc: &InventoryService<MemoryStore>, op: &Op) -> Result<(), InventoryError> {
    let details = MovementDetails::default();
    match *op {
        Op::Ingest(b, quantity) => svc
            .ingest(
                &actor(),
                IngestCommand {
                    product_id: PRODUCT,
                    branch_id: BranchId::new(b),
                    quantity,
                    details,
                },
            )
            .await
            .map(drop),
        Op::Withdraw(b, quantity) => svc
            .withdraw(
                &actor(),
                WithdrawCommand {
                    product_id: PRODUCT,
                    branch_id: BranchId::new(b),
                    quantity,
                    details,
                },
            )
            .await
            .map(drop),
        Op::Transfer(from, to, quantity) => svc
            .transfer(
                &actor(),
                TransferCommand {
                    product_id: PRODUCT,
                    source_branch_id: BranchId::new(from),
                    destination_branch_id: BranchId::new(to),
                    quantity,
                    details,
                },
            )
            .await
            .map(drop),
        Op::Adjust(b, counted_stock) => svc
            .adjust_to_actual(
                &actor(),
                AdjustCommand {
                    product_id: PRODUCT,
                    branch_id: BranchId::new(b),
                    counted_stock,
                    details,
                },
            )
            .await
            .map(drop),
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Feature: inventory-ledger, Property 1: Transfer Conservation
    /// A transfer moves exactly q units and keeps the pair total unchanged.
    #[test]
    fn prop_transfer_conserves_stock(
        initial in quantity(),
        q in quantity(),
        from in branch(),
        to in branch(),
    ) {
        prop_assume!(from != to);
        let rt = runtime();
        rt.block_on(async {
            let svc = service().await;
            apply(&svc, &Op::Ingest(from, initial)).await.unwrap();
            let before_from = stock(&svc, from).await;
            let before_to = stock(&svc, to).await;

            let result = apply(&svc, &Op::Transfer(from, to, q)).await;

            let after_from = stock(&svc, from).await;
            let after_to = stock(&svc, to).await;
            prop_assert_eq!(before_from + before_to, after_from + after_to);
            if result.is_ok() {
                prop_assert_eq!(after_from, before_from - q);
                prop_assert_eq!(after_to, before_to + q);
            } else {
                prop_assert!(q > initial);
                prop_assert_eq!(after_from, before_from);
            }
            Ok(())
        })?;
    }

    /// Feature: inventory-ledger, Property 2 and 3: Replay Consistency and Non-Negative Balances
    /// After any sequence of operations, folding the ledger reproduces every
    /// stored balance, no balance is negative, and rejected operations leave
    /// every balance unchanged.
    #[test]
    fn prop_replay_reproduces_balances(ops in prop::collection::vec(op(), 1..40)) {
        let rt = runtime();
        rt.block_on(async {
            let svc = service().await;
            for op in &ops {
                let before = snapshot(&svc).await;
                if apply(&svc, op).await.is_err() {
                    prop_assert_eq!(snapshot(&svc).await, before);
                }
                for balance in snapshot(&svc).await {
                    prop_assert!(balance >= Decimal::ZERO);
                }
            }

            let entries = svc.list_movements(&MovementFilter::default()).await.unwrap();
            for id in BRANCHES {
                let derived = replay::stock_at(&entries, PRODUCT, Some(BranchId::new(id)), None).unwrap();
                prop_assert_eq!(derived, stock(&svc, id).await);
            }
            let total: Decimal = snapshot(&svc).await.into_iter().sum();
            prop_assert_eq!(replay::stock_at(&entries, PRODUCT, None, None).unwrap(), total);
            Ok(())
        })?;
    }

    /// Feature: inventory-ledger, Property 4: Matching Count Is A No-Op
    #[test]
    fn prop_matching_count_appends_nothing(ops in prop::collection::vec(op(), 0..15), b in branch()) {
        let rt = runtime();
        rt.block_on(async {
            let svc = service().await;
            for op in &ops {
                let _ = apply(&svc, op).await;
            }
            let current = stock(&svc, b).await;
            let before = svc.list_movements(&MovementFilter::default()).await.unwrap().len();

            let outcome = svc
                .adjust_to_actual(
                    &actor(),
                    AdjustCommand {
                        product_id: PRODUCT,
                        branch_id: BranchId::new(b),
                        counted_stock: current,
                        details: MovementDetails::default(),
                    },
                )
                .await
                .unwrap();

            prop_assert!(outcome.movement.is_none());
            prop_assert_eq!(stock(&svc, b).await, current);
            let after = svc.list_movements(&MovementFilter::default()).await.unwrap().len();
            prop_assert_eq!(before, after);
            Ok(())
        })?;
    }
}
