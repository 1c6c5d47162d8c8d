//! Inventory ledger engine.
//!
//! This module implements per-branch stock keeping:
//! - Balances keyed by (product, branch), created lazily at zero
//! - An append-only movement ledger (entries, exits, transfers, adjustments)
//! - Mutation operations that update balances and append ledger rows atomically
//! - Historical reconstruction and the kardex, both pure folds over the ledger
//! - Storage traits and an in-memory implementation

pub mod error;
pub mod memory;
pub mod replay;
pub mod service;
pub mod store;
pub mod types;
pub mod validation;

#[cfg(test)]
mod replay_props;
#[cfg(test)]
mod service_props;

pub use error::{ErrorKind, InventoryError, StoreError};
pub use memory::MemoryStore;
pub use replay::{HistoricalStock, HistoryQuery, Kardex, KardexRow, Valued};
pub use service::InventoryService;
pub use store::{InventoryStore, StoreTx};
pub use types::{
    Actor, AdjustCommand, AdjustmentOutcome, Balance, BalanceAudit, BalanceFilter, BalanceKey,
    BalancePatch, BalanceView, BranchInfo, DocumentRef, IngestCommand, LedgerPolicy, Leg,
    MovementDetails, MovementEntry, MovementFilter, MovementType, NewMovement, ProductInfo,
    StockUpdateOutcome, TransferCommand, TransferOutcome, UpdateStockCommand, WithdrawCommand,
};
