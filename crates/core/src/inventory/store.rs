//! Storage seam for the inventory engine.
//!
//! [`InventoryStore`] serves reads and opens transactions; [`StoreTx`] is a
//! transaction scoped to exactly one mutation. Dropping a transaction
//! without committing discards its writes.

use async_trait::async_trait;
use kardex_shared::types::{BranchId, PageRequest, ProductId};

use super::error::StoreError;
use super::types::{
    Balance, BalanceFilter, BalanceKey, BalancePatch, BalanceView, BranchInfo, MovementEntry,
    MovementFilter, NewMovement, ProductInfo,
};

/// Read access plus transaction factory.
#[async_trait]
pub trait InventoryStore: Send + Sync {
    /// Transaction type produced by [`InventoryStore::begin`].
    type Tx: StoreTx;

    /// Opens a transaction for one mutation.
    async fn begin(&self) -> Result<Self::Tx, StoreError>;

    /// Looks up a product.
    async fn find_product(&self, id: ProductId) -> Result<Option<ProductInfo>, StoreError>;

    /// Looks up a branch.
    async fn find_branch(&self, id: BranchId) -> Result<Option<BranchInfo>, StoreError>;

    /// Point lookup of a balance.
    async fn get_balance(&self, key: BalanceKey) -> Result<Option<Balance>, StoreError>;

    /// One page of balances plus the total number of matching rows.
    async fn list_balances(
        &self,
        filter: &BalanceFilter,
        page: &PageRequest,
    ) -> Result<(Vec<BalanceView>, u64), StoreError>;

    /// Balances of a branch with a positive threshold and `stock <= stock_minimum`.
    async fn list_low_stock(&self, branch_id: BranchId) -> Result<Vec<Balance>, StoreError>;

    /// Ledger rows ordered by `(recorded_at, id)` ascending, read as one snapshot.
    async fn list_movements(&self, filter: &MovementFilter)
    -> Result<Vec<MovementEntry>, StoreError>;
}

/// A transaction spanning one mutation.
#[async_trait]
pub trait StoreTx: Send {
    /// Locks the balance row for the rest of the transaction, creating it
    /// at zero stock if absent.
    async fn lock_balance(&mut self, key: BalanceKey) -> Result<Balance, StoreError>;

    /// Creates the balance if absent, then writes the present patch fields.
    async fn upsert_balance(
        &mut self,
        key: BalanceKey,
        patch: &BalancePatch,
    ) -> Result<Balance, StoreError>;

    /// Appends one immutable ledger row.
    async fn append_movement(&mut self, movement: NewMovement)
    -> Result<MovementEntry, StoreError>;

    /// Makes every write visible.
    async fn commit(self) -> Result<(), StoreError>;

    /// Discards every write.
    async fn rollback(self) -> Result<(), StoreError>;
}
