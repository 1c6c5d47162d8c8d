//! In-memory store.
//!
//! Transactions hold the store mutex for their whole lifetime, which
//! serializes mutations the way row locks do in PostgreSQL. Writes are staged
//! on the transaction and applied on commit; dropping or rolling back a
//! transaction discards them.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use kardex_shared::types::{BranchId, MovementId, PageRequest, ProductId};
use rust_decimal::Decimal;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::error::StoreError;
use super::store::{InventoryStore, StoreTx};
use super::types::{
    Balance, BalanceFilter, BalanceKey, BalancePatch, BalanceView, BranchInfo, MovementEntry,
    MovementFilter, NewMovement, ProductInfo,
};

#[derive(Debug, Default)]
struct MemoryState {
    products: BTreeMap<ProductId, ProductInfo>,
    branches: BTreeMap<BranchId, BranchInfo>,
    balances: BTreeMap<BalanceKey, Balance>,
    movements: Vec<MovementEntry>,
    next_movement_id: i64,
    pending_conflicts: u32,
}

/// Store backed by process memory. Cloning shares the same state.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers or replaces a product.
    pub async fn put_product(&self, product: ProductInfo) {
        self.state.lock().await.products.insert(product.id, product);
    }

    /// Registers or replaces a branch.
    pub async fn put_branch(&self, branch: BranchInfo) {
        self.state.lock().await.branches.insert(branch.id, branch);
    }

    /// Makes the next `count` calls to `begin` fail with a conflict.
    pub async fn inject_conflicts(&self, count: u32) {
        self.state.lock().await.pending_conflicts = count;
    }

    /// Overwrites a stored stock without touching the ledger.
    ///
    /// Only useful to simulate a drifted balance.
    pub async fn overwrite_stock(&self, key: BalanceKey, stock: Decimal) {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        state
            .balances
            .entry(key)
            .or_insert_with(|| Balance::empty(key, now))
            .stock = stock;
    }
}

#[async_trait]
impl InventoryStore for MemoryStore {
    type Tx = MemoryTx;

    async fn begin(&self) -> Result<MemoryTx, StoreError> {
        let mut guard = Arc::clone(&self.state).lock_owned().await;
        if guard.pending_conflicts > 0 {
            guard.pending_conflicts -= 1;
            return Err(StoreError::Conflict(
                "could not serialize access due to concurrent update".to_string(),
            ));
        }
        let next_movement_id = guard.next_movement_id;
        Ok(MemoryTx {
            guard,
            balances: BTreeMap::new(),
            movements: Vec::new(),
            next_movement_id,
        })
    }

    async fn find_product(&self, id: ProductId) -> Result<Option<ProductInfo>, StoreError> {
        Ok(self.state.lock().await.products.get(&id).cloned())
    }

    async fn find_branch(&self, id: BranchId) -> Result<Option<BranchInfo>, StoreError> {
        Ok(self.state.lock().await.branches.get(&id).cloned())
    }

    async fn get_balance(&self, key: BalanceKey) -> Result<Option<Balance>, StoreError> {
        Ok(self.state.lock().await.balances.get(&key).cloned())
    }

    async fn list_balances(
        &self,
        filter: &BalanceFilter,
        page: &PageRequest,
    ) -> Result<(Vec<BalanceView>, u64), StoreError> {
        let state = self.state.lock().await;
        let search = filter.search_term();

        let matching: Vec<BalanceView> = state
            .balances
            .values()
            .filter(|b| filter.branch_id.is_none_or(|id| b.branch_id == id))
            .filter(|b| filter.product_id.is_none_or(|id| b.product_id == id))
            .filter(|b| !filter.low_stock_only || b.is_low_stock())
            .filter_map(|b| {
                let product = state.products.get(&b.product_id)?;
                Some(BalanceView {
                    balance: b.clone(),
                    product_code: product.code.clone(),
                    product_name: product.name.clone(),
                })
            })
            .filter(|view| {
                search.as_deref().is_none_or(|term| {
                    view.product_code.to_lowercase().contains(term)
                        || view.product_name.to_lowercase().contains(term)
                })
            })
            .collect();

        let total = u64::try_from(matching.len()).unwrap_or(u64::MAX);
        let offset = usize::try_from(page.offset()).unwrap_or(usize::MAX);
        let limit = usize::try_from(page.limit()).unwrap_or(usize::MAX);
        let rows = matching.into_iter().skip(offset).take(limit).collect();
        Ok((rows, total))
    }

    async fn list_low_stock(&self, branch_id: BranchId) -> Result<Vec<Balance>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .balances
            .values()
            .filter(|b| b.branch_id == branch_id && b.is_low_stock())
            .cloned()
            .collect())
    }

    async fn list_movements(
        &self,
        filter: &MovementFilter,
    ) -> Result<Vec<MovementEntry>, StoreError> {
        let state = self.state.lock().await;
        let mut rows: Vec<MovementEntry> = state
            .movements
            .iter()
            .filter(|m| filter.matches(m))
            .cloned()
            .collect();
        rows.sort_by_key(|m| (m.recorded_at, m.id));
        Ok(rows)
    }
}

/// Transaction over a [`MemoryStore`].
pub struct MemoryTx {
    guard: OwnedMutexGuard<MemoryState>,
    balances: BTreeMap<BalanceKey, Balance>,
    movements: Vec<MovementEntry>,
    next_movement_id: i64,
}

impl MemoryTx {
    fn current(&self, key: BalanceKey) -> Option<Balance> {
        self.balances
            .get(&key)
            .or_else(|| self.guard.balances.get(&key))
            .cloned()
    }
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn lock_balance(&mut self, key: BalanceKey) -> Result<Balance, StoreError> {
        let balance = self
            .current(key)
            .unwrap_or_else(|| Balance::empty(key, Utc::now()));
        self.balances.insert(key, balance.clone());
        Ok(balance)
    }

    async fn upsert_balance(
        &mut self,
        key: BalanceKey,
        patch: &BalancePatch,
    ) -> Result<Balance, StoreError> {
        let now = Utc::now();
        let mut balance = self
            .current(key)
            .unwrap_or_else(|| Balance::empty(key, now));
        balance.apply(patch, now);
        self.balances.insert(key, balance.clone());
        Ok(balance)
    }

    async fn append_movement(
        &mut self,
        movement: NewMovement,
    ) -> Result<MovementEntry, StoreError> {
        self.next_movement_id += 1;
        let entry =
            MovementEntry::from_new(MovementId::new(self.next_movement_id), Utc::now(), movement);
        self.movements.push(entry.clone());
        Ok(entry)
    }

    async fn commit(mut self) -> Result<(), StoreError> {
        let balances = std::mem::take(&mut self.balances);
        let movements = std::mem::take(&mut self.movements);
        let state = &mut *self.guard;
        state.balances.extend(balances);
        state.movements.extend(movements);
        state.next_movement_id = self.next_movement_id;
        Ok(())
    }

    async fn rollback(self) -> Result<(), StoreError> {
        Ok(())
    }
}
