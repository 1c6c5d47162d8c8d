//! Inventory service: mutation operations and read projections.
//!
//! Every mutation validates its input, checks the product and branches, then
//! runs inside one store transaction: lock the balance rows, check stock,
//! write balances, append the ledger row, commit. Any error rolls the
//! transaction back. Transaction conflicts are retried up to
//! `LedgerPolicy::max_attempts` times.

use std::future::Future;

use chrono::{DateTime, Utc};
use kardex_shared::types::{BranchId, PageRequest, PageResponse, ProductId};
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use super::error::InventoryError;
use super::replay::{self, HistoricalStock, HistoryQuery, Kardex};
use super::store::{InventoryStore, StoreTx};
use super::types::{
    Actor, AdjustCommand, AdjustmentOutcome, Balance, BalanceAudit, BalanceFilter, BalanceKey,
    BalancePatch, BalanceView, BranchInfo, IngestCommand, LedgerPolicy, MovementDetails,
    MovementEntry, MovementFilter, MovementType, NewMovement, ProductInfo, StockUpdateOutcome,
    TransferCommand, TransferOutcome, UpdateStockCommand, WithdrawCommand,
};
use super::validation;

/// Inventory ledger engine over a storage backend.
pub struct InventoryService<S> {
    store: S,
    policy: LedgerPolicy,
}

impl<S: InventoryStore> InventoryService<S> {
    /// Creates a new service.
    #[must_use]
    pub fn new(store: S, policy: LedgerPolicy) -> Self {
        Self { store, policy }
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// The write policy in effect.
    #[must_use]
    pub fn policy(&self) -> &LedgerPolicy {
        &self.policy
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// Adds stock to a branch and appends an ENTRY movement.
    ///
    /// # Errors
    ///
    /// Validation, not-found, concurrency or persistence errors.
    pub async fn ingest(
        &self,
        actor: &Actor,
        command: IngestCommand,
    ) -> Result<Balance, InventoryError> {
        validation::require_positive(command.quantity)?;
        let recorded_at = self.prepare_details(&command.details)?;
        self.require_product(command.product_id).await?;
        self.require_branch(command.branch_id).await?;

        let command = &command;
        let balance = self
            .with_retry("ingest", move || self.ingest_once(actor, command, recorded_at))
            .await?;

        info!(
            product_id = %command.product_id,
            branch_id = %command.branch_id,
            quantity = %command.quantity,
            stock = %balance.stock,
            "stock ingested"
        );
        Ok(balance)
    }

    /// Removes stock from a branch and appends an EXIT movement.
    ///
    /// # Errors
    ///
    /// `InsufficientStock` when the branch holds less than the quantity, plus
    /// validation, not-found, concurrency or persistence errors.
    pub async fn withdraw(
        &self,
        actor: &Actor,
        command: WithdrawCommand,
    ) -> Result<Balance, InventoryError> {
        validation::require_positive(command.quantity)?;
        let recorded_at = self.prepare_details(&command.details)?;
        self.require_product(command.product_id).await?;
        self.require_branch(command.branch_id).await?;

        let command = &command;
        let balance = self
            .with_retry("withdraw", move || {
                self.withdraw_once(actor, command, recorded_at)
            })
            .await?;

        info!(
            product_id = %command.product_id,
            branch_id = %command.branch_id,
            quantity = %command.quantity,
            stock = %balance.stock,
            "stock withdrawn"
        );
        Ok(balance)
    }

    /// Moves stock between two branches and appends one TRANSFER movement.
    ///
    /// Both balances are locked in ascending branch order.
    ///
    /// # Errors
    ///
    /// `SameBranchTransfer`, `InsufficientStock` on the source, plus
    /// validation, not-found, concurrency or persistence errors.
    pub async fn transfer(
        &self,
        actor: &Actor,
        command: TransferCommand,
    ) -> Result<TransferOutcome, InventoryError> {
        validation::require_positive(command.quantity)?;
        if command.source_branch_id == command.destination_branch_id {
            return Err(InventoryError::SameBranchTransfer(command.source_branch_id));
        }
        let recorded_at = self.prepare_details(&command.details)?;
        self.require_product(command.product_id).await?;
        self.require_branch(command.source_branch_id).await?;
        self.require_branch(command.destination_branch_id).await?;

        let command = &command;
        let outcome = self
            .with_retry("transfer", move || {
                self.transfer_once(actor, command, recorded_at)
            })
            .await?;

        info!(
            product_id = %command.product_id,
            source_branch_id = %command.source_branch_id,
            destination_branch_id = %command.destination_branch_id,
            quantity = %command.quantity,
            movement_id = %outcome.movement.id,
            "stock transferred"
        );
        Ok(outcome)
    }

    /// Replaces system stock with a physical count.
    ///
    /// Appends an ADJUSTMENT movement with the signed difference, or nothing
    /// when the count matches.
    ///
    /// # Errors
    ///
    /// Validation, not-found, concurrency or persistence errors.
    pub async fn adjust_to_actual(
        &self,
        actor: &Actor,
        command: AdjustCommand,
    ) -> Result<AdjustmentOutcome, InventoryError> {
        validation::require_counted(command.counted_stock)?;
        let recorded_at = self.prepare_details(&command.details)?;
        self.require_product(command.product_id).await?;
        self.require_branch(command.branch_id).await?;

        let command = &command;
        let outcome = self
            .with_retry("adjust", move || self.adjust_once(actor, command, recorded_at))
            .await?;

        if outcome.movement.is_some() {
            info!(
                product_id = %command.product_id,
                branch_id = %command.branch_id,
                previous = %outcome.previous,
                counted = %outcome.new,
                diff = %outcome.diff,
                "stock adjusted to count"
            );
        } else {
            debug!(
                product_id = %command.product_id,
                branch_id = %command.branch_id,
                "count matches stock, nothing recorded"
            );
        }
        Ok(outcome)
    }

    /// Administrative edit of stock, threshold and branch price.
    ///
    /// A changed stock is recorded as ENTRY or EXIT by the sign of the
    /// delta; threshold and price edits alone leave the ledger untouched.
    ///
    /// # Errors
    ///
    /// `EmptyPatch`, `NegativeValue`, plus not-found, concurrency or
    /// persistence errors.
    pub async fn update_stock(
        &self,
        actor: &Actor,
        command: UpdateStockCommand,
    ) -> Result<StockUpdateOutcome, InventoryError> {
        validation::validate_patch(&command.patch)?;
        let recorded_at = self.prepare_details(&command.details)?;
        self.require_product(command.product_id).await?;
        self.require_branch(command.branch_id).await?;

        let command = &command;
        let outcome = self
            .with_retry("update_stock", move || {
                self.update_once(actor, command, recorded_at)
            })
            .await?;

        info!(
            product_id = %command.product_id,
            branch_id = %command.branch_id,
            stock = %outcome.balance.stock,
            recorded = outcome.movement.is_some(),
            "balance updated"
        );
        Ok(outcome)
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Point lookup of a balance.
    ///
    /// # Errors
    ///
    /// Persistence errors only.
    pub async fn get_balance(
        &self,
        product_id: ProductId,
        branch_id: BranchId,
    ) -> Result<Option<Balance>, InventoryError> {
        Ok(self
            .store
            .get_balance(BalanceKey::new(product_id, branch_id))
            .await?)
    }

    /// Paginated balance listing with optional search.
    ///
    /// # Errors
    ///
    /// Persistence errors only.
    pub async fn list_balances(
        &self,
        filter: &BalanceFilter,
        page: &PageRequest,
    ) -> Result<PageResponse<BalanceView>, InventoryError> {
        let page = page.normalized();
        let (rows, total) = self.store.list_balances(filter, &page).await?;
        Ok(PageResponse::new(rows, page.page, page.per_page, total))
    }

    /// Balances of a branch at or below their positive threshold.
    ///
    /// # Errors
    ///
    /// `BranchNotFound` or persistence errors.
    pub async fn list_low_stock(&self, branch_id: BranchId) -> Result<Vec<Balance>, InventoryError> {
        self.existing_branch(branch_id).await?;
        Ok(self.store.list_low_stock(branch_id).await?)
    }

    /// Ledger rows matching the filter, ordered by `(recorded_at, id)`.
    ///
    /// # Errors
    ///
    /// `InvalidTimeRange` or persistence errors.
    pub async fn list_movements(
        &self,
        filter: &MovementFilter,
    ) -> Result<Vec<MovementEntry>, InventoryError> {
        if let (Some(from), Some(until)) = (filter.from, filter.until)
            && from > until
        {
            return Err(InventoryError::InvalidTimeRange { from, until });
        }
        Ok(self.store.list_movements(filter).await?)
    }

    /// Opening, ingress, egress and closing for a product, physical and valued.
    ///
    /// # Errors
    ///
    /// Not-found, `ReplayOverflow` or persistence errors.
    pub async fn historical_stock(
        &self,
        query: &HistoryQuery,
    ) -> Result<HistoricalStock, InventoryError> {
        let (product, entries) = self.history_input(query, query.movement_filter()).await?;
        replay::reconstruct(&entries, query, product.sale_price)
    }

    /// Chronological movement report with running balance.
    ///
    /// # Errors
    ///
    /// Not-found, `ReplayOverflow` or persistence errors.
    pub async fn kardex(&self, query: &HistoryQuery) -> Result<Kardex, InventoryError> {
        let (product, entries) = self.history_input(query, query.snapshot_filter()).await?;
        replay::kardex(&entries, query, product.sale_price)
    }

    /// Compares the stored balance with the ledger-derived balance.
    ///
    /// # Errors
    ///
    /// Not-found, `ReplayOverflow` or persistence errors.
    pub async fn audit_balance(
        &self,
        product_id: ProductId,
        branch_id: BranchId,
    ) -> Result<BalanceAudit, InventoryError> {
        self.existing_product(product_id).await?;
        self.existing_branch(branch_id).await?;

        let filter = MovementFilter {
            product_id: Some(product_id),
            branch_id: Some(branch_id),
            ..MovementFilter::default()
        };
        let entries = self.store.list_movements(&filter).await?;
        let stored = self
            .store
            .get_balance(BalanceKey::new(product_id, branch_id))
            .await?
            .map_or(Decimal::ZERO, |b| b.stock);
        let derived = replay::stock_at(&entries, product_id, Some(branch_id), None)?;
        let drift = stored - derived;

        if !drift.is_zero() {
            warn!(
                product_id = %product_id,
                branch_id = %branch_id,
                stored = %stored,
                derived = %derived,
                "balance drifted from ledger"
            );
        }

        Ok(BalanceAudit {
            product_id,
            branch_id,
            stored,
            derived,
            drift,
            in_sync: drift.is_zero(),
            movements: entries.len(),
        })
    }

    // ========================================================================
    // Transaction bodies
    // ========================================================================

    async fn ingest_once(
        &self,
        actor: &Actor,
        command: &IngestCommand,
        recorded_at: DateTime<Utc>,
    ) -> Result<Balance, InventoryError> {
        let mut tx = self.store.begin().await?;
        let result = Self::apply_ingest(&mut tx, actor, command, recorded_at).await;
        Self::finish(tx, result).await
    }

    async fn apply_ingest(
        tx: &mut S::Tx,
        actor: &Actor,
        command: &IngestCommand,
        recorded_at: DateTime<Utc>,
    ) -> Result<Balance, InventoryError> {
        let key = BalanceKey::new(command.product_id, command.branch_id);
        let current = tx.lock_balance(key).await?;
        let stock = increased(&current, command.quantity)?;

        let balance = tx.upsert_balance(key, &BalancePatch::stock(stock)).await?;
        tx.append_movement(new_movement(
            actor,
            key,
            MovementType::Entry,
            command.quantity,
            stock,
            &command.details,
            recorded_at,
        ))
        .await?;
        Ok(balance)
    }

    async fn withdraw_once(
        &self,
        actor: &Actor,
        command: &WithdrawCommand,
        recorded_at: DateTime<Utc>,
    ) -> Result<Balance, InventoryError> {
        let mut tx = self.store.begin().await?;
        let result = Self::apply_withdraw(&mut tx, actor, command, recorded_at).await;
        Self::finish(tx, result).await
    }

    async fn apply_withdraw(
        tx: &mut S::Tx,
        actor: &Actor,
        command: &WithdrawCommand,
        recorded_at: DateTime<Utc>,
    ) -> Result<Balance, InventoryError> {
        let key = BalanceKey::new(command.product_id, command.branch_id);
        let current = tx.lock_balance(key).await?;
        ensure_available(&current, command.quantity)?;
        let stock = current.stock - command.quantity;

        let balance = tx.upsert_balance(key, &BalancePatch::stock(stock)).await?;
        tx.append_movement(new_movement(
            actor,
            key,
            MovementType::Exit,
            command.quantity,
            stock,
            &command.details,
            recorded_at,
        ))
        .await?;
        Ok(balance)
    }

    async fn transfer_once(
        &self,
        actor: &Actor,
        command: &TransferCommand,
        recorded_at: DateTime<Utc>,
    ) -> Result<TransferOutcome, InventoryError> {
        let mut tx = self.store.begin().await?;
        let result = Self::apply_transfer(&mut tx, actor, command, recorded_at).await;
        Self::finish(tx, result).await
    }

    async fn apply_transfer(
        tx: &mut S::Tx,
        actor: &Actor,
        command: &TransferCommand,
        recorded_at: DateTime<Utc>,
    ) -> Result<TransferOutcome, InventoryError> {
        let source_key = BalanceKey::new(command.product_id, command.source_branch_id);
        let destination_key = BalanceKey::new(command.product_id, command.destination_branch_id);

        // Lower branch id first.
        let (source, destination) = if source_key.branch_id < destination_key.branch_id {
            let source = tx.lock_balance(source_key).await?;
            let destination = tx.lock_balance(destination_key).await?;
            (source, destination)
        } else {
            let destination = tx.lock_balance(destination_key).await?;
            let source = tx.lock_balance(source_key).await?;
            (source, destination)
        };

        ensure_available(&source, command.quantity)?;
        let source_stock = source.stock - command.quantity;
        let destination_stock = increased(&destination, command.quantity)?;

        let source = tx
            .upsert_balance(source_key, &BalancePatch::stock(source_stock))
            .await?;
        let destination = tx
            .upsert_balance(destination_key, &BalancePatch::stock(destination_stock))
            .await?;

        let mut movement = new_movement(
            actor,
            source_key,
            MovementType::Transfer,
            command.quantity,
            source_stock,
            &command.details,
            recorded_at,
        );
        movement.destination_branch_id = Some(command.destination_branch_id);
        movement.destination_resulting_balance = Some(destination_stock);
        let movement = tx.append_movement(movement).await?;

        Ok(TransferOutcome {
            source,
            destination,
            movement,
        })
    }

    async fn adjust_once(
        &self,
        actor: &Actor,
        command: &AdjustCommand,
        recorded_at: DateTime<Utc>,
    ) -> Result<AdjustmentOutcome, InventoryError> {
        let mut tx = self.store.begin().await?;
        let result = Self::apply_adjust(&mut tx, actor, command, recorded_at).await;
        Self::finish(tx, result).await
    }

    async fn apply_adjust(
        tx: &mut S::Tx,
        actor: &Actor,
        command: &AdjustCommand,
        recorded_at: DateTime<Utc>,
    ) -> Result<AdjustmentOutcome, InventoryError> {
        let key = BalanceKey::new(command.product_id, command.branch_id);
        let current = tx.lock_balance(key).await?;
        let previous = current.stock;
        let diff = command.counted_stock - previous;

        if diff.is_zero() {
            return Ok(AdjustmentOutcome {
                previous,
                new: previous,
                diff: Decimal::ZERO,
                balance: current,
                movement: None,
            });
        }

        let balance = tx
            .upsert_balance(key, &BalancePatch::stock(command.counted_stock))
            .await?;
        let movement = tx
            .append_movement(new_movement(
                actor,
                key,
                MovementType::Adjustment,
                diff,
                command.counted_stock,
                &command.details,
                recorded_at,
            ))
            .await?;

        Ok(AdjustmentOutcome {
            previous,
            new: balance.stock,
            diff,
            balance,
            movement: Some(movement),
        })
    }

    async fn update_once(
        &self,
        actor: &Actor,
        command: &UpdateStockCommand,
        recorded_at: DateTime<Utc>,
    ) -> Result<StockUpdateOutcome, InventoryError> {
        let mut tx = self.store.begin().await?;
        let result = Self::apply_update(&mut tx, actor, command, recorded_at).await;
        Self::finish(tx, result).await
    }

    async fn apply_update(
        tx: &mut S::Tx,
        actor: &Actor,
        command: &UpdateStockCommand,
        recorded_at: DateTime<Utc>,
    ) -> Result<StockUpdateOutcome, InventoryError> {
        let key = BalanceKey::new(command.product_id, command.branch_id);
        let current = tx.lock_balance(key).await?;
        let delta = command
            .patch
            .stock
            .map_or(Decimal::ZERO, |stock| stock - current.stock);

        if delta.is_zero() {
            let patch = command.patch.without_stock();
            let balance = if patch.is_empty() {
                current
            } else {
                tx.upsert_balance(key, &patch).await?
            };
            return Ok(StockUpdateOutcome {
                balance,
                movement: None,
            });
        }

        let balance = tx.upsert_balance(key, &command.patch).await?;
        let (movement_type, quantity) = if delta > Decimal::ZERO {
            (MovementType::Entry, delta)
        } else {
            (MovementType::Exit, -delta)
        };
        let movement = tx
            .append_movement(new_movement(
                actor,
                key,
                movement_type,
                quantity,
                balance.stock,
                &command.details,
                recorded_at,
            ))
            .await?;

        Ok(StockUpdateOutcome {
            balance,
            movement: Some(movement),
        })
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    /// Commits on success; rolls back and returns the original error otherwise.
    async fn finish<T>(
        tx: S::Tx,
        result: Result<T, InventoryError>,
    ) -> Result<T, InventoryError> {
        match result {
            Ok(value) => {
                tx.commit().await?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(error = %rollback_err, "rollback failed");
                }
                Err(err)
            }
        }
    }

    /// Runs `attempt` until it succeeds, fails for a non-conflict reason, or
    /// the attempt budget is spent.
    async fn with_retry<T, F, Fut>(
        &self,
        operation: &'static str,
        mut attempt: F,
    ) -> Result<T, InventoryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, InventoryError>>,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut tries: u32 = 0;
        loop {
            tries += 1;
            match attempt().await {
                Err(err) if err.is_retryable() => {
                    if tries >= max_attempts {
                        warn!(operation, attempts = tries, error = %err, "transaction conflict, giving up");
                        return Err(InventoryError::RetriesExhausted { attempts: tries });
                    }
                    warn!(operation, attempt = tries, error = %err, "transaction conflict, retrying");
                    tokio::time::sleep(self.policy.retry_backoff * tries).await;
                }
                result => return result,
            }
        }
    }

    fn prepare_details(&self, details: &MovementDetails) -> Result<DateTime<Utc>, InventoryError> {
        validation::validate_details(details)?;
        validation::resolve_recorded_at(details.recorded_at, Utc::now(), &self.policy)
    }

    async fn existing_product(&self, id: ProductId) -> Result<ProductInfo, InventoryError> {
        self.store
            .find_product(id)
            .await?
            .ok_or(InventoryError::ProductNotFound(id))
    }

    async fn require_product(&self, id: ProductId) -> Result<ProductInfo, InventoryError> {
        let product = self.existing_product(id).await?;
        if !product.active {
            return Err(InventoryError::ProductInactive(id));
        }
        Ok(product)
    }

    async fn existing_branch(&self, id: BranchId) -> Result<BranchInfo, InventoryError> {
        self.store
            .find_branch(id)
            .await?
            .ok_or(InventoryError::BranchNotFound(id))
    }

    async fn require_branch(&self, id: BranchId) -> Result<BranchInfo, InventoryError> {
        let branch = self.existing_branch(id).await?;
        if !branch.active {
            return Err(InventoryError::BranchInactive(id));
        }
        Ok(branch)
    }

    async fn history_input(
        &self,
        query: &HistoryQuery,
        filter: MovementFilter,
    ) -> Result<(ProductInfo, Vec<MovementEntry>), InventoryError> {
        let product = self.existing_product(query.product_id).await?;
        if let Some(branch_id) = query.branch_id {
            self.existing_branch(branch_id).await?;
        }
        let entries = self.store.list_movements(&filter).await?;
        debug!(
            product_id = %query.product_id,
            branch_id = ?query.branch_id,
            movements = entries.len(),
            "replaying ledger"
        );
        Ok((product, entries))
    }
}

fn ensure_available(balance: &Balance, requested: Decimal) -> Result<(), InventoryError> {
    if balance.stock < requested {
        return Err(InventoryError::InsufficientStock {
            product_id: balance.product_id,
            branch_id: balance.branch_id,
            available: balance.stock,
            requested,
        });
    }
    Ok(())
}

/// Stock after adding `quantity`, refused when it would leave the storable range.
fn increased(balance: &Balance, quantity: Decimal) -> Result<Decimal, InventoryError> {
    balance
        .stock
        .checked_add(quantity)
        .filter(|stock| validation::fits_column(*stock))
        .ok_or(InventoryError::StockOverflow {
            product_id: balance.product_id,
            branch_id: balance.branch_id,
        })
}

fn new_movement(
    actor: &Actor,
    key: BalanceKey,
    movement_type: MovementType,
    quantity: Decimal,
    resulting_balance: Decimal,
    details: &MovementDetails,
    recorded_at: DateTime<Utc>,
) -> NewMovement {
    NewMovement {
        product_id: key.product_id,
        source_branch_id: key.branch_id,
        destination_branch_id: None,
        movement_type,
        quantity,
        resulting_balance,
        destination_resulting_balance: None,
        unit_price: details.unit_price,
        related_document: details.related_document.clone(),
        actor_id: actor.id,
        authorized: actor.authorized_by.is_some(),
        authorizer_id: actor.authorized_by,
        note: details.note.clone(),
        recorded_at,
        external_reference: details.external_reference.clone(),
    }
}
