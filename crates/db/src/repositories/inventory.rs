//! PostgreSQL implementation of the inventory store.
//!
//! Balance rows are serialized with `SELECT ... FOR UPDATE`; a missing row is
//! first created with `INSERT ... ON CONFLICT DO NOTHING` so that two writers
//! racing on a new key still contend for the same lock.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::sea_query::{Expr, Func};
use sea_orm::{
    ActiveModelTrait, ActiveValue::NotSet, ActiveValue::Set, ActiveValue::Unchanged, ColumnTrait,
    Condition, ConnectionTrait, DatabaseConnection, DatabaseTransaction, DbBackend, DbErr, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, RuntimeErr, Select, Statement,
    TransactionTrait,
};

use tracing::debug;

use kardex_core::inventory::{
    Balance, BalanceFilter, BalanceKey, BalancePatch, BalanceView, BranchInfo, DocumentRef,
    InventoryStore, MovementEntry, MovementFilter, NewMovement, ProductInfo, StoreError, StoreTx,
};
use kardex_shared::types::{ActorId, BranchId, MovementId, PageRequest, ProductId};

use crate::entities::{balances, branches, movement_entries, products};

/// SQLSTATE codes PostgreSQL raises for serialization failures and deadlocks.
const RETRYABLE_SQLSTATES: [&str; 2] = ["40001", "40P01"];

const ENSURE_BALANCE_SQL: &str = r"
INSERT INTO balances (product_id, branch_id)
VALUES ($1, $2)
ON CONFLICT (product_id, branch_id) DO NOTHING
";

/// Error types for the PostgreSQL store.
#[derive(Debug, thiserror::Error)]
pub enum PgStoreError {
    /// The balance row vanished between insert and lock.
    #[error("Balance row missing for product {product_id} at branch {branch_id}")]
    BalanceMissing {
        /// Product ID.
        product_id: ProductId,
        /// Branch ID.
        branch_id: BranchId,
    },

    /// Database error.
    #[error("Database error: {0}")]
    Database(#[from] DbErr),
}

impl From<PgStoreError> for StoreError {
    fn from(err: PgStoreError) -> Self {
        match err {
            PgStoreError::Database(db) if is_conflict(&db) => {
                debug!(error = %db, "transaction conflict detected");
                Self::Conflict(db.to_string())
            }
            other => Self::Database(other.to_string()),
        }
    }
}

/// Returns true if the error is a serialization failure or a deadlock.
#[must_use]
pub fn is_conflict(err: &DbErr) -> bool {
    let (DbErr::Exec(runtime) | DbErr::Query(runtime) | DbErr::Conn(runtime)) = err else {
        return false;
    };
    let RuntimeErr::SqlxError(sqlx_err) = runtime else {
        return false;
    };
    sqlx_err
        .as_database_error()
        .and_then(|db| db.code())
        .is_some_and(|code| RETRYABLE_SQLSTATES.contains(&code.as_ref()))
}

/// Inventory store backed by PostgreSQL.
#[derive(Debug, Clone)]
pub struct PgInventoryStore {
    db: DatabaseConnection,
}

impl PgInventoryStore {
    /// Creates a new store over a pooled connection.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Balances joined with their product, filtered but not paginated.
    fn filtered_balances(filter: &BalanceFilter) -> Select<balances::Entity> {
        let mut query = balances::Entity::find().inner_join(products::Entity);

        if let Some(branch_id) = filter.branch_id {
            query = query.filter(balances::Column::BranchId.eq(branch_id.into_inner()));
        }
        if let Some(product_id) = filter.product_id {
            query = query.filter(balances::Column::ProductId.eq(product_id.into_inner()));
        }
        if filter.low_stock_only {
            query = query.filter(low_stock_condition());
        }
        if let Some(term) = filter.search_term() {
            let pattern = format!("%{}%", escape_like(&term));
            query = query.filter(
                Condition::any()
                    .add(
                        Expr::expr(Func::lower(Expr::col((
                            products::Entity,
                            products::Column::Code,
                        ))))
                        .like(pattern.as_str()),
                    )
                    .add(
                        Expr::expr(Func::lower(Expr::col((
                            products::Entity,
                            products::Column::Name,
                        ))))
                        .like(pattern.as_str()),
                    ),
            );
        }
        query
    }
}

#[async_trait]
impl InventoryStore for PgInventoryStore {
    type Tx = PgTx;

    async fn begin(&self) -> Result<PgTx, StoreError> {
        let txn = self.db.begin().await.map_err(PgStoreError::from)?;
        Ok(PgTx { txn })
    }

    async fn find_product(&self, id: ProductId) -> Result<Option<ProductInfo>, StoreError> {
        let model = products::Entity::find_by_id(id.into_inner())
            .one(&self.db)
            .await
            .map_err(PgStoreError::from)?;
        Ok(model.map(product_info))
    }

    async fn find_branch(&self, id: BranchId) -> Result<Option<BranchInfo>, StoreError> {
        let model = branches::Entity::find_by_id(id.into_inner())
            .one(&self.db)
            .await
            .map_err(PgStoreError::from)?;
        Ok(model.map(branch_info))
    }

    async fn get_balance(&self, key: BalanceKey) -> Result<Option<Balance>, StoreError> {
        let model = balances::Entity::find_by_id(key_tuple(key))
            .one(&self.db)
            .await
            .map_err(PgStoreError::from)?;
        Ok(model.map(balance_from_model))
    }

    async fn list_balances(
        &self,
        filter: &BalanceFilter,
        page: &PageRequest,
    ) -> Result<(Vec<BalanceView>, u64), StoreError> {
        let total = Self::filtered_balances(filter)
            .count(&self.db)
            .await
            .map_err(PgStoreError::from)?;

        let rows = Self::filtered_balances(filter)
            .select_also(products::Entity)
            .order_by_asc(balances::Column::ProductId)
            .order_by_asc(balances::Column::BranchId)
            .offset(page.offset())
            .limit(page.limit())
            .all(&self.db)
            .await
            .map_err(PgStoreError::from)?;

        let views = rows
            .into_iter()
            .filter_map(|(balance, product)| {
                let product = product?;
                Some(BalanceView {
                    balance: balance_from_model(balance),
                    product_code: product.code,
                    product_name: product.name,
                })
            })
            .collect();
        Ok((views, total))
    }

    async fn list_low_stock(&self, branch_id: BranchId) -> Result<Vec<Balance>, StoreError> {
        let rows = balances::Entity::find()
            .filter(balances::Column::BranchId.eq(branch_id.into_inner()))
            .filter(low_stock_condition())
            .order_by_asc(balances::Column::ProductId)
            .all(&self.db)
            .await
            .map_err(PgStoreError::from)?;
        Ok(rows.into_iter().map(balance_from_model).collect())
    }

    async fn list_movements(
        &self,
        filter: &MovementFilter,
    ) -> Result<Vec<MovementEntry>, StoreError> {
        let mut query = movement_entries::Entity::find();

        if let Some(product_id) = filter.product_id {
            query = query.filter(movement_entries::Column::ProductId.eq(product_id.into_inner()));
        }
        if let Some(branch_id) = filter.branch_id {
            query = query.filter(
                Condition::any()
                    .add(movement_entries::Column::SourceBranchId.eq(branch_id.into_inner()))
                    .add(movement_entries::Column::DestinationBranchId.eq(branch_id.into_inner())),
            );
        }
        if let Some(movement_type) = filter.movement_type {
            query = query.filter(
                movement_entries::Column::MovementType
                    .eq(crate::entities::sea_orm_active_enums::MovementType::from(movement_type)),
            );
        }
        if let Some(from) = filter.from {
            query = query.filter(movement_entries::Column::RecordedAt.gte(from.fixed_offset()));
        }
        if let Some(until) = filter.until {
            query = query.filter(movement_entries::Column::RecordedAt.lt(until.fixed_offset()));
        }

        let rows = query
            .order_by_asc(movement_entries::Column::RecordedAt)
            .order_by_asc(movement_entries::Column::Id)
            .all(&self.db)
            .await
            .map_err(PgStoreError::from)?;
        Ok(rows.into_iter().map(movement_from_model).collect())
    }
}

/// Transaction over a [`PgInventoryStore`].
pub struct PgTx {
    txn: DatabaseTransaction,
}

impl PgTx {
    async fn lock_row(&self, key: BalanceKey) -> Result<balances::Model, PgStoreError> {
        let (product_id, branch_id) = key_tuple(key);
        self.txn
            .execute(Statement::from_sql_and_values(
                DbBackend::Postgres,
                ENSURE_BALANCE_SQL,
                [product_id.into(), branch_id.into()],
            ))
            .await?;

        balances::Entity::find_by_id((product_id, branch_id))
            .lock_exclusive()
            .one(&self.txn)
            .await?
            .ok_or(PgStoreError::BalanceMissing {
                product_id: key.product_id,
                branch_id: key.branch_id,
            })
            .inspect(|row| {
                debug!(
                    product_id = row.product_id,
                    branch_id = row.branch_id,
                    stock = %row.stock,
                    "balance row locked"
                );
            })
    }
}

#[async_trait]
impl StoreTx for PgTx {
    async fn lock_balance(&mut self, key: BalanceKey) -> Result<Balance, StoreError> {
        let model = self.lock_row(key).await?;
        Ok(balance_from_model(model))
    }

    async fn upsert_balance(
        &mut self,
        key: BalanceKey,
        patch: &BalancePatch,
    ) -> Result<Balance, StoreError> {
        let current = self.lock_row(key).await?;
        let mut model = balances::ActiveModel {
            product_id: Unchanged(current.product_id),
            branch_id: Unchanged(current.branch_id),
            updated_at: Set(Utc::now().fixed_offset()),
            ..Default::default()
        };
        if let Some(stock) = patch.stock {
            model.stock = Set(stock);
        }
        if let Some(minimum) = patch.stock_minimum {
            model.stock_minimum = Set(minimum);
        }
        if let Some(price) = patch.sale_price_override {
            model.sale_price_override = Set(price);
        }

        let updated = model
            .update(&self.txn)
            .await
            .map_err(PgStoreError::from)?;
        Ok(balance_from_model(updated))
    }

    async fn append_movement(
        &mut self,
        movement: NewMovement,
    ) -> Result<MovementEntry, StoreError> {
        let (related_document_type, related_document_id) = match movement.related_document {
            Some(doc) => (Some(doc.document_type), Some(doc.document_id)),
            None => (None, None),
        };
        let model = movement_entries::ActiveModel {
            id: NotSet,
            product_id: Set(movement.product_id.into_inner()),
            source_branch_id: Set(movement.source_branch_id.into_inner()),
            destination_branch_id: Set(movement.destination_branch_id.map(BranchId::into_inner)),
            movement_type: Set(movement.movement_type.into()),
            quantity: Set(movement.quantity),
            resulting_balance: Set(movement.resulting_balance),
            destination_resulting_balance: Set(movement.destination_resulting_balance),
            unit_price: Set(movement.unit_price),
            related_document_type: Set(related_document_type),
            related_document_id: Set(related_document_id),
            actor_id: Set(movement.actor_id.into_inner()),
            authorized: Set(movement.authorized),
            authorizer_id: Set(movement.authorizer_id.map(ActorId::into_inner)),
            note: Set(movement.note),
            recorded_at: Set(movement.recorded_at.fixed_offset()),
            inserted_at: NotSet,
            external_reference: Set(movement.external_reference),
        };

        let inserted = model.insert(&self.txn).await.map_err(PgStoreError::from)?;
        Ok(movement_from_model(inserted))
    }

    async fn commit(self) -> Result<(), StoreError> {
        self.txn.commit().await.map_err(PgStoreError::from)?;
        Ok(())
    }

    async fn rollback(self) -> Result<(), StoreError> {
        self.txn.rollback().await.map_err(PgStoreError::from)?;
        Ok(())
    }
}

fn low_stock_condition() -> Condition {
    Condition::all()
        .add(balances::Column::StockMinimum.gt(Decimal::ZERO))
        .add(
            Expr::col((balances::Entity, balances::Column::Stock))
                .lte(Expr::col((balances::Entity, balances::Column::StockMinimum))),
        )
}

/// Escapes `LIKE` wildcards so user input matches literally.
fn escape_like(term: &str) -> String {
    let mut out = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

const fn key_tuple(key: BalanceKey) -> (i64, i64) {
    (key.product_id.into_inner(), key.branch_id.into_inner())
}

fn utc(value: chrono::DateTime<chrono::FixedOffset>) -> DateTime<Utc> {
    value.with_timezone(&Utc)
}

fn product_info(model: products::Model) -> ProductInfo {
    ProductInfo {
        id: ProductId::new(model.id),
        code: model.code,
        name: model.name,
        sale_price: model.sale_price,
        active: model.active,
    }
}

fn branch_info(model: branches::Model) -> BranchInfo {
    BranchInfo {
        id: BranchId::new(model.id),
        name: model.name,
        active: model.active,
    }
}

fn balance_from_model(model: balances::Model) -> Balance {
    Balance {
        product_id: ProductId::new(model.product_id),
        branch_id: BranchId::new(model.branch_id),
        stock: model.stock,
        stock_minimum: model.stock_minimum,
        sale_price_override: model.sale_price_override,
        updated_at: utc(model.updated_at),
    }
}

fn movement_from_model(model: movement_entries::Model) -> MovementEntry {
    let related_document = model
        .related_document_type
        .zip(model.related_document_id)
        .map(|(document_type, document_id)| DocumentRef {
            document_type,
            document_id,
        });
    MovementEntry {
        id: MovementId::new(model.id),
        product_id: ProductId::new(model.product_id),
        source_branch_id: BranchId::new(model.source_branch_id),
        destination_branch_id: model.destination_branch_id.map(BranchId::new),
        movement_type: model.movement_type.into(),
        quantity: model.quantity,
        resulting_balance: model.resulting_balance,
        destination_resulting_balance: model.destination_resulting_balance,
        unit_price: model.unit_price,
        related_document,
        actor_id: ActorId::new(model.actor_id),
        authorized: model.authorized,
        authorizer_id: model.authorizer_id.map(ActorId::new),
        note: model.note,
        recorded_at: utc(model.recorded_at),
        inserted_at: utc(model.inserted_at),
        external_reference: model.external_reference,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_like_wildcards() {
        assert_eq!(escape_like("50%_off"), "50\\%\\_off");
        assert_eq!(escape_like("a\\b"), "a\\\\b");
        assert_eq!(escape_like("plain"), "plain");
    }

    #[test]
    fn test_non_runtime_errors_are_not_conflicts() {
        assert!(!is_conflict(&DbErr::RecordNotFound("x".into())));
        assert!(!is_conflict(&DbErr::Custom("40001".into())));
    }

    #[test]
    fn test_missing_balance_maps_to_database_error() {
        let err: StoreError = PgStoreError::BalanceMissing {
            product_id: ProductId::new(1),
            branch_id: BranchId::new(2),
        }
        .into();
        assert!(matches!(err, StoreError::Database(_)));
    }
}
