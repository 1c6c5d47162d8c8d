//! Catalog repository for the branches and products the ledger references.

use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Unchanged, ColumnTrait, DatabaseConnection, DbErr,
    EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set, SqlErr,
};

use kardex_shared::types::{BranchId, ProductId};

use crate::entities::{branches, products};

/// Error types for catalog operations.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// Another product already uses this code.
    #[error("Product code already exists: {0}")]
    DuplicateCode(String),

    /// Sale price must not be negative.
    #[error("Sale price cannot be negative: {0}")]
    NegativePrice(Decimal),

    /// Product not found.
    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    /// Branch not found.
    #[error("Branch not found: {0}")]
    BranchNotFound(BranchId),

    /// Database error.
    #[error("Database error: {0}")]
    Database(#[from] DbErr),
}

/// Input for creating a product.
#[derive(Debug, Clone)]
pub struct CreateProductInput {
    /// Unique product code.
    pub code: String,
    /// Display name.
    pub name: String,
    /// Default sale price.
    pub sale_price: Decimal,
}

/// Catalog repository for branch and product maintenance.
#[derive(Debug, Clone)]
pub struct CatalogRepository {
    db: DatabaseConnection,
}

impl CatalogRepository {
    /// Creates a new catalog repository.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Creates an active branch.
    ///
    /// # Errors
    ///
    /// Returns an error if the database insert fails.
    pub async fn create_branch(&self, name: &str) -> Result<branches::Model, CatalogError> {
        let branch = branches::ActiveModel {
            name: Set(name.trim().to_string()),
            active: Set(true),
            created_at: Set(chrono::Utc::now().into()),
            ..Default::default()
        };
        Ok(branch.insert(&self.db).await?)
    }

    /// Lists every branch ordered by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn list_branches(&self) -> Result<Vec<branches::Model>, CatalogError> {
        Ok(branches::Entity::find()
            .order_by_asc(branches::Column::Id)
            .all(&self.db)
            .await?)
    }

    /// Activates or deactivates a branch.
    ///
    /// # Errors
    ///
    /// Returns `BranchNotFound` if the branch does not exist.
    pub async fn set_branch_active(
        &self,
        id: BranchId,
        active: bool,
    ) -> Result<branches::Model, CatalogError> {
        branches::Entity::find_by_id(id.into_inner())
            .one(&self.db)
            .await?
            .ok_or(CatalogError::BranchNotFound(id))?;

        let branch = branches::ActiveModel {
            id: Unchanged(id.into_inner()),
            active: Set(active),
            ..Default::default()
        };
        Ok(branch.update(&self.db).await?)
    }

    /// Creates an active product.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateCode` if the code is taken, or `NegativePrice`.
    pub async fn create_product(
        &self,
        input: CreateProductInput,
    ) -> Result<products::Model, CatalogError> {
        if input.sale_price < Decimal::ZERO {
            return Err(CatalogError::NegativePrice(input.sale_price));
        }
        let code = input.code.trim().to_string();
        if self.code_exists(&code).await? {
            return Err(CatalogError::DuplicateCode(code));
        }

        let now = chrono::Utc::now().into();
        let product = products::ActiveModel {
            code: Set(code.clone()),
            name: Set(input.name.trim().to_string()),
            sale_price: Set(input.sale_price),
            active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };

        // The count above can race with a concurrent insert
        product.insert(&self.db).await.map_err(|err| {
            if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) {
                CatalogError::DuplicateCode(code)
            } else {
                CatalogError::Database(err)
            }
        })
    }

    /// Activates or deactivates a product.
    ///
    /// # Errors
    ///
    /// Returns `ProductNotFound` if the product does not exist.
    pub async fn set_product_active(
        &self,
        id: ProductId,
        active: bool,
    ) -> Result<products::Model, CatalogError> {
        products::Entity::find_by_id(id.into_inner())
            .one(&self.db)
            .await?
            .ok_or(CatalogError::ProductNotFound(id))?;

        let product = products::ActiveModel {
            id: Unchanged(id.into_inner()),
            active: Set(active),
            updated_at: Set(chrono::Utc::now().into()),
            ..Default::default()
        };
        Ok(product.update(&self.db).await?)
    }

    /// Finds a product by its code.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn find_product_by_code(
        &self,
        code: &str,
    ) -> Result<Option<products::Model>, CatalogError> {
        Ok(products::Entity::find()
            .filter(products::Column::Code.eq(code.trim()))
            .one(&self.db)
            .await?)
    }

    async fn code_exists(&self, code: &str) -> Result<bool, DbErr> {
        let count = products::Entity::find()
            .filter(products::Column::Code.eq(code))
            .count(&self.db)
            .await?;
        Ok(count > 0)
    }
}
