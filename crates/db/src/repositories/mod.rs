//! Repository abstractions for data access.
//!
//! Repositories provide a clean interface for database operations,
//! hiding the `SeaORM` implementation details from the rest of the application.

pub mod catalog;
pub mod inventory;

pub use catalog::{CatalogError, CatalogRepository, CreateProductInput};
pub use inventory::{PgInventoryStore, PgStoreError, PgTx, is_conflict};
