//! API route definitions.

use axum::Router;
use kardex_core::inventory::InventoryStore;

use crate::AppState;

pub mod health;
pub mod inventory;

/// Creates the API router with all routes.
pub fn api_routes<S>() -> Router<AppState<S>>
where
    S: InventoryStore + 'static,
{
    Router::new()
        .merge(health::routes())
        .merge(inventory::routes())
}
