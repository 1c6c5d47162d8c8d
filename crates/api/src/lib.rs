//! HTTP API layer with Axum routes and middleware.
//!
//! This crate provides:
//! - REST API routes over the inventory engine
//! - The actor identity extractor
//! - Error-to-response mapping

pub mod error;
pub mod middleware;
pub mod routes;

use axum::Router;
use kardex_core::inventory::{InventoryService, InventoryStore};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use error::ApiError;

/// Application state shared across handlers.
pub struct AppState<S> {
    /// Inventory engine over the configured store.
    pub inventory: Arc<InventoryService<S>>,
}

impl<S> AppState<S> {
    /// Wraps a service for sharing across handlers.
    #[must_use]
    pub fn new(inventory: InventoryService<S>) -> Self {
        Self {
            inventory: Arc::new(inventory),
        }
    }
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            inventory: Arc::clone(&self.inventory),
        }
    }
}

/// Creates the main application router.
pub fn create_router<S>(state: AppState<S>) -> Router
where
    S: InventoryStore + 'static,
{
    Router::new()
        .nest("/api/v1", routes::api_routes())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
