//! Shared types, errors, and configuration for Kardex.
//!
//! This crate provides common types used across all other crates:
//! - Typed integer IDs for products, branches, actors and ledger movements
//! - Pagination types for list endpoints
//! - Application-wide error taxonomy
//! - Configuration management

pub mod config;
pub mod error;
pub mod types;

pub use config::{AppConfig, DatabaseConfig, LedgerConfig, ServerConfig};
pub use error::{AppError, AppResult};
