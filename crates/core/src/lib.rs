//! Core business logic for Kardex.
//!
//! This crate contains the inventory ledger engine with ZERO web or database
//! dependencies. Storage is reached through the traits in
//! [`inventory::store`], so the engine runs unchanged against PostgreSQL or
//! the in-memory store used in tests.
//!
//! # Modules
//!
//! - `inventory` - Balances, the append-only movement ledger, mutation
//!   operations, historical reconstruction and the kardex report

pub mod inventory;
