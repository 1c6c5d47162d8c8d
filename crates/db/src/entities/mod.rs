//! `SeaORM` entities.

pub mod prelude;

pub mod balances;
pub mod branches;
pub mod movement_entries;
pub mod products;
pub mod sea_orm_active_enums;
