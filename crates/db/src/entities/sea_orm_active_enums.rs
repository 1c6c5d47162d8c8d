//! `SeaORM` active enums backed by PostgreSQL enum types.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// `movement_type` enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "movement_type")]
pub enum MovementType {
    /// Stock arrives at a branch.
    #[sea_orm(string_value = "ENTRY")]
    Entry,
    /// Stock leaves a branch.
    #[sea_orm(string_value = "EXIT")]
    Exit,
    /// Stock moves between branches.
    #[sea_orm(string_value = "TRANSFER")]
    Transfer,
    /// Counted stock replaces system stock.
    #[sea_orm(string_value = "ADJUSTMENT")]
    Adjustment,
}

impl From<kardex_core::inventory::MovementType> for MovementType {
    fn from(value: kardex_core::inventory::MovementType) -> Self {
        use kardex_core::inventory::MovementType as Domain;
        match value {
            Domain::Entry => Self::Entry,
            Domain::Exit => Self::Exit,
            Domain::Transfer => Self::Transfer,
            Domain::Adjustment => Self::Adjustment,
        }
    }
}

impl From<MovementType> for kardex_core::inventory::MovementType {
    fn from(value: MovementType) -> Self {
        match value {
            MovementType::Entry => Self::Entry,
            MovementType::Exit => Self::Exit,
            MovementType::Transfer => Self::Transfer,
            MovementType::Adjustment => Self::Adjustment,
        }
    }
}
