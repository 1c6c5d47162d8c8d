//! Entity re-exports.

pub use super::balances::Entity as Balances;
pub use super::branches::Entity as Branches;
pub use super::movement_entries::Entity as MovementEntries;
pub use super::products::Entity as Products;
