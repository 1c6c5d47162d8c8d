//! Database seeder for Kardex development and testing.
//!
//! Seeds branches, a small product catalog and opening stock for local
//! development. Running it twice leaves existing rows alone.
//!
//! Usage: cargo run --bin seeder

use rust_decimal::Decimal;

use kardex_core::inventory::{
    Actor, IngestCommand, InventoryService, LedgerPolicy, MovementDetails,
};
use kardex_db::entities::{branches, products};
use kardex_db::repositories::{CatalogRepository, CreateProductInput};
use kardex_db::{PgInventoryStore, connect};
use kardex_shared::AppConfig;
use kardex_shared::types::{ActorId, BranchId, ProductId};

/// Actor id stamped on seeded movements.
const SEED_ACTOR: ActorId = ActorId::new(1);

const BRANCHES: [&str; 3] = ["Central Warehouse", "Downtown Store", "Airport Kiosk"];

/// (code, name, sale price in cents, opening stock at the warehouse)
const PRODUCTS: [(&str, &str, i64, i64); 4] = [
    ("BOLT-M8", "Hex Bolt M8", 250, 500),
    ("NUT-M8", "Hex Nut M8", 80, 800),
    ("WASH-M8", "Flat Washer M8", 30, 1_000),
    ("DRILL-10", "Cordless Drill 10mm", 8_999, 12),
];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = AppConfig::load()?;

    println!("Connecting to database...");
    let db = connect(&config.database).await?;
    let catalog = CatalogRepository::new(db.clone());

    println!("Seeding branches...");
    let branches = seed_branches(&catalog).await?;

    println!("Seeding products...");
    let products = seed_products(&catalog).await?;

    println!("Seeding opening stock...");
    let service = InventoryService::new(PgInventoryStore::new(db), LedgerPolicy::default());
    if let Some(warehouse) = branches.first() {
        seed_opening_stock(&service, BranchId::new(warehouse.id), &products).await?;
    }

    println!("Seeding complete!");
    Ok(())
}

async fn seed_branches(catalog: &CatalogRepository) -> anyhow::Result<Vec<branches::Model>> {
    let existing = catalog.list_branches().await?;
    let mut seeded = Vec::with_capacity(BRANCHES.len());

    for name in BRANCHES {
        if let Some(branch) = existing.iter().find(|b| b.name == name) {
            println!("  Branch {name} already exists, skipping...");
            seeded.push(branch.clone());
            continue;
        }
        let branch = catalog.create_branch(name).await?;
        println!("  Created branch: {name}");
        seeded.push(branch);
    }
    Ok(seeded)
}

/// Returns the products created by this run with their opening stock.
async fn seed_products(
    catalog: &CatalogRepository,
) -> anyhow::Result<Vec<(products::Model, Decimal)>> {
    let mut created = Vec::new();

    for (code, name, cents, opening) in PRODUCTS {
        if catalog.find_product_by_code(code).await?.is_some() {
            println!("  Product {code} already exists, skipping...");
            continue;
        }
        let product = catalog
            .create_product(CreateProductInput {
                code: code.to_string(),
                name: name.to_string(),
                sale_price: Decimal::new(cents, 2),
            })
            .await?;
        println!("  Created product: {code} {name}");
        created.push((product, Decimal::from(opening)));
    }
    Ok(created)
}

async fn seed_opening_stock(
    service: &InventoryService<PgInventoryStore>,
    branch_id: BranchId,
    products: &[(products::Model, Decimal)],
) -> anyhow::Result<()> {
    let actor = Actor::new(SEED_ACTOR);

    for (product, quantity) in products {
        let balance = service
            .ingest(
                &actor,
                IngestCommand {
                    product_id: ProductId::new(product.id),
                    branch_id,
                    quantity: *quantity,
                    details: MovementDetails {
                        note: Some("Opening stock".to_string()),
                        ..MovementDetails::default()
                    },
                },
            )
            .await?;
        println!("  {} at branch {}: {}", product.code, branch_id, balance.stock);
    }
    Ok(())
}
