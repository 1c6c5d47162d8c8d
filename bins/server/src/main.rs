//! Kardex API Server
//!
//! Main entry point for the inventory ledger service.

use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use kardex_api::{AppState, create_router};
use kardex_core::inventory::{InventoryService, LedgerPolicy};
use kardex_db::{PgInventoryStore, connect};
use kardex_shared::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kardex=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = AppConfig::load()?;

    // Connect to database
    let db = connect(&config.database).await?;
    info!(
        max_connections = config.database.max_connections,
        "Connected to database"
    );

    // Create inventory engine
    let policy = LedgerPolicy::from(&config.ledger);
    info!(
        allow_backdating = policy.allow_backdating,
        max_attempts = policy.max_attempts,
        "Ledger policy configured"
    );
    let service = InventoryService::new(PgInventoryStore::new(db), policy);

    // Create router
    let app = create_router(AppState::new(service));

    // Start server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
