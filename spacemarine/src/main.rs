mod server;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};

use spacemarine_core::{
    bootstrap::{init_database, init_services, load_config},
    logging,
};

use server::SpaceMarineServer;

#[derive(Parser, Debug)]
#[command(name = "spacemarine")]
#[command(about = "SpaceMarine REST service with WebSocket change feed", long_about = None)]
struct Args {
    /// Config file; overrides SPACEMARINE_CONFIG_PATH and ./config.yaml
    #[arg(long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // 1. Load and validate configuration
    let config = load_config(args.config.as_deref())?;

    // 2. Initialize logging
    logging::init_logging(&config.logging)?;
    info!("SpaceMarine server starting...");
    info!("HTTP address: {}", config.http_address());

    // 3. Initialize database
    let pool = init_database(&config).await?;

    // 4. Run migrations
    info!("Running database migrations...");
    sqlx::migrate!("../migrations")
        .run(&pool)
        .await
        .map_err(|e| {
            error!("Failed to run migrations: {}", e);
            anyhow::anyhow!("Migration failed: {e}")
        })?;
    info!("Migrations completed");

    // 5. Initialize services
    let services = init_services(pool.clone(), &config);

    // 6. Serve until a shutdown signal arrives
    SpaceMarineServer::new(config, services, pool).start().await
}
