//! FarmData API Server
//!
//! Serves farm types, crops and farmer records to the mobile clerk app and
//! reconciles records captured offline.
//!
//! # Configuration
//!
//! Environment variables:
//! - `FARMDATA_PORT`: Port to listen on (default: 8000)
//! - `FARMDATA_BIND_ADDRESS`: Address to bind (default: 0.0.0.0)
//! - `FARMDATA_DATABASE_PATH`: SQLite database (default: ~/.local/share/farmdata-server/farmdata.db)
//! - `FARMDATA_CONFIG`: Path to config file (default: ~/.config/farmdata-server/config.yaml)
//!
//! # Config File Format
//!
//! ```yaml
//! port: 8000
//! bind_address: 127.0.0.1
//! database_path: /var/lib/farmdata/farmdata.db
//! ```
//!
//! # Endpoints
//!
//! - `GET /api/v1/health/`: Health check endpoint (no auth required)
//! - `/api/v1/farm-types/`, `/api/v1/crops/`: reference data (admin writes)
//! - `/api/v1/farmer-data/`, `POST /api/v1/farmer-data/sync/`: farmer records
//! - `/api/v1/users/`: user administration, `/api/v1/users/me/`
//!
//! API tokens are issued with `farmdata-admin user add`.

use farmdata::config::Config;
use farmdata::db::init_db;
use farmdata::server::{router, AppState};
use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load(None)?;
    tracing::info!("Database: {}", config.database_path.display());

    let pool = init_db(&config.database_path).await?;
    let app = router(AppState::new(pool));

    // Start server
    let addr = SocketAddr::new(config.bind_address, config.port);
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "farmdata=info,farmdata_server=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = run().await {
        tracing::error!("Server failed: {}", e);
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
