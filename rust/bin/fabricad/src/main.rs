//! `fabricad`: the Fabrica server binary.
//!
//! Usage:
//!   fabricad -c <context-name-or-path> [--listen <addr>]
//!
//! The context name resolves to `/etc/fabrica/<name>.toml`.
//! If a path with `/` or `.toml` is given, it's used directly.

mod auth_middleware;
mod bootstrap;
mod config;
mod routes;

use std::sync::Arc;

use clap::Parser;
use fabrica_core::Module;
use tracing::info;

use config::ServerConfig;

/// Fabrica server.
#[derive(Parser, Debug)]
#[command(name = "fabricad", about = "Fabrica ERP server")]
struct Cli {
    /// Context name or path to config file.
    #[arg(short = 'c', long = "config", required = true)]
    config: String,

    /// Listen address (overrides default 0.0.0.0:8080).
    #[arg(long = "listen", default_value = "0.0.0.0:8080")]
    listen: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();

    // Load server configuration.
    let config_path = ServerConfig::resolve_path(&cli.config);
    info!("Loading configuration from {}", config_path.display());
    let server_config = ServerConfig::load(&config_path)?;
    bootstrap::verify_config(&server_config)?;

    // Initialize storage.
    let data_dir = std::path::PathBuf::from(&server_config.storage.data_dir);
    std::fs::create_dir_all(&data_dir)?;

    let core_config = fabrica_core::ServiceConfig {
        data_dir: Some(data_dir),
        listen: cli.listen.clone(),
        ..Default::default()
    };

    let sqlite_path = core_config.resolve_sqlite_path();
    let sql: Arc<dyn fabrica_sql::SQLStore> = Arc::new(
        fabrica_sql::SqliteStore::open(&sqlite_path)
            .map_err(|e| anyhow::anyhow!("failed to open SQL store: {}", e))?,
    );
    info!("SQL store at {}", sqlite_path.display());

    let flow = Arc::new(docflow::DocFlow::new(Arc::clone(&sql))?);

    // ── Modules ──

    let auth_module = auth::AuthModule::new(
        Arc::clone(&sql),
        auth::service::AuthConfig {
            jwt_secret: server_config.jwt.secret.clone(),
            expire_secs: server_config.jwt.expire_secs,
            root_password_hash: server_config.root.password_hash.clone(),
        },
    )?;
    info!("Auth module initialized");

    let cmms_module = cmms::CmmsModule::new(
        Arc::clone(&flow),
        cmms::worker::WatchdogConfig {
            permit_expiry_interval: server_config.watchdog.permit_expiry_interval_secs,
        },
    );
    info!("CMMS module initialized");

    let inventory_module = inventory::InventoryModule::new(Arc::clone(&flow))?;
    info!("Inventory module initialized");

    let purchasing_module = purchasing::PurchasingModule::new(
        Arc::clone(&flow),
        inventory_module.ledger(),
        server_config.purchasing.clone(),
    );
    info!("Purchasing module initialized");

    let sales_module = sales::SalesModule::new(Arc::clone(&flow))?;
    info!("Sales module initialized");

    let modules: [&dyn Module; 5] = [
        &auth_module,
        &cmms_module,
        &inventory_module,
        &purchasing_module,
        &sales_module,
    ];
    let app = routes::build_router(auth_module.service(), &modules);

    // Start server.
    let listener = tokio::net::TcpListener::bind(&core_config.listen).await?;
    info!("Fabrica server listening on {}", core_config.listen);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    cmms_module.shutdown();
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {}", e);
    }
    info!("Shutdown signal received");
}
