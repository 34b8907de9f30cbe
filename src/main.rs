use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

use chatline_server::auth;
use chatline_server::config::{generate_config_template, Config};
use chatline_server::db;
use chatline_server::routes;
use chatline_server::state::AppState;
use chatline_server::ws::ConnectionRegistry;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load config with layered precedence: defaults < TOML < env < CLI
    let config = Config::load()?;

    // Handle --generate-config: print template and exit
    if config.generate_config {
        print!("{}", generate_config_template());
        return Ok(());
    }

    // Initialize tracing/logging
    if config.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "chatline_server=info".parse().unwrap()),
            )
            .init();
    } else {
        tracing_subscriber::fmt()
            .pretty()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "chatline_server=info".parse().unwrap()),
            )
            .init();
    }

    tracing::info!("Chatline server v{} starting", env!("CARGO_PKG_VERSION"));

    // Initialize SQLite database
    let db = db::init_db(&config.data_dir)?;

    // Load or generate JWT signing key (256-bit random, stored in data_dir)
    let jwt_secret = auth::jwt::load_or_generate_jwt_secret(&config.data_dir)?;

    // Build application state. The connection registry starts empty: all
    // presence is rebuilt from live connections after a restart.
    let app_state = AppState {
        db,
        jwt_secret,
        connections: Arc::new(ConnectionRegistry::new()),
        data_dir: config.data_dir.clone(),
        client_url: config.client_url.clone(),
    };

    // Build router
    let app = routes::build_router(app_state);

    // Bind and serve
    let addr = format!("{}:{}", config.bind_address, config.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
