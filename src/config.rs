use clap::Parser;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Chatline realtime chat server
#[derive(Parser, Serialize, Deserialize, Clone, Debug)]
#[command(name = "chatline-server", version, about = "Chatline realtime chat server")]
pub struct Config {
    /// Port to listen on
    #[arg(long, env = "CHATLINE_PORT", default_value = "3000")]
    pub port: u16,

    /// Bind address
    #[arg(long, env = "CHATLINE_BIND_ADDRESS", default_value = "0.0.0.0")]
    pub bind_address: String,

    /// Path to TOML config file
    #[arg(long, default_value = "./chatline.toml")]
    pub config: String,

    /// Enable structured JSON logging (for Docker/production)
    #[arg(long, env = "CHATLINE_JSON_LOGS")]
    pub json_logs: bool,

    /// Output a commented TOML config template and exit
    #[arg(long)]
    pub generate_config: bool,

    /// Data directory for persistent state (DB, JWT key, media)
    #[arg(long, env = "CHATLINE_DATA_DIR", default_value = "./data")]
    pub data_dir: String,

    /// Allowed CORS origin for the web client
    #[arg(long, env = "CHATLINE_CLIENT_URL", default_value = "http://localhost:5173")]
    pub client_url: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3000,
            bind_address: "0.0.0.0".to_string(),
            config: "./chatline.toml".to_string(),
            json_logs: false,
            generate_config: false,
            data_dir: "./data".to_string(),
            client_url: "http://localhost:5173".to_string(),
        }
    }
}

impl Config {
    /// Load config with layered precedence:
    /// built-in defaults < TOML file < env vars (CHATLINE_*) < CLI args
    pub fn load() -> Result<Self, figment::Error> {
        let cli = Config::parse();
        let config_path = cli.config.clone();

        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_path))
            .merge(Env::prefixed("CHATLINE_"))
            .merge(Serialized::defaults(cli))
            .extract()
    }
}

/// Generate a commented TOML config template
pub fn generate_config_template() -> String {
    r#"# Chatline Server Configuration
# Place this file at ./chatline.toml or specify with --config <path>
# All settings can be overridden via environment variables (CHATLINE_PORT, etc.)
# or CLI flags (--port, etc.)

# Server port (default: 3000)
# port = 3000

# Bind address (default: 0.0.0.0 — all interfaces)
# bind_address = "0.0.0.0"

# Enable structured JSON logging for Docker/production
# json_logs = false

# Data directory for SQLite database, JWT signing key, and media files
# data_dir = "./data"

# Allowed CORS origin for the web client
# client_url = "http://localhost:5173"
"#
    .to_string()
}
