use std::sync::Arc;

use crate::db::DbPool;
use crate::ws::ConnectionRegistry;

/// Shared application state passed to all handlers via axum State extractor.
#[derive(Clone)]
pub struct AppState {
    /// SQLite connection wrapped in Arc<Mutex>
    pub db: DbPool,
    /// JWT signing secret (256-bit random key)
    pub jwt_secret: Vec<u8>,
    /// Live WebSocket connections, one per user
    pub connections: Arc<ConnectionRegistry>,
    /// Data directory for media storage
    pub data_dir: String,
    /// Allowed CORS origin for the web client
    pub client_url: String,
}
