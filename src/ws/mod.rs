pub mod actor;
pub mod broadcast;
pub mod events;
pub mod handler;
pub mod registry;

use std::fmt;

pub use events::DeliveryEvent;
pub use registry::ConnectionRegistry;

/// Opaque user identity assigned by the identity system (users.id).
pub type UserId = i64;

/// A live, pushable duplex channel to one connected client.
///
/// Handles are owned by the connection's lifecycle task; the broadcaster and
/// the delivery notifier push through handles they do not own, which is why
/// a failed push must evict the registry entry rather than assume the owning
/// task will notice.
pub trait ConnectionHandle: Send + Sync {
    /// Queue an event for delivery on this connection.
    fn push(&self, event: &DeliveryEvent) -> Result<(), PushError>;
}

/// Why a push through a connection handle failed.
#[derive(Debug)]
pub enum PushError {
    /// The connection's writer task has exited; the socket is presumed dead.
    Closed,
    /// The event could not be serialized to the wire format.
    Encode(serde_json::Error),
}

impl fmt::Display for PushError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PushError::Closed => write!(f, "connection closed"),
            PushError::Encode(e) => write!(f, "event encoding failed: {}", e),
        }
    }
}

impl std::error::Error for PushError {}
