//! Presence broadcast and unicast message delivery.
//!
//! Both paths push through handles owned by other connection tasks, so a
//! failed push evicts the registry entry (the connection is presumed dead)
//! instead of waiting for the owning task to notice.

use std::sync::Arc;
use tokio::task::JoinSet;

use crate::db::models::Message;
use crate::ws::{ConnectionRegistry, DeliveryEvent, UserId};

/// Broadcast the current set of online users to every live connection.
///
/// Fire-and-forget for the caller: connect/disconnect paths must not block
/// on broadcast completion. Pushes run as a task group so individual
/// failures are still observed and fed back into eviction.
pub fn announce_presence(registry: &Arc<ConnectionRegistry>) {
    let registry = Arc::clone(registry);
    tokio::spawn(async move {
        broadcast_presence(&registry).await;
    });
}

/// One presence broadcast: snapshot once, push to every handle as of call
/// time, one task per push. A push failure is logged and evicts that user;
/// delivery to the remaining handles is unaffected.
pub(crate) async fn broadcast_presence(registry: &Arc<ConnectionRegistry>) {
    let online_users = registry.snapshot_users();
    let event = DeliveryEvent::online_users(online_users);

    let mut pushes = JoinSet::new();
    for (user_id, handle) in registry.handles() {
        let event = event.clone();
        pushes.spawn(async move { (user_id, handle.push(&event)) });
    }

    while let Some(joined) = pushes.join_next().await {
        match joined {
            Ok((user_id, Err(err))) => {
                tracing::warn!(
                    user_id,
                    error = %err,
                    "Presence push failed, evicting connection"
                );
                registry.remove(user_id);
            }
            Ok((_, Ok(()))) => {}
            Err(err) => {
                tracing::warn!(error = %err, "Presence push task failed to complete");
            }
        }
    }
}

/// Push a freshly persisted message to its recipient's live connection.
///
/// Called right after the message is durable. Best-effort and decoupled from
/// persistence: an unregistered recipient is a silent no-op, and a failed
/// push evicts the stale connection without retry or re-queue. Never fails
/// the enclosing create-message operation.
pub fn notify_new_message(registry: &ConnectionRegistry, recipient: UserId, message: &Message) {
    let Some(handle) = registry.lookup(recipient) else {
        tracing::debug!(recipient, "Recipient not connected, skipping delivery push");
        return;
    };

    if let Err(err) = handle.push(&DeliveryEvent::new_message(message.clone())) {
        tracing::warn!(
            recipient,
            message_id = message.id,
            error = %err,
            "Message push failed, evicting connection"
        );
        registry.remove(recipient);
    }
}
