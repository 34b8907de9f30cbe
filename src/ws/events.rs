//! Wire-level events pushed to clients over WebSocket.
//!
//! Serialized as JSON with a stable `event` tag:
//! - `{"event":"newMessage","message":{...}}`
//! - `{"event":"getOnlineUsers","onlineUsers":[...]}`

use serde::Serialize;

use crate::db::models::Message;
use crate::ws::UserId;

/// An event delivered to a client connection, unicast (newMessage)
/// or multicast (getOnlineUsers).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum DeliveryEvent {
    #[serde(rename = "newMessage")]
    NewMessage { message: Message },
    #[serde(rename = "getOnlineUsers")]
    OnlineUsers {
        #[serde(rename = "onlineUsers")]
        online_users: Vec<UserId>,
    },
}

impl DeliveryEvent {
    pub fn new_message(message: Message) -> Self {
        DeliveryEvent::NewMessage { message }
    }

    pub fn online_users(online_users: Vec<UserId>) -> Self {
        DeliveryEvent::OnlineUsers { online_users }
    }
}
