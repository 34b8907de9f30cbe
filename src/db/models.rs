//! Database row types for all tables.
//! These correspond 1:1 to the SQLite schema defined in migrations.rs.
//! Serialization follows the client wire format (camelCase where the
//! original API used it), so rows can be returned to clients directly.

use serde::Serialize;

/// User record in the users table.
/// The password hash never leaves the server.
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    #[serde(rename = "fullname")]
    pub full_name: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    #[serde(rename = "profilePic")]
    pub profile_pic: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Message record in the messages table.
#[derive(Debug, Clone, Serialize)]
pub struct Message {
    pub id: i64,
    #[serde(rename = "senderId")]
    pub sender_id: i64,
    #[serde(rename = "receiverId")]
    pub receiver_id: i64,
    pub text: String,
    pub image: String,
    #[serde(rename = "createdAt")]
    pub created_at: String,
    #[serde(rename = "updatedAt")]
    pub updated_at: String,
}
