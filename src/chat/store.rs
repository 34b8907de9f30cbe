//! Message storage operations.
//!
//! Synchronous rusqlite functions; handlers call these under
//! tokio::task::spawn_blocking. The id and timestamps of a message are
//! server-assigned here, never supplied by the client.

use chrono::Utc;

use crate::auth::accounts::row_to_user;
use crate::db::models::{Message, User};
use crate::db::DbPool;
use crate::ws::UserId;

const MESSAGE_COLUMNS: &str =
    "id, sender_id, receiver_id, text, image, created_at, updated_at";

fn row_to_message(row: &rusqlite::Row) -> rusqlite::Result<Message> {
    Ok(Message {
        id: row.get(0)?,
        sender_id: row.get(1)?,
        receiver_id: row.get(2)?,
        text: row.get(3)?,
        image: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

/// Persist a new message and return it with server-assigned id/timestamps.
pub fn create_message(
    db: &DbPool,
    sender_id: UserId,
    receiver_id: UserId,
    text: &str,
    image_url: &str,
) -> Result<Message, String> {
    let conn = db.lock().map_err(|e| format!("DB lock error: {}", e))?;
    let now = Utc::now().to_rfc3339();

    conn.execute(
        "INSERT INTO messages (sender_id, receiver_id, text, image, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params![sender_id, receiver_id, text, image_url, now, now],
    )
    .map_err(|e| format!("Failed to insert message: {}", e))?;

    Ok(Message {
        id: conn.last_insert_rowid(),
        sender_id,
        receiver_id,
        text: text.to_string(),
        image: image_url.to_string(),
        created_at: now.clone(),
        updated_at: now,
    })
}

/// Full conversation between two users, ordered by creation time ascending.
pub fn find_messages(
    db: &DbPool,
    user_a: UserId,
    user_b: UserId,
) -> Result<Vec<Message>, String> {
    let conn = db.lock().map_err(|e| format!("DB lock error: {}", e))?;

    let mut stmt = conn
        .prepare(&format!(
            "SELECT {} FROM messages
             WHERE (sender_id = ?1 AND receiver_id = ?2)
                OR (sender_id = ?2 AND receiver_id = ?1)
             ORDER BY created_at ASC, id ASC",
            MESSAGE_COLUMNS
        ))
        .map_err(|e| format!("Failed to prepare query: {}", e))?;

    let messages = stmt
        .query_map(rusqlite::params![user_a, user_b], row_to_message)
        .map_err(|e| format!("Failed to query messages: {}", e))?
        .collect::<rusqlite::Result<Vec<_>>>()
        .map_err(|e| format!("Failed to read message row: {}", e))?;

    Ok(messages)
}

/// All users except the given one, for the contact sidebar.
pub fn list_contacts(db: &DbPool, exclude: UserId) -> Result<Vec<User>, String> {
    let conn = db.lock().map_err(|e| format!("DB lock error: {}", e))?;

    let mut stmt = conn
        .prepare(
            "SELECT id, email, full_name, password_hash, profile_pic, created_at, updated_at
             FROM users WHERE id != ?1 ORDER BY full_name ASC",
        )
        .map_err(|e| format!("Failed to prepare query: {}", e))?;

    let users = stmt
        .query_map(rusqlite::params![exclude], row_to_user)
        .map_err(|e| format!("Failed to query users: {}", e))?
        .collect::<rusqlite::Result<Vec<_>>>()
        .map_err(|e| format!("Failed to read user row: {}", e))?;

    Ok(users)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn test_db() -> (DbPool, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let pool = db::init_db(dir.path().to_str().unwrap()).unwrap();
        (pool, dir)
    }

    fn insert_user(db: &DbPool, email: &str, name: &str) -> UserId {
        let conn = db.lock().unwrap();
        conn.execute(
            "INSERT INTO users (email, full_name, password_hash, profile_pic, created_at, updated_at)
             VALUES (?1, ?2, 'x', '', '2026-01-01T00:00:00+00:00', '2026-01-01T00:00:00+00:00')",
            rusqlite::params![email, name],
        )
        .unwrap();
        conn.last_insert_rowid()
    }

    #[test]
    fn create_assigns_id_and_timestamps() {
        let (db, _dir) = test_db();
        let a = insert_user(&db, "a@x.com", "A");
        let b = insert_user(&db, "b@x.com", "B");

        let msg = create_message(&db, a, b, "hello", "").unwrap();
        assert!(msg.id > 0);
        assert!(!msg.created_at.is_empty());
        assert_eq!(msg.sender_id, a);
        assert_eq!(msg.receiver_id, b);
    }

    #[test]
    fn find_returns_both_directions_ascending() {
        let (db, _dir) = test_db();
        let a = insert_user(&db, "a@x.com", "A");
        let b = insert_user(&db, "b@x.com", "B");
        let c = insert_user(&db, "c@x.com", "C");

        create_message(&db, a, b, "one", "").unwrap();
        create_message(&db, b, a, "two", "").unwrap();
        create_message(&db, a, c, "unrelated", "").unwrap();

        let conversation = find_messages(&db, a, b).unwrap();
        assert_eq!(conversation.len(), 2);
        assert_eq!(conversation[0].text, "one");
        assert_eq!(conversation[1].text, "two");

        // Symmetric from the other side
        let same = find_messages(&db, b, a).unwrap();
        assert_eq!(same.len(), 2);
    }

    #[test]
    fn contacts_exclude_the_caller() {
        let (db, _dir) = test_db();
        let a = insert_user(&db, "a@x.com", "A");
        insert_user(&db, "b@x.com", "B");

        let contacts = list_contacts(&db, a).unwrap();
        assert_eq!(contacts.len(), 1);
        assert_eq!(contacts[0].email, "b@x.com");
    }
}
