use crate::models::{MessageRow, PresenceRow, UserRow};
use crate::{Database, now_stamp};
use anyhow::Result;
use rusqlite::Connection;

impl Database {
    // -- Users --

    pub fn create_user(
        &self,
        id: &str,
        username: &str,
        email: &str,
        password_hash: &str,
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO users (id, username, email, password) VALUES (?1, ?2, ?3, ?4)",
                (id, username, email, password_hash),
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "email", email))
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "username", username))
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id", id))
    }

    // -- Presence --

    /// Renew the "I am alive" lease: online, last_active = now.
    pub fn set_online(&self, user_id: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "UPDATE users SET online = 1, last_active = ?1 WHERE id = ?2",
                (now_stamp(), user_id),
            )?;
            Ok(())
        })
    }

    /// Demote to offline. Driven by the client idle timer, logout, or the
    /// server-side expiry sweep — never by relay disconnect alone.
    pub fn set_offline(&self, user_id: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute("UPDATE users SET online = 0 WHERE id = ?1", [user_id])?;
            Ok(())
        })
    }

    /// Store the live relay connection handle. Last writer wins: a second
    /// tab connecting simply overwrites the first tab's handle.
    pub fn bind_connection(&self, user_id: &str, handle: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "UPDATE users SET connection_id = ?1, online = 1, last_active = ?2 WHERE id = ?3",
                (handle, now_stamp(), user_id),
            )?;
            Ok(())
        })
    }

    /// Clear the connection handle, but only if this connection still owns
    /// it. Returns false when a newer connection has already overwritten the
    /// handle (two-tab race) — the caller must then leave presence alone.
    pub fn unbind_connection(&self, user_id: &str, handle: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let cleared = conn.execute(
                "UPDATE users SET connection_id = NULL WHERE id = ?1 AND connection_id = ?2",
                (user_id, handle),
            )?;
            Ok(cleared > 0)
        })
    }

    pub fn list_users_with_presence(&self) -> Result<Vec<PresenceRow>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT username, online FROM users ORDER BY username")?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(PresenceRow {
                        name: row.get(0)?,
                        online: row.get::<_, i64>(1)? != 0,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Mark every user offline whose lease is older than `cutoff`.
    /// Returns how many rows were demoted.
    pub fn expire_stale_presence(&self, cutoff: &str) -> Result<usize> {
        self.with_conn_mut(|conn| {
            let demoted = conn.execute(
                "UPDATE users SET online = 0
                 WHERE online = 1 AND (last_active IS NULL OR last_active < ?1)",
                [cutoff],
            )?;
            Ok(demoted)
        })
    }

    // -- Messages --

    /// Append a message. The store assigns `created_at`, clamped to the
    /// newest existing stamp so insertion order is never decreasing even if
    /// the wall clock steps backwards.
    pub fn append_message(&self, id: &str, sender: &str, body: &str) -> Result<String> {
        self.with_conn_mut(|conn| {
            let newest: Option<String> = conn
                .query_row("SELECT MAX(created_at) FROM messages", [], |row| row.get(0))
                .optional()?
                .flatten();

            let mut stamp = now_stamp();
            if let Some(newest) = newest {
                if stamp < newest {
                    stamp = newest;
                }
            }

            conn.execute(
                "INSERT INTO messages (id, sender, body, created_at) VALUES (?1, ?2, ?3, ?4)",
                (id, sender, body, &stamp),
            )?;
            Ok(stamp)
        })
    }

    /// The canonical log, oldest first.
    pub fn list_messages(&self) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, sender, body, created_at FROM messages ORDER BY created_at, id",
            )?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(MessageRow {
                        id: row.get(0)?,
                        sender: row.get(1)?,
                        body: row.get(2)?,
                        created_at: row.get(3)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    let sql = format!(
        "SELECT id, username, email, password, online, last_active, connection_id, created_at
         FROM users WHERE {} = ?1",
        column
    );
    let mut stmt = conn.prepare(&sql)?;

    let row = stmt
        .query_row([value], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                username: row.get(1)?,
                email: row.get(2)?,
                password: row.get(3)?,
                online: row.get::<_, i64>(4)? != 0,
                last_active: row.get(5)?,
                connection_id: row.get(6)?,
                created_at: row.get(7)?,
            })
        })
        .optional()?;

    Ok(row)
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db_with_user(name: &str, email: &str) -> (Database, String) {
        let db = Database::open_in_memory().unwrap();
        let id = uuid::Uuid::new_v4().to_string();
        db.create_user(&id, name, email, "hash").unwrap();
        (db, id)
    }

    #[test]
    fn message_round_trip_preserves_sender_and_body() {
        let db = Database::open_in_memory().unwrap();
        db.append_message("m1", "alice", "hi").unwrap();

        let messages = db.list_messages().unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].sender, "alice");
        assert_eq!(messages[0].body, "hi");
    }

    #[test]
    fn created_at_never_decreases() {
        let db = Database::open_in_memory().unwrap();
        let mut stamps = Vec::new();
        for i in 0..20 {
            stamps.push(db.append_message(&format!("m{}", i), "alice", "x").unwrap());
        }
        for pair in stamps.windows(2) {
            assert!(pair[0] <= pair[1], "{} > {}", pair[0], pair[1]);
        }
        let listed: Vec<String> = db
            .list_messages()
            .unwrap()
            .into_iter()
            .map(|m| m.created_at)
            .collect();
        assert_eq!(listed, stamps);
    }

    #[test]
    fn duplicate_username_and_email_are_rejected() {
        let (db, _) = db_with_user("alice", "alice@example.com");
        assert!(
            db.create_user("u2", "alice", "other@example.com", "hash")
                .is_err()
        );
        assert!(
            db.create_user("u3", "other", "alice@example.com", "hash")
                .is_err()
        );
    }

    #[test]
    fn second_tab_keeps_its_handle_when_first_tab_disconnects() {
        let (db, id) = db_with_user("alice", "alice@example.com");

        db.bind_connection(&id, "tab-1").unwrap();
        db.bind_connection(&id, "tab-2").unwrap();

        // First tab disconnects after being overwritten: must not clear
        assert!(!db.unbind_connection(&id, "tab-1").unwrap());
        let user = db.get_user_by_id(&id).unwrap().unwrap();
        assert_eq!(user.connection_id.as_deref(), Some("tab-2"));

        // Owning tab clears successfully
        assert!(db.unbind_connection(&id, "tab-2").unwrap());
        let user = db.get_user_by_id(&id).unwrap().unwrap();
        assert_eq!(user.connection_id, None);
    }

    #[test]
    fn stale_lease_is_expired_by_sweep() {
        let (db, id) = db_with_user("alice", "alice@example.com");
        let other = uuid::Uuid::new_v4().to_string();
        db.create_user(&other, "bob", "bob@example.com", "hash")
            .unwrap();

        db.set_online(&id).unwrap();
        db.set_online(&other).unwrap();

        // Nothing is stale against a cutoff in the past
        assert_eq!(db.expire_stale_presence("2000-01-01T00:00:00.000Z").unwrap(), 0);

        // Everything is stale against a cutoff in the far future
        let demoted = db.expire_stale_presence("9999-01-01T00:00:00.000Z").unwrap();
        assert_eq!(demoted, 2);
        let users = db.list_users_with_presence().unwrap();
        assert!(users.iter().all(|u| !u.online));
    }

    #[test]
    fn offline_signal_clears_online_flag_only() {
        let (db, id) = db_with_user("alice", "alice@example.com");
        db.bind_connection(&id, "tab-1").unwrap();
        db.set_offline(&id).unwrap();

        let user = db.get_user_by_id(&id).unwrap().unwrap();
        assert!(!user.online);
        // Idle does not tear down the relay connection
        assert_eq!(user.connection_id.as_deref(), Some("tab-1"));
        assert!(user.last_active.is_some());
    }
}
