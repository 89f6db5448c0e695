//! Minimal access to the `users` table.
//!
//! Account creation and profile management belong to an external subsystem;
//! the message core only validates receiver existence and resolves display
//! names for the conversation projection.

use rusqlite::params;

use causerie_shared::types::UserId;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::messages::{parse_ts, parse_uuid};
use crate::models::UserRecord;

impl Database {
    pub fn insert_user(&self, user: &UserRecord) -> Result<()> {
        self.conn().execute(
            "INSERT INTO users (id, username, created_at) VALUES (?1, ?2, ?3)",
            params![
                user.id.to_string(),
                user.username,
                user.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn user_exists(&self, id: UserId) -> Result<bool> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM users WHERE id = ?1",
            params![id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn get_user(&self, id: UserId) -> Result<UserRecord> {
        self.conn()
            .query_row(
                "SELECT id, username, created_at FROM users WHERE id = ?1",
                params![id.to_string()],
                |row| {
                    let id_str: String = row.get(0)?;
                    let username: String = row.get(1)?;
                    let ts_str: String = row.get(2)?;
                    Ok(UserRecord {
                        id: UserId(parse_uuid(&id_str, 0)?),
                        username,
                        created_at: parse_ts(&ts_str, 2)?,
                    })
                },
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_lookup() {
        let db = Database::open_in_memory().unwrap();
        let user = UserRecord::new("alice");

        assert!(!db.user_exists(user.id).unwrap());
        db.insert_user(&user).unwrap();
        assert!(db.user_exists(user.id).unwrap());

        let fetched = db.get_user(user.id).unwrap();
        assert_eq!(fetched.username, "alice");
    }

    #[test]
    fn test_get_missing_is_not_found() {
        let db = Database::open_in_memory().unwrap();
        assert!(matches!(
            db.get_user(UserId::new()),
            Err(StoreError::NotFound)
        ));
    }

    #[test]
    fn test_duplicate_username_rejected() {
        let db = Database::open_in_memory().unwrap();
        db.insert_user(&UserRecord::new("alice")).unwrap();
        assert!(db.insert_user(&UserRecord::new("alice")).is_err());
    }
}
