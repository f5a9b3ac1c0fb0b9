//! User repository.

use rusqlite::params;

use crate::database::Database;
use crate::error::Result;
use crate::models::User;

impl Database {
    /// Inserts a new user and returns its id.
    ///
    /// A duplicate username surfaces as the UNIQUE-constraint error from
    /// SQLite; callers that want a friendly message check
    /// [`user_by_username`](Self::user_by_username) first.
    pub fn create_user(&self, username: &str, email: &str, pass_hash: &str) -> Result<i64> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO users (username, email, pass_hash) VALUES (?1, ?2, ?3)",
            params![username, email, pass_hash],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Fetches a user by exact username.
    pub fn user_by_username(&self, username: &str) -> Result<Option<User>> {
        let conn = self.lock();
        match conn.query_row(
            "SELECT id, username, email, pass_hash FROM users WHERE username = ?1",
            params![username],
            row_to_user,
        ) {
            Ok(user) => Ok(Some(user)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        pass_hash: row.get(3)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_and_fetch() {
        let db = Database::open_in_memory().unwrap();
        let id = db.create_user("alice", "a@x", "pbkdf2$1$aa$bb").unwrap();
        assert_eq!(id, 1);

        let user = db.user_by_username("alice").unwrap().unwrap();
        assert_eq!(user.id, 1);
        assert_eq!(user.username, "alice");
        assert_eq!(user.email, "a@x");
        assert_eq!(user.pass_hash, "pbkdf2$1$aa$bb");
    }

    #[test]
    fn ids_are_sequential() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(db.create_user("alice", "a@x", "h").unwrap(), 1);
        assert_eq!(db.create_user("bob", "b@x", "h").unwrap(), 2);
    }

    #[test]
    fn unknown_user_is_none() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.user_by_username("ghost").unwrap().is_none());
    }

    #[test]
    fn duplicate_username_is_rejected() {
        let db = Database::open_in_memory().unwrap();
        db.create_user("alice", "a@x", "h").unwrap();
        assert!(db.create_user("alice", "other@x", "h2").is_err());
    }
}
