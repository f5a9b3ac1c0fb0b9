//! Session repository.
//!
//! Timestamps are stored as RFC 3339 text and parsed back with `chrono`;
//! validity is decided in code against `Utc::now()` rather than in SQL.

use chrono::{DateTime, Duration, Utc};
use rusqlite::params;

use crate::database::Database;
use crate::error::Result;
use crate::models::Session;
use crate::token;

impl Database {
    /// Creates a session for `user_id` expiring `ttl_seconds` from now and
    /// returns its bearer token.
    pub fn create_session(&self, user_id: i64, ttl_seconds: i64) -> Result<String> {
        let token = token::generate_token();
        let expires_at = Utc::now() + Duration::seconds(ttl_seconds);

        let conn = self.lock();
        conn.execute(
            "INSERT INTO sessions (user_id, token, expires_at) VALUES (?1, ?2, ?3)",
            params![user_id, token, expires_at.to_rfc3339()],
        )?;
        Ok(token)
    }

    /// Resolves a token to its session if the session has not expired.
    pub fn validate_token(&self, token: &str) -> Result<Option<Session>> {
        let conn = self.lock();
        let session = match conn.query_row(
            "SELECT id, user_id, token, expires_at, last_seen_at
             FROM sessions WHERE token = ?1",
            params![token],
            row_to_session,
        ) {
            Ok(s) => s,
            Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        if session.is_valid_at(Utc::now()) {
            Ok(Some(session))
        } else {
            Ok(None)
        }
    }

    /// Stamps the session's `last_seen_at`. Unknown tokens are a no-op.
    pub fn touch_session(&self, token: &str) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "UPDATE sessions SET last_seen_at = ?1 WHERE token = ?2",
            params![Utc::now().to_rfc3339(), token],
        )?;
        Ok(())
    }

    /// All unexpired sessions, most recently seen first.
    pub fn valid_sessions(&self) -> Result<Vec<Session>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, user_id, token, expires_at, last_seen_at FROM sessions",
        )?;
        let rows = stmt.query_map([], row_to_session)?;

        let now = Utc::now();
        let mut sessions = Vec::new();
        for row in rows {
            let session = row?;
            if session.is_valid_at(now) {
                sessions.push(session);
            }
        }
        sessions.sort_by(|a, b| b.last_seen_at.cmp(&a.last_seen_at));
        Ok(sessions)
    }
}

fn row_to_session(row: &rusqlite::Row<'_>) -> rusqlite::Result<Session> {
    let expires_str: String = row.get(3)?;
    let last_seen_str: Option<String> = row.get(4)?;

    let expires_at = parse_ts(&expires_str, 3)?;
    let last_seen_at = match last_seen_str {
        Some(s) => Some(parse_ts(&s, 4)?),
        None => None,
    };

    Ok(Session {
        id: row.get(0)?,
        user_id: row.get(1)?,
        token: row.get(2)?,
        expires_at,
        last_seen_at,
    })
}

fn parse_ts(s: &str, col: usize) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(col, rusqlite::types::Type::Text, Box::new(e))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db_with_user() -> (Database, i64) {
        let db = Database::open_in_memory().unwrap();
        let id = db.create_user("alice", "a@x", "h").unwrap();
        (db, id)
    }

    #[test]
    fn create_and_validate() {
        let (db, user_id) = db_with_user();
        let token = db.create_session(user_id, 24 * 3600).unwrap();
        assert_eq!(token.len(), 64);

        let session = db.validate_token(&token).unwrap().unwrap();
        assert_eq!(session.user_id, user_id);
        assert_eq!(session.token, token);
        assert!(session.last_seen_at.is_none());
        assert!(session.expires_at > Utc::now());
    }

    #[test]
    fn unknown_token_is_none() {
        let (db, _) = db_with_user();
        assert!(db.validate_token("deadbeef").unwrap().is_none());
    }

    #[test]
    fn expired_session_is_none() {
        let (db, user_id) = db_with_user();
        let token = db.create_session(user_id, -1).unwrap();
        assert!(db.validate_token(&token).unwrap().is_none());
    }

    #[test]
    fn touch_updates_last_seen() {
        let (db, user_id) = db_with_user();
        let token = db.create_session(user_id, 3600).unwrap();

        db.touch_session(&token).unwrap();
        let session = db.validate_token(&token).unwrap().unwrap();
        assert!(session.last_seen_at.is_some());

        // unknown token must not error
        db.touch_session("nope").unwrap();
    }

    #[test]
    fn valid_sessions_filters_expired() {
        let (db, user_id) = db_with_user();
        let live = db.create_session(user_id, 3600).unwrap();
        let _dead = db.create_session(user_id, -1).unwrap();

        let sessions = db.valid_sessions().unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].token, live);
    }

    #[test]
    fn tokens_are_distinct_per_login() {
        let (db, user_id) = db_with_user();
        let a = db.create_session(user_id, 3600).unwrap();
        let b = db.create_session(user_id, 3600).unwrap();
        assert_ne!(a, b);
    }
}
