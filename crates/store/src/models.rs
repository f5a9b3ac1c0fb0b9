//! Row types for the two persisted tables.

use chrono::{DateTime, Utc};

/// A registered account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    /// Opaque password verifier, `pbkdf2$<iters>$<salt_hex>$<dk_hex>`.
    pub pass_hash: String,
}

/// A long-lived login grant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub id: i64,
    pub user_id: i64,
    /// 64 hex characters from 32 random bytes.
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub last_seen_at: Option<DateTime<Utc>>,
}

impl Session {
    /// A session is valid while the current time precedes its expiry.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}
