//! Persistence for the FSX server: users, login sessions, password
//! verifiers and bearer tokens.
//!
//! The [`Database`] wraps a single SQLite connection behind a mutex; the
//! repository methods in `users.rs` and `sessions.rs` are the only query
//! surface. Password hashing and token generation are pure helpers with no
//! database dependency.

mod database;
mod error;
mod models;
pub mod password;
mod sessions;
pub mod token;
mod users;

pub use database::Database;
pub use error::{Result, StoreError};
pub use models::{Session, User};
