//! Credential service: registration and login on top of the store.

use std::sync::Arc;

use fsx_protocol::messages::{LoginReq, LoginResp, RegisterReq, RegisterResp};
use fsx_store::{password, Database};

/// Login grants live for 24 hours.
pub const SESSION_TTL_SECONDS: i64 = 24 * 3600;

/// Handles REGISTER_REQ and LOGIN_REQ against the user/session repositories.
pub struct AuthService {
    db: Arc<Database>,
}

impl AuthService {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub fn register(&self, req: &RegisterReq) -> RegisterResp {
        if req.username.is_empty() || req.username.len() > 64 {
            return fail("username must be 1-64 characters");
        }
        if req.password.is_empty() || req.password.len() > 128 {
            return fail("password must be 1-128 characters");
        }

        match self.db.user_by_username(&req.username) {
            Ok(Some(_)) => return fail("username already exists"),
            Ok(None) => {}
            Err(e) => return fail(format!("registration failed: {e}")),
        }

        if req.email.is_empty() || req.email.len() > 255 {
            return fail("email must be 1-255 characters");
        }

        let pass_hash = password::hash_password(&req.password);
        match self.db.create_user(&req.username, &req.email, &pass_hash) {
            Ok(user_id) => {
                tracing::debug!(user_id, username = %req.username, "user created");
                RegisterResp {
                    ok: true,
                    message: "user created successfully".into(),
                }
            }
            Err(e) => fail(format!("registration failed: {e}")),
        }
    }

    pub fn login(&self, req: &LoginReq) -> LoginResp {
        if req.username.is_empty() || req.password.is_empty() {
            return LoginResp::failure("username and password required");
        }

        // Unknown user and bad password produce the same opaque message.
        let user = match self.db.user_by_username(&req.username) {
            Ok(Some(user)) => user,
            Ok(None) => return LoginResp::failure("invalid username or password"),
            Err(e) => return LoginResp::failure(format!("login failed: {e}")),
        };

        if !password::verify_password(&req.password, &user.pass_hash) {
            return LoginResp::failure("invalid username or password");
        }

        match self.db.create_session(user.id, SESSION_TTL_SECONDS) {
            Ok(token) => LoginResp {
                ok: true,
                token,
                user_id: user.id,
                username: user.username,
                message: "login successful".into(),
            },
            Err(e) => LoginResp::failure(format!("login failed: {e}")),
        }
    }
}

fn fail(message: impl Into<String>) -> RegisterResp {
    RegisterResp {
        ok: false,
        message: message.into(),
    }
}
