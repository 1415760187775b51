use std::sync::Arc;

use chrono::Utc;
use rand::RngCore;
use tracing::{debug, info};

use murmur_db::Database;
use murmur_types::UserId;
use murmur_types::api::LoginResponse;

use crate::error::{ApiError, ApiResult};
use crate::password::{hash_password, verify_password};

const TOKEN_BYTES: usize = 32;

/// Issues and validates opaque session tokens.
///
/// Tokens live in the `sessions` table, so they survive restarts and every
/// handler shares the same view through the injected instance.
pub struct SessionManager {
    db: Arc<Database>,
    ttl: chrono::Duration,
}

impl SessionManager {
    pub fn new(db: Arc<Database>, ttl: chrono::Duration) -> Self {
        Self { db, ttl }
    }

    /// Create an account. Does not log the user in.
    pub fn register(&self, email: &str, name: &str, password: &str) -> ApiResult<UserId> {
        let email = email.trim();
        let name = name.trim();
        if email.is_empty() || name.is_empty() {
            return Err(ApiError::InvalidInput("email and name are required".into()));
        }
        if password.is_empty() {
            return Err(ApiError::InvalidInput("password is required".into()));
        }

        let pass_hash = hash_password(password)?;
        let user_id = self
            .db
            .create_user(email, name, &pass_hash)?
            .ok_or(ApiError::EmailInUse)?;

        info!(user_id, "registered new user");
        Ok(user_id)
    }

    /// Check credentials and open a new session. Unknown email and wrong
    /// password fail identically.
    pub fn login(&self, email: &str, password: &str) -> ApiResult<LoginResponse> {
        let user = self
            .db
            .get_user_by_email(email.trim())?
            .ok_or(ApiError::InvalidCredentials)?;

        if !verify_password(password, &user.pass_hash) {
            return Err(ApiError::InvalidCredentials);
        }

        let token = new_token();
        let expires_at = (Utc::now() + self.ttl).format("%Y-%m-%d %H:%M:%S").to_string();
        self.db.insert_session(&token, user.id, &expires_at)?;

        info!(user_id = user.id, %expires_at, "session opened");
        Ok(LoginResponse {
            token,
            user_id: user.id,
            name: user.name,
        })
    }

    /// Map a token to its user. Every authenticated operation starts here.
    pub fn resolve(&self, token: &str) -> ApiResult<UserId> {
        if token.is_empty() {
            return Err(ApiError::Unauthenticated);
        }
        self.db.session_user(token)?.ok_or(ApiError::Unauthenticated)
    }

    /// Drop a session. Logging out twice is not an error.
    pub fn logout(&self, token: &str) -> ApiResult<()> {
        if self.db.delete_session(token)? {
            debug!("session closed");
        }
        Ok(())
    }

    pub fn sweep_expired(&self) -> anyhow::Result<usize> {
        self.db.delete_expired_sessions()
    }
}

fn new_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
