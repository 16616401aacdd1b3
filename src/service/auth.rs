use std::sync::Arc;

use chrono::{Duration, Utc};
use rand::RngCore;

use crate::error::{Result, RoomlyError};
use crate::store::{SessionStore, User, UserStore};

const SESSION_TTL_DAYS: i64 = 7;

pub struct AuthService {
    users: Arc<dyn UserStore>,
    sessions: Arc<dyn SessionStore>,
}

impl AuthService {
    pub fn new(users: Arc<dyn UserStore>, sessions: Arc<dyn SessionStore>) -> Self {
        Self { users, sessions }
    }

    pub fn register(&self, email: &str, password: &str) -> Result<()> {
        let email = email.trim().to_lowercase();
        if !valid_email(&email) || password.len() < 8 {
            return Err(RoomlyError::InvalidInput(
                "invalid email or password".to_string(),
            ));
        }
        let hash = bcrypt::hash(password, bcrypt::DEFAULT_COST)
            .map_err(|e| RoomlyError::Internal(e.to_string()))?;
        self.users.create_user(&email, &hash, false)?;
        Ok(())
    }

    /// Returns (session token, expiry) on success. Credential failures are
    /// indistinguishable by design.
    pub fn login(&self, email: &str, password: &str) -> Result<(String, String)> {
        let email = email.trim().to_lowercase();
        let user = self
            .users
            .user_by_email(&email)?
            .ok_or_else(|| RoomlyError::Unauthenticated("invalid credentials".to_string()))?;
        let ok = bcrypt::verify(password, &user.password_hash)
            .map_err(|e| RoomlyError::Internal(e.to_string()))?;
        if !ok {
            return Err(RoomlyError::Unauthenticated(
                "invalid credentials".to_string(),
            ));
        }

        let token = random_token();
        let expires_at = (Utc::now() + Duration::days(SESSION_TTL_DAYS)).to_rfc3339();
        self.sessions.put_session(&token, &user.id, &expires_at)?;
        Ok((token, expires_at))
    }

    pub fn logout(&self, token: &str) -> Result<()> {
        if token.is_empty() {
            return Ok(());
        }
        self.sessions.delete_session(token)
    }

    pub fn current_user(&self, token: &str) -> Result<User> {
        if token.is_empty() {
            return Err(RoomlyError::Unauthenticated("no token".to_string()));
        }
        let session = self
            .sessions
            .session(token)?
            .ok_or_else(|| RoomlyError::Unauthenticated("invalid session".to_string()))?;
        self.users
            .user_by_id(&session.user_id)?
            .ok_or_else(|| RoomlyError::Unauthenticated("invalid session".to_string()))
    }

    /// Creates the bootstrap admin account if it does not exist yet.
    pub fn seed_admin(&self, email: &str, password: &str) -> Result<()> {
        let email = email.trim().to_lowercase();
        if self.users.user_by_email(&email)?.is_some() {
            return Ok(());
        }
        let hash = bcrypt::hash(password, bcrypt::DEFAULT_COST)
            .map_err(|e| RoomlyError::Internal(e.to_string()))?;
        self.users.create_user(&email, &hash, true)?;
        tracing::info!(email = %email, "Seeded admin account");
        Ok(())
    }
}

fn random_token() -> String {
    let mut buf = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut buf);
    hex::encode(buf)
}

fn valid_email(s: &str) -> bool {
    s.contains('@') && s.len() <= 255
}
