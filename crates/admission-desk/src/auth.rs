//! Administrator credentials and cookie sessions.
//!
//! An [`AdminIdentity`] is only minted by verifying a password; afterwards it travels in
//! the admin's session, so every review operation that takes one is implicitly
//! authenticated.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tower_sessions::cookie::{time, SameSite};
use tower_sessions::{Expiry, MemoryStore, Session, SessionManagerLayer};

use crate::config::AdminConfig;

/// An authenticated administrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminIdentity {
    username: String,
}

impl AdminIdentity {
    pub(crate) fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("invalid username or password")]
    InvalidCredentials,
    #[error("admin session required")]
    MissingSession,
    #[error("session store failed: {0}")]
    SessionStore(String),
}

/// Known administrator accounts with SHA-256 password digests.
#[derive(Debug, Default)]
pub struct AdminDirectory {
    accounts: HashMap<String, String>,
}

impl AdminDirectory {
    pub fn from_config(config: &AdminConfig) -> Self {
        let mut directory = Self::default();
        directory.add_account(&config.username, &config.password);
        directory
    }

    pub fn add_account(&mut self, username: &str, password: &str) {
        self.accounts
            .insert(username.to_string(), password_digest(username, password));
    }

    pub fn verify(&self, username: &str, password: &str) -> Result<AdminIdentity, AuthError> {
        let expected = self
            .accounts
            .get(username)
            .ok_or(AuthError::InvalidCredentials)?;
        let supplied = password_digest(username, password);
        if constant_time_eq(expected.as_bytes(), supplied.as_bytes()) {
            Ok(AdminIdentity::new(username))
        } else {
            Err(AuthError::InvalidCredentials)
        }
    }
}

/// Digest salted with the username so equal passwords differ across accounts.
fn password_digest(username: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(username.as_bytes());
    hasher.update(b":");
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

fn constant_time_eq(left: &[u8], right: &[u8]) -> bool {
    left.len() == right.len()
        && left
            .iter()
            .zip(right)
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
}

/// Session key holding the signed-in [`AdminIdentity`].
const ADMIN_SESSION_KEY: &str = "admin";

/// Cookie-keyed admin sessions held in process memory, expiring after `ttl` of inactivity.
pub fn session_layer(
    cookie_name: &'static str,
    ttl: Duration,
    secure: bool,
) -> SessionManagerLayer<MemoryStore> {
    let ttl = time::Duration::try_from(ttl).unwrap_or(time::Duration::MAX);
    SessionManagerLayer::new(MemoryStore::default())
        .with_name(cookie_name)
        .with_path("/")
        .with_http_only(true)
        .with_same_site(SameSite::Strict)
        .with_secure(secure)
        .with_expiry(Expiry::OnInactivity(ttl))
}

/// Bind a verified administrator to the session under a fresh session id.
pub async fn sign_in(session: &Session, identity: &AdminIdentity) -> Result<(), AuthError> {
    session.cycle_id().await.map_err(session_failure)?;
    session
        .insert(ADMIN_SESSION_KEY, identity)
        .await
        .map_err(session_failure)
}

pub async fn current_admin(session: &Session) -> Result<AdminIdentity, AuthError> {
    session
        .get::<AdminIdentity>(ADMIN_SESSION_KEY)
        .await
        .map_err(session_failure)?
        .ok_or(AuthError::MissingSession)
}

/// Drop the session record; the session cookie is expired on the response.
pub async fn sign_out(session: &Session) -> Result<(), AuthError> {
    session.flush().await.map_err(session_failure)
}

fn session_failure(err: tower_sessions::session::Error) -> AuthError {
    AuthError::SessionStore(err.to_string())
}
