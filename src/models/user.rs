//! User model - the aggregate carrying the revocation ledger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// User entity.
///
/// `token_version` is the revocation ledger: an opaque value that is
/// regenerated on every revoke-all event and never reverts. Every
/// authorization created for this user is stamped with the value current
/// at creation time.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    /// None for federated-only accounts that never set a local password.
    pub password_hash: Option<String>,
    pub role: String,
    pub mfa_enabled: bool,
    pub mfa_secret: Option<String>,
    pub token_version: Uuid,
    pub enabled: bool,
    pub locked: bool,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Create a new user with a fresh token version.
    pub fn new(username: String, password_hash: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            username,
            password_hash,
            role: "USER".to_string(),
            mfa_enabled: false,
            mfa_secret: None,
            token_version: Uuid::new_v4(),
            enabled: true,
            locked: false,
            created_at: Utc::now(),
        }
    }

    /// Whether the account is in a state that permits authentication.
    pub fn can_authenticate(&self) -> bool {
        self.enabled && !self.locked
    }

    /// Enable TOTP with the given base32 secret.
    pub fn with_mfa(mut self, secret: String) -> Self {
        self.mfa_enabled = true;
        self.mfa_secret = Some(secret);
        self
    }
}
