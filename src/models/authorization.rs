//! Authorization record - one login/consent session and its tokens.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Attribute key under which the owning user's token version is stamped.
pub const ATTR_TOKEN_VERSION: &str = "token_version";

/// OAuth2 authorization grant types handled by this server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantType {
    AuthorizationCode,
    RefreshToken,
    ClientCredentials,
}

impl GrantType {
    pub fn as_str(&self) -> &'static str {
        match self {
            GrantType::AuthorizationCode => "authorization_code",
            GrantType::RefreshToken => "refresh_token",
            GrantType::ClientCredentials => "client_credentials",
        }
    }
}

impl fmt::Display for GrantType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GrantType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "authorization_code" => Ok(GrantType::AuthorizationCode),
            "refresh_token" => Ok(GrantType::RefreshToken),
            "client_credentials" => Ok(GrantType::ClientCredentials),
            other => Err(format!("unknown grant type: {other}")),
        }
    }
}

/// Token categories stored on an authorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Access,
    Refresh,
}

impl TokenKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKind::Access => "access",
            TokenKind::Refresh => "refresh",
        }
    }
}

impl FromStr for TokenKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "access" => Ok(TokenKind::Access),
            "refresh" => Ok(TokenKind::Refresh),
            other => Err(format!("unknown token kind: {other}")),
        }
    }
}

/// A token attached to an authorization.
///
/// Rotated-out refresh tokens stay attached with `invalidated = true`
/// instead of being deleted. A second presentation of a consumed token
/// therefore still resolves to its authorization, which is what makes
/// reuse detection possible.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredToken {
    pub value: String,
    pub kind: TokenKind,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub invalidated: bool,
}

impl StoredToken {
    pub fn new(value: String, kind: TokenKind, ttl_secs: i64) -> Self {
        let now = Utc::now();
        Self {
            value,
            kind,
            issued_at: now,
            expires_at: now + Duration::seconds(ttl_secs),
            invalidated: false,
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }

    /// Usable: neither rotated out nor expired.
    pub fn is_active(&self) -> bool {
        !self.invalidated && !self.is_expired()
    }
}

/// Server-side record of a single login/consent session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationRecord {
    pub id: Uuid,
    pub principal_name: String,
    pub grant_type: GrantType,
    /// Open attribute bag; this core only ever writes `token_version`.
    pub attributes: HashMap<String, String>,
    pub tokens: Vec<StoredToken>,
}

impl AuthorizationRecord {
    pub fn new(principal_name: String, grant_type: GrantType) -> Self {
        Self {
            id: Uuid::new_v4(),
            principal_name,
            grant_type,
            attributes: HashMap::new(),
            tokens: Vec::new(),
        }
    }

    /// The stamped token version, if any.
    pub fn token_version(&self) -> Option<&str> {
        self.attributes.get(ATTR_TOKEN_VERSION).map(String::as_str)
    }

    pub fn set_token_version(&mut self, version: &str) {
        self.attributes
            .insert(ATTR_TOKEN_VERSION.to_string(), version.to_string());
    }

    pub fn attach_token(&mut self, token: StoredToken) {
        self.tokens.push(token);
    }

    /// Look up a stored token by literal value, regardless of state.
    pub fn find_token(&self, value: &str) -> Option<&StoredToken> {
        self.tokens.iter().find(|t| t.value == value)
    }

    pub fn has_token(&self, value: &str, kind: Option<TokenKind>) -> bool {
        self.tokens
            .iter()
            .any(|t| t.value == value && kind.map_or(true, |k| t.kind == k))
    }

    /// Mark every refresh token on this record as consumed. Called during
    /// rotation, before the replacement token is attached.
    pub fn invalidate_refresh_tokens(&mut self) {
        for token in &mut self.tokens {
            if token.kind == TokenKind::Refresh {
                token.invalidated = true;
            }
        }
    }
}
