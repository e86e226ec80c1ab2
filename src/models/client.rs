//! Registered OAuth2 client model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::models::GrantType;

/// How a client authenticates at the token endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientAuthMethod {
    /// Public clients (browser SPA, mobile app) - no secret.
    None,
    ClientSecretBasic,
    ClientSecretPost,
}

impl ClientAuthMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClientAuthMethod::None => "none",
            ClientAuthMethod::ClientSecretBasic => "client_secret_basic",
            ClientAuthMethod::ClientSecretPost => "client_secret_post",
        }
    }
}

/// Registered client entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisteredClient {
    pub id: uuid::Uuid,
    pub client_id: String,
    /// SHA-256 hex of the client secret; None for public clients.
    pub client_secret_hash: Option<String>,
    pub client_name: String,
    pub redirect_uris: Vec<String>,
    pub auth_methods: Vec<ClientAuthMethod>,
    pub grant_types: Vec<GrantType>,
    pub access_token_ttl_secs: i64,
    pub refresh_token_ttl_secs: i64,
    pub created_at: DateTime<Utc>,
}

impl RegisteredClient {
    pub fn new(
        client_id: String,
        client_name: String,
        client_secret: Option<&str>,
        redirect_uris: Vec<String>,
        grant_types: Vec<GrantType>,
    ) -> Self {
        let auth_methods = if client_secret.is_some() {
            vec![
                ClientAuthMethod::ClientSecretBasic,
                ClientAuthMethod::ClientSecretPost,
            ]
        } else {
            vec![ClientAuthMethod::None]
        };

        Self {
            id: uuid::Uuid::new_v4(),
            client_id,
            client_secret_hash: client_secret.map(Self::hash_secret),
            client_name,
            redirect_uris,
            auth_methods,
            grant_types,
            access_token_ttl_secs: 900,
            refresh_token_ttl_secs: 604_800,
            created_at: Utc::now(),
        }
    }

    /// Hash a client secret with SHA-256.
    pub fn hash_secret(secret: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(secret.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// A client that cannot hold a secret.
    pub fn is_public(&self) -> bool {
        self.client_secret_hash.is_none()
    }

    pub fn allows_method(&self, method: ClientAuthMethod) -> bool {
        self.auth_methods.contains(&method)
    }

    pub fn allows_grant(&self, grant: GrantType) -> bool {
        self.grant_types.contains(&grant)
    }

    /// Constant-time comparison of a presented secret against the stored hash.
    pub fn verify_secret(&self, presented: &str) -> bool {
        let Some(stored) = &self.client_secret_hash else {
            return false;
        };
        let computed = Self::hash_secret(presented);
        computed.as_bytes().ct_eq(stored.as_bytes()).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secret_verification() {
        let client = RegisteredClient::new(
            "portal_web".to_string(),
            "Portal".to_string(),
            Some("s3cret"),
            vec!["https://portal.example.com/callback".to_string()],
            vec![GrantType::AuthorizationCode, GrantType::RefreshToken],
        );

        assert!(!client.is_public());
        assert!(client.verify_secret("s3cret"));
        assert!(!client.verify_secret("wrong"));
        assert!(client.allows_method(ClientAuthMethod::ClientSecretPost));
        assert!(!client.allows_method(ClientAuthMethod::None));
    }

    #[test]
    fn public_client_has_no_secret_and_method_none() {
        let client = RegisteredClient::new(
            "app_mobile".to_string(),
            "Mobile app".to_string(),
            None,
            vec!["com.example.app://callback".to_string()],
            vec![GrantType::AuthorizationCode, GrantType::RefreshToken],
        );

        assert!(client.is_public());
        assert!(client.allows_method(ClientAuthMethod::None));
        assert!(!client.verify_secret("anything"));
    }
}
