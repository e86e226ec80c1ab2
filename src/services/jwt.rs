//! RS256 access tokens and the claims customizer.

use std::sync::Arc;

use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::services::error::ServiceError;
use crate::services::store::UserStore;

/// Claims carried by an access token.
///
/// The optional fields are populated by [`TokenClaimsCustomizer`] for
/// user principals and stay absent for client-credentials tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    pub sub: String,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
    pub client_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roles: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_version: Option<String>,
}

/// Successful token-endpoint response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
}

impl JwtService {
    pub fn new(private_pem: &[u8], public_pem: &[u8], issuer: String) -> Result<Self, ServiceError> {
        let encoding_key = EncodingKey::from_rsa_pem(private_pem)
            .map_err(|e| ServiceError::Config(anyhow::anyhow!("Invalid RSA private key: {e}")))?;
        let decoding_key = DecodingKey::from_rsa_pem(public_pem)
            .map_err(|e| ServiceError::Config(anyhow::anyhow!("Invalid RSA public key: {e}")))?;
        Ok(Self {
            encoding_key,
            decoding_key,
            issuer,
        })
    }

    /// Base claims for a principal; subject only, no user enrichment.
    pub fn base_claims(&self, subject: &str, client_id: &str, ttl_secs: i64) -> AccessTokenClaims {
        let now = Utc::now().timestamp();
        AccessTokenClaims {
            sub: subject.to_string(),
            iss: self.issuer.clone(),
            iat: now,
            exp: now + ttl_secs,
            jti: Uuid::new_v4().to_string(),
            client_id: client_id.to_string(),
            user_id: None,
            roles: None,
            token_version: None,
        }
    }

    pub fn sign(&self, claims: &AccessTokenClaims) -> Result<String, ServiceError> {
        encode(&Header::new(Algorithm::RS256), claims, &self.encoding_key)
            .map_err(|e| anyhow::anyhow!("Failed to sign access token: {e}").into())
    }

    pub fn verify(&self, token: &str) -> Result<AccessTokenClaims, ServiceError> {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_issuer(&[&self.issuer]);
        let data = decode::<AccessTokenClaims>(token, &self.decoding_key, &validation)
            .map_err(|e| anyhow::anyhow!("Invalid access token: {e}"))?;
        Ok(data.claims)
    }
}

/// Enriches access-token claims for user principals.
///
/// A client-credentials token has no user behind it and passes through
/// untouched. For users, the claims gain the user's id, role, and the
/// token version current at issuance so resource servers can check
/// revocation without a round trip.
pub struct TokenClaimsCustomizer {
    users: Arc<dyn UserStore>,
}

impl TokenClaimsCustomizer {
    pub fn new(users: Arc<dyn UserStore>) -> Self {
        Self { users }
    }

    pub async fn customize(&self, claims: &mut AccessTokenClaims) -> Result<(), ServiceError> {
        let Some(user) = self.users.find_user_by_username(&claims.sub).await? else {
            return Ok(());
        };

        claims.user_id = Some(user.id);
        claims.roles = Some(vec![user.role]);
        claims.token_version = Some(user.token_version.to_string());
        Ok(())
    }
}
