//! Client authentication and the public-client refresh gate.
//!
//! Public clients (no secret) may only use the refresh-token grant when
//! their `client_id` carries an allow-listed suffix. The suffix is a
//! registration-time naming convention: operators opt a public client
//! into refresh tokens by naming it accordingly, with no schema change.

use std::sync::Arc;

use crate::models::{ClientAuthMethod, GrantType, RegisteredClient};
use crate::services::error::{OAuth2Error, ServiceError};
use crate::services::store::ClientStore;

/// Suffixes that opt a public client into the refresh-token grant.
pub const TRUSTED_PUBLIC_SUFFIXES: [&str; 3] = ["_mobile", "_test", "_with_refresh"];

/// Credentials as presented at the token endpoint, before any lookup.
#[derive(Debug, Clone)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: Option<String>,
    pub method: ClientAuthMethod,
}

pub struct ClientTrustPolicy {
    clients: Arc<dyn ClientStore>,
}

impl ClientTrustPolicy {
    pub fn new(clients: Arc<dyn ClientStore>) -> Self {
        Self { clients }
    }

    /// Whether a public client's id opts it into refresh tokens.
    pub fn has_trusted_suffix(client_id: &str) -> bool {
        let lowered = client_id.to_ascii_lowercase();
        TRUSTED_PUBLIC_SUFFIXES
            .iter()
            .any(|suffix| lowered.ends_with(suffix))
    }

    /// Authenticate a client for the given grant. Failures use the
    /// `invalid_client` code and name only the check that failed.
    pub async fn authenticate(
        &self,
        credentials: &ClientCredentials,
        grant_type: GrantType,
    ) -> Result<RegisteredClient, ServiceError> {
        let client = self
            .clients
            .find_client(&credentials.client_id)
            .await?
            .ok_or_else(|| OAuth2Error::invalid_client("client_id"))?;

        if !client.allows_method(credentials.method) {
            return Err(OAuth2Error::invalid_client("authentication_method").into());
        }

        if credentials.method != ClientAuthMethod::None {
            let presented = credentials
                .client_secret
                .as_deref()
                .ok_or_else(|| OAuth2Error::invalid_client("authentication_method"))?;
            if !client.verify_secret(presented) {
                return Err(OAuth2Error::invalid_client("authentication_method").into());
            }
        }

        if !client.allows_grant(grant_type) {
            return Err(OAuth2Error::unauthorized_client(format!(
                "Grant type {grant_type} is not registered for this client"
            ))
            .into());
        }

        if grant_type == GrantType::RefreshToken
            && client.is_public()
            && !Self::has_trusted_suffix(&client.client_id)
        {
            tracing::info!(
                client_id = %client.client_id,
                "Public client without a trusted suffix attempted refresh"
            );
            return Err(OAuth2Error::invalid_client("refresh_token_not_allowed").into());
        }

        Ok(client)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::error::OAuth2ErrorCode;
    use crate::services::store::InMemoryStore;

    async fn policy_with(clients: Vec<RegisteredClient>) -> ClientTrustPolicy {
        let store = Arc::new(InMemoryStore::new());
        for client in &clients {
            store.save_client(client).await.unwrap();
        }
        ClientTrustPolicy::new(store)
    }

    fn public_client(client_id: &str) -> RegisteredClient {
        RegisteredClient::new(
            client_id.to_string(),
            client_id.to_string(),
            None,
            vec![],
            vec![GrantType::AuthorizationCode, GrantType::RefreshToken],
        )
    }

    fn creds_none(client_id: &str) -> ClientCredentials {
        ClientCredentials {
            client_id: client_id.to_string(),
            client_secret: None,
            method: ClientAuthMethod::None,
        }
    }

    fn assert_invalid_client(err: ServiceError, reason: &str) {
        match err {
            ServiceError::OAuth2(e) => {
                assert_eq!(e.code, OAuth2ErrorCode::InvalidClient);
                assert_eq!(
                    e.description.as_deref(),
                    Some(format!("Client authentication failed: {reason}").as_str())
                );
            }
            other => panic!("expected OAuth2 error, got {other:?}"),
        }
    }

    #[test]
    fn suffix_match_is_case_insensitive() {
        assert!(ClientTrustPolicy::has_trusted_suffix("app_mobile"));
        assert!(ClientTrustPolicy::has_trusted_suffix("APP_MOBILE"));
        assert!(ClientTrustPolicy::has_trusted_suffix("qa_Test"));
        assert!(ClientTrustPolicy::has_trusted_suffix("spa_with_refresh"));
        assert!(!ClientTrustPolicy::has_trusted_suffix("mobile_app"));
        assert!(!ClientTrustPolicy::has_trusted_suffix("portal_web"));
    }

    #[tokio::test]
    async fn unknown_client_fails_on_client_id() {
        let policy = policy_with(vec![]).await;
        let err = policy
            .authenticate(&creds_none("nobody"), GrantType::ClientCredentials)
            .await
            .unwrap_err();
        assert_invalid_client(err, "client_id");
    }

    #[tokio::test]
    async fn wrong_secret_fails_on_authentication_method() {
        let client = RegisteredClient::new(
            "portal_web".to_string(),
            "Portal".to_string(),
            Some("s3cret"),
            vec![],
            vec![GrantType::ClientCredentials],
        );
        let policy = policy_with(vec![client]).await;

        let err = policy
            .authenticate(
                &ClientCredentials {
                    client_id: "portal_web".to_string(),
                    client_secret: Some("wrong".to_string()),
                    method: ClientAuthMethod::ClientSecretPost,
                },
                GrantType::ClientCredentials,
            )
            .await
            .unwrap_err();
        assert_invalid_client(err, "authentication_method");
    }

    #[tokio::test]
    async fn public_client_cannot_use_a_secret_method() {
        let policy = policy_with(vec![public_client("app_mobile")]).await;

        let err = policy
            .authenticate(
                &ClientCredentials {
                    client_id: "app_mobile".to_string(),
                    client_secret: Some("made-up".to_string()),
                    method: ClientAuthMethod::ClientSecretBasic,
                },
                GrantType::RefreshToken,
            )
            .await
            .unwrap_err();
        assert_invalid_client(err, "authentication_method");
    }

    #[tokio::test]
    async fn suffixed_public_client_may_refresh() {
        let policy = policy_with(vec![public_client("app_mobile")]).await;
        let client = policy
            .authenticate(&creds_none("app_mobile"), GrantType::RefreshToken)
            .await
            .unwrap();
        assert!(client.is_public());
    }

    #[tokio::test]
    async fn unsuffixed_public_client_may_not_refresh() {
        let policy = policy_with(vec![public_client("spa_dashboard")]).await;
        let err = policy
            .authenticate(&creds_none("spa_dashboard"), GrantType::RefreshToken)
            .await
            .unwrap_err();
        assert_invalid_client(err, "refresh_token_not_allowed");
    }

    #[tokio::test]
    async fn unsuffixed_public_client_may_still_use_other_grants() {
        let policy = policy_with(vec![public_client("spa_dashboard")]).await;
        assert!(policy
            .authenticate(&creds_none("spa_dashboard"), GrantType::AuthorizationCode)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn confidential_client_refresh_is_not_gated_by_suffix() {
        let client = RegisteredClient::new(
            "portal_web".to_string(),
            "Portal".to_string(),
            Some("s3cret"),
            vec![],
            vec![GrantType::RefreshToken],
        );
        let policy = policy_with(vec![client]).await;

        assert!(policy
            .authenticate(
                &ClientCredentials {
                    client_id: "portal_web".to_string(),
                    client_secret: Some("s3cret".to_string()),
                    method: ClientAuthMethod::ClientSecretBasic,
                },
                GrantType::RefreshToken,
            )
            .await
            .is_ok());
    }
}
