//! Refresh-token reuse detection.
//!
//! Rotation keeps consumed refresh tokens attached to their
//! authorization (marked invalidated), so a replayed token still
//! resolves to its session. Whenever the token endpoint answers a
//! refresh-token request with `invalid_grant`, this handler resolves
//! the presented token and deletes the whole authorization: if a
//! rotated token resurfaces it was either leaked or the legitimate
//! holder lost the race, and in both cases the session family dies.

use std::sync::Arc;

use crate::models::{GrantType, TokenKind};
use crate::services::error::{OAuth2Error, OAuth2ErrorCode};
use crate::services::store::AuthorizationStore;

pub struct ReuseDetectionHandler {
    /// Undecorated store: the lookup here must resolve stale and
    /// invalidated tokens without triggering version checks.
    store: Arc<dyn AuthorizationStore>,
}

impl ReuseDetectionHandler {
    pub fn new(store: Arc<dyn AuthorizationStore>) -> Self {
        Self { store }
    }

    /// Inspect a token-endpoint failure and revoke the session behind a
    /// replayed refresh token. Always returns the original error; cleanup
    /// failures are logged, never surfaced.
    pub async fn handle(
        &self,
        grant_type: Option<GrantType>,
        refresh_token: Option<&str>,
        error: OAuth2Error,
    ) -> OAuth2Error {
        if error.code != OAuth2ErrorCode::InvalidGrant
            || grant_type != Some(GrantType::RefreshToken)
        {
            return error;
        }
        let Some(token) = refresh_token else {
            return error;
        };

        // Refresh tokens only: an access-token value smuggled into the
        // refresh_token parameter must not take a session down with it.
        match self
            .store
            .find_by_token(token, Some(TokenKind::Refresh))
            .await
        {
            Ok(Some(record)) => {
                tracing::warn!(
                    principal = %record.principal_name,
                    authorization_id = %record.id,
                    "Refresh token reuse detected, revoking authorization"
                );
                if let Err(e) = self.store.remove_authorization(record.id).await {
                    tracing::error!(error = %e, "Failed to remove reused authorization");
                }
            }
            Ok(None) => {
                // Unknown token, or the session was already deleted by the
                // version check. Nothing left to revoke.
            }
            Err(e) => {
                tracing::error!(error = %e, "Reuse lookup failed");
            }
        }

        error
    }
}
