//! Token-version enforcement around the authorization store.
//!
//! `VersionedAuthorizationStore` decorates any [`AuthorizationStore`]:
//! on save it stamps the record with the owning user's current token
//! version; on refresh-token lookup it compares the stamp against the
//! user's live version and rejects (and deletes) stale sessions. One
//! version rotation therefore kills every outstanding session at its
//! next refresh, with no per-token bookkeeping.

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{AuthorizationRecord, GrantType, TokenKind};
use crate::services::error::{OAuth2Error, ServiceError};
use crate::services::store::{AuthorizationStore, UserStore};

pub struct VersionedAuthorizationStore {
    inner: Arc<dyn AuthorizationStore>,
    users: Arc<dyn UserStore>,
}

impl VersionedAuthorizationStore {
    pub fn new(inner: Arc<dyn AuthorizationStore>, users: Arc<dyn UserStore>) -> Self {
        Self { inner, users }
    }

    /// Enforce the version check on a record resolved by refresh token.
    async fn verify(
        &self,
        record: AuthorizationRecord,
    ) -> Result<Option<AuthorizationRecord>, ServiceError> {
        let user = self
            .users
            .find_user_by_username(&record.principal_name)
            .await?;

        let Some(user) = user else {
            // Account is gone; the session must not survive it.
            tracing::warn!(
                principal = %record.principal_name,
                authorization_id = %record.id,
                "Refresh for a deleted user, removing authorization"
            );
            self.inner.remove_authorization(record.id).await?;
            return Err(OAuth2Error::invalid_grant("User not found").into());
        };

        let Some(stamped) = record.token_version() else {
            // Pre-versioning record. Reject the refresh but keep the row so
            // the anomaly stays visible to operators.
            tracing::warn!(
                principal = %record.principal_name,
                authorization_id = %record.id,
                "Authorization has no token version stamp"
            );
            return Err(OAuth2Error::invalid_grant("Missing token_version").into());
        };

        if stamped != user.token_version.to_string() {
            tracing::info!(
                principal = %record.principal_name,
                authorization_id = %record.id,
                "Stale token version, session revoked"
            );
            self.inner.remove_authorization(record.id).await?;
            return Err(
                OAuth2Error::invalid_grant("Token revoked — all sessions invalidated").into(),
            );
        }

        Ok(Some(record))
    }
}

#[async_trait]
impl AuthorizationStore for VersionedAuthorizationStore {
    async fn save_authorization(&self, record: &AuthorizationRecord) -> Result<(), ServiceError> {
        // Stamp once, on first save. Client-credentials records have no
        // user behind them and stay unstamped; they carry no refresh
        // token, so the check never runs for them either.
        if record.grant_type == GrantType::ClientCredentials
            || record.token_version().is_some()
        {
            return self.inner.save_authorization(record).await;
        }

        let user = self
            .users
            .find_user_by_username(&record.principal_name)
            .await?;

        match user {
            Some(user) => {
                let mut stamped = record.clone();
                stamped.set_token_version(&user.token_version.to_string());
                self.inner.save_authorization(&stamped).await
            }
            None => self.inner.save_authorization(record).await,
        }
    }

    async fn find_by_token(
        &self,
        token_value: &str,
        kind: Option<TokenKind>,
    ) -> Result<Option<AuthorizationRecord>, ServiceError> {
        let found = self.inner.find_by_token(token_value, kind).await?;

        match found {
            Some(record) if kind == Some(TokenKind::Refresh) => self.verify(record).await,
            other => Ok(other),
        }
    }

    async fn remove_authorization(&self, id: Uuid) -> Result<(), ServiceError> {
        self.inner.remove_authorization(id).await
    }

    async fn remove_all_for_principal(&self, principal_name: &str) -> Result<u64, ServiceError> {
        self.inner.remove_all_for_principal(principal_name).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{GrantType, StoredToken, User};
    use crate::services::error::OAuth2ErrorCode;
    use crate::services::store::InMemoryStore;

    fn versioned() -> (Arc<InMemoryStore>, VersionedAuthorizationStore) {
        let backend = Arc::new(InMemoryStore::new());
        let store =
            VersionedAuthorizationStore::new(backend.clone(), backend.clone());
        (backend, store)
    }

    fn record_with_refresh(principal: &str, token: &str) -> AuthorizationRecord {
        let mut record =
            AuthorizationRecord::new(principal.to_string(), GrantType::AuthorizationCode);
        record.attach_token(StoredToken::new(token.to_string(), TokenKind::Refresh, 3600));
        record
    }

    fn assert_invalid_grant(err: ServiceError, description: &str) {
        match err {
            ServiceError::OAuth2(e) => {
                assert_eq!(e.code, OAuth2ErrorCode::InvalidGrant);
                assert_eq!(e.description.as_deref(), Some(description));
            }
            other => panic!("expected OAuth2 error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn save_stamps_the_current_version() {
        let (backend, store) = versioned();
        let user = User::new("alice@example.com".to_string(), None);
        let version = user.token_version;
        backend.save_user(&user).await.unwrap();

        store
            .save_authorization(&record_with_refresh("alice@example.com", "rt1"))
            .await
            .unwrap();

        let saved = backend
            .find_by_token("rt1", Some(TokenKind::Refresh))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(saved.token_version(), Some(version.to_string().as_str()));
    }

    #[tokio::test]
    async fn matching_version_passes_through() {
        let (backend, store) = versioned();
        backend
            .save_user(&User::new("alice@example.com".to_string(), None))
            .await
            .unwrap();
        store
            .save_authorization(&record_with_refresh("alice@example.com", "rt1"))
            .await
            .unwrap();

        let found = store
            .find_by_token("rt1", Some(TokenKind::Refresh))
            .await
            .unwrap();
        assert!(found.is_some());
    }

    #[tokio::test]
    async fn stale_version_rejects_and_deletes() {
        let (backend, store) = versioned();
        backend
            .save_user(&User::new("alice@example.com".to_string(), None))
            .await
            .unwrap();
        store
            .save_authorization(&record_with_refresh("alice@example.com", "rt1"))
            .await
            .unwrap();

        backend.rotate_token_version("alice@example.com").await.unwrap();

        let err = store
            .find_by_token("rt1", Some(TokenKind::Refresh))
            .await
            .unwrap_err();
        assert_invalid_grant(err, "Token revoked — all sessions invalidated");

        // The stale session is gone from the backend.
        assert!(backend
            .find_by_token("rt1", Some(TokenKind::Refresh))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn deleted_user_rejects_and_deletes() {
        let (backend, store) = versioned();
        // Record saved directly, no user row behind it.
        let mut record = record_with_refresh("ghost@example.com", "rt1");
        record.set_token_version(&Uuid::new_v4().to_string());
        backend.save_authorization(&record).await.unwrap();

        let err = store
            .find_by_token("rt1", Some(TokenKind::Refresh))
            .await
            .unwrap_err();
        assert_invalid_grant(err, "User not found");

        assert!(backend
            .find_by_token("rt1", Some(TokenKind::Refresh))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn unstamped_record_rejects_but_is_kept() {
        let (backend, store) = versioned();
        backend
            .save_user(&User::new("alice@example.com".to_string(), None))
            .await
            .unwrap();
        // Bypass the decorator so the record lands without a stamp.
        backend
            .save_authorization(&record_with_refresh("alice@example.com", "rt1"))
            .await
            .unwrap();

        let err = store
            .find_by_token("rt1", Some(TokenKind::Refresh))
            .await
            .unwrap_err();
        assert_invalid_grant(err, "Missing token_version");

        // Still present: the anomaly is rejected, not erased.
        assert!(backend
            .find_by_token("rt1", Some(TokenKind::Refresh))
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn stamp_is_written_once_and_kept() {
        let (backend, store) = versioned();
        backend
            .save_user(&User::new("alice@example.com".to_string(), None))
            .await
            .unwrap();
        store
            .save_authorization(&record_with_refresh("alice@example.com", "rt1"))
            .await
            .unwrap();

        let stamped = backend
            .find_by_token("rt1", Some(TokenKind::Refresh))
            .await
            .unwrap()
            .unwrap();
        let original_stamp = stamped.token_version().unwrap().to_string();

        // Rotate the user's version, then re-save the record: the stamp
        // must not move with it.
        backend.rotate_token_version("alice@example.com").await.unwrap();
        store.save_authorization(&stamped).await.unwrap();

        let reloaded = backend
            .find_by_token("rt1", Some(TokenKind::Refresh))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reloaded.token_version(), Some(original_stamp.as_str()));
    }

    #[tokio::test]
    async fn client_credentials_records_are_never_stamped() {
        let (backend, store) = versioned();
        // A user whose name collides with the client id must not cause a
        // stamp either.
        backend
            .save_user(&User::new("portal_web".to_string(), None))
            .await
            .unwrap();

        let mut record =
            AuthorizationRecord::new("portal_web".to_string(), GrantType::ClientCredentials);
        record.attach_token(StoredToken::new("at1".to_string(), TokenKind::Access, 900));
        store.save_authorization(&record).await.unwrap();

        let saved = backend
            .find_by_token("at1", Some(TokenKind::Access))
            .await
            .unwrap()
            .unwrap();
        assert!(saved.token_version().is_none());
    }

    #[tokio::test]
    async fn access_token_lookups_skip_the_check() {
        let (backend, store) = versioned();
        // No user row at all; an access-token lookup must not care.
        let mut record =
            AuthorizationRecord::new("portal_web".to_string(), GrantType::ClientCredentials);
        record.attach_token(StoredToken::new("at1".to_string(), TokenKind::Access, 900));
        backend.save_authorization(&record).await.unwrap();

        let found = store
            .find_by_token("at1", Some(TokenKind::Access))
            .await
            .unwrap();
        assert!(found.is_some());
    }
}
