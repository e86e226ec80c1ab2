//! Revoke-all-sessions facade.

use std::sync::Arc;

use uuid::Uuid;

use crate::services::error::ServiceError;
use crate::services::store::SessionRevocation;

/// Single entry point for "log this user out everywhere".
///
/// Rotating the user's token version is what actually kills the
/// sessions: every outstanding authorization carries the old stamp and
/// fails its next refresh. Deleting the stored authorizations on top of
/// that is immediate hygiene, not the enforcement mechanism.
pub struct SessionManager {
    revocation: Arc<dyn SessionRevocation>,
}

impl SessionManager {
    pub fn new(revocation: Arc<dyn SessionRevocation>) -> Self {
        Self { revocation }
    }

    pub async fn revoke_all(&self, username: &str) -> Result<Uuid, ServiceError> {
        let new_version = self.revocation.revoke_all_sessions(username).await?;
        tracing::info!(%username, "All sessions revoked");
        Ok(new_version)
    }
}
