//! Persistence seams.
//!
//! Handlers and services depend on these traits, never on a concrete
//! backend. `InMemoryStore` ships alongside the Postgres implementation
//! so tests and local runs need no database.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{AuthorizationRecord, RegisteredClient, TokenKind, User};
use crate::services::error::ServiceError;

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn save_user(&self, user: &User) -> Result<(), ServiceError>;

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, ServiceError>;

    /// Replace the user's token version with a fresh value, returning it.
    async fn rotate_token_version(&self, username: &str) -> Result<Uuid, ServiceError>;
}

#[async_trait]
pub trait AuthorizationStore: Send + Sync {
    async fn save_authorization(&self, record: &AuthorizationRecord) -> Result<(), ServiceError>;

    /// Resolve a token value to its authorization. Rotated-out tokens still
    /// resolve; callers inspect `invalidated` themselves.
    async fn find_by_token(
        &self,
        token_value: &str,
        kind: Option<TokenKind>,
    ) -> Result<Option<AuthorizationRecord>, ServiceError>;

    async fn remove_authorization(&self, id: Uuid) -> Result<(), ServiceError>;

    /// Delete every authorization belonging to a principal, returning how
    /// many were removed.
    async fn remove_all_for_principal(&self, principal_name: &str) -> Result<u64, ServiceError>;
}

#[async_trait]
pub trait ClientStore: Send + Sync {
    async fn save_client(&self, client: &RegisteredClient) -> Result<(), ServiceError>;

    async fn find_client(&self, client_id: &str) -> Result<Option<RegisteredClient>, ServiceError>;

    /// All registered clients; used to seed the origin trust store at boot.
    async fn list_clients(&self) -> Result<Vec<RegisteredClient>, ServiceError>;
}

/// Revoke-all-sessions in one step: rotate the user's token version and
/// drop their server-side authorizations together.
#[async_trait]
pub trait SessionRevocation: Send + Sync {
    async fn revoke_all_sessions(&self, username: &str) -> Result<Uuid, ServiceError>;
}

/// In-memory backend for tests and local development.
#[derive(Default)]
pub struct InMemoryStore {
    users: Mutex<HashMap<String, User>>,
    authorizations: Mutex<HashMap<Uuid, AuthorizationRecord>>,
    clients: Mutex<HashMap<String, RegisteredClient>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_users(&self) -> std::sync::MutexGuard<'_, HashMap<String, User>> {
        // A poisoned lock means a panic mid-update; propagating the panic
        // is the only sane option for an in-memory test store.
        self.users.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_authorizations(
        &self,
    ) -> std::sync::MutexGuard<'_, HashMap<Uuid, AuthorizationRecord>> {
        self.authorizations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }

    fn lock_clients(&self) -> std::sync::MutexGuard<'_, HashMap<String, RegisteredClient>> {
        self.clients.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl UserStore for InMemoryStore {
    async fn save_user(&self, user: &User) -> Result<(), ServiceError> {
        self.lock_users().insert(user.username.clone(), user.clone());
        Ok(())
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, ServiceError> {
        Ok(self.lock_users().get(username).cloned())
    }

    async fn rotate_token_version(&self, username: &str) -> Result<Uuid, ServiceError> {
        let mut users = self.lock_users();
        let user = users.get_mut(username).ok_or(ServiceError::UserNotFound)?;
        user.token_version = Uuid::new_v4();
        Ok(user.token_version)
    }
}

#[async_trait]
impl AuthorizationStore for InMemoryStore {
    async fn save_authorization(&self, record: &AuthorizationRecord) -> Result<(), ServiceError> {
        self.lock_authorizations().insert(record.id, record.clone());
        Ok(())
    }

    async fn find_by_token(
        &self,
        token_value: &str,
        kind: Option<TokenKind>,
    ) -> Result<Option<AuthorizationRecord>, ServiceError> {
        Ok(self
            .lock_authorizations()
            .values()
            .find(|r| r.has_token(token_value, kind))
            .cloned())
    }

    async fn remove_authorization(&self, id: Uuid) -> Result<(), ServiceError> {
        self.lock_authorizations().remove(&id);
        Ok(())
    }

    async fn remove_all_for_principal(&self, principal_name: &str) -> Result<u64, ServiceError> {
        let mut authorizations = self.lock_authorizations();
        let before = authorizations.len();
        authorizations.retain(|_, r| r.principal_name != principal_name);
        Ok((before - authorizations.len()) as u64)
    }
}

#[async_trait]
impl ClientStore for InMemoryStore {
    async fn save_client(&self, client: &RegisteredClient) -> Result<(), ServiceError> {
        let mut clients = self.lock_clients();
        if clients.contains_key(&client.client_id) {
            return Err(ServiceError::ClientAlreadyExists);
        }
        clients.insert(client.client_id.clone(), client.clone());
        Ok(())
    }

    async fn find_client(&self, client_id: &str) -> Result<Option<RegisteredClient>, ServiceError> {
        Ok(self.lock_clients().get(client_id).cloned())
    }

    async fn list_clients(&self) -> Result<Vec<RegisteredClient>, ServiceError> {
        Ok(self.lock_clients().values().cloned().collect())
    }
}

#[async_trait]
impl SessionRevocation for InMemoryStore {
    async fn revoke_all_sessions(&self, username: &str) -> Result<Uuid, ServiceError> {
        // Hold both locks so no authorization slips in between the version
        // rotation and the sweep.
        let mut users = self.lock_users();
        let mut authorizations = self.lock_authorizations();

        let user = users.get_mut(username).ok_or(ServiceError::UserNotFound)?;
        user.token_version = Uuid::new_v4();
        authorizations.retain(|_, r| r.principal_name != username);

        Ok(user.token_version)
    }
}
