//! Postgres persistence.
//!
//! List-valued client columns and the authorization attribute bag are
//! stored as JSON text and parsed in code; tokens live in their own
//! table so a token value resolves to its authorization with one join.

use std::collections::HashMap;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::models::{
    AuthorizationRecord, ClientAuthMethod, GrantType, RegisteredClient, StoredToken, TokenKind,
    User,
};
use crate::services::error::ServiceError;
use crate::services::store::{AuthorizationStore, ClientStore, SessionRevocation, UserStore};

#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, ServiceError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        tracing::info!("Connected to Postgres");
        Ok(Self { pool })
    }

    pub async fn run_migrations(&self) -> Result<(), ServiceError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| ServiceError::Database(anyhow::anyhow!("Migration failed: {e}")))?;
        tracing::info!("Migrations applied");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[derive(FromRow)]
struct AuthorizationRow {
    id: Uuid,
    principal_name: String,
    grant_type: String,
    attributes: String,
}

#[derive(FromRow)]
struct TokenRow {
    token_value: String,
    kind: String,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    invalidated: bool,
}

#[derive(FromRow)]
struct ClientRow {
    id: Uuid,
    client_id: String,
    client_secret_hash: Option<String>,
    client_name: String,
    redirect_uris: String,
    auth_methods: String,
    grant_types: String,
    access_token_ttl_secs: i64,
    refresh_token_ttl_secs: i64,
    created_at: DateTime<Utc>,
}

fn bad_column(column: &str, err: impl std::fmt::Display) -> ServiceError {
    ServiceError::Database(anyhow::anyhow!("Corrupt column {column}: {err}"))
}

impl AuthorizationRow {
    fn into_record(self, tokens: Vec<TokenRow>) -> Result<AuthorizationRecord, ServiceError> {
        let grant_type =
            GrantType::from_str(&self.grant_type).map_err(|e| bad_column("grant_type", e))?;
        let attributes: HashMap<String, String> =
            serde_json::from_str(&self.attributes).map_err(|e| bad_column("attributes", e))?;

        let tokens = tokens
            .into_iter()
            .map(|row| {
                Ok(StoredToken {
                    value: row.token_value,
                    kind: TokenKind::from_str(&row.kind).map_err(|e| bad_column("kind", e))?,
                    issued_at: row.issued_at,
                    expires_at: row.expires_at,
                    invalidated: row.invalidated,
                })
            })
            .collect::<Result<Vec<_>, ServiceError>>()?;

        Ok(AuthorizationRecord {
            id: self.id,
            principal_name: self.principal_name,
            grant_type,
            attributes,
            tokens,
        })
    }
}

impl TryFrom<ClientRow> for RegisteredClient {
    type Error = ServiceError;

    fn try_from(row: ClientRow) -> Result<Self, ServiceError> {
        Ok(RegisteredClient {
            id: row.id,
            client_id: row.client_id,
            client_secret_hash: row.client_secret_hash,
            client_name: row.client_name,
            redirect_uris: serde_json::from_str(&row.redirect_uris)
                .map_err(|e| bad_column("redirect_uris", e))?,
            auth_methods: serde_json::from_str(&row.auth_methods)
                .map_err(|e| bad_column("auth_methods", e))?,
            grant_types: serde_json::from_str(&row.grant_types)
                .map_err(|e| bad_column("grant_types", e))?,
            access_token_ttl_secs: row.access_token_ttl_secs,
            refresh_token_ttl_secs: row.refresh_token_ttl_secs,
            created_at: row.created_at,
        })
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, ServiceError> {
    serde_json::to_string(value).map_err(|e| ServiceError::Internal(anyhow::Error::new(e)))
}

#[async_trait]
impl UserStore for Database {
    async fn save_user(&self, user: &User) -> Result<(), ServiceError> {
        sqlx::query(
            r#"
            INSERT INTO users
                (id, username, password_hash, role, mfa_enabled, mfa_secret,
                 token_version, enabled, locked, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (username) DO UPDATE SET
                password_hash = EXCLUDED.password_hash,
                role = EXCLUDED.role,
                mfa_enabled = EXCLUDED.mfa_enabled,
                mfa_secret = EXCLUDED.mfa_secret,
                token_version = EXCLUDED.token_version,
                enabled = EXCLUDED.enabled,
                locked = EXCLUDED.locked
            "#,
        )
        .bind(user.id)
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(&user.role)
        .bind(user.mfa_enabled)
        .bind(&user.mfa_secret)
        .bind(user.token_version)
        .bind(user.enabled)
        .bind(user.locked)
        .bind(user.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, ServiceError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = $1")
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn rotate_token_version(&self, username: &str) -> Result<Uuid, ServiceError> {
        let new_version: Option<Uuid> = sqlx::query_scalar(
            "UPDATE users SET token_version = $2 WHERE username = $1 RETURNING token_version",
        )
        .bind(username)
        .bind(Uuid::new_v4())
        .fetch_optional(&self.pool)
        .await?;
        new_version.ok_or(ServiceError::UserNotFound)
    }
}

#[async_trait]
impl AuthorizationStore for Database {
    async fn save_authorization(&self, record: &AuthorizationRecord) -> Result<(), ServiceError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO oauth2_authorization (id, principal_name, grant_type, attributes)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE SET attributes = EXCLUDED.attributes
            "#,
        )
        .bind(record.id)
        .bind(&record.principal_name)
        .bind(record.grant_type.as_str())
        .bind(to_json(&record.attributes)?)
        .execute(&mut *tx)
        .await?;

        // Full token replace keeps the save idempotent; a record carries a
        // handful of tokens at most.
        sqlx::query("DELETE FROM oauth2_authorization_token WHERE authorization_id = $1")
            .bind(record.id)
            .execute(&mut *tx)
            .await?;

        for token in &record.tokens {
            sqlx::query(
                r#"
                INSERT INTO oauth2_authorization_token
                    (authorization_id, token_value, kind, issued_at, expires_at, invalidated)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(record.id)
            .bind(&token.value)
            .bind(token.kind.as_str())
            .bind(token.issued_at)
            .bind(token.expires_at)
            .bind(token.invalidated)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn find_by_token(
        &self,
        token_value: &str,
        kind: Option<TokenKind>,
    ) -> Result<Option<AuthorizationRecord>, ServiceError> {
        let id: Option<Uuid> = match kind {
            Some(kind) => {
                sqlx::query_scalar(
                    r#"
                    SELECT authorization_id FROM oauth2_authorization_token
                    WHERE token_value = $1 AND kind = $2
                    "#,
                )
                .bind(token_value)
                .bind(kind.as_str())
                .fetch_optional(&self.pool)
                .await?
            }
            None => {
                sqlx::query_scalar(
                    "SELECT authorization_id FROM oauth2_authorization_token WHERE token_value = $1",
                )
                .bind(token_value)
                .fetch_optional(&self.pool)
                .await?
            }
        };

        let Some(id) = id else {
            return Ok(None);
        };

        let row = sqlx::query_as::<_, AuthorizationRow>(
            "SELECT id, principal_name, grant_type, attributes FROM oauth2_authorization WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let tokens = sqlx::query_as::<_, TokenRow>(
            r#"
            SELECT token_value, kind, issued_at, expires_at, invalidated
            FROM oauth2_authorization_token
            WHERE authorization_id = $1
            ORDER BY issued_at
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        row.into_record(tokens).map(Some)
    }

    async fn remove_authorization(&self, id: Uuid) -> Result<(), ServiceError> {
        sqlx::query("DELETE FROM oauth2_authorization WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn remove_all_for_principal(&self, principal_name: &str) -> Result<u64, ServiceError> {
        let result = sqlx::query("DELETE FROM oauth2_authorization WHERE principal_name = $1")
            .bind(principal_name)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl ClientStore for Database {
    async fn save_client(&self, client: &RegisteredClient) -> Result<(), ServiceError> {
        let result = sqlx::query(
            r#"
            INSERT INTO oauth2_registered_client
                (id, client_id, client_secret_hash, client_name, redirect_uris,
                 auth_methods, grant_types, access_token_ttl_secs,
                 refresh_token_ttl_secs, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (client_id) DO NOTHING
            "#,
        )
        .bind(client.id)
        .bind(&client.client_id)
        .bind(&client.client_secret_hash)
        .bind(&client.client_name)
        .bind(to_json(&client.redirect_uris)?)
        .bind(to_json(&client.auth_methods)?)
        .bind(to_json(&client.grant_types)?)
        .bind(client.access_token_ttl_secs)
        .bind(client.refresh_token_ttl_secs)
        .bind(client.created_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(ServiceError::ClientAlreadyExists);
        }
        Ok(())
    }

    async fn find_client(&self, client_id: &str) -> Result<Option<RegisteredClient>, ServiceError> {
        let row = sqlx::query_as::<_, ClientRow>(
            "SELECT * FROM oauth2_registered_client WHERE client_id = $1",
        )
        .bind(client_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(RegisteredClient::try_from).transpose()
    }

    async fn list_clients(&self) -> Result<Vec<RegisteredClient>, ServiceError> {
        let rows = sqlx::query_as::<_, ClientRow>("SELECT * FROM oauth2_registered_client")
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(RegisteredClient::try_from).collect()
    }
}

#[async_trait]
impl SessionRevocation for Database {
    async fn revoke_all_sessions(&self, username: &str) -> Result<Uuid, ServiceError> {
        let mut tx = self.pool.begin().await?;

        let new_version: Option<Uuid> = sqlx::query_scalar(
            "UPDATE users SET token_version = $2 WHERE username = $1 RETURNING token_version",
        )
        .bind(username)
        .bind(Uuid::new_v4())
        .fetch_optional(&mut *tx)
        .await?;

        let Some(new_version) = new_version else {
            tx.rollback().await?;
            return Err(ServiceError::UserNotFound);
        };

        sqlx::query("DELETE FROM oauth2_authorization WHERE principal_name = $1")
            .bind(username)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(new_version)
    }
}
