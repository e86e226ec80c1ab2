//! Login and session revocation endpoints.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};

use crate::models::{AuthorizationRecord, GrantType, StoredToken, TokenKind};
use crate::services::{LoginDetails, ServiceError, TokenResponse};
use crate::utils;
use crate::AppState;

const DEFAULT_ACCESS_TTL_SECS: i64 = 900;
const DEFAULT_REFRESH_TTL_SECS: i64 = 604_800;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
    pub code: Option<String>,
    /// Client issuing the login; token lifetimes fall back to server
    /// defaults when omitted.
    pub client_id: Option<String>,
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<TokenResponse>, ServiceError> {
    let user = state
        .authenticator
        .authenticate(&LoginDetails {
            username: req.username,
            password: req.password,
            code: req.code,
        })
        .await?;

    let (client_id, access_ttl, refresh_ttl) = match &req.client_id {
        Some(id) => match state.clients.find_client(id).await? {
            Some(client) => (
                client.client_id,
                client.access_token_ttl_secs,
                client.refresh_token_ttl_secs,
            ),
            None => (id.clone(), DEFAULT_ACCESS_TTL_SECS, DEFAULT_REFRESH_TTL_SECS),
        },
        None => (
            state.config.service_name.clone(),
            DEFAULT_ACCESS_TTL_SECS,
            DEFAULT_REFRESH_TTL_SECS,
        ),
    };

    let mut claims = state
        .jwt
        .base_claims(&user.username, &client_id, access_ttl);
    state.claims.customize(&mut claims).await?;
    let access_token = state.jwt.sign(&claims)?;

    let refresh_token = utils::random_token();
    let mut record =
        AuthorizationRecord::new(user.username.clone(), GrantType::AuthorizationCode);
    record.attach_token(StoredToken::new(
        access_token.clone(),
        TokenKind::Access,
        access_ttl,
    ));
    record.attach_token(StoredToken::new(
        refresh_token.clone(),
        TokenKind::Refresh,
        refresh_ttl,
    ));
    // The versioned store stamps the record with the user's current
    // token version on the way down.
    state.authorizations.save_authorization(&record).await?;

    Ok(Json(TokenResponse {
        access_token,
        token_type: "Bearer".to_string(),
        expires_in: access_ttl,
        refresh_token: Some(refresh_token),
    }))
}

#[derive(Debug, Deserialize)]
pub struct RevokeAllRequest {
    pub username: String,
}

#[derive(Debug, Serialize)]
pub struct RevokeAllResponse {
    pub message: String,
}

pub async fn revoke_all_sessions(
    State(state): State<AppState>,
    Json(req): Json<RevokeAllRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    state.session_manager.revoke_all(&req.username).await?;
    Ok((
        StatusCode::OK,
        Json(RevokeAllResponse {
            message: "All sessions revoked".to_string(),
        }),
    ))
}
