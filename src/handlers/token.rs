//! OAuth2 token endpoint.
//!
//! Supports the refresh_token and client_credentials grants. Every
//! failure funnels through the reuse-detection handler before leaving,
//! so a replayed refresh token revokes its session as a side effect of
//! producing the error response.

use axum::{
    extract::State,
    http::{header, HeaderMap},
    response::{IntoResponse, Response},
    Form, Json,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::Deserialize;

use crate::models::{AuthorizationRecord, ClientAuthMethod, GrantType, StoredToken, TokenKind};
use crate::services::{ClientCredentials, OAuth2Error, ServiceError, TokenResponse};
use crate::utils;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    pub grant_type: String,
    pub refresh_token: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

pub async fn token(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(req): Form<TokenRequest>,
) -> Response {
    let grant_type = req.grant_type.parse::<GrantType>().ok();

    match process(&state, &headers, &req, grant_type).await {
        Ok(response) => Json(response).into_response(),
        Err(err) => {
            let oauth_err = match err {
                ServiceError::OAuth2(e) => e,
                other => {
                    tracing::error!(error = %other, "Token endpoint failure");
                    OAuth2Error::server_error()
                }
            };
            state
                .reuse_handler
                .handle(grant_type, req.refresh_token.as_deref(), oauth_err)
                .await
                .into_response()
        }
    }
}

async fn process(
    state: &AppState,
    headers: &HeaderMap,
    req: &TokenRequest,
    grant_type: Option<GrantType>,
) -> Result<TokenResponse, ServiceError> {
    let grant_type = match grant_type {
        Some(g @ (GrantType::RefreshToken | GrantType::ClientCredentials)) => g,
        _ => return Err(OAuth2Error::unsupported_grant_type().into()),
    };

    let credentials = extract_client_credentials(headers, req)?;
    let client = state
        .client_trust
        .authenticate(&credentials, grant_type)
        .await?;

    match grant_type {
        GrantType::ClientCredentials => client_credentials_grant(state, &client).await,
        GrantType::RefreshToken => refresh_token_grant(state, &client, req).await,
        GrantType::AuthorizationCode => unreachable!("filtered above"),
    }
}

/// Pull client credentials from the Basic authorization header or the
/// form body. Absent both, the client is treated as public.
fn extract_client_credentials(
    headers: &HeaderMap,
    req: &TokenRequest,
) -> Result<ClientCredentials, ServiceError> {
    if let Some(value) = headers.get(header::AUTHORIZATION) {
        let value = value
            .to_str()
            .map_err(|_| OAuth2Error::invalid_client("client_id"))?;
        let encoded = value
            .strip_prefix("Basic ")
            .ok_or_else(|| OAuth2Error::invalid_client("authentication_method"))?;
        let decoded = BASE64
            .decode(encoded)
            .map_err(|_| OAuth2Error::invalid_client("client_id"))?;
        let decoded =
            String::from_utf8(decoded).map_err(|_| OAuth2Error::invalid_client("client_id"))?;
        let (client_id, secret) = decoded
            .split_once(':')
            .ok_or_else(|| OAuth2Error::invalid_client("client_id"))?;

        return Ok(ClientCredentials {
            client_id: client_id.to_string(),
            client_secret: Some(secret.to_string()),
            method: ClientAuthMethod::ClientSecretBasic,
        });
    }

    let client_id = req
        .client_id
        .clone()
        .ok_or_else(|| OAuth2Error::invalid_request("client_id is required"))?;

    match &req.client_secret {
        Some(secret) => Ok(ClientCredentials {
            client_id,
            client_secret: Some(secret.clone()),
            method: ClientAuthMethod::ClientSecretPost,
        }),
        None => Ok(ClientCredentials {
            client_id,
            client_secret: None,
            method: ClientAuthMethod::None,
        }),
    }
}

async fn client_credentials_grant(
    state: &AppState,
    client: &crate::models::RegisteredClient,
) -> Result<TokenResponse, ServiceError> {
    // No user behind a machine token: the claims customizer is skipped,
    // even when a username happens to collide with the client_id.
    let claims = state.jwt.base_claims(
        &client.client_id,
        &client.client_id,
        client.access_token_ttl_secs,
    );
    let access_token = state.jwt.sign(&claims)?;

    let mut record =
        AuthorizationRecord::new(client.client_id.clone(), GrantType::ClientCredentials);
    record.attach_token(StoredToken::new(
        access_token.clone(),
        TokenKind::Access,
        client.access_token_ttl_secs,
    ));
    state.authorizations.save_authorization(&record).await?;

    Ok(TokenResponse {
        access_token,
        token_type: "Bearer".to_string(),
        expires_in: client.access_token_ttl_secs,
        refresh_token: None,
    })
}

async fn refresh_token_grant(
    state: &AppState,
    client: &crate::models::RegisteredClient,
    req: &TokenRequest,
) -> Result<TokenResponse, ServiceError> {
    let presented = req
        .refresh_token
        .as_deref()
        .ok_or_else(|| OAuth2Error::invalid_request("refresh_token is required"))?;

    // The versioned store runs the token-version check here and deletes
    // stale sessions itself.
    let mut record = state
        .authorizations
        .find_by_token(presented, Some(TokenKind::Refresh))
        .await?
        .ok_or_else(|| OAuth2Error::invalid_grant("Invalid refresh token"))?;

    let usable = record.find_token(presented).map(StoredToken::is_active);
    if usable != Some(true) {
        // Rotated-out or expired. The reuse handler deletes the record
        // once this error reaches it.
        return Err(OAuth2Error::invalid_grant("Invalid refresh token").into());
    }

    let mut claims = state.jwt.base_claims(
        &record.principal_name,
        &client.client_id,
        client.access_token_ttl_secs,
    );
    state.claims.customize(&mut claims).await?;
    let access_token = state.jwt.sign(&claims)?;

    record.invalidate_refresh_tokens();
    let next_refresh = utils::random_token();
    record.attach_token(StoredToken::new(
        next_refresh.clone(),
        TokenKind::Refresh,
        client.refresh_token_ttl_secs,
    ));
    record.attach_token(StoredToken::new(
        access_token.clone(),
        TokenKind::Access,
        client.access_token_ttl_secs,
    ));
    state.authorizations.save_authorization(&record).await?;

    Ok(TokenResponse {
        access_token,
        token_type: "Bearer".to_string(),
        expires_in: client.access_token_ttl_secs,
        refresh_token: Some(next_refresh),
    })
}
