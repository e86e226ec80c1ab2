//! Client registration.

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};

use crate::models::{GrantType, RegisteredClient};
use crate::services::{ClientRegisteredEvent, OAuth2Error, ServiceError};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct RegisterClientRequest {
    pub client_id: String,
    pub client_name: String,
    /// Omit for public clients.
    pub client_secret: Option<String>,
    #[serde(default)]
    pub redirect_uris: Vec<String>,
    pub grant_types: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct RegisterClientResponse {
    pub client_id: String,
    pub client_name: String,
    pub redirect_uris: Vec<String>,
    pub public: bool,
}

pub async fn register_client(
    State(state): State<AppState>,
    Json(req): Json<RegisterClientRequest>,
) -> Result<(StatusCode, Json<RegisterClientResponse>), ServiceError> {
    let grant_types = req
        .grant_types
        .iter()
        .map(|g| g.parse::<GrantType>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(OAuth2Error::invalid_request)?;

    let client = RegisteredClient::new(
        req.client_id,
        req.client_name,
        req.client_secret.as_deref(),
        req.redirect_uris,
        grant_types,
    );

    state.clients.save_client(&client).await?;
    tracing::info!(client_id = %client.client_id, public = client.is_public(), "Client registered");

    // Receiver count can be zero in tests; a send error just means
    // nobody is listening yet.
    let _ = state.events.send(ClientRegisteredEvent::from(&client));

    Ok((
        StatusCode::CREATED,
        Json(RegisterClientResponse {
            client_id: client.client_id,
            client_name: client.client_name,
            redirect_uris: client.redirect_uris,
            public: client.client_secret_hash.is_none(),
        }),
    ))
}
