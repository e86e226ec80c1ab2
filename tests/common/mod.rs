//! Shared harness for endpoint tests: in-memory backend, throwaway RSA
//! keys, and small request helpers.
#![allow(dead_code)]

use std::sync::{Arc, OnceLock};

use axum::body::Body;
use axum::http::{header, Request, Response, StatusCode};
use rsa::pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde_json::Value;
use tower::ServiceExt;

use auth_core::config::{Config, DatabaseConfig, Environment, JwtConfig};
use auth_core::models::{GrantType, RegisteredClient, User};
use auth_core::services::{InMemoryStore, JwtService};
use auth_core::utils::hash_password;
use auth_core::{build_router, AppState};

static TEST_KEYS: OnceLock<(String, String)> = OnceLock::new();

fn test_keys() -> &'static (String, String) {
    TEST_KEYS.get_or_init(|| {
        let key = RsaPrivateKey::new(&mut rand::thread_rng(), 2048)
            .expect("RSA key generation");
        let private_pem = key
            .to_pkcs8_pem(LineEnding::LF)
            .expect("private key PEM")
            .to_string();
        let public_pem = RsaPublicKey::from(&key)
            .to_public_key_pem(LineEnding::LF)
            .expect("public key PEM");
        (private_pem, public_pem)
    })
}

fn test_config() -> Config {
    Config {
        environment: Environment::Dev,
        service_name: "auth-core".to_string(),
        log_level: "info".to_string(),
        host: "127.0.0.1".to_string(),
        port: 8080,
        database: DatabaseConfig {
            url: "postgres://unused".to_string(),
            max_connections: 1,
        },
        jwt: JwtConfig {
            private_key_path: String::new(),
            public_key_path: String::new(),
            issuer: "https://auth.test".to_string(),
        },
    }
}

pub fn test_state() -> (AppState, Arc<InMemoryStore>) {
    let backend = Arc::new(InMemoryStore::new());
    let (private_pem, public_pem) = test_keys();
    let jwt = JwtService::new(
        private_pem.as_bytes(),
        public_pem.as_bytes(),
        "https://auth.test".to_string(),
    )
    .expect("JWT service");
    let state = AppState::assemble(test_config(), backend.clone(), jwt);
    (state, backend)
}

pub async fn seed_user(state: &AppState, username: &str, password: &str) -> User {
    let user = User::new(username.to_string(), Some(hash_password(password).unwrap()));
    state.users.save_user(&user).await.unwrap();
    user
}

pub async fn seed_public_client(state: &AppState, client_id: &str) -> RegisteredClient {
    let client = RegisteredClient::new(
        client_id.to_string(),
        client_id.to_string(),
        None,
        vec![],
        vec![GrantType::AuthorizationCode, GrantType::RefreshToken],
    );
    state.clients.save_client(&client).await.unwrap();
    client
}

pub async fn post_json(state: &AppState, uri: &str, body: Value) -> Response<Body> {
    build_router(state.clone())
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap()
}

pub async fn post_form(state: &AppState, uri: &str, form: &str) -> Response<Body> {
    build_router(state.clone())
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from(form.to_string()))
                .unwrap(),
        )
        .await
        .unwrap()
}

pub async fn json_body(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Log in and return (access_token, refresh_token).
pub async fn login(
    state: &AppState,
    username: &str,
    password: &str,
    client_id: &str,
) -> (String, String) {
    let response = post_json(
        state,
        "/auth/login",
        serde_json::json!({
            "username": username,
            "password": password,
            "client_id": client_id,
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    (
        body["access_token"].as_str().unwrap().to_string(),
        body["refresh_token"].as_str().unwrap().to_string(),
    )
}

/// Exchange a refresh token for a public client at the token endpoint.
pub async fn refresh(state: &AppState, client_id: &str, refresh_token: &str) -> Response<Body> {
    post_form(
        state,
        "/oauth2/token",
        &format!("grant_type=refresh_token&client_id={client_id}&refresh_token={refresh_token}"),
    )
    .await
}
