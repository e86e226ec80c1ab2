pub mod config;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

use std::sync::Arc;

use axum::{middleware::from_fn_with_state, routing::get, routing::post, Json, Router};
use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;

use crate::config::{Config, Environment};
use crate::services::{
    AuthorizationStore, ClientRegisteredEvent, ClientStore, ClientTrustPolicy, JwtService,
    MfaAuthenticator, OriginTrustStore, ReuseDetectionHandler, SessionManager,
    SessionRevocation, TokenClaimsCustomizer, UserStore, VersionedAuthorizationStore,
};

/// Shared application state.
///
/// `authorizations` is the version-enforcing decorator; the undecorated
/// backend is only reachable through the reuse handler, which needs raw
/// token lookups.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub users: Arc<dyn UserStore>,
    pub clients: Arc<dyn ClientStore>,
    pub authorizations: Arc<dyn AuthorizationStore>,
    pub jwt: Arc<JwtService>,
    pub claims: Arc<TokenClaimsCustomizer>,
    pub authenticator: Arc<MfaAuthenticator>,
    pub client_trust: Arc<ClientTrustPolicy>,
    pub reuse_handler: Arc<ReuseDetectionHandler>,
    pub session_manager: Arc<SessionManager>,
    pub origins: Arc<OriginTrustStore>,
    pub events: broadcast::Sender<ClientRegisteredEvent>,
}

impl AppState {
    /// Wire every service around a single storage backend.
    pub fn assemble<B>(config: Config, backend: Arc<B>, jwt: JwtService) -> Self
    where
        B: UserStore + AuthorizationStore + ClientStore + SessionRevocation + 'static,
    {
        let users: Arc<dyn UserStore> = backend.clone();
        let clients: Arc<dyn ClientStore> = backend.clone();
        let raw_authorizations: Arc<dyn AuthorizationStore> = backend.clone();
        let revocation: Arc<dyn SessionRevocation> = backend;

        let authorizations: Arc<dyn AuthorizationStore> = Arc::new(
            VersionedAuthorizationStore::new(raw_authorizations.clone(), users.clone()),
        );

        let (events, _) = broadcast::channel(64);

        Self {
            config: Arc::new(config),
            jwt: Arc::new(jwt),
            claims: Arc::new(TokenClaimsCustomizer::new(users.clone())),
            authenticator: Arc::new(MfaAuthenticator::new(users.clone())),
            client_trust: Arc::new(ClientTrustPolicy::new(clients.clone())),
            reuse_handler: Arc::new(ReuseDetectionHandler::new(raw_authorizations)),
            session_manager: Arc::new(SessionManager::new(revocation)),
            origins: Arc::new(OriginTrustStore::new()),
            users,
            clients,
            authorizations,
            events,
        }
    }

    /// Keep the origin trust store current with client registrations.
    pub fn spawn_origin_listener(&self) {
        let origins = self.origins.clone();
        let events = self.events.subscribe();
        tokio::spawn(async move {
            origins.listen(events).await;
        });
    }

    /// Seed the origin trust store from already-registered clients.
    pub async fn load_trusted_origins(&self) -> Result<(), services::ServiceError> {
        let clients = self.clients.list_clients().await?;
        self.origins.bulk_load(&clients);
        Ok(())
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/oauth2/token", post(handlers::token))
        .route("/auth/login", post(handlers::login))
        .route("/sessions/revoke-all", post(handlers::revoke_all_sessions))
        .route("/admin/clients", post(handlers::register_client))
        .layer(from_fn_with_state(
            state.origins.clone(),
            middleware::dynamic_cors,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

pub fn init_tracing(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));

    if config.environment == Environment::Prod {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
