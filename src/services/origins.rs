//! Dynamic CORS origin trust store.
//!
//! Trusted origins are derived from registered clients' redirect URIs:
//! the scheme://host[:port] origin of every HTTP(S) redirect URI is
//! trusted. The set is bulk-loaded at boot and kept current by
//! subscribing to client-registration events, so a newly registered
//! client's SPA works without a restart.

use dashmap::DashSet;
use tokio::sync::broadcast;
use url::Url;

use crate::models::RegisteredClient;

/// Broadcast whenever a client is registered.
#[derive(Debug, Clone)]
pub struct ClientRegisteredEvent {
    pub client_id: String,
    pub redirect_uris: Vec<String>,
}

impl From<&RegisteredClient> for ClientRegisteredEvent {
    fn from(client: &RegisteredClient) -> Self {
        Self {
            client_id: client.client_id.clone(),
            redirect_uris: client.redirect_uris.clone(),
        }
    }
}

#[derive(Default)]
pub struct OriginTrustStore {
    origins: DashSet<String>,
}

impl OriginTrustStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalize a redirect URI to its origin. Non-URL strings and
    /// non-HTTP(S) schemes (native app callbacks like `com.app://cb`)
    /// yield no browser origin and are skipped.
    fn origin_of(redirect_uri: &str) -> Option<String> {
        let url = Url::parse(redirect_uri).ok()?;
        match url.scheme() {
            "http" | "https" => Some(url.origin().ascii_serialization()),
            _ => None,
        }
    }

    pub fn trust_redirect_uris<'a>(&self, uris: impl IntoIterator<Item = &'a str>) {
        for uri in uris {
            if let Some(origin) = Self::origin_of(uri) {
                if self.origins.insert(origin.clone()) {
                    tracing::debug!(%origin, "Trusting CORS origin");
                }
            }
        }
    }

    /// Seed the set from every registered client.
    pub fn bulk_load(&self, clients: &[RegisteredClient]) {
        for client in clients {
            self.trust_redirect_uris(client.redirect_uris.iter().map(String::as_str));
        }
        tracing::info!(count = self.origins.len(), "Loaded trusted CORS origins");
    }

    pub fn is_trusted(&self, origin: &str) -> bool {
        self.origins.contains(origin)
    }

    pub fn len(&self) -> usize {
        self.origins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.origins.is_empty()
    }

    /// Consume registration events until the channel closes. Lagged
    /// receivers resynchronize by skipping; origins missed here are
    /// re-added on the next boot's bulk load.
    pub async fn listen(&self, mut events: broadcast::Receiver<ClientRegisteredEvent>) {
        loop {
            match events.recv().await {
                Ok(event) => {
                    tracing::debug!(client_id = %event.client_id, "Client registered, updating origins");
                    self.trust_redirect_uris(event.redirect_uris.iter().map(String::as_str));
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "Origin event receiver lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }
}
