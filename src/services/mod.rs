pub mod client_trust;
pub mod database;
pub mod error;
pub mod jwt;
pub mod mfa;
pub mod origins;
pub mod reuse;
pub mod sessions;
pub mod store;
pub mod token_version;

pub use client_trust::{ClientCredentials, ClientTrustPolicy, TRUSTED_PUBLIC_SUFFIXES};
pub use database::Database;
pub use error::{OAuth2Error, OAuth2ErrorCode, ServiceError};
pub use jwt::{AccessTokenClaims, JwtService, TokenClaimsCustomizer, TokenResponse};
pub use mfa::{AuthenticatedUser, LoginDetails, MfaAuthenticator};
pub use origins::{ClientRegisteredEvent, OriginTrustStore};
pub use reuse::ReuseDetectionHandler;
pub use sessions::SessionManager;
pub use store::{
    AuthorizationStore, ClientStore, InMemoryStore, SessionRevocation, UserStore,
};
pub use token_version::VersionedAuthorizationStore;
