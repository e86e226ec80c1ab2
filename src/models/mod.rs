pub mod authorization;
pub mod client;
pub mod user;

pub use authorization::{
    AuthorizationRecord, GrantType, StoredToken, TokenKind, ATTR_TOKEN_VERSION,
};
pub use client::{ClientAuthMethod, RegisteredClient};
pub use user::User;
