//! Error taxonomy: internal service errors and the OAuth2 wire errors.

use std::fmt;

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// OAuth2 error codes surfaced at the token endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OAuth2ErrorCode {
    InvalidRequest,
    InvalidClient,
    InvalidGrant,
    UnauthorizedClient,
    UnsupportedGrantType,
    ServerError,
}

impl OAuth2ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            OAuth2ErrorCode::InvalidRequest => "invalid_request",
            OAuth2ErrorCode::InvalidClient => "invalid_client",
            OAuth2ErrorCode::InvalidGrant => "invalid_grant",
            OAuth2ErrorCode::UnauthorizedClient => "unauthorized_client",
            OAuth2ErrorCode::UnsupportedGrantType => "unsupported_grant_type",
            OAuth2ErrorCode::ServerError => "server_error",
        }
    }
}

impl fmt::Display for OAuth2ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An OAuth2 protocol error, rendered as the standard
/// `{error, error_description?}` JSON body with no-store caching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuth2Error {
    pub code: OAuth2ErrorCode,
    pub description: Option<String>,
}

impl OAuth2Error {
    pub fn invalid_request(description: impl Into<String>) -> Self {
        Self {
            code: OAuth2ErrorCode::InvalidRequest,
            description: Some(description.into()),
        }
    }

    /// Client authentication failure naming the parameter or check that
    /// failed, mirroring the RFC 6749 §3.2.1 phrasing.
    pub fn invalid_client(reason: &str) -> Self {
        Self {
            code: OAuth2ErrorCode::InvalidClient,
            description: Some(format!("Client authentication failed: {reason}")),
        }
    }

    pub fn invalid_grant(description: impl Into<String>) -> Self {
        Self {
            code: OAuth2ErrorCode::InvalidGrant,
            description: Some(description.into()),
        }
    }

    pub fn unauthorized_client(description: impl Into<String>) -> Self {
        Self {
            code: OAuth2ErrorCode::UnauthorizedClient,
            description: Some(description.into()),
        }
    }

    pub fn unsupported_grant_type() -> Self {
        Self {
            code: OAuth2ErrorCode::UnsupportedGrantType,
            description: None,
        }
    }

    pub fn server_error() -> Self {
        Self {
            code: OAuth2ErrorCode::ServerError,
            description: None,
        }
    }
}

impl fmt::Display for OAuth2Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.description {
            Some(desc) => write!(f, "{}: {}", self.code, desc),
            None => f.write_str(self.code.as_str()),
        }
    }
}

impl std::error::Error for OAuth2Error {}

#[derive(Serialize)]
struct OAuth2ErrorBody<'a> {
    error: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_description: Option<&'a str>,
}

impl IntoResponse for OAuth2Error {
    fn into_response(self) -> Response {
        let body = OAuth2ErrorBody {
            error: self.code.as_str(),
            error_description: self.description.as_deref(),
        };
        (
            StatusCode::BAD_REQUEST,
            [
                (header::CACHE_CONTROL, "no-store"),
                (header::PRAGMA, "no-cache"),
            ],
            Json(&body),
        )
            .into_response()
    }
}

/// Internal service errors.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    Database(anyhow::Error),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),

    #[error("Configuration error: {0}")]
    Config(anyhow::Error),

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("2FA code is missing")]
    MfaCodeMissing,

    #[error("Invalid verification code")]
    InvalidVerificationCode,

    #[error("User not found")]
    UserNotFound,

    #[error("Client already exists")]
    ClientAlreadyExists,

    #[error("{0}")]
    OAuth2(#[from] OAuth2Error),
}

impl From<sqlx::Error> for ServiceError {
    fn from(err: sqlx::Error) -> Self {
        ServiceError::Database(anyhow::Error::new(err))
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            error: String,
            #[serde(skip_serializing_if = "Option::is_none")]
            details: Option<String>,
        }

        // OAuth2 errors keep their own wire format.
        if let ServiceError::OAuth2(err) = self {
            return err.into_response();
        }

        let (status, error, details) = match self {
            ServiceError::InvalidCredentials
            | ServiceError::MfaCodeMissing
            | ServiceError::InvalidVerificationCode => {
                (StatusCode::UNAUTHORIZED, self.to_string(), None)
            }
            ServiceError::UserNotFound => (StatusCode::NOT_FOUND, self.to_string(), None),
            ServiceError::ClientAlreadyExists => (StatusCode::CONFLICT, self.to_string(), None),
            ServiceError::Database(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Database error".to_string(),
                Some(err.to_string()),
            ),
            ServiceError::Internal(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
                Some(err.to_string()),
            ),
            ServiceError::Config(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Configuration error".to_string(),
                Some(err.to_string()),
            ),
            ServiceError::OAuth2(_) => unreachable!("handled above"),
        };

        (status, Json(ErrorResponse { error, details })).into_response()
    }
}
