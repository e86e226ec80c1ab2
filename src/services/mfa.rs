//! Password + TOTP authentication.

use std::sync::Arc;

use serde::Deserialize;

use crate::models::User;
use crate::services::error::ServiceError;
use crate::services::store::UserStore;
use crate::utils::{self, verify_password};

/// Credentials submitted to the login endpoint.
#[derive(Debug, Deserialize)]
pub struct LoginDetails {
    pub username: String,
    pub password: String,
    /// TOTP code; required when the account has MFA enabled.
    pub code: Option<String>,
}

/// The authenticated identity handed to callers. Carries no credential
/// material.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub id: uuid::Uuid,
    pub username: String,
    pub role: String,
}

impl From<&User> for AuthenticatedUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            role: user.role.clone(),
        }
    }
}

pub struct MfaAuthenticator {
    users: Arc<dyn UserStore>,
}

impl MfaAuthenticator {
    pub fn new(users: Arc<dyn UserStore>) -> Self {
        Self { users }
    }

    /// Authenticate a user: password first, then the TOTP second factor
    /// when the account has one enrolled.
    ///
    /// Account-state and password failures all collapse into
    /// `InvalidCredentials` so the response never reveals whether the
    /// username exists. MFA failures are distinct by design: at that
    /// point the password already matched.
    pub async fn authenticate(
        &self,
        details: &LoginDetails,
    ) -> Result<AuthenticatedUser, ServiceError> {
        let user = self
            .users
            .find_user_by_username(&details.username)
            .await?
            .ok_or(ServiceError::InvalidCredentials)?;

        if !user.can_authenticate() {
            return Err(ServiceError::InvalidCredentials);
        }

        let Some(hash) = &user.password_hash else {
            // Federated-only account; no password to check.
            return Err(ServiceError::InvalidCredentials);
        };
        if !verify_password(&details.password, hash) {
            return Err(ServiceError::InvalidCredentials);
        }

        if user.mfa_enabled {
            self.verify_second_factor(&user, details.code.as_deref())?;
        }

        tracing::info!(username = %user.username, mfa = user.mfa_enabled, "User authenticated");
        Ok(AuthenticatedUser::from(&user))
    }

    fn verify_second_factor(&self, user: &User, code: Option<&str>) -> Result<(), ServiceError> {
        // A blank code counts as absent, not as a failed attempt.
        let code = code
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .ok_or(ServiceError::MfaCodeMissing)?;

        // Reject non-numeric input before touching the TOTP machinery.
        if code.len() != 6 || code.parse::<u64>().is_err() {
            return Err(ServiceError::InvalidVerificationCode);
        }

        let secret = user
            .mfa_secret
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("MFA enabled but no secret enrolled"))?;

        match utils::totp::verify_code(secret, code) {
            Ok(true) => Ok(()),
            Ok(false) => Err(ServiceError::InvalidVerificationCode),
            Err(e) => {
                tracing::error!(username = %user.username, error = %e, "TOTP verification error");
                Err(ServiceError::InvalidVerificationCode)
            }
        }
    }
}
