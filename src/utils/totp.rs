//! TOTP second factor (RFC 6238: SHA-1, 6 digits, 30s step, one step skew).

use totp_rs::{Algorithm, Secret, TOTP};

const ISSUER: &str = "auth-core";

fn build(secret_base32: &str, account: &str) -> Result<TOTP, anyhow::Error> {
    let secret_bytes = Secret::Encoded(secret_base32.to_string())
        .to_bytes()
        .map_err(|e| anyhow::anyhow!("Invalid TOTP secret: {:?}", e))?;

    TOTP::new(
        Algorithm::SHA1,
        6,
        1,
        30,
        secret_bytes,
        Some(ISSUER.to_string()),
        account.to_string(),
    )
    .map_err(|e| anyhow::anyhow!("TOTP init failed: {}", e))
}

/// Generate a new base32-encoded TOTP secret for enrollment.
pub fn generate_secret() -> String {
    Secret::generate_secret().to_encoded().to_string()
}

/// Verify a submitted code against the account's secret.
pub fn verify_code(secret_base32: &str, code: &str) -> Result<bool, anyhow::Error> {
    let totp = build(secret_base32, "account")?;
    totp.check_current(code)
        .map_err(|e| anyhow::anyhow!("TOTP clock error: {}", e))
}

/// Compute the code for the current time window. Used by enrollment
/// confirmation flows and tests.
pub fn current_code(secret_base32: &str) -> Result<String, anyhow::Error> {
    let totp = build(secret_base32, "account")?;
    totp.generate_current()
        .map_err(|e| anyhow::anyhow!("TOTP clock error: {}", e))
}
