pub mod password;
pub mod totp;

pub use password::{hash_password, verify_password};

use rand::Rng;

/// Generate an opaque token value (refresh tokens are not JWTs).
pub fn random_token() -> String {
    let bytes: [u8; 32] = rand::thread_rng().gen();
    hex::encode(bytes)
}
