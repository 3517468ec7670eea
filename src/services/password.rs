// src/services/password.rs
//! PBKDF2-SHA256 password hashing.
//!
//! Hashes are stored in `user_auth_providers.password_hash` as JSON. The
//! colon-delimited form `algorithm:iterations:salt:hash` is still accepted when
//! parsing older rows.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use pbkdf2::pbkdf2_hmac;
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

pub const PBKDF2_SHA256: &str = "pbkdf2-sha256";

/// Iteration count for new hashes. Kept at the ceiling of the edge runtime the
/// storefront also deploys to.
pub const DEFAULT_ITERATIONS: u32 = 100_000;

/// Rows claiming more rounds than this are treated as corrupt.
const MAX_ITERATIONS: u32 = 10_000_000;

const SALT_LEN: usize = 16;
const KEY_LEN: usize = 32;

#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("failed to serialize password hash: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordHash {
    pub algorithm: String,
    pub salt: String,
    pub iterations: u32,
    pub hash: String,
}

impl PasswordHash {
    /// Colon-delimited encoding: `pbkdf2-sha256:<iterations>:<salt>:<hash>`.
    pub fn serialize(&self) -> String {
        format!(
            "{}:{}:{}:{}",
            self.algorithm, self.iterations, self.salt, self.hash
        )
    }

    /// Structured encoding written to the database.
    pub fn to_storage(&self) -> Result<String, PasswordError> {
        Ok(serde_json::to_string(self)?)
    }
}

fn derive_key(password: &str, salt: &[u8], iterations: u32) -> [u8; KEY_LEN] {
    let mut key = [0u8; KEY_LEN];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, iterations, &mut key);
    key
}

/// Hash a password with a fresh random salt.
pub fn hash_password(password: &str) -> PasswordHash {
    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);

    let key = derive_key(password, &salt, DEFAULT_ITERATIONS);

    PasswordHash {
        algorithm: PBKDF2_SHA256.to_string(),
        salt: STANDARD.encode(salt),
        iterations: DEFAULT_ITERATIONS,
        hash: STANDARD.encode(key),
    }
}

/// Verify a password against a stored hash. Fails closed on any malformed input.
pub fn verify_password(password: &str, stored: &PasswordHash) -> bool {
    if stored.algorithm != PBKDF2_SHA256 {
        return false;
    }
    if stored.iterations == 0 || stored.iterations > MAX_ITERATIONS {
        return false;
    }
    let Ok(salt) = STANDARD.decode(&stored.salt) else {
        return false;
    };

    let derived = STANDARD.encode(derive_key(password, &salt, stored.iterations));
    constant_time_eq(derived.as_bytes(), stored.hash.as_bytes())
}

/// Compare without short-circuiting on the first differing byte.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter()
        .zip(b.iter())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}

/// Parse a stored hash in either the JSON or the colon-delimited encoding.
pub fn parse_password_hash(serialized: &str) -> Option<PasswordHash> {
    if let Ok(parsed) = serde_json::from_str::<PasswordHash>(serialized) {
        if parsed.algorithm == PBKDF2_SHA256 {
            return Some(parsed);
        }
    }

    let parts: Vec<&str> = serialized.split(':').collect();
    let [algorithm, iterations, salt, hash] = parts.as_slice() else {
        return None;
    };
    if *algorithm != PBKDF2_SHA256 {
        return None;
    }
    let iterations = iterations.parse::<u32>().ok()?;

    Some(PasswordHash {
        algorithm: PBKDF2_SHA256.to_string(),
        salt: salt.to_string(),
        iterations,
        hash: hash.to_string(),
    })
}
