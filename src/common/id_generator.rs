// src/common/id_generator.rs
//! Random identifier and secret generation
//!
//! Entity ids are prefixed Crockford Base32 strings (e.g. `U_7K2M...`).
//! Bearer secrets (session tokens, OAuth state) are unprefixed base64url strings
//! drawn from the OS RNG. The two are never derived from each other.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::{rngs::OsRng, Rng, RngCore};

/// Crockford Base32 alphabet (excludes I, L, O, U to avoid confusion)
const CROCKFORD_ALPHABET: &[u8; 32] = b"0123456789ABCDEFGHJKMNPQRSTVWXYZ";

/// Random characters per entity id: 20 chars * 5 bits = 100 bits.
const ENTITY_ID_LENGTH: usize = 20;

/// Bytes of entropy in a session token.
pub const SESSION_TOKEN_BYTES: usize = 32;

/// Bytes of entropy in an OAuth anti-forgery state value.
pub const OAUTH_STATE_BYTES: usize = 24;

/// Entity type prefixes for ID generation
#[derive(Debug, Clone, Copy)]
pub enum EntityPrefix {
    /// User (U_)
    User,
    /// Credential binding (AP_)
    AuthProvider,
    /// Session row (S_)
    Session,
}

impl EntityPrefix {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityPrefix::User => "U",
            EntityPrefix::AuthProvider => "AP",
            EntityPrefix::Session => "S",
        }
    }
}

fn generate_crockford_string(length: usize) -> String {
    let mut rng = OsRng;
    (0..length)
        .map(|_| CROCKFORD_ALPHABET[rng.gen_range(0..32)] as char)
        .collect()
}

/// Generate a prefixed id, e.g. `U_K7NP3XQ2...`
pub fn generate_id(prefix: EntityPrefix) -> String {
    format!(
        "{}_{}",
        prefix.as_str(),
        generate_crockford_string(ENTITY_ID_LENGTH)
    )
}

pub fn generate_user_id() -> String {
    generate_id(EntityPrefix::User)
}

pub fn generate_auth_provider_id() -> String {
    generate_id(EntityPrefix::AuthProvider)
}

pub fn generate_session_id() -> String {
    generate_id(EntityPrefix::Session)
}

/// Generate an opaque base64url secret with `bytes` bytes of entropy.
pub fn generate_secret_token(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    OsRng.fill_bytes(&mut buf);
    URL_SAFE_NO_PAD.encode(buf)
}
