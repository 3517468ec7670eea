// src/services/mod.rs
//
// Persistence and identity services shared by the auth and admin modules

pub mod auth_providers;
pub mod google;
pub mod password;
pub mod sessions;
pub mod users;

// Re-export commonly used types for convenience
pub use google::{GoogleOAuthClient, GoogleTokenVerifier};
pub use password::{hash_password, parse_password_hash, verify_password};
pub use sessions::SessionStore;
