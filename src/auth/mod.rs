//! # Auth Module
//!
//! Password and Google sign-in, cookie sessions, and the request gate that
//! resolves a session into an [`AuthContext`] for downstream handlers.

pub mod cookies;
pub mod extractors;
pub mod gate;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod validators;

#[cfg(test)]
mod tests;

pub use gate::request_gate;
pub use routes::auth_routes;
