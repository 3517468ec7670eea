//! Authentication routes

use axum::{
    routing::{get, post},
    Router,
};

use super::handlers;

/// Creates and returns the authentication router
///
/// # Routes
/// - `POST /api/auth/register` - Create a password account
/// - `POST /api/auth/login` - Password login, sets the session cookie
/// - `POST /api/auth/logout` - Drop the session and clear the cookie
/// - `GET /api/auth/me` - Current user from the session cookie
/// - `GET /api/auth/google/start` - Begin the Google code flow
/// - `GET /api/auth/google/callback` - Complete the Google code flow
/// - `POST /api/auth/google` - Sign in with a Google ID token
pub fn auth_routes() -> Router {
    Router::new()
        .route("/api/auth/register", post(handlers::register))
        .route("/api/auth/login", post(handlers::login))
        .route("/api/auth/logout", post(handlers::logout))
        .route("/api/auth/me", get(handlers::me))
        .route("/api/auth/google/start", get(handlers::google_start))
        .route("/api/auth/google/callback", get(handlers::google_callback))
        .route("/api/auth/google", post(handlers::google_token))
}
