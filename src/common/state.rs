// Application state shared across all modules

use reqwest::Client;
use sqlx::SqlitePool;
use std::sync::Arc;

use super::config::AppConfig;
use crate::services::{GoogleOAuthClient, GoogleTokenVerifier, SessionStore};

/// Database pool, resolved configuration and the services built on them.
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub config: Arc<AppConfig>,
    pub sessions: SessionStore,
    pub google_verifier: Arc<GoogleTokenVerifier>,
    pub google_oauth: GoogleOAuthClient,
}

impl AppState {
    pub fn new(db: SqlitePool, http: Client, config: AppConfig) -> Self {
        let google_verifier = Arc::new(GoogleTokenVerifier::from_config(
            http.clone(),
            &config.google,
        ));
        Self::with_verifier(db, http, config, google_verifier)
    }

    /// Build state around an already constructed token verifier.
    pub fn with_verifier(
        db: SqlitePool,
        http: Client,
        config: AppConfig,
        google_verifier: Arc<GoogleTokenVerifier>,
    ) -> Self {
        let google_oauth = GoogleOAuthClient::new(http, config.google.clone());
        Self {
            sessions: SessionStore::new(db.clone()),
            db,
            config: Arc::new(config),
            google_verifier,
            google_oauth,
        }
    }

    /// Audiences accepted on Google ID tokens.
    pub fn google_audiences(&self) -> Vec<String> {
        vec![self.config.google.client_id.clone()]
    }
}
