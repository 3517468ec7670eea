// Application configuration resolved once at startup

use std::env;
use thiserror::Error;

const DEFAULT_DATABASE_URL: &str = "sqlite://storefront.db";
const DEFAULT_PUBLIC_BASE_URL: &str = "http://localhost:8080";
const DEFAULT_CORS_ORIGINS: &str = "http://localhost:3000,http://localhost:5173";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

/// Google OAuth client settings and endpoints.
///
/// The endpoints default to Google's production URLs and are only
/// overridden in tests.
#[derive(Debug, Clone)]
pub struct GoogleConfig {
    pub client_id: String,
    pub client_secret: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub jwks_uri: String,
}

impl GoogleConfig {
    pub const AUTHORIZATION_ENDPOINT: &'static str = "https://accounts.google.com/o/oauth2/v2/auth";
    pub const TOKEN_ENDPOINT: &'static str = "https://oauth2.googleapis.com/token";
    pub const JWKS_URI: &'static str = "https://www.googleapis.com/oauth2/v3/certs";

    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            authorization_endpoint: Self::AUTHORIZATION_ENDPOINT.to_string(),
            token_endpoint: Self::TOKEN_ENDPOINT.to_string(),
            jwks_uri: Self::JWKS_URI.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub port: u16,
    pub production: bool,
    pub public_base_url: String,
    pub cors_origins: Vec<String>,
    pub google: GoogleConfig,
}

impl AppConfig {
    /// Resolve configuration from the process environment.
    ///
    /// Fails fast when the Google client credentials are absent. The client id
    /// falls back to `PUBLIC_GOOGLE_CLIENT_ID`, which the browser bundle also reads.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let client_id = non_empty("GOOGLE_CLIENT_ID")
            .or_else(|| non_empty("PUBLIC_GOOGLE_CLIENT_ID"))
            .ok_or(ConfigError::Missing("GOOGLE_CLIENT_ID"))?;
        let client_secret =
            non_empty("GOOGLE_CLIENT_SECRET").ok_or(ConfigError::Missing("GOOGLE_CLIENT_SECRET"))?;

        let port = match non_empty("PORT") {
            Some(raw) => raw.parse::<u16>().map_err(|_| ConfigError::Invalid {
                name: "PORT",
                value: raw,
            })?,
            None => 8080,
        };

        let app_env = non_empty("APP_ENV").unwrap_or_else(|| "development".to_string());

        let cors_origins = non_empty("CORS_ORIGINS")
            .unwrap_or_else(|| DEFAULT_CORS_ORIGINS.to_string())
            .split(',')
            .map(|origin| origin.trim().to_string())
            .filter(|origin| !origin.is_empty())
            .collect();

        Ok(Self {
            database_url: non_empty("DATABASE_URL")
                .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
            port,
            production: !app_env.eq_ignore_ascii_case("development"),
            public_base_url: non_empty("PUBLIC_BASE_URL")
                .unwrap_or_else(|| DEFAULT_PUBLIC_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            cors_origins,
            google: GoogleConfig::new(client_id, client_secret),
        })
    }

    /// Redirect URI registered with Google for the code flow.
    pub fn google_redirect_uri(&self) -> String {
        format!("{}/api/auth/google/callback", self.public_base_url)
    }
}
