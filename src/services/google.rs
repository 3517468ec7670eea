// src/services/google.rs
//! Google sign-in: ID-token verification against a cached JWKS, and the
//! OAuth authorization-code exchange.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::common::config::GoogleConfig;

pub const GOOGLE_ISSUERS: [&str; 2] = ["https://accounts.google.com", "accounts.google.com"];

/// How long a fetched key set is trusted.
pub const JWKS_TTL_MINUTES: i64 = 60;

/// Minimum age before an unknown `kid` may force an early refetch.
const JWKS_FORCED_REFRESH_MINUTES: i64 = 5;

#[derive(Debug, Error)]
pub enum TokenVerifyError {
    #[error("token header has no key id")]
    MissingKeyId,

    #[error("no published key matches the token key id")]
    UnknownKey,

    #[error("token signature does not match")]
    SignatureMismatch,

    #[error("token audience mismatch")]
    AudienceMismatch,

    #[error("token issuer mismatch")]
    IssuerMismatch,

    #[error("token has expired")]
    Expired,

    #[error("malformed token: {0}")]
    Malformed(String),

    #[error("failed to fetch signing keys: {0}")]
    KeyFetch(String),
}

impl From<jsonwebtoken::errors::Error> for TokenVerifyError {
    fn from(e: jsonwebtoken::errors::Error) -> Self {
        match e.kind() {
            ErrorKind::InvalidSignature => TokenVerifyError::SignatureMismatch,
            ErrorKind::InvalidAudience => TokenVerifyError::AudienceMismatch,
            ErrorKind::InvalidIssuer => TokenVerifyError::IssuerMismatch,
            ErrorKind::ExpiredSignature => TokenVerifyError::Expired,
            _ => TokenVerifyError::Malformed(e.to_string()),
        }
    }
}

#[derive(Debug, Error)]
pub enum GoogleError {
    #[error("token exchange failed with status {status}: {body}")]
    TokenExchange { status: u16, body: String },

    #[error("token response did not include an id_token")]
    MissingIdToken,

    #[error("HTTP request failed: {0}")]
    RequestFailed(String),
}

/// Verified claims of a Google ID token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoogleIdTokenPayload {
    pub sub: String,
    pub iss: String,
    pub exp: i64,
    pub email: Option<String>,
    pub email_verified: Option<bool>,
    pub name: Option<String>,
    pub picture: Option<String>,
}

// ============================================================================
// JWKS cache
// ============================================================================

/// Where signing keys come from.
#[async_trait]
pub trait KeySource: Send + Sync {
    async fn fetch(&self) -> Result<JwkSet, TokenVerifyError>;
}

/// Fetches the published key set over HTTPS.
pub struct HttpKeySource {
    client: Client,
    url: String,
}

impl HttpKeySource {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl KeySource for HttpKeySource {
    async fn fetch(&self) -> Result<JwkSet, TokenVerifyError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| TokenVerifyError::KeyFetch(e.to_string()))?;

        if !response.status().is_success() {
            return Err(TokenVerifyError::KeyFetch(format!(
                "status {}",
                response.status()
            )));
        }

        response
            .json::<JwkSet>()
            .await
            .map_err(|e| TokenVerifyError::KeyFetch(e.to_string()))
    }
}

struct CachedKeys {
    keys: Arc<JwkSet>,
    fetched_at: DateTime<Utc>,
}

/// Time-bounded cache over a [`KeySource`].
///
/// Concurrent refreshes may both hit the source; the last write wins.
pub struct JwksCache {
    source: Arc<dyn KeySource>,
    ttl: Duration,
    state: RwLock<Option<CachedKeys>>,
}

impl JwksCache {
    pub fn new(source: Arc<dyn KeySource>) -> Self {
        Self::with_ttl(source, Duration::minutes(JWKS_TTL_MINUTES))
    }

    pub fn with_ttl(source: Arc<dyn KeySource>, ttl: Duration) -> Self {
        Self {
            source,
            ttl,
            state: RwLock::new(None),
        }
    }

    pub async fn keys(&self) -> Result<Arc<JwkSet>, TokenVerifyError> {
        self.keys_at(Utc::now()).await
    }

    async fn keys_at(&self, now: DateTime<Utc>) -> Result<Arc<JwkSet>, TokenVerifyError> {
        {
            let state = self.state.read().await;
            if let Some(cached) = state.as_ref() {
                if now - cached.fetched_at < self.ttl {
                    return Ok(cached.keys.clone());
                }
            }
        }
        self.refresh_at(now).await
    }

    /// Refetch if the cached set is at least `min_age` old. Returns `None` when
    /// the cache was left untouched.
    async fn refresh_if_older_than(
        &self,
        now: DateTime<Utc>,
        min_age: Duration,
    ) -> Result<Option<Arc<JwkSet>>, TokenVerifyError> {
        {
            let state = self.state.read().await;
            if let Some(cached) = state.as_ref() {
                if now - cached.fetched_at < min_age {
                    return Ok(None);
                }
            }
        }
        self.refresh_at(now).await.map(Some)
    }

    async fn refresh_at(&self, now: DateTime<Utc>) -> Result<Arc<JwkSet>, TokenVerifyError> {
        let keys = Arc::new(self.source.fetch().await?);
        info!(key_count = keys.keys.len(), "Refreshed Google signing keys");

        let mut state = self.state.write().await;
        *state = Some(CachedKeys {
            keys: keys.clone(),
            fetched_at: now,
        });
        Ok(keys)
    }
}

// ============================================================================
// ID-token verifier
// ============================================================================

pub struct GoogleTokenVerifier {
    jwks: JwksCache,
    issuers: Vec<String>,
}

impl GoogleTokenVerifier {
    pub fn new(jwks: JwksCache) -> Self {
        Self {
            jwks,
            issuers: GOOGLE_ISSUERS.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Verifier fetching keys from `config.jwks_uri`.
    pub fn from_config(client: Client, config: &GoogleConfig) -> Self {
        let source = HttpKeySource::new(client, config.jwks_uri.clone());
        Self::new(JwksCache::new(Arc::new(source)))
    }

    /// Verify signature, audience, issuer and expiry of an ID token.
    pub async fn verify(
        &self,
        id_token: &str,
        audiences: &[String],
    ) -> Result<GoogleIdTokenPayload, TokenVerifyError> {
        self.verify_at(id_token, audiences, Utc::now()).await
    }

    async fn verify_at(
        &self,
        id_token: &str,
        audiences: &[String],
        now: DateTime<Utc>,
    ) -> Result<GoogleIdTokenPayload, TokenVerifyError> {
        let header = decode_header(id_token)?;
        if header.alg != Algorithm::RS256 {
            return Err(TokenVerifyError::Malformed(format!(
                "unsupported algorithm {:?}",
                header.alg
            )));
        }
        let kid = header.kid.ok_or(TokenVerifyError::MissingKeyId)?;

        let keys = self.jwks.keys_at(now).await?;
        let key = match keys.find(&kid) {
            Some(jwk) => DecodingKey::from_jwk(jwk)?,
            None => {
                // Google rotates keys; a new kid may predate our cached copy.
                debug!(kid = %kid, "Unknown key id, attempting key refresh");
                let refreshed = self
                    .jwks
                    .refresh_if_older_than(now, Duration::minutes(JWKS_FORCED_REFRESH_MINUTES))
                    .await?
                    .ok_or(TokenVerifyError::UnknownKey)?;
                let jwk = refreshed.find(&kid).ok_or(TokenVerifyError::UnknownKey)?;
                DecodingKey::from_jwk(jwk)?
            }
        };

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(audiences);
        validation.set_issuer(self.issuers.as_slice());

        let data = decode::<GoogleIdTokenPayload>(id_token, &key, &validation).map_err(|e| {
            warn!(error = %e, "Google ID token rejected");
            TokenVerifyError::from(e)
        })?;

        Ok(data.claims)
    }
}

// ============================================================================
// OAuth code flow
// ============================================================================

#[derive(Debug, Deserialize)]
struct TokenResponse {
    id_token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GoogleOAuthClient {
    client: Client,
    config: GoogleConfig,
}

impl GoogleOAuthClient {
    pub fn new(client: Client, config: GoogleConfig) -> Self {
        Self { client, config }
    }

    /// Authorization endpoint URL carrying the anti-forgery `state`.
    pub fn authorization_url(&self, state: &str, redirect_uri: &str) -> String {
        format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&prompt=select_account&state={}",
            self.config.authorization_endpoint,
            urlencoding::encode(&self.config.client_id),
            urlencoding::encode(redirect_uri),
            urlencoding::encode("openid email profile"),
            urlencoding::encode(state),
        )
    }

    /// Exchange an authorization code for the user's ID token.
    pub async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<String, GoogleError> {
        let params = [
            ("code", code),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("redirect_uri", redirect_uri),
            ("grant_type", "authorization_code"),
        ];

        let response = self
            .client
            .post(&self.config.token_endpoint)
            .form(&params)
            .send()
            .await
            .map_err(|e| GoogleError::RequestFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(http_status = %status, "Google token exchange failed");
            return Err(GoogleError::TokenExchange {
                status: status.as_u16(),
                body,
            });
        }

        let tokens: TokenResponse = response
            .json()
            .await
            .map_err(|e| GoogleError::RequestFailed(e.to_string()))?;

        tokens.id_token.ok_or(GoogleError::MissingIdToken)
    }
}

// ============================================================================
// Test fixtures
// ============================================================================
