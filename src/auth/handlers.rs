//! Authentication handlers

use axum::{
    extract::{Extension, Json, Query},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{AppendHeaders, IntoResponse, Redirect, Response},
};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::cookies::{
    oauth_state_cookie, read_cookie, removal_cookie, session_cookie, OAUTH_STATE_COOKIE,
    SESSION_COOKIE,
};
use super::models::{
    GoogleIdTokenRequest, LoginRequest, LoginResponse, OAuthCallbackParams, PublicUser,
    RegisterRequest, Role, User, GOOGLE_PROVIDER,
};
use super::validators::RegistrationValidator;
use crate::common::{
    generate_secret_token, normalize_email, safe_email_log, ApiError, ApiJson, AppState,
    ValidationResult, Validator, OAUTH_STATE_BYTES,
};
use crate::services::google::{GoogleError, GoogleIdTokenPayload, TokenVerifyError};
use crate::services::{auth_providers, hash_password, parse_password_hash, users, verify_password};

const POST_LOGIN_PATH: &str = "/dashboard";

/// Hash off the async runtime and encode for the `password_hash` column.
pub(crate) async fn hash_for_storage(password: String) -> Result<String, ApiError> {
    let hashed = tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| ApiError::InternalServer(format!("password hashing task failed: {}", e)))?;
    hashed
        .to_storage()
        .map_err(|e| ApiError::InternalServer(e.to_string()))
}

/// Require an email/password pair, returning the normalized email.
fn require_credentials(
    email: Option<&str>,
    password: Option<&str>,
) -> Result<String, ApiError> {
    let mut validation = ValidationResult::new();
    validation.require("email", email);
    validation.require_non_empty("password", password);
    validation.into_result()?;

    Ok(normalize_email(email.unwrap_or_default()))
}

async fn start_session(state: &AppState, user_id: &str) -> Result<String, ApiError> {
    let session = state.sessions.create(user_id).await?;
    Ok(session_cookie(&session.token, state.config.production))
}

/// POST /api/auth/register
/// Creates a password account. No session is issued; clients log in afterwards.
///
/// # Request Body
/// ```json
/// { "email": "a@x.com", "password": "...", "name": "Ada" }
/// ```
pub async fn register(
    Extension(state): Extension<Arc<AppState>>,
    ApiJson(payload): ApiJson<RegisterRequest>,
) -> Result<(StatusCode, Json<PublicUser>), ApiError> {
    RegistrationValidator.validate(&payload).into_result()?;
    let email = normalize_email(payload.email.as_deref().unwrap_or_default());
    let name = payload
        .name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string);

    if users::find_user_by_email(&state.db, &email).await?.is_some() {
        debug!(email = %safe_email_log(&email), "Registration rejected: email already registered");
        return Err(ApiError::Conflict("email already registered".to_string()));
    }

    let password_hash = hash_for_storage(payload.password.unwrap_or_default()).await?;

    let user = users::create_password_user(&state.db, &email, name.as_deref(), Role::User, &password_hash)
        .await
        .map_err(|e| {
            if users::is_unique_violation(&e) {
                ApiError::Conflict("email already registered".to_string())
            } else {
                ApiError::from(e)
            }
        })?;

    info!(user_id = %user.id, email = %safe_email_log(&user.email), "User registered");
    Ok((StatusCode::CREATED, Json(user.public())))
}

/// POST /api/auth/login
///
/// Every credential failure yields the same 401 body.
pub async fn login(
    Extension(state): Extension<Arc<AppState>>,
    ApiJson(payload): ApiJson<LoginRequest>,
) -> Result<Response, ApiError> {
    let email = require_credentials(payload.email.as_deref(), payload.password.as_deref())?;
    let password = payload.password.unwrap_or_default();
    let invalid = || ApiError::Unauthorized("invalid_credentials".to_string());

    let credential = auth_providers::get_password_auth_by_email(&state.db, &email).await?;
    let Some((user_id, stored)) = credential.and_then(|c| Some((c.user_id, c.password_hash?))) else {
        debug!(email = %safe_email_log(&email), "Login failed: no password credential");
        return Err(invalid());
    };
    let Some(parsed) = parse_password_hash(&stored) else {
        warn!(user_id = %user_id, "Login failed: stored password hash is unreadable");
        return Err(invalid());
    };

    let matches = tokio::task::spawn_blocking(move || verify_password(&password, &parsed))
        .await
        .map_err(|e| ApiError::InternalServer(format!("password verification task failed: {}", e)))?;
    if !matches {
        debug!(user_id = %user_id, "Login failed: wrong password");
        return Err(invalid());
    }

    let cookie = start_session(&state, &user_id).await?;
    info!(user_id = %user_id, "User logged in with password");

    Ok((
        AppendHeaders([(header::SET_COOKIE, cookie)]),
        Json(LoginResponse { ok: true, user_id }),
    )
        .into_response())
}

/// POST /api/auth/logout
pub async fn logout(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    if let Some(token) = read_cookie(&headers, SESSION_COOKIE) {
        state.sessions.delete(&token).await?;
    }

    Ok((
        AppendHeaders([(
            header::SET_COOKIE,
            removal_cookie(SESSION_COOKIE, state.config.production),
        )]),
        Json(json!({ "ok": true })),
    )
        .into_response())
}

/// GET /api/auth/me
pub async fn me(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<PublicUser>, ApiError> {
    let token = read_cookie(&headers, SESSION_COOKIE)
        .ok_or_else(|| ApiError::Unauthorized("not_authenticated".to_string()))?;

    let session = state
        .sessions
        .get_by_token(&token)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("invalid_session".to_string()))?;

    let user = users::find_user_by_id(&state.db, &session.user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("user_not_found".to_string()))?;

    Ok(Json(user.public()))
}

/// GET /api/auth/google/start
/// Redirects to Google's consent screen with a fresh anti-forgery state.
pub async fn google_start(Extension(state): Extension<Arc<AppState>>) -> Response {
    let oauth_state = generate_secret_token(OAUTH_STATE_BYTES);
    let url = state
        .google_oauth
        .authorization_url(&oauth_state, &state.config.google_redirect_uri());

    debug!("Starting Google OAuth flow");
    (
        AppendHeaders([(
            header::SET_COOKIE,
            oauth_state_cookie(&oauth_state, state.config.production),
        )]),
        Redirect::temporary(&url),
    )
        .into_response()
}

/// GET /api/auth/google/callback
///
/// The `oauth_state` cookie is cleared on every outcome.
pub async fn google_callback(
    Extension(state): Extension<Arc<AppState>>,
    Query(params): Query<OAuthCallbackParams>,
    headers: HeaderMap,
) -> Response {
    let mut response = match complete_google_callback(&state, params, &headers).await {
        Ok(response) => response,
        Err(e) => e.into_response(),
    };

    let clear_state = removal_cookie(OAUTH_STATE_COOKIE, state.config.production);
    match HeaderValue::from_str(&clear_state) {
        Ok(value) => {
            response.headers_mut().append(header::SET_COOKIE, value);
        }
        Err(e) => error!(error = %e, "Failed to encode oauth_state removal cookie"),
    }
    response
}

async fn complete_google_callback(
    state: &AppState,
    params: OAuthCallbackParams,
    headers: &HeaderMap,
) -> Result<Response, ApiError> {
    if let Some(reason) = params.error.as_deref() {
        warn!(reason = %reason, "Google returned an OAuth error");
    }

    let code = params
        .code
        .filter(|c| !c.is_empty())
        .ok_or_else(|| ApiError::BadRequest("missing_code".to_string()))?;

    // Checked before any outbound call
    let expected_state = read_cookie(headers, OAUTH_STATE_COOKIE);
    match (params.state.as_deref(), expected_state.as_deref()) {
        (Some(received), Some(expected)) if !received.is_empty() && received == expected => {}
        _ => {
            warn!("OAuth callback rejected: state mismatch");
            return Err(ApiError::BadRequest("invalid_state".to_string()));
        }
    }

    let redirect_uri = state.config.google_redirect_uri();
    let id_token = state
        .google_oauth
        .exchange_code(&code, &redirect_uri)
        .await
        .map_err(|e| {
            warn!(error = %e, "Google code exchange failed");
            match e {
                GoogleError::MissingIdToken => {
                    ApiError::BadRequest("missing_id_token".to_string())
                }
                _ => ApiError::BadRequest("token_exchange_failed".to_string()),
            }
        })?;

    let payload = verify_google_token(state, &id_token).await?;
    let user_id = resolve_google_user(state, &payload).await?;
    let cookie = start_session(state, &user_id).await?;

    info!(user_id = %user_id, "User logged in with Google (code flow)");
    Ok((
        AppendHeaders([(header::SET_COOKIE, cookie)]),
        Redirect::temporary(POST_LOGIN_PATH),
    )
        .into_response())
}

/// POST /api/auth/google
/// Signs in with an ID token obtained client-side.
///
/// # Request Body
/// ```json
/// { "id_token": "<google id token>" }
/// ```
pub async fn google_token(
    Extension(state): Extension<Arc<AppState>>,
    ApiJson(payload): ApiJson<GoogleIdTokenRequest>,
) -> Result<Response, ApiError> {
    let id_token = payload
        .id_token
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("id_token required".to_string()))?;

    let claims = verify_google_token(&state, &id_token).await?;
    let user_id = resolve_google_user(&state, &claims).await?;
    let cookie = start_session(&state, &user_id).await?;

    info!(user_id = %user_id, "User logged in with Google (ID token)");
    Ok((
        AppendHeaders([(header::SET_COOKIE, cookie)]),
        Json(LoginResponse { ok: true, user_id }),
    )
        .into_response())
}

async fn verify_google_token(
    state: &AppState,
    id_token: &str,
) -> Result<GoogleIdTokenPayload, ApiError> {
    let payload = state
        .google_verifier
        .verify(id_token, &state.google_audiences())
        .await
        .map_err(|e| match e {
            TokenVerifyError::KeyFetch(reason) => {
                error!(reason = %reason, "Google signing keys unavailable");
                ApiError::InternalServer("google key fetch failed".to_string())
            }
            e => {
                warn!(error = %e, "Google ID token verification failed");
                ApiError::Unauthorized("invalid_token".to_string())
            }
        })?;

    if payload.sub.is_empty() {
        return Err(ApiError::Unauthorized("invalid_token".to_string()));
    }
    Ok(payload)
}

/// Find or create the local user for a verified Google identity.
///
/// Order: existing binding, then an existing account with the same email
/// (linked by adding a binding), then a new account.
async fn resolve_google_user(
    state: &AppState,
    payload: &GoogleIdTokenPayload,
) -> Result<String, ApiError> {
    let sub = payload.sub.as_str();

    if let Some(binding) =
        auth_providers::get_auth_provider_by_provider_id(&state.db, GOOGLE_PROVIDER, sub).await?
    {
        debug!(user_id = %binding.user_id, "Google identity already bound");
        return Ok(binding.user_id);
    }

    let email = payload
        .email
        .as_deref()
        .map(normalize_email)
        .filter(|e| !e.is_empty());

    if let Some(email) = email.as_deref() {
        if let Some(existing) = users::find_user_by_email(&state.db, email).await? {
            return link_google_identity(state, &existing, payload).await;
        }
    }

    let email = email.unwrap_or_else(|| format!("{}@users.google.local", sub));
    match users::create_oauth_user(&state.db, &email, payload.name.as_deref(), GOOGLE_PROVIDER, sub)
        .await
    {
        Ok(user) => {
            info!(user_id = %user.id, email = %safe_email_log(&user.email), "Created user from Google sign-in");
            Ok(user.id)
        }
        Err(e) if users::is_unique_violation(&e) => {
            // A concurrent sign-in won the insert
            if let Some(binding) =
                auth_providers::get_auth_provider_by_provider_id(&state.db, GOOGLE_PROVIDER, sub)
                    .await?
            {
                return Ok(binding.user_id);
            }
            match users::find_user_by_email(&state.db, &email).await? {
                Some(existing) => link_google_identity(state, &existing, payload).await,
                None => Err(ApiError::from(e)),
            }
        }
        Err(e) => Err(ApiError::from(e)),
    }
}

async fn link_google_identity(
    state: &AppState,
    user: &User,
    payload: &GoogleIdTokenPayload,
) -> Result<String, ApiError> {
    if payload.email_verified == Some(false) {
        warn!(user_id = %user.id, "Refusing to link Google identity with unverified email");
        return Err(ApiError::Conflict("email already registered".to_string()));
    }

    match auth_providers::create_oauth_provider(&state.db, &user.id, GOOGLE_PROVIDER, &payload.sub)
        .await
    {
        Ok(()) => {
            info!(user_id = %user.id, "Linked Google identity to existing account");
            Ok(user.id.clone())
        }
        Err(e) if users::is_unique_violation(&e) => {
            auth_providers::get_auth_provider_by_provider_id(&state.db, GOOGLE_PROVIDER, &payload.sub)
                .await?
                .map(|binding| binding.user_id)
                .ok_or_else(|| ApiError::from(e))
        }
        Err(e) => Err(ApiError::from(e)),
    }
}
