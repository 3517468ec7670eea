//! Request gate: resolves the session cookie for every inbound request.

use axum::{
    extract::{Extension, Request},
    http::{header, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use std::sync::Arc;
use tracing::{debug, warn};

use super::cookies::{read_cookie, removal_cookie, SESSION_COOKIE};
use super::models::AuthContext;
use crate::admin::guard::admin_response;
use crate::common::{safe_token_log, ApiError, AppState};
use crate::services::users::find_user_by_id;

pub const USER_ID_HEADER: &str = "x-user-id";

const PUBLIC_PREFIXES: [&str; 6] = [
    "/api/auth/",
    "/login",
    "/signup",
    "/static/",
    "/favicon.ico",
    "/health",
];

const LOGIN_PATH: &str = "/login";

fn is_public(path: &str) -> bool {
    PUBLIC_PREFIXES.iter().any(|prefix| path.starts_with(prefix))
}

fn is_api(path: &str) -> bool {
    path.starts_with("/api/")
}

fn is_admin_api(path: &str) -> bool {
    path.starts_with("/api/admin/") || path == "/api/admin"
}

fn is_admin_ui(path: &str) -> bool {
    path.starts_with("/admin")
}

fn requires_session(path: &str) -> bool {
    path.starts_with("/dashboard") || is_admin_ui(path) || is_api(path)
}

fn redirect_to_login_clearing_cookie(secure: bool) -> Response {
    (
        [(header::SET_COOKIE, removal_cookie(SESSION_COOKIE, secure))],
        Redirect::temporary(LOGIN_PATH),
    )
        .into_response()
}

/// Middleware attaching an [`AuthContext`] to requests that carry a live session.
///
/// Requires `Extension<Arc<AppState>>` to be layered outside of it.
pub async fn request_gate(
    Extension(state): Extension<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Response {
    // Identity headers only ever come from this gate
    request.headers_mut().remove(USER_ID_HEADER);

    let path = request.uri().path().to_string();
    if is_public(&path) {
        return next.run(request).await;
    }

    let token = match read_cookie(request.headers(), SESSION_COOKIE) {
        Some(token) => token,
        None if requires_session(&path) => {
            debug!(path = %path, "No session cookie, redirecting to login");
            return Redirect::temporary(LOGIN_PATH).into_response();
        }
        None => return next.run(request).await,
    };

    let secure = state.config.production;

    let session = match state.sessions.get_by_token(&token).await {
        Ok(Some(session)) => session,
        Ok(None) => {
            debug!(token = %safe_token_log(&token), path = %path, "Invalid or expired session");
            return redirect_to_login_clearing_cookie(secure);
        }
        Err(e) => return ApiError::from(e).into_response(),
    };

    let user = match find_user_by_id(&state.db, &session.user_id).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            warn!(user_id = %session.user_id, "Session references a missing user");
            return redirect_to_login_clearing_cookie(secure);
        }
        Err(e) => return ApiError::from(e).into_response(),
    };

    let context = AuthContext {
        user_id: user.id.clone(),
        role: user.role(),
    };

    if !context.is_admin() {
        if is_admin_api(&path) {
            warn!(user_id = %context.user_id, path = %path, "Non-admin blocked from admin API");
            return admin_response("Admin access required", None);
        }
        if is_admin_ui(&path) {
            warn!(user_id = %context.user_id, path = %path, "Non-admin redirected away from admin area");
            return Redirect::temporary("/").into_response();
        }
    }

    if is_api(&path) {
        if let Ok(value) = HeaderValue::from_str(&context.user_id) {
            request.headers_mut().insert(USER_ID_HEADER, value);
        }
    }
    request.extensions_mut().insert(context);

    next.run(request).await
}
