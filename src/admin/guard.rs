// src/admin/guard.rs
//! Role checks for the back-office surface.

use async_trait::async_trait;
use axum::{
    extract::{Extension, FromRequestParts},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::{error, warn};

use crate::auth::models::{AuthContext, Role};
use crate::common::AppState;
use crate::services::users::find_user_by_id;

/// Whether `user_id` currently holds the admin role. Unknown users are not admins.
pub async fn is_admin(pool: &SqlitePool, user_id: &str) -> Result<bool, sqlx::Error> {
    Ok(find_user_by_id(pool, user_id)
        .await?
        .map(|user| user.is_admin())
        .unwrap_or(false))
}

/// JSON `{"error": message}` response, 403 unless another status is given.
pub fn admin_response(message: &str, status: Option<StatusCode>) -> Response {
    (
        status.unwrap_or(StatusCode::FORBIDDEN),
        Json(json!({ "error": message })),
    )
        .into_response()
}

/// An authenticated caller whose admin role was confirmed against the store.
#[derive(Debug, Clone)]
pub struct AdminUser {
    pub user_id: String,
}

#[async_trait]
impl<S> FromRequestParts<S> for AdminUser
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let context = match parts.extensions.get::<AuthContext>() {
            Some(context) => context.clone(),
            None => return Err(admin_response("Unauthorized", Some(StatusCode::UNAUTHORIZED))),
        };

        let Extension(app_state): Extension<Arc<AppState>> =
            Extension::from_request_parts(parts, state)
                .await
                .map_err(|e| e.into_response())?;

        // The gate's role may be stale if it changed mid-request
        let confirmed = context.role == Role::Admin
            && is_admin(&app_state.db, &context.user_id)
                .await
                .map_err(|e| {
                    error!(error = %e, user_id = %context.user_id, "Admin role lookup failed");
                    admin_response("internal_error", Some(StatusCode::INTERNAL_SERVER_ERROR))
                })?;

        if !confirmed {
            warn!(user_id = %context.user_id, "Admin access denied");
            return Err(admin_response("Admin access required", None));
        }

        Ok(AdminUser {
            user_id: context.user_id,
        })
    }
}
