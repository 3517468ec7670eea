// src/admin/handlers/users.rs

use axum::{extract::Extension, http::StatusCode, Json};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::admin::guard::AdminUser;
use crate::admin::models::{
    AdminActionResponse, CreateAdminRequest, PromoteUserRequest, UpdateRoleRequest,
    UserListResponse, UserResponse,
};
use crate::admin::validators::CreateAdminValidator;
use crate::auth::handlers::hash_for_storage;
use crate::auth::models::{Role, User};
use crate::common::{normalize_email, safe_email_log, ApiError, ApiJson, AppState, Validator};
use crate::services::users;

/// Drop every session of a user whose role just changed, so the next request
/// is re-gated with the new role.
async fn invalidate_sessions(state: &AppState, user: &User) -> Result<(), ApiError> {
    let removed = state.sessions.delete_all_for_user(&user.id).await.map_err(|e| {
        error!(error = %e, user_id = %user.id, "Failed to invalidate sessions after role change");
        ApiError::DatabaseError(e)
    })?;
    info!(user_id = %user.id, removed_sessions = removed, "Sessions invalidated after role change");
    Ok(())
}

/// GET /api/admin/users - List all users, newest first
pub async fn list_users(
    Extension(state): Extension<Arc<AppState>>,
    admin: AdminUser,
) -> Result<Json<UserListResponse>, ApiError> {
    let users = users::list_users(&state.db).await.map_err(|e| {
        error!(error = %e, "Database error fetching user list");
        ApiError::DatabaseError(e)
    })?;

    info!(
        admin_user_id = %admin.user_id,
        user_count = users.len(),
        "User list fetched"
    );

    Ok(Json(UserListResponse { users }))
}

/// PATCH /api/admin/users - Change a user's role
pub async fn update_user_role(
    Extension(state): Extension<Arc<AppState>>,
    admin: AdminUser,
    ApiJson(request): ApiJson<UpdateRoleRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    let (Some(target_user_id), Some(role)) = (
        request.target_user_id.filter(|id| !id.trim().is_empty()),
        request.role.filter(|r| !r.trim().is_empty()),
    ) else {
        return Err(ApiError::BadRequest(
            "Missing required fields: targetUserId, role".to_string(),
        ));
    };

    let role: Role = role.parse().map_err(|_| {
        ApiError::BadRequest("Invalid role. Must be \"user\" or \"admin\"".to_string())
    })?;

    let previous = users::find_user_by_id(&state.db, &target_user_id)
        .await?
        .ok_or_else(|| {
            warn!(target_user_id = %target_user_id, "Role update failed: user not found");
            ApiError::NotFound("User not found".to_string())
        })?;

    let user = users::update_user_role(&state.db, &target_user_id, role)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    if previous.role() != role {
        invalidate_sessions(&state, &user).await?;
    }

    info!(
        admin_user_id = %admin.user_id,
        target_user_id = %user.id,
        role = %role,
        "User role updated by admin"
    );

    Ok(Json(UserResponse { user }))
}

/// POST /api/admin/create-admin - Create a password account with the admin role
pub async fn create_admin(
    Extension(state): Extension<Arc<AppState>>,
    admin: AdminUser,
    ApiJson(request): ApiJson<CreateAdminRequest>,
) -> Result<(StatusCode, Json<AdminActionResponse>), ApiError> {
    CreateAdminValidator.validate(&request).into_result()?;
    let email = normalize_email(request.email.as_deref().unwrap_or_default());

    if users::find_user_by_email(&state.db, &email).await?.is_some() {
        warn!(email = %safe_email_log(&email), "Admin creation failed: user already exists");
        return Err(ApiError::Conflict("User already exists".to_string()));
    }

    let password_hash = hash_for_storage(request.password.unwrap_or_default()).await?;
    let name = request.name.as_deref().map(str::trim).filter(|n| !n.is_empty());

    let user = users::create_password_user(&state.db, &email, name, Role::Admin, &password_hash)
        .await
        .map_err(|e| {
            if users::is_unique_violation(&e) {
                ApiError::Conflict("User already exists".to_string())
            } else {
                error!(error = %e, "Database error creating admin user");
                ApiError::DatabaseError(e)
            }
        })?;

    info!(
        admin_user_id = %admin.user_id,
        created_user_id = %user.id,
        email = %safe_email_log(&user.email),
        "Admin user created"
    );

    Ok((
        StatusCode::CREATED,
        Json(AdminActionResponse {
            message: "Admin user created successfully".to_string(),
            user: user.public(),
        }),
    ))
}

/// POST /api/admin/promote-user - Grant the admin role by email
pub async fn promote_user(
    Extension(state): Extension<Arc<AppState>>,
    admin: AdminUser,
    ApiJson(request): ApiJson<PromoteUserRequest>,
) -> Result<Json<AdminActionResponse>, ApiError> {
    let email = request
        .email
        .as_deref()
        .map(normalize_email)
        .filter(|e| !e.is_empty())
        .ok_or_else(|| ApiError::BadRequest("Email is required".to_string()))?;

    let user = users::find_user_by_email(&state.db, &email)
        .await?
        .ok_or_else(|| {
            warn!(email = %safe_email_log(&email), "Promotion failed: user not found");
            ApiError::NotFound("User not found".to_string())
        })?;

    let promoted = users::update_user_role(&state.db, &user.id, Role::Admin)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    if !user.is_admin() {
        invalidate_sessions(&state, &promoted).await?;
    }

    info!(
        admin_user_id = %admin.user_id,
        promoted_user_id = %promoted.id,
        "User promoted to admin"
    );

    Ok(Json(AdminActionResponse {
        message: "User promoted to admin successfully".to_string(),
        user: promoted.public(),
    }))
}
