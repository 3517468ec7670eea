// src/admin/models.rs

use serde::{Deserialize, Serialize};

use crate::auth::models::{PublicUser, User};

/// Body for `PATCH /api/admin/users`
#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRoleRequest {
    pub target_user_id: Option<String>,
    pub role: Option<String>,
}

/// Body for `POST /api/admin/create-admin`
#[derive(Debug, Deserialize, Default)]
pub struct CreateAdminRequest {
    pub email: Option<String>,
    pub password: Option<String>,
    pub name: Option<String>,
}

/// Body for `POST /api/admin/promote-user`
#[derive(Debug, Deserialize, Default)]
pub struct PromoteUserRequest {
    pub email: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UserListResponse {
    pub users: Vec<User>,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub user: User,
}

#[derive(Debug, Serialize)]
pub struct AdminActionResponse {
    pub message: String,
    pub user: PublicUser,
}
