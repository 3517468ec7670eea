// src/admin/routes.rs

use axum::{
    routing::{get, post},
    Router,
};

use super::handlers;

pub fn admin_routes() -> Router {
    Router::new()
        // User management
        .route(
            "/api/admin/users",
            get(handlers::users::list_users).patch(handlers::users::update_user_role),
        )
        .route(
            "/api/admin/create-admin",
            post(handlers::users::create_admin),
        )
        .route(
            "/api/admin/promote-user",
            post(handlers::users::promote_user),
        )
}
