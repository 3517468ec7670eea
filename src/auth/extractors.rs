//! Authentication extractors for Axum

use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::request::Parts};
use tracing::debug;

use super::models::AuthContext;
use crate::common::ApiError;

/// Identity resolved by the request gate.
///
/// Handlers taking an `AuthContext` reject with 401 when the gate did not
/// attach one, which happens on public paths or requests without a session.
#[async_trait]
impl<S> FromRequestParts<S> for AuthContext
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        match parts.extensions.get::<AuthContext>() {
            Some(context) => Ok(context.clone()),
            None => {
                debug!(path = %parts.uri.path(), "No auth context on request");
                Err(ApiError::Unauthorized("not_authenticated".to_string()))
            }
        }
    }
}
