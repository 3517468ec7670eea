// src/common/extract.rs
//! Request body extractor that answers malformed input with an [`ApiError`].

use axum::extract::{rejection::JsonRejection, FromRequest};
use tracing::debug;

use super::error::ApiError;

/// `axum::Json` whose rejection is a JSON 400 `invalid_body` instead of
/// axum's plain-text 400/415/422.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        debug!(reason = %rejection.body_text(), "Rejected request body");
        ApiError::BadRequest("invalid_body".to_string())
    }
}
