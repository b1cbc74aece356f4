use super::authentication::get_authenticated_user;
use crate::error::ApiError;
use axum::{extract::Request, middleware::Next, response::Response};
use shared::Error;
use tracing::warn;

/// Only moderators may create, edit, or delete stories. Runs after
/// [`super::auth_middleware`].
pub async fn require_moderator(request: Request, next: Next) -> Result<Response, ApiError> {
    let user = get_authenticated_user(&request).ok_or(Error::Unauthorized)?;

    if !user.is_moderator {
        warn!(user = %user.username, "non-moderator attempted a story mutation");
        return Err(Error::Forbidden.into());
    }

    Ok(next.run(request).await)
}
