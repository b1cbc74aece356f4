use crate::error::ApiError;
use crate::state::AppState;
use axum::{
    extract::{FromRequestParts, Request, State},
    http::{HeaderMap, header, request::Parts},
    middleware::Next,
    response::Response,
};
use std::convert::Infallible;
use shared::Error;
use taleshelf::domain::AuthUser;
use tracing::debug;

/// Extract the token from `Authorization: Bearer <token>`.
fn extract_bearer_token(auth_header: &str) -> Option<&str> {
    let (scheme, token) = auth_header.trim().split_once(' ')?;
    let token = token.trim();

    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
        return None;
    }
    Some(token)
}

async fn session_user(state: &AppState, headers: &HeaderMap) -> Result<Option<AuthUser>, ApiError> {
    let Some(token) = headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(extract_bearer_token)
    else {
        return Ok(None);
    };

    Ok(state.sessions.user_for_token(token).await?)
}

/// Authentication middleware: resolves the bearer token to a session user
/// and attaches it to the request extensions.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let user = session_user(&state, request.headers())
        .await?
        .ok_or(Error::Unauthorized)?;

    debug!(user = %user.username, "request authenticated");
    request.extensions_mut().insert(user);

    Ok(next.run(request).await)
}

/// Like [`auth_middleware`] for public routes: a valid session is attached,
/// anything else leaves the request anonymous.
pub async fn identify_viewer(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if let Some(user) = session_user(&state, request.headers()).await? {
        debug!(user = %user.username, "viewer identified");
        request.extensions_mut().insert(user);
    }

    Ok(next.run(request).await)
}

/// Extract authenticated user from request extensions
pub fn get_authenticated_user(request: &Request) -> Option<&AuthUser> {
    request.extensions().get::<AuthUser>()
}

/// Session user of a public request, if any.
#[derive(Debug, Clone, Default)]
pub struct Viewer(pub Option<AuthUser>);

impl Viewer {
    /// Drafts are visible to moderators and to their own author.
    pub fn can_see_drafts(&self, author_id: Option<&str>) -> bool {
        match &self.0 {
            Some(user) => user.is_moderator || author_id == Some(user.id.as_str()),
            None => false,
        }
    }
}

impl<S: Send + Sync> FromRequestParts<S> for Viewer {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(parts.extensions.get::<AuthUser>().cloned()))
    }
}
