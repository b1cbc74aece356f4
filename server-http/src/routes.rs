use crate::handlers;
use crate::middleware::{auth_middleware, identify_viewer, require_moderator};
use crate::state::AppState;
use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method, header},
    middleware,
    routing::{get, post, put},
};
use shared::config::Config;
use tower::Layer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::normalize_path::{NormalizePath, NormalizePathLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

/// Headroom for the JSON envelope around a base64 cover image.
const BODY_OVERHEAD_BYTES: usize = 64 * 1024;

/// Build and configure the application router
pub fn build_router(state: AppState, config: &Config) -> Router {
    let moderator_routes = Router::new()
        .route("/stories", post(handlers::create_story))
        .route(
            "/stories/{id}",
            put(handlers::update_story).delete(handlers::delete_story),
        )
        .route_layer(middleware::from_fn(require_moderator))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let public_routes = Router::new()
        .route("/stories", get(handlers::list_stories))
        .route("/stories/search", get(handlers::search_stories))
        .route("/stories/{id}", get(handlers::get_story))
        .route("/users/{id}/stories", get(handlers::user_stories))
        .route("/users/{id}/stats", get(handlers::user_stats))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            identify_viewer,
        ));

    Router::new()
        .route("/health", get(handlers::health_check))
        .merge(public_routes)
        .merge(moderator_routes)
        .layer(DefaultBodyLimit::max(body_limit(config.max_cover_bytes)))
        .layer(cors_layer(&config.allowed_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Router wrapped so that `/stories/` routes like `/stories`. Path
/// normalization has to run before routing, so it wraps the router itself.
pub fn build_app(state: AppState, config: &Config) -> NormalizePath<Router> {
    NormalizePathLayer::trim_trailing_slash().layer(build_router(state, config))
}

/// Base64 inflates the cover by 4/3.
fn body_limit(max_cover_bytes: u64) -> usize {
    (max_cover_bytes as usize).div_ceil(3) * 4 + BODY_OVERHEAD_BYTES
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    if allowed_origins.is_empty() || allowed_origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    layer.allow_origin(origins)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_body_limit_fits_largest_encoded_cover() {
        let limit = body_limit(5 * 1024 * 1024);
        assert!(limit > 5 * 1024 * 1024 * 4 / 3);
    }
}
