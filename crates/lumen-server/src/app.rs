use std::sync::Arc;

use axum::{
    http::HeaderValue,
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{routes, state::AppState};

/// Construct the router with all routes and middleware attached.
///
/// The beacon endpoint gets permissive CORS — the tracking script is
/// embedded on third-party sites, so browsers need the headers. The rest of
/// the API only opens up to configured origins.
pub fn build_app(state: Arc<AppState>) -> Router {
    let send_cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_cors = if state.config.cors_origins.is_empty() {
        CorsLayer::new()
    } else {
        let origins: Vec<HeaderValue> = state
            .config
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new().allow_origin(origins)
    };

    let beacon = Router::new()
        .route("/api/send", post(routes::send::send))
        .layer(send_cors);

    let api = Router::new()
        .route(
            "/api/websites",
            post(routes::websites::create).get(routes::websites::list),
        )
        .route(
            "/api/websites/{id}",
            get(routes::websites::show).delete(routes::websites::remove),
        )
        .route("/api/websites/{id}/reset", post(routes::websites::reset))
        .route("/api/websites/{id}/stats", get(routes::websites::stats))
        .route("/api/websites/{id}/metrics", get(routes::websites::metrics))
        .route(
            "/api/websites/{id}/pageviews",
            get(routes::websites::pageviews),
        )
        .route(
            "/api/websites/{id}/events",
            get(routes::websites::event_data),
        )
        .route(
            "/api/websites/{id}/realtime",
            get(routes::websites::realtime),
        )
        .route("/api/users", post(routes::users::create).get(routes::users::list))
        .route(
            "/api/users/{id}",
            get(routes::users::show).delete(routes::users::remove),
        )
        .layer(api_cors);

    Router::new()
        .route("/health", get(routes::health::health))
        .merge(beacon)
        .merge(api)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
