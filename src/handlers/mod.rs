//! HTTP Request Handlers
//!
//! Handlers are organised by resource; every handler is a thin layer over
//! the services.

pub mod health;
pub mod metrics;
pub mod problems;
pub mod sessions;
pub mod submissions;

use axum::Router;
use tower_http::{
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    trace::TraceLayer,
};

use crate::{constants::MAX_REQUEST_BODY_BYTES, state::AppState};

/// Create all API routes
pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(health::routes())
        .nest("/problems", problems::routes())
        .nest("/sessions", sessions::routes())
        .nest("/submissions", submissions::routes())
}

/// Full application router: the API under `/api/v1` plus `/metrics`
pub fn app(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1", routes())
        .merge(metrics::routes())
        .layer(TraceLayer::new_for_http())
        .layer(RequestBodyLimitLayer::new(MAX_REQUEST_BODY_BYTES))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
