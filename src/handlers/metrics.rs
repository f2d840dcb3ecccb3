//! Prometheus scrape endpoint

use axum::{http::header, response::IntoResponse, routing::get, Router};

use crate::{error::AppResult, judge::metrics, state::AppState};

async fn scrape() -> AppResult<impl IntoResponse> {
    let body = metrics::render().map_err(anyhow::Error::from)?;
    Ok(([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body))
}

/// Metrics routes, mounted outside the API prefix
pub fn routes() -> Router<AppState> {
    Router::new().route("/metrics", get(scrape))
}
