use crate::state::AppState;
use crate::{api, logging};
use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::decompression::RequestDecompressionLayer;

/// Routes plus middleware. Gzip request bodies are inflated before logging
/// sees them; responses are gzipped when the client accepts it.
pub fn build_http_app(state: AppState) -> Router {
    api::routes()
        .with_state(state)
        .layer(DefaultBodyLimit::max(logging::MAX_BODY_BYTES))
        .layer(middleware::from_fn(logging::request_logging))
        .layer(RequestDecompressionLayer::new())
        .layer(CompressionLayer::new())
}
