use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{delete, get, post};
use axum::Router;
use tower::limit::GlobalConcurrencyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::config::ServiceConfig;
use crate::handler::{self, AppState};

/// Build the axum router with all Information Service endpoints.
pub fn build_router(state: Arc<AppState>, config: &ServiceConfig) -> Router {
    Router::new()
        .route("/", get(handler::index))
        .route("/health", get(handler::health))
        .route("/generate", get(handler::generate))
        .route("/pairing", post(handler::request_pairing))
        .route(
            "/info/:key",
            get(handler::get_info)
                .put(handler::put_info)
                .post(handler::post_info)
                .delete(handler::delete_info),
        )
        .route("/info/:key/:name", delete(handler::delete_info_entry))
        .layer(DefaultBodyLimit::max(config.max_body_size))
        .layer(TimeoutLayer::new(config.request_timeout()))
        .layer(GlobalConcurrencyLimitLayer::new(config.max_connections))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
