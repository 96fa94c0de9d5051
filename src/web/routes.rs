use axum::{routing::post, Router};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::handlers;
use crate::state::AppState;

/// Create the application router
///
/// A single endpoint: POST an SDP offer to `/`, get the answer back.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", post(handlers::offer_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
