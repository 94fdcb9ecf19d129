pub mod health;
pub mod upload;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    response::{IntoResponse, Response},
};
use std::any::Any;
use std::sync::Arc;
use tower_http::{catch_panic::CatchPanicLayer, cors::CorsLayer, trace::TraceLayer};

use crate::AppState;
use crate::services::error::ApiError;

/// Build all routes for the API
pub fn build_routes() -> Router<Arc<AppState>> {
    Router::new()
        .merge(health::routes())
        .merge(upload::routes())
}

/// Routes plus body limit, CORS, request tracing and panic recovery
pub fn app(state: Arc<AppState>, max_upload_bytes: usize) -> Router {
    build_routes()
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    };
    tracing::error!(%detail, "Handler panicked");
    ApiError::Internal(detail).into_response()
}
