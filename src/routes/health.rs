//! Liveness endpoint

use axum::{Router, routing::get};
use std::sync::Arc;

use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/health", get(health))
}

async fn health() -> &'static str {
    "ok"
}
