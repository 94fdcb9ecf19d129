//! Image moderation endpoint (/upload)

use axum::{
    Json, Router,
    extract::{Request, State},
    routing::post,
};
use serde::Serialize;
use std::sync::Arc;

use crate::AppState;
use crate::services::error::ApiError;
use crate::services::{moderation, normalizer};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/upload", post(upload))
}

#[derive(Debug, Serialize)]
struct UploadResponse {
    message: &'static str,
    is_appropriate: bool,
}

/// POST /upload - Moderate an uploaded file, a base64 payload or an image URL
async fn upload(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Json<UploadResponse>, ApiError> {
    let image = normalizer::normalize(&state.fetcher, request)
        .await?
        .ok_or(ApiError::FetchFailed)?;

    let verdict = moderation::evaluate(state.vision.as_ref(), &image)
        .await
        .map_err(|e| {
            tracing::error!("Moderation error: {}", e);
            ApiError::from(e)
        })?;

    tracing::info!(
        is_appropriate = verdict.is_appropriate,
        safe_search_flagged = verdict.safe_search_flagged,
        denied_label = verdict.denied_label.as_ref().map(|l| l.description.as_str()),
        safety = ?verdict.safety,
        bytes = image.len(),
        "Moderation complete"
    );

    Ok(Json(UploadResponse {
        message: verdict.message(),
        is_appropriate: verdict.is_appropriate,
    }))
}
