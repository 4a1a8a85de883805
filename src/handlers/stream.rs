use crate::{
    models::{ApiResponse, StreamEntry, StreamStats},
    services::StreamBuffer,
};
use axum::{extract::State, Json};
use std::sync::Arc;

pub async fn recent_transactions(
    State(buffer): State<Arc<StreamBuffer>>,
) -> Json<ApiResponse<Vec<StreamEntry>>> {
    Json(ApiResponse::ok(buffer.snapshot().await, "pending-stream"))
}

pub async fn stream_stats(
    State(buffer): State<Arc<StreamBuffer>>,
) -> Json<ApiResponse<StreamStats>> {
    Json(ApiResponse::ok(buffer.stats().await, "pending-stream"))
}
