use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};

use super::StatusState;
use crate::scheduler::CycleStatus;

pub async fn health() -> impl IntoResponse {
    let mut response = Response::new(Body::from("ok"));
    *response.status_mut() = StatusCode::OK;
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    response
}

/// `GET /status` returns the most recent [`CycleStatus`]. Before the first
/// cycle completes every counter is zero and `last_finished_at` is null.
pub async fn status(State(state): State<StatusState>) -> impl IntoResponse {
    let current: CycleStatus = state.status.borrow().clone();
    (
        [(header::CACHE_CONTROL, HeaderValue::from_static("no-store"))],
        Json(current),
    )
}
