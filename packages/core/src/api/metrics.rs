use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::Response,
};

use super::StatusState;

/// `GET /metrics` in Prometheus text format.
pub async fn metrics(State(state): State<StatusState>) -> Response {
    match state.metrics.render() {
        Ok(body) => {
            let mut response = Response::new(Body::from(body));
            response.headers_mut().insert(
                header::CONTENT_TYPE,
                header::HeaderValue::from_static("text/plain; version=0.0.4"),
            );
            response
        }
        Err(err) => {
            tracing::error!("Failed to render metrics: {}", err);
            let mut response = Response::new(Body::from("metrics error"));
            *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            response
        }
    }
}
