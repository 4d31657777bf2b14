use crate::domain::EventIngestionService;
use crate::http::ApiError;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use std::sync::Arc;

pub const EVENT_ACCEPTED: &str = "Event Accepted";

#[derive(Clone)]
pub struct AppState {
    pub ingestion: Arc<EventIngestionService>,
}

/// `POST /events`
pub async fn submit_event(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<(StatusCode, &'static str), ApiError> {
    state.ingestion.submit_event(&body).await?;
    Ok((StatusCode::ACCEPTED, EVENT_ACCEPTED))
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}
