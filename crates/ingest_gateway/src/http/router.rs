use crate::http::{health_check, submit_event, AppState};
use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

/// - `POST /events` submit one event
/// - `GET /health` liveness probe
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/events", post(submit_event))
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::EventIngestionService;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use common::domain::{DomainError, MockRawEventProducer};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn app(producer: MockRawEventProducer) -> Router {
        router(AppState {
            ingestion: Arc::new(EventIngestionService::new(Arc::new(producer))),
        })
    }

    async fn post_events(app: Router, body: &'static str) -> (StatusCode, String) {
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/events")
                    .header("content-type", "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();

        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_valid_event_is_accepted() {
        let mut producer = MockRawEventProducer::new();
        producer
            .expect_publish_raw_event()
            .times(1)
            .returning(|_| Ok(()));

        let (status, body) = post_events(
            app(producer),
            r#"{"userId":"u1","eventType":"click","payload":{"sku":"A-1"}}"#,
        )
        .await;

        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body, "Event Accepted");
    }

    #[tokio::test]
    async fn test_missing_field_is_bad_request() {
        let mut producer = MockRawEventProducer::new();
        producer.expect_publish_raw_event().never();

        let (status, body) = post_events(app(producer), r#"{"eventType":"click"}"#).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body,
            r#"{"error":"Missing required fields: userId or eventType"}"#
        );
    }

    #[tokio::test]
    async fn test_malformed_body_is_bad_request() {
        let mut producer = MockRawEventProducer::new();
        producer.expect_publish_raw_event().never();

        let (status, body) = post_events(app(producer), "not-json").await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, r#"{"error":"Invalid or missing JSON payload"}"#);
    }

    #[tokio::test]
    async fn test_publish_failure_is_internal_error() {
        let mut producer = MockRawEventProducer::new();
        producer
            .expect_publish_raw_event()
            .times(1)
            .returning(|_| Err(DomainError::PublishError(anyhow::anyhow!("stream unavailable"))));

        let (status, body) =
            post_events(app(producer), r#"{"userId":"u1","eventType":"click"}"#).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body.starts_with(r#"{"error":"Internal Server Error: "#));
        assert!(body.contains("stream unavailable"));
    }

    #[tokio::test]
    async fn test_health_reports_version() {
        let response = app(MockRawEventProducer::new())
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
    }
}
