use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use chrono::Utc;
use specbridge_slack::{InboundWebhookRequest, WebhookPipeline, WebhookReply};

use crate::health::{self, HealthState};

#[derive(Clone)]
pub struct WebhookState {
    pipeline: Arc<WebhookPipeline>,
}

pub fn router(pipeline: Arc<WebhookPipeline>) -> Router {
    Router::new()
        .route("/api/slack/commands", post(command))
        .route("/api/slack/commands/{command}", post(named_command))
        .route("/api/slack/events", post(event))
        .with_state(WebhookState { pipeline })
}

/// Webhook routes plus `/health`.
pub fn app(pipeline: Arc<WebhookPipeline>) -> Router {
    let verifier = pipeline.verifier();
    let state = HealthState::new(
        verifier.has_secret(),
        pipeline.dispatcher().registry().command_names(),
    );
    router(pipeline).merge(health::router(state))
}

async fn command(State(state): State<WebhookState>, headers: HeaderMap, body: Bytes) -> Response {
    let request = inbound(&headers, body);
    into_response(state.pipeline.handle_command(&request, None).await)
}

async fn named_command(
    State(state): State<WebhookState>,
    Path(command): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request = inbound(&headers, body);
    into_response(state.pipeline.handle_command(&request, Some(&command)).await)
}

async fn event(State(state): State<WebhookState>, headers: HeaderMap, body: Bytes) -> Response {
    let request = inbound(&headers, body);
    into_response(state.pipeline.handle_event(&request).await)
}

/// Captures the raw body and headers before anything parses them.
fn inbound(headers: &HeaderMap, body: Bytes) -> InboundWebhookRequest {
    let headers = headers.iter().filter_map(|(name, value)| {
        value.to_str().ok().map(|value| (name.as_str().to_owned(), value.to_owned()))
    });
    InboundWebhookRequest::new(body.to_vec(), headers, Utc::now())
}

fn into_response(reply: WebhookReply) -> Response {
    let status =
        StatusCode::from_u16(reply.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(reply.body())).into_response()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
        Router,
    };
    use chrono::Utc;
    use secrecy::SecretString;
    use serde_json::{json, Value};
    use specbridge_core::config::AppConfig;
    use specbridge_slack::signature::{compute_signature, SigningSecret};
    use tower::ServiceExt;

    use super::app;
    use crate::bootstrap::bootstrap_with_config;

    const SECRET: &str = "shhh";

    fn test_app() -> Router {
        let mut config = AppConfig::default();
        config.slack.signing_secret = Some(SecretString::from(SECRET.to_owned()));
        let application = bootstrap_with_config(config).expect("bootstrap");
        app(application.pipeline)
    }

    fn signed_post(uri: &str, content_type: &str, body: &str) -> Request<Body> {
        let timestamp = Utc::now().timestamp().to_string();
        let signature =
            compute_signature(body.as_bytes(), &timestamp, &SigningSecret::new(SECRET));
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", content_type)
            .header("x-signature", signature)
            .header("x-request-timestamp", timestamp)
            .body(Body::from(body.to_owned()))
            .expect("request")
    }

    async fn read_json(response: axum::response::Response) -> (StatusCode, Value) {
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        (status, serde_json::from_slice(&bytes).expect("json body"))
    }

    #[tokio::test]
    async fn per_command_route_dispatches_signed_command() {
        let request = signed_post(
            "/api/slack/commands/specify",
            "application/x-www-form-urlencoded",
            "token=abc&text=hello&user_id=U1&channel_id=C1",
        );

        let (status, body) = read_json(test_app().oneshot(request).await.expect("response")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["response_type"], "in_channel");
        assert!(body["text"].as_str().unwrap_or_default().contains("hello"));
    }

    #[tokio::test]
    async fn generic_command_route_reads_name_from_form() {
        let request = signed_post(
            "/api/slack/commands",
            "application/x-www-form-urlencoded",
            "command=%2Fhelp&user_id=U1&channel_id=C1",
        );

        let (status, body) = read_json(test_app().oneshot(request).await.expect("response")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["response_type"], "ephemeral");
        assert!(body["text"].as_str().unwrap_or_default().contains("/specify"));
    }

    #[tokio::test]
    async fn bad_signature_returns_401_unauthorized() {
        let request = Request::builder()
            .method("POST")
            .uri("/api/slack/commands/specify")
            .header("x-signature", "v0=0000")
            .header("x-request-timestamp", Utc::now().timestamp().to_string())
            .body(Body::from("text=hello"))
            .expect("request");

        let (status, body) = read_json(test_app().oneshot(request).await.expect("response")).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, json!({ "error": "Unauthorized" }));
    }

    #[tokio::test]
    async fn url_verification_is_answered_without_signature() {
        let request = Request::builder()
            .method("POST")
            .uri("/api/slack/events")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"type":"url_verification","challenge":"c-123"}"#))
            .expect("request");

        let (status, body) = read_json(test_app().oneshot(request).await.expect("response")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "challenge": "c-123" }));
    }

    #[tokio::test]
    async fn signed_event_callback_is_acknowledged() {
        let payload = json!({
            "type": "event_callback",
            "event_id": "Ev9",
            "event": { "type": "app_mention", "user": "U1", "channel": "C1", "text": "hi" }
        })
        .to_string();
        let request = signed_post("/api/slack/events", "application/json", &payload);

        let (status, _) = read_json(test_app().oneshot(request).await.expect("response")).await;

        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn health_route_reports_secret_readiness() {
        let request = Request::builder().uri("/health").body(Body::empty()).expect("request");

        let (status, body) = read_json(test_app().oneshot(request).await.expect("response")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["signing_secret"]["status"], "ready");
        assert!(!body.to_string().contains(SECRET));
    }
}
