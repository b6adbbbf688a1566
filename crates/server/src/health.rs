use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

#[derive(Clone)]
pub struct HealthState {
    signing_secret_configured: bool,
    commands: Vec<String>,
}

impl HealthState {
    pub fn new(signing_secret_configured: bool, commands: Vec<String>) -> Self {
        Self { signing_secret_configured, commands }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub signing_secret: HealthCheck,
    pub commands: Vec<String>,
    pub checked_at: String,
}

pub fn router(state: HealthState) -> Router {
    Router::new().route("/health", get(health)).with_state(state)
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let signing_secret = if state.signing_secret_configured {
        HealthCheck { status: "ready", detail: "signing secret configured".to_string() }
    } else {
        HealthCheck {
            status: "degraded",
            detail: "signing secret missing; signed webhooks will fail".to_string(),
        }
    };
    let ready = signing_secret.status == "ready";

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck {
            status: "ready",
            detail: "specbridge-server runtime initialized".to_string(),
        },
        signing_secret,
        commands: state.commands.clone(),
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

#[cfg(test)]
mod tests {
    use axum::{extract::State, http::StatusCode, Json};

    use crate::health::{health, HealthState};

    #[tokio::test]
    async fn health_returns_ready_when_signing_secret_is_configured() {
        let state = HealthState::new(true, vec!["help".to_owned(), "specify".to_owned()]);

        let (status, Json(payload)) = health(State(state)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload.status, "ready");
        assert_eq!(payload.signing_secret.status, "ready");
        assert_eq!(payload.commands, vec!["help".to_owned(), "specify".to_owned()]);
    }

    #[tokio::test]
    async fn health_returns_service_unavailable_without_signing_secret() {
        let (status, Json(payload)) = health(State(HealthState::new(false, Vec::new()))).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(payload.status, "degraded");
        assert_eq!(payload.signing_secret.status, "degraded");
        assert_eq!(payload.service.status, "ready");
    }
}
