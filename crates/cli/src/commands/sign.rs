use chrono::Utc;
use secrecy::ExposeSecret;
use serde_json::json;
use specbridge_core::config::{AppConfig, LoadOptions};
use specbridge_slack::{
    request::{SIGNATURE_HEADER, TIMESTAMP_HEADER},
    signature::{compute_signature, SigningSecret},
};

use super::{CommandResult, EXIT_CONFIG, EXIT_INPUT};

const COMMAND: &str = "sign";

/// Signs `body` the way the platform does, so a request can be replayed by hand.
pub fn run(timestamp: Option<&str>, body: &str, secret: Option<String>) -> CommandResult {
    let timestamp = match timestamp {
        Some(timestamp) => timestamp.trim().to_string(),
        None => Utc::now().timestamp().to_string(),
    };
    if timestamp.parse::<i64>().is_err() {
        return CommandResult::failure(
            COMMAND,
            "invalid_timestamp",
            format!("timestamp `{timestamp}` is not unix seconds"),
            EXIT_INPUT,
        );
    }

    let secret = match secret.filter(|secret| !secret.trim().is_empty()) {
        Some(secret) => SigningSecret::new(secret),
        None => match configured_secret() {
            Ok(secret) => secret,
            Err(message) => {
                return CommandResult::failure(COMMAND, "config_validation", message, EXIT_CONFIG)
            }
        },
    };

    let signature = compute_signature(body.as_bytes(), &timestamp, &secret);
    CommandResult::success_with_details(
        COMMAND,
        signature.clone(),
        Some(json!({
            "timestamp": timestamp,
            "headers": {
                SIGNATURE_HEADER: signature,
                TIMESTAMP_HEADER: timestamp,
            },
        })),
    )
}

fn configured_secret() -> Result<SigningSecret, String> {
    let config = AppConfig::load(LoadOptions::default())
        .map_err(|error| format!("config validation failed: {error}"))?;

    config
        .slack
        .signing_secret
        .filter(|secret| !secret.expose_secret().trim().is_empty())
        .map(SigningSecret::from)
        .ok_or_else(|| "no --secret given and slack.signing_secret is not configured".to_string())
}
