use std::env;
use std::fs;
use std::path::Path;

use specbridge_core::config::{resolve_config_path, AppConfig, LoadOptions};
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = resolve_config_path(None);
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let signing_secret = if config.slack.has_signing_secret() { "<redacted>" } else { "<unset>" };
    let fields: [(&str, &[&str], String); 11] = [
        ("slack.signing_secret", &["SPECBRIDGE_SLACK_SIGNING_SECRET"], signing_secret.to_string()),
        (
            "slack.require_signing_secret",
            &["SPECBRIDGE_SLACK_REQUIRE_SIGNING_SECRET"],
            config.slack.require_signing_secret.to_string(),
        ),
        (
            "slack.replay_window_secs",
            &["SPECBRIDGE_SLACK_REPLAY_WINDOW_SECS"],
            config.slack.replay_window_secs.to_string(),
        ),
        (
            "server.bind_address",
            &["SPECBRIDGE_SERVER_BIND_ADDRESS"],
            config.server.bind_address.clone(),
        ),
        ("server.port", &["SPECBRIDGE_SERVER_PORT"], config.server.port.to_string()),
        (
            "server.graceful_shutdown_secs",
            &["SPECBRIDGE_SERVER_GRACEFUL_SHUTDOWN_SECS"],
            config.server.graceful_shutdown_secs.to_string(),
        ),
        (
            "dispatch.response_deadline_ms",
            &["SPECBRIDGE_DISPATCH_RESPONSE_DEADLINE_MS"],
            config.dispatch.response_deadline_ms.to_string(),
        ),
        (
            "dispatch.followup_timeout_secs",
            &["SPECBRIDGE_DISPATCH_FOLLOWUP_TIMEOUT_SECS"],
            config.dispatch.followup_timeout_secs.to_string(),
        ),
        (
            "dispatch.followup_queue_capacity",
            &["SPECBRIDGE_DISPATCH_FOLLOWUP_QUEUE_CAPACITY"],
            config.dispatch.followup_queue_capacity.to_string(),
        ),
        (
            "logging.level",
            &["SPECBRIDGE_LOGGING_LEVEL", "SPECBRIDGE_LOG_LEVEL"],
            config.logging.level.clone(),
        ),
        (
            "logging.format",
            &["SPECBRIDGE_LOGGING_FORMAT", "SPECBRIDGE_LOG_FORMAT"],
            format!("{:?}", config.logging.format),
        ),
    ];

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for (key_path, env_keys, value) in fields {
        let source =
            field_source(key_path, env_keys, config_file_doc.as_ref(), config_file_path.as_deref());
        lines.push(render_line(key_path, &value, source));
    }

    lines.join("\n")
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}
