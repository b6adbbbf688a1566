use std::env;
use std::sync::{Mutex, OnceLock};

use serde_json::Value;
use specbridge_cli::commands::{config, doctor, sign};

const VECTOR_BODY: &str = "token=abc&text=hello&user_id=U1&channel_id=C1";
const VECTOR_SIGNATURE: &str =
    "v0=7711a32354e538a82c0e85b174536207b788f84596cdd7001cd00605c33367a9";

#[test]
fn sign_with_explicit_secret_matches_reference_vector() {
    with_env(&[], || {
        let result = sign::run(Some("1700000000"), VECTOR_BODY, Some("shhh".to_string()));
        assert_eq!(result.exit_code, 0);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "sign");
        assert_eq!(payload["status"], "ok");
        assert_eq!(payload["message"], VECTOR_SIGNATURE);
        assert_eq!(payload["details"]["headers"]["x-signature"], VECTOR_SIGNATURE);
        assert_eq!(payload["details"]["headers"]["x-request-timestamp"], "1700000000");
    });
}

#[test]
fn sign_falls_back_to_configured_secret() {
    with_env(&[("SPECBRIDGE_SLACK_SIGNING_SECRET", "shhh")], || {
        let result = sign::run(Some("1700000000"), VECTOR_BODY, None);
        assert_eq!(result.exit_code, 0);
        assert_eq!(parse_payload(&result.output)["message"], VECTOR_SIGNATURE);
    });
}

#[test]
fn sign_without_any_secret_is_a_config_failure() {
    with_env(&[], || {
        let result = sign::run(Some("1700000000"), VECTOR_BODY, None);
        assert_eq!(result.exit_code, 2);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn sign_rejects_non_numeric_timestamp() {
    with_env(&[], || {
        let result = sign::run(Some("yesterday"), VECTOR_BODY, Some("shhh".to_string()));
        assert_eq!(result.exit_code, 64);
        assert_eq!(parse_payload(&result.output)["error_class"], "invalid_timestamp");
    });
}

#[test]
fn doctor_json_passes_with_signing_secret() {
    with_env(&[("SPECBRIDGE_SLACK_SIGNING_SECRET", "shhh")], || {
        let result = doctor::run(true);
        assert_eq!(result.exit_code, 0);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["overall_status"], "pass");
        let names: Vec<&str> = payload["checks"]
            .as_array()
            .expect("checks array")
            .iter()
            .filter_map(|check| check["name"].as_str())
            .collect();
        assert_eq!(
            names,
            vec![
                "config_validation",
                "signing_secret_readiness",
                "response_deadline",
                "followup_delivery"
            ]
        );
        assert!(!result.output.contains("shhh"));
    });
}

#[test]
fn doctor_reports_missing_secret_and_skips_dependent_checks() {
    with_env(&[], || {
        let result = doctor::run(true);
        assert_eq!(result.exit_code, 2);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["overall_status"], "fail");
        assert_eq!(payload["checks"][0]["status"], "fail");
        assert!(payload["checks"][0]["details"]
            .as_str()
            .unwrap_or_default()
            .contains("slack.signing_secret"));
        assert_eq!(payload["checks"][1]["status"], "skipped");
    });
}

#[test]
fn doctor_flags_missing_secret_when_not_required() {
    with_env(&[("SPECBRIDGE_SLACK_REQUIRE_SIGNING_SECRET", "false")], || {
        let result = doctor::run(false);
        assert_eq!(result.exit_code, 2);
        assert!(result.output.contains("- [ok] config_validation"));
        assert!(result.output.contains("- [fail] signing_secret_readiness"));
    });
}

#[test]
fn config_redacts_secret_and_attributes_sources() {
    with_env(
        &[
            ("SPECBRIDGE_SLACK_SIGNING_SECRET", "super-secret-value"),
            ("SPECBRIDGE_LOG_LEVEL", "debug"),
        ],
        || {
            let output = config::run();

            assert!(!output.contains("super-secret-value"));
            assert!(output.contains(
                "- slack.signing_secret = <redacted> (source: env (SPECBRIDGE_SLACK_SIGNING_SECRET))"
            ));
            assert!(
                output.contains("- logging.level = debug (source: env (SPECBRIDGE_LOG_LEVEL))")
            );
            assert!(output.contains("- server.port = 8080 (source: default)"));
        },
    );
}

#[test]
fn config_reports_validation_failure() {
    with_env(&[], || {
        let output = config::run();
        assert!(output.starts_with("config validation failed:"));
    });
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "SPECBRIDGE_SLACK_SIGNING_SECRET",
        "SPECBRIDGE_SLACK_REQUIRE_SIGNING_SECRET",
        "SPECBRIDGE_SLACK_REPLAY_WINDOW_SECS",
        "SPECBRIDGE_SERVER_BIND_ADDRESS",
        "SPECBRIDGE_SERVER_PORT",
        "SPECBRIDGE_SERVER_GRACEFUL_SHUTDOWN_SECS",
        "SPECBRIDGE_DISPATCH_RESPONSE_DEADLINE_MS",
        "SPECBRIDGE_DISPATCH_FOLLOWUP_TIMEOUT_SECS",
        "SPECBRIDGE_DISPATCH_FOLLOWUP_QUEUE_CAPACITY",
        "SPECBRIDGE_LOGGING_LEVEL",
        "SPECBRIDGE_LOGGING_FORMAT",
        "SPECBRIDGE_LOG_LEVEL",
        "SPECBRIDGE_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
