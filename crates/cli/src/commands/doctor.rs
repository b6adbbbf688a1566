use std::time::Duration;

use serde::Serialize;
use specbridge_core::config::{AppConfig, LoadOptions};
use specbridge_slack::followup::ResponseUrlSender;

use super::{CommandResult, EXIT_CONFIG};

/// Slack abandons a slash command that is not answered within three seconds.
const PLATFORM_RESPONSE_LIMIT_MS: u64 = 3_000;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> CommandResult {
    let report = build_report();
    let exit_code = if report.overall_status == CheckStatus::Pass { 0 } else { EXIT_CONFIG };

    let output = if json_output {
        serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        })
    } else {
        render_human(&report)
    };

    CommandResult { exit_code, output }
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_signing_secret(&config));
            checks.push(check_response_deadline(&config));
            checks.push(check_followup_delivery(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            for name in ["signing_secret_readiness", "response_deadline", "followup_delivery"] {
                checks.push(DoctorCheck {
                    name,
                    status: CheckStatus::Skipped,
                    details: "skipped because configuration did not load".to_string(),
                });
            }
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_signing_secret(config: &AppConfig) -> DoctorCheck {
    if config.slack.has_signing_secret() {
        let window = match config.slack.replay_window_secs {
            0 => "replay window disabled".to_string(),
            secs => format!("replay window {secs}s"),
        };
        return DoctorCheck {
            name: "signing_secret_readiness",
            status: CheckStatus::Pass,
            details: format!("signing secret configured; {window}"),
        };
    }

    DoctorCheck {
        name: "signing_secret_readiness",
        status: CheckStatus::Fail,
        details: "slack.signing_secret is not set; every signed webhook will return 500"
            .to_string(),
    }
}

fn check_response_deadline(config: &AppConfig) -> DoctorCheck {
    let deadline = config.dispatch.response_deadline_ms;
    if deadline < PLATFORM_RESPONSE_LIMIT_MS {
        DoctorCheck {
            name: "response_deadline",
            status: CheckStatus::Pass,
            details: format!(
                "{deadline}ms, under the {PLATFORM_RESPONSE_LIMIT_MS}ms platform limit"
            ),
        }
    } else {
        DoctorCheck {
            name: "response_deadline",
            status: CheckStatus::Fail,
            details: format!(
                "{deadline}ms leaves no headroom under the {PLATFORM_RESPONSE_LIMIT_MS}ms platform limit"
            ),
        }
    }
}

fn check_followup_delivery(config: &AppConfig) -> DoctorCheck {
    let timeout = Duration::from_secs(config.dispatch.followup_timeout_secs);
    match ResponseUrlSender::new(timeout) {
        Ok(_) => DoctorCheck {
            name: "followup_delivery",
            status: CheckStatus::Pass,
            details: format!(
                "HTTP client ready (timeout {}s, queue capacity {})",
                config.dispatch.followup_timeout_secs, config.dispatch.followup_queue_capacity
            ),
        },
        Err(error) => DoctorCheck {
            name: "followup_delivery",
            status: CheckStatus::Fail,
            details: error.to_string(),
        },
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
