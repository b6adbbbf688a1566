use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_CONFIG_FILE: &str = "specbridge.toml";
pub const NESTED_CONFIG_FILE: &str = "config/specbridge.toml";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub slack: SlackConfig,
    pub server: ServerConfig,
    pub dispatch: DispatchConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct SlackConfig {
    pub signing_secret: Option<SecretString>,
    pub require_signing_secret: bool,
    /// Maximum allowed skew between the request timestamp and receipt time. Zero disables it.
    pub replay_window_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct DispatchConfig {
    pub response_deadline_ms: u64,
    pub followup_timeout_secs: u64,
    pub followup_queue_capacity: usize,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub signing_secret: Option<String>,
    pub require_signing_secret: Option<bool>,
    pub replay_window_secs: Option<u64>,
    pub bind_address: Option<String>,
    pub port: Option<u16>,
    pub response_deadline_ms: Option<u64>,
    pub log_level: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            slack: SlackConfig {
                signing_secret: None,
                require_signing_secret: true,
                replay_window_secs: 300,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            dispatch: DispatchConfig {
                response_deadline_ms: 2_500,
                followup_timeout_secs: 10,
                followup_queue_capacity: 64,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl SlackConfig {
    pub fn has_signing_secret(&self) -> bool {
        self.signing_secret
            .as_ref()
            .map(|secret| !secret.expose_secret().trim().is_empty())
            .unwrap_or(false)
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(slack) = patch.slack {
            if let Some(signing_secret_value) = slack.signing_secret {
                self.slack.signing_secret = Some(secret_value(signing_secret_value));
            }
            if let Some(require_signing_secret) = slack.require_signing_secret {
                self.slack.require_signing_secret = require_signing_secret;
            }
            if let Some(replay_window_secs) = slack.replay_window_secs {
                self.slack.replay_window_secs = replay_window_secs;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(dispatch) = patch.dispatch {
            if let Some(response_deadline_ms) = dispatch.response_deadline_ms {
                self.dispatch.response_deadline_ms = response_deadline_ms;
            }
            if let Some(followup_timeout_secs) = dispatch.followup_timeout_secs {
                self.dispatch.followup_timeout_secs = followup_timeout_secs;
            }
            if let Some(followup_queue_capacity) = dispatch.followup_queue_capacity {
                self.dispatch.followup_queue_capacity = followup_queue_capacity;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("SPECBRIDGE_SLACK_SIGNING_SECRET") {
            self.slack.signing_secret = Some(secret_value(value));
        }
        if let Some(value) = read_env("SPECBRIDGE_SLACK_REQUIRE_SIGNING_SECRET") {
            self.slack.require_signing_secret =
                parse_bool("SPECBRIDGE_SLACK_REQUIRE_SIGNING_SECRET", &value)?;
        }
        if let Some(value) = read_env("SPECBRIDGE_SLACK_REPLAY_WINDOW_SECS") {
            self.slack.replay_window_secs =
                parse_u64("SPECBRIDGE_SLACK_REPLAY_WINDOW_SECS", &value)?;
        }

        if let Some(value) = read_env("SPECBRIDGE_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("SPECBRIDGE_SERVER_PORT") {
            self.server.port = parse_u16("SPECBRIDGE_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("SPECBRIDGE_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("SPECBRIDGE_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        if let Some(value) = read_env("SPECBRIDGE_DISPATCH_RESPONSE_DEADLINE_MS") {
            self.dispatch.response_deadline_ms =
                parse_u64("SPECBRIDGE_DISPATCH_RESPONSE_DEADLINE_MS", &value)?;
        }
        if let Some(value) = read_env("SPECBRIDGE_DISPATCH_FOLLOWUP_TIMEOUT_SECS") {
            self.dispatch.followup_timeout_secs =
                parse_u64("SPECBRIDGE_DISPATCH_FOLLOWUP_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("SPECBRIDGE_DISPATCH_FOLLOWUP_QUEUE_CAPACITY") {
            self.dispatch.followup_queue_capacity =
                parse_usize("SPECBRIDGE_DISPATCH_FOLLOWUP_QUEUE_CAPACITY", &value)?;
        }

        let log_level =
            read_env("SPECBRIDGE_LOGGING_LEVEL").or_else(|| read_env("SPECBRIDGE_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("SPECBRIDGE_LOGGING_FORMAT").or_else(|| read_env("SPECBRIDGE_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(signing_secret) = overrides.signing_secret {
            self.slack.signing_secret = Some(secret_value(signing_secret));
        }
        if let Some(require_signing_secret) = overrides.require_signing_secret {
            self.slack.require_signing_secret = require_signing_secret;
        }
        if let Some(replay_window_secs) = overrides.replay_window_secs {
            self.slack.replay_window_secs = replay_window_secs;
        }
        if let Some(bind_address) = overrides.bind_address {
            self.server.bind_address = bind_address;
        }
        if let Some(port) = overrides.port {
            self.server.port = port;
        }
        if let Some(response_deadline_ms) = overrides.response_deadline_ms {
            self.dispatch.response_deadline_ms = response_deadline_ms;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_slack(&self.slack)?;
        validate_server(&self.server)?;
        validate_dispatch(&self.dispatch)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

pub fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from(DEFAULT_CONFIG_FILE), PathBuf::from(NESTED_CONFIG_FILE)]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_slack(slack: &SlackConfig) -> Result<(), ConfigError> {
    if slack.require_signing_secret && !slack.has_signing_secret() {
        return Err(ConfigError::Validation(
            "slack.signing_secret is required. Get it from https://api.slack.com/apps > Your App > Basic Information > Signing Secret (or set SPECBRIDGE_SLACK_SIGNING_SECRET)".to_string(),
        ));
    }

    if slack.replay_window_secs > 3_600 {
        return Err(ConfigError::Validation(
            "slack.replay_window_secs must be in range 0..=3600".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.bind_address.trim().is_empty() {
        return Err(ConfigError::Validation("server.bind_address must not be empty".to_string()));
    }

    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_dispatch(dispatch: &DispatchConfig) -> Result<(), ConfigError> {
    // Slack abandons slash commands that are not acknowledged within three seconds.
    if dispatch.response_deadline_ms == 0 || dispatch.response_deadline_ms > 3_000 {
        return Err(ConfigError::Validation(
            "dispatch.response_deadline_ms must be in range 1..=3000".to_string(),
        ));
    }

    if dispatch.followup_timeout_secs == 0 || dispatch.followup_timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "dispatch.followup_timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if dispatch.followup_queue_capacity == 0 {
        return Err(ConfigError::Validation(
            "dispatch.followup_queue_capacity must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.parse::<usize>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    slack: Option<SlackPatch>,
    server: Option<ServerPatch>,
    dispatch: Option<DispatchPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct SlackPatch {
    signing_secret: Option<String>,
    require_signing_secret: Option<bool>,
    replay_window_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct DispatchPatch {
    response_deadline_ms: Option<u64>,
    followup_timeout_secs: Option<u64>,
    followup_queue_capacity: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
