use thiserror::Error;

/// Why an inbound request failed authentication. Kept for logs only, never rendered.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum AuthenticationFailure {
    #[error("missing signature header")]
    MissingSignature,
    #[error("missing timestamp header")]
    MissingTimestamp,
    #[error("timestamp header is not a unix timestamp")]
    InvalidTimestamp,
    #[error("timestamp is outside the replay window")]
    StaleTimestamp,
    #[error("signature mismatch")]
    SignatureMismatch,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum WebhookError {
    #[error("configuration failure: {0}")]
    Configuration(String),
    #[error("authentication failure: {0}")]
    Authentication(AuthenticationFailure),
    #[error("command `/{command}` requires an argument")]
    Validation { command: String, usage: String },
    #[error("unrecognized command `/{0}`")]
    UnknownCommand(String),
    #[error("malformed request: {0}")]
    Malformed(String),
}

/// Outward handling of a [`WebhookError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Disposition {
    /// HTTP 200 with an ephemeral command response.
    Ephemeral,
    /// HTTP 400 with `{ "error": ... }`.
    BadRequest,
    /// HTTP 401 with `{ "error": "Unauthorized" }`.
    Unauthorized,
    /// HTTP 500 with `{ "error": ... }`.
    Internal,
}

impl Disposition {
    pub fn status_code(self) -> u16 {
        match self {
            Self::Ephemeral => 200,
            Self::BadRequest => 400,
            Self::Unauthorized => 401,
            Self::Internal => 500,
        }
    }
}

impl WebhookError {
    pub fn disposition(&self) -> Disposition {
        match self {
            Self::Configuration(_) => Disposition::Internal,
            Self::Authentication(_) => Disposition::Unauthorized,
            Self::Validation { .. } | Self::UnknownCommand(_) => Disposition::Ephemeral,
            Self::Malformed(_) => Disposition::BadRequest,
        }
    }

    pub fn public_message(&self) -> String {
        match self {
            Self::Configuration(_) => "Server configuration error".to_owned(),
            Self::Authentication(_) => "Unauthorized".to_owned(),
            Self::Validation { usage, .. } => usage.clone(),
            Self::UnknownCommand(command) if command.is_empty() => {
                "Sorry, that is an unrecognized command.".to_owned()
            }
            Self::UnknownCommand(command) => {
                format!("Sorry, `/{command}` is an unrecognized command.")
            }
            Self::Malformed(_) => "Malformed request".to_owned(),
        }
    }

    pub fn error_class(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration",
            Self::Authentication(_) => "authentication",
            Self::Validation { .. } => "validation",
            Self::UnknownCommand(_) => "unknown_command",
            Self::Malformed(_) => "malformed",
        }
    }
}

impl From<AuthenticationFailure> for WebhookError {
    fn from(value: AuthenticationFailure) -> Self {
        Self::Authentication(value)
    }
}
