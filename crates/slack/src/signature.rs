//! Request signing per Slack's `v0` scheme.
//!
//! The base string is `v0:{timestamp}:{raw body}` over the exact received bytes, the
//! signature is `v0=` followed by the hex HMAC-SHA256 of that base string, and the
//! comparison runs in constant time.

use std::fmt;
use std::time::Duration;

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use specbridge_core::config::SlackConfig;
use specbridge_core::{AuthenticationFailure, WebhookError};
use subtle::ConstantTimeEq;
use thiserror::Error;

use crate::request::InboundWebhookRequest;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_VERSION: &str = "v0";

#[derive(Clone)]
pub struct SigningSecret(SecretString);

impl SigningSecret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(SecretString::from(value.into()))
    }

    fn expose(&self) -> &[u8] {
        self.0.expose_secret().as_bytes()
    }
}

impl From<SecretString> for SigningSecret {
    fn from(value: SecretString) -> Self {
        Self(value)
    }
}

impl fmt::Debug for SigningSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SigningSecret(<redacted>)")
    }
}

pub fn signing_base(raw_body: &[u8], timestamp: &str) -> Vec<u8> {
    let capacity = SIGNATURE_VERSION.len() + timestamp.len() + raw_body.len() + 2;
    let mut base = Vec::with_capacity(capacity);
    base.extend_from_slice(SIGNATURE_VERSION.as_bytes());
    base.push(b':');
    base.extend_from_slice(timestamp.as_bytes());
    base.push(b':');
    base.extend_from_slice(raw_body);
    base
}

pub fn compute_signature(raw_body: &[u8], timestamp: &str, secret: &SigningSecret) -> String {
    // HMAC accepts keys of any length; the error arm is unreachable in practice and
    // yields a value no well-formed header can match.
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.expose()) else {
        return String::new();
    };
    mac.update(&signing_base(raw_body, timestamp));
    format!("{SIGNATURE_VERSION}={}", hex::encode(mac.finalize().into_bytes()))
}

/// Returns `true` only when `signature` matches the expected value. Never panics.
pub fn verify(raw_body: &[u8], timestamp: &str, signature: &str, secret: &SigningSecret) -> bool {
    if signature.is_empty() || timestamp.is_empty() {
        return false;
    }

    let expected = compute_signature(raw_body, timestamp, secret);
    expected.as_bytes().ct_eq(signature.as_bytes()).into()
}

#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum VerificationError {
    #[error("signing secret is not configured")]
    MissingSecret,
    #[error(transparent)]
    Rejected(#[from] AuthenticationFailure),
}

impl From<VerificationError> for WebhookError {
    fn from(value: VerificationError) -> Self {
        match value {
            VerificationError::MissingSecret => {
                Self::Configuration("signing secret is not configured".to_owned())
            }
            VerificationError::Rejected(failure) => Self::Authentication(failure),
        }
    }
}

#[derive(Clone, Debug)]
pub struct SignatureVerifier {
    secret: Option<SigningSecret>,
    replay_window: Option<Duration>,
}

impl SignatureVerifier {
    pub fn new(secret: Option<SigningSecret>) -> Self {
        Self { secret, replay_window: None }
    }

    pub fn from_config(config: &SlackConfig) -> Self {
        let secret = config
            .signing_secret
            .as_ref()
            .filter(|secret| !secret.expose_secret().trim().is_empty())
            .cloned()
            .map(SigningSecret::from);
        Self::new(secret).with_replay_window(Duration::from_secs(config.replay_window_secs))
    }

    /// A zero window disables the freshness check.
    pub fn with_replay_window(mut self, window: Duration) -> Self {
        self.replay_window = (!window.is_zero()).then_some(window);
        self
    }

    pub fn has_secret(&self) -> bool {
        self.secret.is_some()
    }

    pub fn replay_window(&self) -> Option<Duration> {
        self.replay_window
    }

    pub fn check(&self, request: &InboundWebhookRequest) -> Result<(), VerificationError> {
        let secret = self.secret.as_ref().ok_or(VerificationError::MissingSecret)?;
        let signature = request.signature().ok_or(AuthenticationFailure::MissingSignature)?;
        let timestamp = request.timestamp().ok_or(AuthenticationFailure::MissingTimestamp)?;

        if let Some(window) = self.replay_window {
            check_freshness(timestamp, request, window)?;
        }

        if verify(request.raw_body(), timestamp, signature, secret) {
            Ok(())
        } else {
            Err(AuthenticationFailure::SignatureMismatch.into())
        }
    }
}

fn check_freshness(
    timestamp: &str,
    request: &InboundWebhookRequest,
    window: Duration,
) -> Result<(), AuthenticationFailure> {
    let sent_at =
        timestamp.trim().parse::<i64>().map_err(|_| AuthenticationFailure::InvalidTimestamp)?;
    let skew = request.received_at().timestamp().abs_diff(sent_at);
    if skew > window.as_secs() {
        return Err(AuthenticationFailure::StaleTimestamp);
    }
    Ok(())
}
