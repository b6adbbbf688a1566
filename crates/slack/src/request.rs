use std::collections::HashMap;

use chrono::{DateTime, Utc};
use uuid::Uuid;

pub const SIGNATURE_HEADER: &str = "x-signature";
pub const TIMESTAMP_HEADER: &str = "x-request-timestamp";
pub const SLACK_SIGNATURE_HEADER: &str = "x-slack-signature";
pub const SLACK_TIMESTAMP_HEADER: &str = "x-slack-request-timestamp";

const BODY_PREVIEW_BYTES: usize = 64;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContentKind {
    Json,
    Form,
}

/// Snapshot of one inbound webhook request, taken before any body parsing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundWebhookRequest {
    raw_body: Vec<u8>,
    headers: HashMap<String, String>,
    received_at: DateTime<Utc>,
    correlation_id: String,
}

impl InboundWebhookRequest {
    pub fn new<B, I, K, V>(raw_body: B, headers: I, received_at: DateTime<Utc>) -> Self
    where
        B: Into<Vec<u8>>,
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let headers = headers
            .into_iter()
            .map(|(name, value)| (name.as_ref().to_ascii_lowercase(), value.into()))
            .collect();

        Self {
            raw_body: raw_body.into(),
            headers,
            received_at,
            correlation_id: Uuid::new_v4().to_string(),
        }
    }

    pub fn raw_body(&self) -> &[u8] {
        &self.raw_body
    }

    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }

    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    /// Signature header, accepting Slack's native name as an alias.
    pub fn signature(&self) -> Option<&str> {
        self.header(SIGNATURE_HEADER).or_else(|| self.header(SLACK_SIGNATURE_HEADER))
    }

    pub fn timestamp(&self) -> Option<&str> {
        self.header(TIMESTAMP_HEADER).or_else(|| self.header(SLACK_TIMESTAMP_HEADER))
    }

    pub fn content_kind(&self) -> ContentKind {
        if let Some(content_type) = self.header("content-type") {
            let content_type = content_type.to_ascii_lowercase();
            if content_type.starts_with("application/json") {
                return ContentKind::Json;
            }
            if content_type.starts_with("application/x-www-form-urlencoded") {
                return ContentKind::Form;
            }
        }

        match self.raw_body.iter().find(|byte| !byte.is_ascii_whitespace()) {
            Some(b'{') => ContentKind::Json,
            _ => ContentKind::Form,
        }
    }

    pub fn body_preview(&self) -> String {
        let end = self.raw_body.len().min(BODY_PREVIEW_BYTES);
        let mut preview = String::from_utf8_lossy(&self.raw_body[..end]).into_owned();
        if self.raw_body.len() > BODY_PREVIEW_BYTES {
            preview.push_str("...");
        }
        preview
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::{ContentKind, InboundWebhookRequest};

    #[test]
    fn header_lookup_is_case_insensitive_and_accepts_slack_aliases() {
        let request = InboundWebhookRequest::new(
            "text=hi",
            [("X-Slack-Signature", "v0=abc"), ("X-Slack-Request-Timestamp", "1700000000")],
            Utc::now(),
        );

        assert_eq!(request.signature(), Some("v0=abc"));
        assert_eq!(request.timestamp(), Some("1700000000"));
        assert_eq!(request.header("x-slack-signature"), Some("v0=abc"));
    }

    #[test]
    fn generic_headers_take_precedence_over_slack_aliases() {
        let request = InboundWebhookRequest::new(
            "",
            [("X-Signature", "v0=generic"), ("X-Slack-Signature", "v0=slack")],
            Utc::now(),
        );

        assert_eq!(request.signature(), Some("v0=generic"));
        assert_eq!(request.timestamp(), None);
    }

    #[test]
    fn content_kind_uses_header_then_body_shape() {
        let json = InboundWebhookRequest::new(
            "anything",
            [("Content-Type", "application/json; charset=utf-8")],
            Utc::now(),
        );
        let form = InboundWebhookRequest::new(
            "{\"looks\":\"json\"}",
            [("Content-Type", "application/x-www-form-urlencoded")],
            Utc::now(),
        );
        let sniffed = InboundWebhookRequest::new(
            "  {\"type\":\"url_verification\"}",
            Vec::<(&str, &str)>::new(),
            Utc::now(),
        );

        assert_eq!(json.content_kind(), ContentKind::Json);
        assert_eq!(form.content_kind(), ContentKind::Form);
        assert_eq!(sniffed.content_kind(), ContentKind::Json);
    }

    #[test]
    fn body_preview_is_truncated() {
        let body = "x".repeat(200);
        let request = InboundWebhookRequest::new(body, Vec::<(&str, &str)>::new(), Utc::now());

        let preview = request.body_preview();
        assert_eq!(preview.len(), 64 + 3);
        assert!(preview.ends_with("..."));
    }
}
