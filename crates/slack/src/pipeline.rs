//! One request pipeline for every webhook route.
//!
//! Commands: verify, parse, de-duplicate, dispatch. Events: detect the URL
//! verification handshake first (it is answered without a signature check), then
//! verify, de-duplicate by `event_id`, and hand the envelope to the event dispatcher.

use chrono::{DateTime, TimeZone, Utc};
use serde_json::{json, Value};
use specbridge_core::{Disposition, WebhookError};
use tracing::{info, warn};

use crate::{
    commands,
    dispatch::{CommandDispatcher, CommandResult},
    events::{self, EventContext, EventDispatcher, RoutedEvent},
    registry::CommandContext,
    replay::ReplayGuard,
    request::{ContentKind, InboundWebhookRequest},
    signature::SignatureVerifier,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WebhookReply {
    Command(CommandResult),
    Challenge(String),
    Acknowledged,
    Rejected(WebhookError),
}

impl WebhookReply {
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Command(_) | Self::Challenge(_) | Self::Acknowledged => 200,
            Self::Rejected(error) => error.disposition().status_code(),
        }
    }

    pub fn body(&self) -> Value {
        match self {
            Self::Command(result) => command_body(result),
            Self::Challenge(challenge) => json!({ "challenge": challenge }),
            Self::Acknowledged => json!({ "ok": true }),
            Self::Rejected(error) => match error.disposition() {
                Disposition::Ephemeral => command_body(&CommandResult::from_error(error)),
                Disposition::BadRequest | Disposition::Unauthorized | Disposition::Internal => {
                    json!({ "error": error.public_message() })
                }
            },
        }
    }
}

/// The signed send time, which may be ahead of receipt by up to the replay window.
fn stamped_at(request: &InboundWebhookRequest) -> DateTime<Utc> {
    request
        .timestamp()
        .and_then(|timestamp| timestamp.trim().parse::<i64>().ok())
        .and_then(|seconds| Utc.timestamp_opt(seconds, 0).single())
        .unwrap_or_else(|| request.received_at())
}

fn command_body(result: &CommandResult) -> Value {
    json!({ "response_type": result.response_type, "text": result.text })
}

pub struct WebhookPipeline {
    verifier: SignatureVerifier,
    dispatcher: CommandDispatcher,
    events: EventDispatcher,
    replay: ReplayGuard,
}

impl WebhookPipeline {
    pub fn new(
        verifier: SignatureVerifier,
        dispatcher: CommandDispatcher,
        events: EventDispatcher,
    ) -> Self {
        Self { verifier, dispatcher, events, replay: ReplayGuard::default() }
    }

    pub fn with_replay_guard(mut self, replay: ReplayGuard) -> Self {
        self.replay = replay;
        self
    }

    pub fn verifier(&self) -> &SignatureVerifier {
        &self.verifier
    }

    pub fn dispatcher(&self) -> &CommandDispatcher {
        &self.dispatcher
    }

    /// `route_command` names the command for per-command routes; a `command` form
    /// field in the body takes precedence.
    pub async fn handle_command(
        &self,
        request: &InboundWebhookRequest,
        route_command: Option<&str>,
    ) -> WebhookReply {
        if let Err(reply) = self.authenticate(request) {
            return reply;
        }

        // A body without a name still gets a 200; the dispatcher answers it as unrecognized.
        let command = commands::parse(request.raw_body()).or_route_name(route_command);

        if let Some(signature) = request.signature() {
            if !self.first_delivery(&format!("command:{signature}"), request) {
                info!(
                    event_name = "slack.command.duplicate",
                    correlation_id = %request.correlation_id(),
                    command = %command.name,
                    channel_id = %command.channel_id,
                    "duplicate command delivery acknowledged without dispatch"
                );
                return WebhookReply::Command(CommandResult::ephemeral(format!(
                    "`{}` is already being processed.",
                    command.display_name()
                )));
            }
        }

        let ctx = CommandContext { correlation_id: request.correlation_id().to_owned() };
        WebhookReply::Command(self.dispatcher.dispatch(&command, &ctx).await)
    }

    pub async fn handle_event(&self, request: &InboundWebhookRequest) -> WebhookReply {
        let routed = serde_json::from_slice::<Value>(request.raw_body())
            .map_err(|error| error.to_string())
            .and_then(|body| events::route(&body).map_err(|error| error.to_string()));

        if let Ok(RoutedEvent::Handshake { challenge }) = &routed {
            info!(
                event_name = "slack.event.handshake",
                correlation_id = %request.correlation_id(),
                "answered url verification handshake"
            );
            return WebhookReply::Challenge(challenge.clone());
        }

        if let Err(reply) = self.authenticate(request) {
            return reply;
        }

        let envelope = match routed {
            Ok(RoutedEvent::EventCallback(envelope)) => envelope,
            Ok(RoutedEvent::Unsupported { event_type }) => {
                info!(
                    event_name = "slack.event.unsupported",
                    correlation_id = %request.correlation_id(),
                    event_type = %event_type,
                    "unsupported event type acknowledged"
                );
                return WebhookReply::Acknowledged;
            }
            Ok(RoutedEvent::Handshake { .. }) => return WebhookReply::Acknowledged,
            Err(_) if request.content_kind() == ContentKind::Form => {
                return self.malformed(request, "event callbacks must be JSON, got a form body");
            }
            Err(reason) => return self.malformed(request, &reason),
        };

        if !self.first_delivery(&format!("event:{}", envelope.event_id), request) {
            info!(
                event_name = "slack.event.duplicate",
                correlation_id = %request.correlation_id(),
                event_id = %envelope.event_id,
                "duplicate event delivery acknowledged without dispatch"
            );
            return WebhookReply::Acknowledged;
        }

        let ctx = EventContext { correlation_id: request.correlation_id().to_owned() };
        match self.events.dispatch(&envelope, &ctx).await {
            Ok(result) => info!(
                event_name = "slack.event.dispatched",
                correlation_id = %ctx.correlation_id,
                event_id = %envelope.event_id,
                event_type = %envelope.raw_type,
                result = ?result,
                "event dispatched"
            ),
            Err(error) => warn!(
                event_name = "slack.event.failed",
                correlation_id = %ctx.correlation_id,
                event_id = %envelope.event_id,
                event_type = %envelope.raw_type,
                error = %error,
                "event handler failed"
            ),
        }
        WebhookReply::Acknowledged
    }

    fn first_delivery(&self, key: &str, request: &InboundWebhookRequest) -> bool {
        self.replay.check_and_record_until(key, request.received_at(), stamped_at(request))
    }

    fn authenticate(&self, request: &InboundWebhookRequest) -> Result<(), WebhookReply> {
        self.verifier.check(request).map_err(|failure| {
            let error = WebhookError::from(failure);
            warn!(
                event_name = "slack.signature.rejected",
                correlation_id = %request.correlation_id(),
                error_class = error.error_class(),
                reason = %failure,
                body_preview = %request.body_preview(),
                "webhook request rejected before dispatch"
            );
            WebhookReply::Rejected(error)
        })
    }

    fn malformed(&self, request: &InboundWebhookRequest, reason: &str) -> WebhookReply {
        warn!(
            event_name = "slack.request.malformed",
            correlation_id = %request.correlation_id(),
            reason = %reason,
            body_preview = %request.body_preview(),
            "malformed webhook body"
        );
        WebhookReply::Rejected(WebhookError::Malformed(reason.to_owned()))
    }
}
