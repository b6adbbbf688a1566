use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::{
    commands::sanitize_argument,
    dispatch::CommandResult,
    followup::{DeferredJob, FollowUpQueue, QueueError},
};

pub const URL_VERIFICATION: &str = "url_verification";
pub const EVENT_CALLBACK: &str = "event_callback";

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum SlackEventType {
    AppMention,
    Message,
    Unsupported,
}

impl SlackEventType {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "app_mention" => Self::AppMention,
            "message" => Self::Message,
            _ => Self::Unsupported,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventEnvelope {
    pub event_id: String,
    pub team_id: String,
    pub event_type: SlackEventType,
    /// Inner `event.type` exactly as delivered.
    pub raw_type: String,
    pub user_id: Option<String>,
    pub channel_id: Option<String>,
    pub text: Option<String>,
    pub from_bot: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RoutedEvent {
    /// One-time URL verification. Answered without signature verification.
    Handshake { challenge: String },
    EventCallback(EventEnvelope),
    Unsupported { event_type: String },
}

impl RoutedEvent {
    pub fn is_handshake(&self) -> bool {
        matches!(self, Self::Handshake { .. })
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum EventRouteError {
    #[error("event body has no `type` field")]
    MissingType,
    #[error("url_verification body has no `challenge`")]
    MissingChallenge,
    #[error("event_callback body is missing `{0}`")]
    MissingField(&'static str),
}

/// Classifies a decoded event body by its top-level `type`.
///
/// Only JSON bodies from the events endpoint reach this function. Slash commands arrive
/// form-encoded on their own routes and go through [`crate::commands::parse`], so there
/// is no command variant here. Any other top-level type becomes
/// [`RoutedEvent::Unsupported`] and is acknowledged without dispatch.
pub fn route(body: &Value) -> Result<RoutedEvent, EventRouteError> {
    let event_type = body.get("type").and_then(Value::as_str).ok_or(EventRouteError::MissingType)?;

    match event_type {
        URL_VERIFICATION => {
            let challenge = body
                .get("challenge")
                .and_then(Value::as_str)
                .filter(|challenge| !challenge.is_empty())
                .ok_or(EventRouteError::MissingChallenge)?;
            Ok(RoutedEvent::Handshake { challenge: challenge.to_owned() })
        }
        EVENT_CALLBACK => envelope(body).map(RoutedEvent::EventCallback),
        other => Ok(RoutedEvent::Unsupported { event_type: other.to_owned() }),
    }
}

fn envelope(body: &Value) -> Result<EventEnvelope, EventRouteError> {
    let event_id = string_field(body, "event_id").ok_or(EventRouteError::MissingField("event_id"))?;
    let event = body
        .get("event")
        .filter(|event| event.is_object())
        .ok_or(EventRouteError::MissingField("event"))?;
    let raw_type = string_field(event, "type").ok_or(EventRouteError::MissingField("event.type"))?;

    Ok(EventEnvelope {
        event_id,
        team_id: string_field(body, "team_id").unwrap_or_default(),
        event_type: SlackEventType::parse(&raw_type),
        raw_type,
        user_id: string_field(event, "user"),
        channel_id: string_field(event, "channel"),
        text: string_field(event, "text"),
        from_bot: event.get("bot_id").is_some_and(|bot_id| !bot_id.is_null()),
    })
}

fn string_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(str::to_owned)
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventContext {
    pub correlation_id: String,
}

impl Default for EventContext {
    fn default() -> Self {
        Self { correlation_id: "unknown-correlation-id".to_owned() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandlerResult {
    Processed,
    Ignored,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum EventHandlerError {
    #[error("event handler failure: {0}")]
    Failed(String),
    #[error(transparent)]
    Queue(#[from] QueueError),
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    fn event_type(&self) -> SlackEventType;

    async fn handle(
        &self,
        envelope: &EventEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError>;
}

#[derive(Default)]
pub struct EventDispatcher {
    handlers: HashMap<SlackEventType, Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<H>(&mut self, handler: H)
    where
        H: EventHandler + 'static,
    {
        self.handlers.insert(handler.event_type(), Arc::new(handler));
    }

    /// Event types without a handler are acknowledged as [`HandlerResult::Ignored`].
    pub async fn dispatch(
        &self,
        envelope: &EventEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let Some(handler) = self.handlers.get(&envelope.event_type) else {
            return Ok(HandlerResult::Ignored);
        };

        handler.handle(envelope, ctx).await
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

pub fn default_dispatcher(queue: FollowUpQueue) -> EventDispatcher {
    let mut dispatcher = EventDispatcher::new();
    dispatcher.register(MentionHandler::new(queue));
    dispatcher
}

/// Hands `app_mention` events to the follow-up queue. Mentions carry no
/// `response_url`, so the worker only records them.
pub struct MentionHandler {
    queue: FollowUpQueue,
}

impl MentionHandler {
    pub fn new(queue: FollowUpQueue) -> Self {
        Self { queue }
    }
}

#[async_trait]
impl EventHandler for MentionHandler {
    fn event_type(&self) -> SlackEventType {
        SlackEventType::AppMention
    }

    async fn handle(
        &self,
        envelope: &EventEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        if envelope.from_bot {
            return Ok(HandlerResult::Ignored);
        }

        let text = sanitize_argument(envelope.text.as_deref().unwrap_or_default());
        let user = envelope.user_id.clone().unwrap_or_else(|| "someone".to_owned());
        let job = DeferredJob::new("app_mention", ctx.correlation_id.clone(), None, async move {
            CommandResult::in_channel(format!("Mention from {user}: {text}"))
        });

        self.queue.enqueue(job)?;
        Ok(HandlerResult::Processed)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::{
        default_dispatcher, route, EventContext, EventDispatcher, EventRouteError,
        HandlerResult, RoutedEvent, SlackEventType,
    };
    use crate::followup::{FollowUpQueue, LoggingSender};

    fn mention_body(bot_id: Option<&str>) -> serde_json::Value {
        json!({
            "type": "event_callback",
            "team_id": "T1",
            "event_id": "Ev01",
            "event": {
                "type": "app_mention",
                "user": "U1",
                "channel": "C1",
                "text": "<@B1> draft a login flow",
                "bot_id": bot_id,
            }
        })
    }

    #[test]
    fn routes_url_verification_as_handshake() {
        let routed = route(&json!({ "type": "url_verification", "challenge": "abc123" }))
            .expect("handshake");

        assert_eq!(routed, RoutedEvent::Handshake { challenge: "abc123".to_owned() });
        assert!(routed.is_handshake());
    }

    #[test]
    fn handshake_without_challenge_is_rejected() {
        assert_eq!(
            route(&json!({ "type": "url_verification" })),
            Err(EventRouteError::MissingChallenge)
        );
        assert_eq!(
            route(&json!({ "type": "url_verification", "challenge": "" })),
            Err(EventRouteError::MissingChallenge)
        );
    }

    #[test]
    fn routes_event_callback_into_envelope() {
        let RoutedEvent::EventCallback(envelope) = route(&mention_body(None)).expect("callback")
        else {
            panic!("expected event callback");
        };

        assert_eq!(envelope.event_id, "Ev01");
        assert_eq!(envelope.team_id, "T1");
        assert_eq!(envelope.event_type, SlackEventType::AppMention);
        assert_eq!(envelope.raw_type, "app_mention");
        assert_eq!(envelope.user_id.as_deref(), Some("U1"));
        assert_eq!(envelope.channel_id.as_deref(), Some("C1"));
        assert!(!envelope.from_bot);
    }

    #[test]
    fn event_callback_requires_event_id_and_event() {
        assert_eq!(
            route(&json!({ "type": "event_callback", "event": { "type": "message" } })),
            Err(EventRouteError::MissingField("event_id"))
        );
        assert_eq!(
            route(&json!({ "type": "event_callback", "event_id": "Ev1" })),
            Err(EventRouteError::MissingField("event"))
        );
    }

    #[test]
    fn unknown_top_level_types_are_unsupported() {
        assert_eq!(
            route(&json!({ "type": "app_rate_limited" })),
            Ok(RoutedEvent::Unsupported { event_type: "app_rate_limited".to_owned() })
        );
        assert_eq!(route(&json!({ "challenge": "x" })), Err(EventRouteError::MissingType));
    }

    #[tokio::test]
    async fn dispatcher_ignores_event_types_without_handler() {
        let dispatcher = EventDispatcher::new();
        let RoutedEvent::EventCallback(envelope) = route(&mention_body(None)).expect("callback")
        else {
            panic!("expected event callback");
        };

        let result = dispatcher.dispatch(&envelope, &EventContext::default()).await;
        assert_eq!(result, Ok(HandlerResult::Ignored));
    }

    #[tokio::test]
    async fn default_dispatcher_processes_mentions_and_skips_bots() {
        let (queue, _worker) = FollowUpQueue::start(4, Arc::new(LoggingSender));
        let dispatcher = default_dispatcher(queue);
        assert_eq!(dispatcher.handler_count(), 1);

        let RoutedEvent::EventCallback(human) = route(&mention_body(None)).expect("callback")
        else {
            panic!("expected event callback");
        };
        let RoutedEvent::EventCallback(bot) = route(&mention_body(Some("B1"))).expect("callback")
        else {
            panic!("expected event callback");
        };

        let ctx = EventContext::default();
        assert_eq!(dispatcher.dispatch(&human, &ctx).await, Ok(HandlerResult::Processed));
        assert_eq!(dispatcher.dispatch(&bot, &ctx).await, Ok(HandlerResult::Ignored));
    }
}
