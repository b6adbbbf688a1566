//! Slack webhook boundary for specbridge
//!
//! This crate turns raw inbound webhook requests into command and event dispatch:
//! - **Signature** (`signature`) - `v0` HMAC-SHA256 verification with a replay window
//! - **Events** (`events`) - URL verification handshake and `event_callback` routing
//! - **Commands** (`commands`) - form-encoded slash command parsing
//! - **Dispatch** (`registry`, `dispatch`) - handler table and deadline-bounded dispatch
//! - **Follow-up** (`followup`) - deferred work posted to `response_url`
//!
//! # Architecture
//!
//! ```text
//! HTTP route → WebhookPipeline ─ handshake? → { challenge }
//!                  │
//!                  ├─ SignatureVerifier → 401 / 500
//!                  ├─ ReplayGuard (retries)
//!                  ├─ commands::parse → CommandDispatcher → HandlerRegistry
//!                  └─ events::route → EventDispatcher
//!                                       ↓
//!                              FollowUpQueue → response_url
//! ```

pub mod commands;
pub mod dispatch;
pub mod events;
pub mod followup;
pub mod handlers;
pub mod pipeline;
pub mod registry;
pub mod replay;
pub mod request;
pub mod signature;

pub use dispatch::{CommandDispatcher, CommandResult, ResponseVisibility};
pub use pipeline::{WebhookPipeline, WebhookReply};
pub use request::InboundWebhookRequest;
pub use signature::{SignatureVerifier, SigningSecret};
