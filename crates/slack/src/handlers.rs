use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use specbridge_core::{
    collaborators::collect_completion, ChatMessage, CompletionError, CompletionStream,
    DocumentStore, StoreError,
};
use thiserror::Error;
use tracing::{info, warn};

use crate::{
    commands::{sanitize_argument, ParsedCommand},
    dispatch::CommandResult,
    followup::{DeferredJob, FollowUpQueue},
    registry::{
        CommandContext, CommandHandler, CommandUsage, HandlerError, HandlerRegistry,
        RegistryError,
    },
};

pub const DOCUMENTS_COLLECTION: &str = "documents";

const SPECIFY_SYSTEM_PROMPT: &str = "You write concise software specifications. Answer with a \
    markdown outline: purpose, requirements, and open questions.";

#[derive(Debug, Error)]
enum DraftError {
    #[error(transparent)]
    Completion(#[from] CompletionError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// `/specify <text>`: acknowledges at once and drafts the specification on the
/// follow-up queue.
pub struct SpecifyHandler {
    queue: FollowUpQueue,
    store: Arc<dyn DocumentStore>,
    completion: Arc<dyn CompletionStream>,
}

impl SpecifyHandler {
    pub fn new(
        queue: FollowUpQueue,
        store: Arc<dyn DocumentStore>,
        completion: Arc<dyn CompletionStream>,
    ) -> Self {
        Self { queue, store, completion }
    }
}

#[async_trait]
impl CommandHandler for SpecifyHandler {
    fn name(&self) -> &'static str {
        "specify"
    }

    fn description(&self) -> &'static str {
        "Draft a specification from a one-line request"
    }

    fn requires_argument(&self) -> bool {
        true
    }

    fn usage(&self) -> String {
        "/specify <what you want specified>".to_owned()
    }

    async fn handle(
        &self,
        command: &ParsedCommand,
        ctx: &CommandContext,
    ) -> Result<CommandResult, HandlerError> {
        let request = sanitize_argument(&command.argument);
        if request.is_empty() {
            return Ok(CommandResult::ephemeral(format!(
                "Please provide a description after `/specify`. Usage: `{}`",
                self.usage()
            )));
        }

        let store = Arc::clone(&self.store);
        let completion = Arc::clone(&self.completion);
        let correlation_id = ctx.correlation_id.clone();
        let draft_request = request.clone();
        let user_id = command.user_id.clone();
        let channel_id = command.channel_id.clone();

        let job = DeferredJob::new(
            "specify",
            ctx.correlation_id.clone(),
            command.response_url.clone(),
            async move {
                match draft_specification(
                    store.as_ref(),
                    completion.as_ref(),
                    &draft_request,
                    &user_id,
                    &channel_id,
                )
                .await
                {
                    Ok(draft) => CommandResult::in_channel(draft),
                    Err(error) => {
                        warn!(
                            event_name = "slack.specify.draft_failed",
                            correlation_id = %correlation_id,
                            error = %error,
                            "specification draft failed"
                        );
                        CommandResult::ephemeral(format!(
                            "Sorry, I could not draft a specification for \"{draft_request}\"."
                        ))
                    }
                }
            },
        );

        self.queue.enqueue(job).map_err(|error| HandlerError::Deferral(error.to_string()))?;

        Ok(CommandResult::in_channel(format!("Processing your request to specify: \"{request}\"")))
    }
}

async fn draft_specification(
    store: &dyn DocumentStore,
    completion: &dyn CompletionStream,
    request: &str,
    user_id: &str,
    channel_id: &str,
) -> Result<String, DraftError> {
    let chunks = completion
        .submit(vec![ChatMessage::system(SPECIFY_SYSTEM_PROMPT), ChatMessage::user(request)])
        .await?;
    let draft = collect_completion(chunks).await?;

    let mut fields = Map::new();
    fields.insert("request".to_owned(), Value::String(request.to_owned()));
    fields.insert("content".to_owned(), Value::String(draft.clone()));
    fields.insert("user_id".to_owned(), Value::String(user_id.to_owned()));
    fields.insert("channel_id".to_owned(), Value::String(channel_id.to_owned()));
    let id = store.insert(DOCUMENTS_COLLECTION, fields).await?;

    info!(
        event_name = "slack.specify.draft_stored",
        document_id = %id,
        channel_id = %channel_id,
        "specification draft stored"
    );
    Ok(draft)
}

/// `/help`: lists every registered command.
pub struct HelpHandler {
    usages: Vec<CommandUsage>,
}

impl HelpHandler {
    pub fn new(mut usages: Vec<CommandUsage>) -> Self {
        usages.push(CommandUsage {
            name: "help".to_owned(),
            usage: "/help".to_owned(),
            description: "List available commands".to_owned(),
        });
        usages.sort_by(|left, right| left.name.cmp(&right.name));
        usages.dedup_by(|left, right| left.name == right.name);
        Self { usages }
    }
}

#[async_trait]
impl CommandHandler for HelpHandler {
    fn name(&self) -> &'static str {
        "help"
    }

    fn description(&self) -> &'static str {
        "List available commands"
    }

    async fn handle(
        &self,
        _command: &ParsedCommand,
        _ctx: &CommandContext,
    ) -> Result<CommandResult, HandlerError> {
        let mut text = String::from("Available commands:");
        for usage in &self.usages {
            text.push_str(&format!("\n• `{}` {}", usage.usage, usage.description));
        }
        Ok(CommandResult::ephemeral(text))
    }
}

pub fn default_registry(
    queue: FollowUpQueue,
    store: Arc<dyn DocumentStore>,
    completion: Arc<dyn CompletionStream>,
) -> Result<HandlerRegistry, RegistryError> {
    let mut builder = HandlerRegistry::builder();
    builder.register(SpecifyHandler::new(queue, store, completion))?;

    let usages = builder.usages();
    builder.register(HelpHandler::new(usages))?;
    Ok(builder.build())
}
