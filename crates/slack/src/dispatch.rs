use std::{sync::Arc, time::Duration};

use serde::{Deserialize, Serialize};
use specbridge_core::WebhookError;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::{
    commands::ParsedCommand,
    followup::{DeferredJob, FollowUpQueue},
    registry::{CommandContext, CommandHandler, HandlerError, HandlerRegistry},
};

pub const DEFAULT_RESPONSE_DEADLINE: Duration = Duration::from_millis(2_500);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseVisibility {
    /// Visible only to the invoking user.
    Ephemeral,
    /// Visible to everyone in the originating channel.
    InChannel,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResult {
    pub response_type: ResponseVisibility,
    pub text: String,
}

impl CommandResult {
    pub fn ephemeral(text: impl Into<String>) -> Self {
        Self { response_type: ResponseVisibility::Ephemeral, text: text.into() }
    }

    pub fn in_channel(text: impl Into<String>) -> Self {
        Self { response_type: ResponseVisibility::InChannel, text: text.into() }
    }

    /// Ephemeral rendering of an error that still answers with HTTP 200.
    pub fn from_error(error: &WebhookError) -> Self {
        Self::ephemeral(error.public_message())
    }
}

type HandlerTask = JoinHandle<Result<CommandResult, HandlerError>>;

pub struct CommandDispatcher {
    registry: Arc<HandlerRegistry>,
    response_deadline: Duration,
    late_results: Option<FollowUpQueue>,
}

impl CommandDispatcher {
    pub fn new(registry: Arc<HandlerRegistry>) -> Self {
        Self { registry, response_deadline: DEFAULT_RESPONSE_DEADLINE, late_results: None }
    }

    pub fn with_response_deadline(mut self, response_deadline: Duration) -> Self {
        self.response_deadline = response_deadline;
        self
    }

    /// Handlers that overrun the deadline keep running; their result is posted to the
    /// command's `response_url` through `queue`. Without a queue they are cancelled.
    pub fn with_follow_up_queue(mut self, queue: FollowUpQueue) -> Self {
        self.late_results = Some(queue);
        self
    }

    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }

    /// Always yields a result; unknown commands, missing arguments, handler failures and
    /// handlers that overrun the deadline all become ephemeral responses.
    pub async fn dispatch(&self, command: &ParsedCommand, ctx: &CommandContext) -> CommandResult {
        let handler = match self.resolve(command) {
            Ok(handler) => handler,
            Err(error) => {
                info!(
                    event_name = "slack.command.rejected",
                    correlation_id = %ctx.correlation_id,
                    command = %command.name,
                    channel_id = %command.channel_id,
                    error_class = error.error_class(),
                    "command rejected before handler invocation"
                );
                return CommandResult::from_error(&error);
            }
        };

        let mut task: HandlerTask = {
            let handler = Arc::clone(handler);
            let command = command.clone();
            let ctx = ctx.clone();
            tokio::spawn(async move { handler.handle(&command, &ctx).await })
        };

        match tokio::time::timeout(self.response_deadline, &mut task).await {
            Ok(Ok(Ok(result))) => {
                info!(
                    event_name = "slack.command.handled",
                    correlation_id = %ctx.correlation_id,
                    command = %command.name,
                    channel_id = %command.channel_id,
                    response_type = ?result.response_type,
                    "command handled"
                );
                result
            }
            Ok(Ok(Err(error))) => {
                warn!(
                    event_name = "slack.command.failed",
                    correlation_id = %ctx.correlation_id,
                    command = %command.name,
                    channel_id = %command.channel_id,
                    error = %error,
                    "command handler failed"
                );
                failure_reply(&command.display_name())
            }
            Ok(Err(join_error)) => {
                warn!(
                    event_name = "slack.command.failed",
                    correlation_id = %ctx.correlation_id,
                    command = %command.name,
                    channel_id = %command.channel_id,
                    error = %join_error,
                    "command handler task did not complete"
                );
                failure_reply(&command.display_name())
            }
            Err(_) => self.defer_overrun(task, command, ctx),
        }
    }

    fn defer_overrun(
        &self,
        task: HandlerTask,
        command: &ParsedCommand,
        ctx: &CommandContext,
    ) -> CommandResult {
        warn!(
            event_name = "slack.command.deadline_exceeded",
            correlation_id = %ctx.correlation_id,
            command = %command.name,
            channel_id = %command.channel_id,
            deadline_ms = self.response_deadline.as_millis() as u64,
            "command handler exceeded the response deadline"
        );

        let display_name = command.display_name();
        let abort = task.abort_handle();
        let queued = match (&self.late_results, &command.response_url) {
            (Some(queue), Some(response_url)) => {
                let job = DeferredJob::new(
                    format!("late:{}", command.name),
                    ctx.correlation_id.clone(),
                    Some(response_url.clone()),
                    late_result(task, display_name.clone(), ctx.correlation_id.clone()),
                );
                queue.enqueue(job).map_err(|error| error.to_string())
            }
            (None, _) => Err("no follow-up queue configured".to_owned()),
            (Some(_), None) => Err("command carried no response_url".to_owned()),
        };

        match queued {
            Ok(()) => CommandResult::ephemeral(format!(
                "Still working on `{display_name}`. Results will follow when ready."
            )),
            Err(reason) => {
                abort.abort();
                warn!(
                    event_name = "slack.command.overrun_cancelled",
                    correlation_id = %ctx.correlation_id,
                    command = %command.name,
                    reason = %reason,
                    "overrunning command cancelled because its result cannot be followed up"
                );
                CommandResult::ephemeral(format!(
                    "`{display_name}` is taking too long. Please try again in a moment."
                ))
            }
        }
    }

    fn resolve(&self, command: &ParsedCommand) -> Result<&Arc<dyn CommandHandler>, WebhookError> {
        let handler = self
            .registry
            .get(&command.name)
            .ok_or_else(|| WebhookError::UnknownCommand(command.name.clone()))?;

        if handler.requires_argument() && !command.has_argument() {
            return Err(WebhookError::Validation {
                command: command.name.clone(),
                usage: usage_hint(handler.as_ref()),
            });
        }

        Ok(handler)
    }
}

async fn late_result(
    task: HandlerTask,
    display_name: String,
    correlation_id: String,
) -> CommandResult {
    match task.await {
        Ok(Ok(result)) => result,
        Ok(Err(error)) => {
            warn!(
                event_name = "slack.command.failed",
                correlation_id = %correlation_id,
                command = %display_name,
                error = %error,
                "command handler failed after the response deadline"
            );
            failure_reply(&display_name)
        }
        Err(join_error) => {
            warn!(
                event_name = "slack.command.failed",
                correlation_id = %correlation_id,
                command = %display_name,
                error = %join_error,
                "command handler task did not complete"
            );
            failure_reply(&display_name)
        }
    }
}

fn failure_reply(display_name: &str) -> CommandResult {
    CommandResult::ephemeral(format!(
        "Sorry, `{display_name}` failed. Please try again in a moment."
    ))
}

fn usage_hint(handler: &dyn CommandHandler) -> String {
    format!(
        "Please provide a description after `/{}`. Usage: `{}`",
        handler.name(),
        handler.usage()
    )
}
