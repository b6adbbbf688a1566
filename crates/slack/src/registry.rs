use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use thiserror::Error;

use crate::{commands::ParsedCommand, dispatch::CommandResult};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandContext {
    pub correlation_id: String,
}

impl Default for CommandContext {
    fn default() -> Self {
        Self { correlation_id: "unknown-correlation-id".to_owned() }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum HandlerError {
    #[error("command handler failed: {0}")]
    Failed(String),
    #[error("could not hand off deferred work: {0}")]
    Deferral(String),
}

#[async_trait]
pub trait CommandHandler: Send + Sync {
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    fn requires_argument(&self) -> bool {
        false
    }

    fn usage(&self) -> String {
        format!("/{}", self.name())
    }

    async fn handle(
        &self,
        command: &ParsedCommand,
        ctx: &CommandContext,
    ) -> Result<CommandResult, HandlerError>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandUsage {
    pub name: String,
    pub usage: String,
    pub description: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("command `/{0}` is already registered")]
    DuplicateCommand(String),
    #[error("command names must be non-empty lowercase words without a leading slash: `{0}`")]
    InvalidName(String),
}

#[derive(Default)]
pub struct RegistryBuilder {
    handlers: HashMap<String, Arc<dyn CommandHandler>>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<H>(&mut self, handler: H) -> Result<&mut Self, RegistryError>
    where
        H: CommandHandler + 'static,
    {
        self.register_shared(Arc::new(handler))
    }

    pub fn register_shared(
        &mut self,
        handler: Arc<dyn CommandHandler>,
    ) -> Result<&mut Self, RegistryError> {
        let name = handler.name();
        if !is_valid_name(name) {
            return Err(RegistryError::InvalidName(name.to_owned()));
        }
        if self.handlers.contains_key(name) {
            return Err(RegistryError::DuplicateCommand(name.to_owned()));
        }

        self.handlers.insert(name.to_owned(), handler);
        Ok(self)
    }

    pub fn usages(&self) -> Vec<CommandUsage> {
        collect_usages(&self.handlers)
    }

    pub fn build(self) -> HandlerRegistry {
        HandlerRegistry { handlers: self.handlers }
    }
}

/// Command name to handler table. Immutable once built; share it behind an `Arc`.
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn CommandHandler>>,
}

impl HandlerRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn CommandHandler>> {
        self.handlers.get(name)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn command_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn usages(&self) -> Vec<CommandUsage> {
        collect_usages(&self.handlers)
    }
}

fn collect_usages(handlers: &HashMap<String, Arc<dyn CommandHandler>>) -> Vec<CommandUsage> {
    let mut usages: Vec<CommandUsage> = handlers
        .values()
        .map(|handler| CommandUsage {
            name: handler.name().to_owned(),
            usage: handler.usage(),
            description: handler.description().to_owned(),
        })
        .collect();
    usages.sort_by(|left, right| left.name.cmp(&right.name));
    usages
}

fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name.bytes().all(|byte| {
            byte.is_ascii_lowercase() || byte.is_ascii_digit() || matches!(byte, b'-' | b'_')
        })
}
