//! Boundaries to the services the webhook core hands work to.
//!
//! - [`DocumentStore`] - typed record storage with server-assigned ids and creation timestamps
//! - [`CompletionStream`] - submit a message list, receive incrementally produced text
//!
//! The in-memory implementations back local development and tests.

use std::{collections::HashMap, fmt, sync::Arc};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentId(pub String);

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub collection: String,
    pub created_at: DateTime<Utc>,
    pub fields: Map<String, Value>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("collection name must not be empty")]
    EmptyCollection,
    #[error("document store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn insert(
        &self,
        collection: &str,
        fields: Map<String, Value>,
    ) -> Result<DocumentId, StoreError>;

    async fn get(&self, collection: &str, id: &DocumentId) -> Result<Option<Document>, StoreError>;

    /// Documents whose `field` equals `value`, oldest first.
    async fn query_by_index(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> Result<Vec<Document>, StoreError>;
}

#[derive(Clone, Default)]
pub struct InMemoryDocumentStore {
    collections: Arc<RwLock<HashMap<String, Vec<Document>>>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self, collection: &str) -> usize {
        self.collections.read().await.get(collection).map(Vec::len).unwrap_or(0)
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn insert(
        &self,
        collection: &str,
        fields: Map<String, Value>,
    ) -> Result<DocumentId, StoreError> {
        if collection.trim().is_empty() {
            return Err(StoreError::EmptyCollection);
        }

        let id = DocumentId(Uuid::new_v4().simple().to_string());
        let document = Document {
            id: id.clone(),
            collection: collection.to_owned(),
            created_at: Utc::now(),
            fields,
        };

        self.collections.write().await.entry(collection.to_owned()).or_default().push(document);
        Ok(id)
    }

    async fn get(&self, collection: &str, id: &DocumentId) -> Result<Option<Document>, StoreError> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .and_then(|documents| documents.iter().find(|document| &document.id == id))
            .cloned())
    }

    async fn query_by_index(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> Result<Vec<Document>, StoreError> {
        let collections = self.collections.read().await;
        let Some(documents) = collections.get(collection) else {
            return Ok(Vec::new());
        };

        Ok(documents
            .iter()
            .filter(|document| document.fields.get(field) == Some(value))
            .cloned()
            .collect())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: ChatRole::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: ChatRole::User, content: content.into() }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CompletionError {
    #[error("completion request rejected: {0}")]
    Rejected(String),
    #[error("completion stream interrupted: {0}")]
    Interrupted(String),
}

pub type CompletionChunks = mpsc::Receiver<Result<String, CompletionError>>;

#[async_trait]
pub trait CompletionStream: Send + Sync {
    async fn submit(&self, messages: Vec<ChatMessage>) -> Result<CompletionChunks, CompletionError>;
}

/// Drains a completion stream into one string, failing on the first error chunk.
pub async fn collect_completion(mut chunks: CompletionChunks) -> Result<String, CompletionError> {
    let mut output = String::new();
    while let Some(chunk) = chunks.recv().await {
        output.push_str(&chunk?);
    }
    Ok(output)
}

/// Emits a fixed outline built from the last user message, one line per chunk.
#[derive(Clone, Copy, Debug, Default)]
pub struct ScriptedCompletion;

#[async_trait]
impl CompletionStream for ScriptedCompletion {
    async fn submit(
        &self,
        messages: Vec<ChatMessage>,
    ) -> Result<CompletionChunks, CompletionError> {
        let request = messages
            .iter()
            .rev()
            .find(|message| message.role == ChatRole::User)
            .map(|message| message.content.clone())
            .ok_or_else(|| CompletionError::Rejected("no user message supplied".to_owned()))?;

        let lines = [
            format!("# Specification: {request}\n"),
            "## Purpose\n".to_owned(),
            format!("Describe what `{request}` must accomplish and for whom.\n"),
            "## Requirements\n".to_owned(),
            "- Inputs, outputs, and error cases\n".to_owned(),
            "## Open Questions\n".to_owned(),
            "- Constraints not yet agreed\n".to_owned(),
        ];

        let (sender, receiver) = mpsc::channel(lines.len());
        for line in lines {
            // capacity equals the line count, so this never waits
            if sender.send(Ok(line)).await.is_err() {
                break;
            }
        }
        Ok(receiver)
    }
}
