pub mod collaborators;
pub mod config;
pub mod errors;

pub use collaborators::{
    ChatMessage, ChatRole, CompletionError, CompletionStream, Document, DocumentId, DocumentStore,
    InMemoryDocumentStore, ScriptedCompletion, StoreError,
};
pub use errors::{AuthenticationFailure, Disposition, WebhookError};
