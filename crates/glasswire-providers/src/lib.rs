//! Text generation backends.
//!
//! The relay talks to two kinds of backend: a [`StreamingBackend`] that
//! yields tokens as they are generated (tried first), and a
//! [`CompletionBackend`] that returns the whole reply in one call (the
//! fallback). Both ship with Ollama implementations in [`ollama`].

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod ndjson;
pub mod ollama;

/// A prompt plus the system instruction it runs under.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub system: String,
    pub prompt: String,
}

impl GenerateRequest {
    pub fn new(system: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            prompt: prompt.into(),
        }
    }

    /// `[system, user]` chat message list.
    pub fn messages(&self) -> Vec<ChatMessage> {
        vec![
            ChatMessage {
                role: "system".into(),
                content: self.system.clone(),
            },
            ChatMessage {
                role: "user".into(),
                content: self.prompt.clone(),
            },
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

/// One incremental unit from a streaming backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenChunk {
    pub content: String,
    /// Set on the backend's own end-of-response signal.
    pub done: bool,
}

pub type TokenStream = Pin<Box<dyn Stream<Item = Result<TokenChunk, BackendError>> + Send>>;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Backend unreachable: {0}")]
    Unreachable(String),

    #[error("Backend returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed backend response: {0}")]
    Malformed(String),

    #[error("Backend stream error: {0}")]
    Stream(String),
}

impl BackendError {
    /// The backend could not serve the request at all (connect failure or
    /// non-success status). This is what triggers fallback.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unreachable(_) | Self::Status { .. })
    }
}

/// Natively streaming generation transport.
#[async_trait]
pub trait StreamingBackend: Send + Sync {
    /// Backend identifier for logs.
    fn id(&self) -> &str;

    /// Model served by this backend.
    fn model(&self) -> &str;

    /// Open a token stream. Errors here mean nothing was generated.
    async fn stream(&self, request: &GenerateRequest) -> Result<TokenStream, BackendError>;
}

/// Blocking generation transport returning the complete reply.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    fn id(&self) -> &str;

    fn model(&self) -> &str;

    async fn complete(&self, request: &GenerateRequest) -> Result<String, BackendError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_are_system_then_user() {
        let req = GenerateRequest::new("You are terse.", "hello");
        let messages = req.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, "system");
        assert_eq!(messages[0].content, "You are terse.");
        assert_eq!(messages[1].role, "user");
        assert_eq!(messages[1].content, "hello");
    }

    #[test]
    fn test_unavailable_classification() {
        assert!(BackendError::Unreachable("refused".into()).is_unavailable());
        assert!(
            BackendError::Status {
                status: 503,
                body: String::new()
            }
            .is_unavailable()
        );
        assert!(!BackendError::Malformed("x".into()).is_unavailable());
        assert!(!BackendError::Stream("reset".into()).is_unavailable());
    }
}
