//! Ollama backends.
//!
//! [`OllamaChat`] streams from `/api/chat` (NDJSON, one record per token
//! batch). [`OllamaGenerate`] calls `/api/generate` with streaming off and
//! returns the whole reply.

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use glasswire_core::config::BackendConfig;

use crate::ndjson::parse_ndjson_stream;
use crate::{
    BackendError, ChatMessage, CompletionBackend, GenerateRequest, StreamingBackend, TokenChunk,
    TokenStream,
};

// --- Wire types ---

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    stream: bool,
}

/// One NDJSON record of a streamed `/api/chat` reply.
#[derive(Debug, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    message: Option<ChunkMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkMessage {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Serialize)]
struct GenerateBody<'a> {
    model: &'a str,
    prompt: &'a str,
    system: &'a str,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

fn base_url(config: &BackendConfig) -> String {
    config.base_url.trim_end_matches('/').to_string()
}

async fn post_json<B: Serialize>(
    client: &reqwest::Client,
    url: &str,
    body: &B,
) -> Result<reqwest::Response, BackendError> {
    let response = client
        .post(url)
        .json(body)
        .send()
        .await
        .map_err(|e| BackendError::Unreachable(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(BackendError::Status {
            status: status.as_u16(),
            body,
        });
    }
    Ok(response)
}

/// Streaming chat backend.
pub struct OllamaChat {
    base_url: String,
    model: String,
    client: reqwest::Client,
}

impl OllamaChat {
    pub fn new(config: &BackendConfig) -> Self {
        Self {
            base_url: base_url(config),
            model: config.model.clone(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl StreamingBackend for OllamaChat {
    fn id(&self) -> &str {
        "ollama-chat"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn stream(&self, request: &GenerateRequest) -> Result<TokenStream, BackendError> {
        let url = format!("{}/api/chat", self.base_url);
        debug!(%url, model = %self.model, "Opening chat stream");

        let body = ChatRequest {
            model: &self.model,
            messages: request.messages(),
            stream: true,
        };
        let response = post_json(&self.client, &url, &body).await?;

        let chunks = parse_ndjson_stream::<_, _, ChatChunk>(response.bytes_stream()).map(|item| {
            let chunk = item?;
            if let Some(error) = chunk.error {
                return Err(BackendError::Stream(error));
            }
            let content = chunk.message.unwrap_or_default().content;
            trace!(len = content.len(), done = chunk.done, "Chat chunk");
            Ok(TokenChunk {
                content,
                done: chunk.done,
            })
        });

        Ok(Box::pin(chunks))
    }
}

/// Non-streaming generate backend.
pub struct OllamaGenerate {
    base_url: String,
    model: String,
    client: reqwest::Client,
}

impl OllamaGenerate {
    pub fn new(config: &BackendConfig) -> Self {
        Self {
            base_url: base_url(config),
            model: config.model.clone(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl CompletionBackend for OllamaGenerate {
    fn id(&self) -> &str {
        "ollama-generate"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: &GenerateRequest) -> Result<String, BackendError> {
        let url = format!("{}/api/generate", self.base_url);
        debug!(%url, model = %self.model, "Requesting full completion");

        let body = GenerateBody {
            model: &self.model,
            prompt: &request.prompt,
            system: &request.system,
            stream: false,
        };
        let response = post_json(&self.client, &url, &body).await?;
        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| BackendError::Malformed(e.to_string()))?;
        Ok(parsed.response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trims_slash() {
        let config = BackendConfig {
            base_url: "http://localhost:11434/".into(),
            model: "granite3.3:8b".into(),
        };
        let chat = OllamaChat::new(&config);
        assert_eq!(chat.base_url, "http://localhost:11434");
        assert_eq!(chat.model(), "granite3.3:8b");
    }

    #[test]
    fn test_chat_request_shape() {
        let req = GenerateRequest::new("sys", "hi");
        let body = ChatRequest {
            model: "m",
            messages: req.messages(),
            stream: true,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["stream"], true);
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "hi");
    }

    #[test]
    fn test_chat_chunk_tolerates_missing_fields() {
        let chunk: ChatChunk = serde_json::from_str(r#"{"done":true}"#).unwrap();
        assert!(chunk.done);
        assert!(chunk.message.is_none());

        let chunk: ChatChunk =
            serde_json::from_str(r#"{"model":"m","message":{"role":"assistant","content":"Hi"},"done":false}"#)
                .unwrap();
        assert_eq!(chunk.message.unwrap().content, "Hi");
    }
}
