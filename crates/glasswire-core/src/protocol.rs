//! Client-visible relay protocol.
//!
//! Relay clients send one [`RelayRequest`] per prompt and receive a sequence
//! of [`RelayEvent`]s, one JSON object per WebSocket text frame:
//! at most one `start`, zero or more `token`, then exactly one terminal
//! `complete` or `error`, which is always the last event. An `error` may come
//! without any `start`, as for an empty prompt or a failed fallback. `info`
//! may appear anywhere before the terminal event and is never terminal.

use serde::{Deserialize, Serialize};

/// Client -> server prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayRequest {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

/// Server -> client event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RelayEvent {
    Start {
        message: String,
    },
    Token {
        content: String,
        done: bool,
        /// Only set on the markdown relay flavor.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        model: Option<String>,
    },
    Complete {
        message: String,
    },
    Error {
        message: String,
    },
    Info {
        message: String,
    },
}

impl RelayEvent {
    pub fn start(message: impl Into<String>) -> Self {
        Self::Start {
            message: message.into(),
        }
    }

    pub fn complete(message: impl Into<String>) -> Self {
        Self::Complete {
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::Info {
            message: message.into(),
        }
    }

    /// `complete` and `error` end a request.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete { .. } | Self::Error { .. })
    }
}

/// One entry of the static model roster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelEntry {
    pub id: String,
    pub name: String,
    pub description: String,
}

/// Response of the model roster query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelRoster {
    pub models: Vec<ModelEntry>,
    pub current_model: String,
}

impl ModelRoster {
    /// Single-entry roster describing the backing model.
    pub fn single(model: &str) -> Self {
        Self {
            models: vec![ModelEntry {
                id: model.to_string(),
                name: display_name(model),
                description: format!("Local {model} served through Ollama"),
            }],
            current_model: model.to_string(),
        }
    }
}

/// `granite3.3:8b` -> `Granite3.3 (8b)`.
fn display_name(model: &str) -> String {
    let (family, tag) = model.split_once(':').unwrap_or((model, ""));
    let mut chars = family.chars();
    let family = match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
        None => String::new(),
    };
    if tag.is_empty() {
        family
    } else {
        format!("{family} ({tag})")
    }
}
