//! Token relay session state machine, one per relay connection.
//!
//! Each request walks
//! `Idle -> AwaitingPrimary -> {StreamingPrimary | AwaitingFallback -> StreamingFallback} -> Idle`
//! and always ends in exactly one terminal event. Once a request falls back,
//! the primary is not tried again for that request.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use glasswire_core::config::BackendsConfig;
use glasswire_core::protocol::{RelayEvent, RelayRequest};
use glasswire_providers::{CompletionBackend, GenerateRequest, StreamingBackend, TokenStream};

use crate::segment::segment;

/// Which relay endpoint a session serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayFlavor {
    /// Plain chat; `token` events carry no model.
    Chat,
    /// Markdown assistant; `token` events name the serving model.
    Markdown,
}

impl RelayFlavor {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::Markdown => "markdown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    AwaitingPrimary,
    StreamingPrimary,
    AwaitingFallback,
    StreamingFallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActiveBackend {
    Primary,
    Fallback,
}

/// Backends and pacing shared by every session.
#[derive(Clone)]
pub struct RelayBackends {
    pub primary: Arc<dyn StreamingBackend>,
    pub secondary: Arc<dyn CompletionBackend>,
    pub fallback_delay: Duration,
    pub chat_system_prompt: String,
    pub markdown_system_prompt: String,
}

impl RelayBackends {
    pub fn new(
        primary: Arc<dyn StreamingBackend>,
        secondary: Arc<dyn CompletionBackend>,
        config: &BackendsConfig,
    ) -> Self {
        Self {
            primary,
            secondary,
            fallback_delay: Duration::from_millis(config.fallback_token_delay_ms),
            chat_system_prompt: config.chat_system_prompt.clone(),
            markdown_system_prompt: config.markdown_system_prompt.clone(),
        }
    }
}

/// The client's event channel is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionClosed;

pub type EventSender = mpsc::UnboundedSender<RelayEvent>;

pub struct RelaySession {
    id: String,
    flavor: RelayFlavor,
    backends: RelayBackends,
    phase: SessionPhase,
    active: Option<ActiveBackend>,
    system_prompt: String,
    prompt: String,
    // Only filled on the fallback path.
    assembled: String,
}

impl RelaySession {
    pub fn new(id: impl Into<String>, flavor: RelayFlavor, backends: RelayBackends) -> Self {
        Self {
            id: id.into(),
            flavor,
            backends,
            phase: SessionPhase::Idle,
            active: None,
            system_prompt: String::new(),
            prompt: String::new(),
            assembled: String::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn flavor(&self) -> RelayFlavor {
        self.flavor
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Backend that served (or is serving) the latest request.
    pub fn active_backend(&self) -> Option<ActiveBackend> {
        self.active
    }

    /// Run one request to its terminal event.
    ///
    /// Backend failures become `error` events and leave the session usable;
    /// only a vanished client ends it.
    pub async fn handle(
        &mut self,
        request: RelayRequest,
        events: &EventSender,
    ) -> Result<(), SessionClosed> {
        self.reset();
        let result = self.run(request, events).await;
        self.phase = SessionPhase::Idle;
        result
    }

    fn reset(&mut self) {
        self.phase = SessionPhase::Idle;
        self.active = None;
        self.system_prompt.clear();
        self.prompt.clear();
        self.assembled.clear();
    }

    async fn run(&mut self, request: RelayRequest, events: &EventSender) -> Result<(), SessionClosed> {
        if request.message.trim().is_empty() {
            debug!(session_id = %self.id, "Rejecting empty prompt");
            return self.emit(events, RelayEvent::error("Message cannot be empty"));
        }

        self.prompt = request.message;
        self.system_prompt = request
            .system_prompt
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| self.default_system_prompt().to_string());

        let generate = GenerateRequest::new(self.system_prompt.clone(), self.prompt.clone());

        self.phase = SessionPhase::AwaitingPrimary;
        self.active = Some(ActiveBackend::Primary);
        match self.backends.primary.stream(&generate).await {
            Ok(stream) => self.stream_primary(stream, events).await,
            Err(e) if e.is_unavailable() => {
                warn!(
                    session_id = %self.id,
                    primary = self.backends.primary.id(),
                    %e,
                    "Primary backend unavailable, falling back"
                );
                #[cfg(feature = "metrics")]
                crate::metrics::record_fallback(self.flavor.as_str());
                self.emit(
                    events,
                    RelayEvent::info(format!(
                        "Primary backend unavailable ({e}); falling back to {}",
                        self.backends.secondary.id()
                    )),
                )?;
                self.run_fallback(&generate, events).await
            }
            Err(e) => self.emit(events, RelayEvent::error(e.to_string())),
        }
    }

    async fn stream_primary(
        &mut self,
        mut stream: TokenStream,
        events: &EventSender,
    ) -> Result<(), SessionClosed> {
        self.phase = SessionPhase::StreamingPrimary;
        self.emit(events, RelayEvent::start("Generating response"))?;

        let model = self.event_model(self.backends.primary.model());
        let mut tokens = 0usize;
        while let Some(item) = stream.next().await {
            match item {
                Ok(chunk) => {
                    tokens += 1;
                    let done = chunk.done;
                    self.emit(
                        events,
                        RelayEvent::Token {
                            content: chunk.content,
                            done,
                            model: model.clone(),
                        },
                    )?;
                    if done {
                        debug!(session_id = %self.id, tokens, "Primary stream complete");
                        return self.emit(events, RelayEvent::complete("Response complete"));
                    }
                }
                Err(e) => {
                    warn!(session_id = %self.id, %e, "Primary stream failed mid-response");
                    return self.emit(events, RelayEvent::error(e.to_string()));
                }
            }
        }

        // Stream closed without the backend's done marker; close it off.
        warn!(session_id = %self.id, tokens, "Primary stream ended without done signal");
        self.emit(
            events,
            RelayEvent::Token {
                content: String::new(),
                done: true,
                model,
            },
        )?;
        self.emit(events, RelayEvent::complete("Response complete"))
    }

    async fn run_fallback(
        &mut self,
        generate: &GenerateRequest,
        events: &EventSender,
    ) -> Result<(), SessionClosed> {
        self.phase = SessionPhase::AwaitingFallback;
        self.active = Some(ActiveBackend::Fallback);

        let text = match self.backends.secondary.complete(generate).await {
            Ok(text) => text,
            Err(e) => {
                warn!(session_id = %self.id, %e, "Fallback backend failed");
                return self.emit(events, RelayEvent::error(e.to_string()));
            }
        };
        self.assembled = text;

        self.phase = SessionPhase::StreamingFallback;
        self.emit(events, RelayEvent::start("Generating response"))?;

        let model = self.event_model(self.backends.secondary.model());
        let fragments: Vec<String> = segment(&self.assembled)
            .into_iter()
            .map(str::to_string)
            .collect();
        info!(session_id = %self.id, fragments = fragments.len(), "Replaying fallback response");

        if fragments.is_empty() {
            self.emit(
                events,
                RelayEvent::Token {
                    content: String::new(),
                    done: true,
                    model: model.clone(),
                },
            )?;
        }

        let last = fragments.len().saturating_sub(1);
        for (i, fragment) in fragments.into_iter().enumerate() {
            self.emit(
                events,
                RelayEvent::Token {
                    content: fragment,
                    done: i == last,
                    model: model.clone(),
                },
            )?;
            if i != last && !self.backends.fallback_delay.is_zero() {
                tokio::time::sleep(self.backends.fallback_delay).await;
            }
        }

        self.emit(events, RelayEvent::complete("Response complete"))
    }

    fn default_system_prompt(&self) -> &str {
        match self.flavor {
            RelayFlavor::Chat => &self.backends.chat_system_prompt,
            RelayFlavor::Markdown => &self.backends.markdown_system_prompt,
        }
    }

    fn event_model(&self, model: &str) -> Option<String> {
        match self.flavor {
            RelayFlavor::Chat => None,
            RelayFlavor::Markdown => Some(model.to_string()),
        }
    }

    fn emit(&self, events: &EventSender, event: RelayEvent) -> Result<(), SessionClosed> {
        events.send(event).map_err(|_| {
            debug!(session_id = %self.id, "Client gone, dropping relay events");
            SessionClosed
        })
    }
}
