//! Chat session: wires history, attachments, the live stream and the
//! controller to a transport.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use flowchat_api::{AgentCreateRequest, AgentCreated, ChatRequest};
use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};

use crate::consumer::consume;
use crate::contexts::{AttachAction, ContextContent, ContextSet};
use crate::controller::{Controller, EditState, RemoveOutcome, RetryOutcome};
use crate::error::Result;
use crate::events::{ChatEvent, Notice, Notifier, StreamOutcome, log_notifier};
use crate::handle::{StreamHandle, StreamTicket};
use crate::history::{Field, History, Snapshot};
use crate::transport::Transport;

/// Session-level settings
#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    /// Model requested per message; `None` lets the server decide
    pub model: Option<String>,
    /// Drop all context blocks once a message has been sent
    pub clear_contexts_after_send: bool,
    /// Drop all context blocks after an agent was created
    pub clear_contexts_after_agent_create: bool,
}

/// How a send ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Blank input; nothing was appended or sent
    Rejected,
    /// The stream could not be opened; the placeholder stays empty
    OpenFailed { message: String },
    Completed,
    Cancelled,
    /// The stream broke midway; partial content stays
    Failed { message: String },
}

impl From<StreamOutcome> for SendOutcome {
    fn from(outcome: StreamOutcome) -> Self {
        match outcome {
            StreamOutcome::Completed => SendOutcome::Completed,
            StreamOutcome::Cancelled => SendOutcome::Cancelled,
            StreamOutcome::Failed { message } => SendOutcome::Failed { message },
        }
    }
}

/// A single conversation with the chat server.
///
/// Cheap to clone; every clone drives the same state, so one task can await
/// [`ChatSession::send`] while another cancels, retries or edits.
#[derive(Clone)]
pub struct ChatSession {
    history: History,
    contexts: Arc<Mutex<ContextSet>>,
    controller: Controller,
    stream: StreamHandle,
    transport: Arc<dyn Transport>,
    notifier: Notifier,
    events: broadcast::Sender<ChatEvent>,
    scroll_lock: Arc<AtomicBool>,
    config: Arc<Mutex<SessionConfig>>,
}

impl ChatSession {
    pub fn new(transport: Arc<dyn Transport>, config: SessionConfig) -> Self {
        let history = History::new();
        let stream = StreamHandle::new();
        let (events, _) = broadcast::channel(256);
        Self {
            controller: Controller::new(history.clone(), stream.clone()),
            history,
            contexts: Arc::new(Mutex::new(ContextSet::new())),
            stream,
            transport,
            notifier: log_notifier(),
            events,
            scroll_lock: Arc::new(AtomicBool::new(false)),
            config: Arc::new(Mutex::new(config)),
        }
    }

    /// Deliver user-visible failures and confirmations to `notifier`
    pub fn with_notifier(mut self, notifier: Notifier) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn snapshot(&self) -> Snapshot {
        self.history.snapshot()
    }

    /// Watch history snapshots
    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.history.subscribe()
    }

    /// Subscribe to streaming events
    pub fn events(&self) -> broadcast::Receiver<ChatEvent> {
        self.events.subscribe()
    }

    pub fn is_streaming(&self) -> bool {
        self.stream.is_live()
    }

    /// Whether the view should follow streamed content
    pub fn scroll_locked(&self) -> bool {
        self.scroll_lock.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> SessionConfig {
        self.config.lock().clone()
    }

    /// Model requested by subsequent sends
    pub fn set_model(&self, model: Option<String>) {
        self.config.lock().model = model;
    }

    fn emit(&self, event: ChatEvent) {
        // No receivers is fine
        let _ = self.events.send(event);
    }

    fn notify(&self, notice: Notice) {
        (self.notifier)(notice);
    }

    /// Send a user message and stream the reply into the history.
    ///
    /// Resolves when the stream ends. Blank input is rejected without a
    /// network call.
    pub async fn send(&self, text: &str) -> SendOutcome {
        if text.trim().is_empty() {
            tracing::debug!("Ignoring blank message");
            return SendOutcome::Rejected;
        }

        // Prior turns only; the new question travels separately
        let request = ChatRequest {
            question: text.to_string(),
            conversation: self.history.snapshot().to_conversation(),
            model: self.config.lock().model.clone(),
            contexts: self.contexts.lock().to_payload(),
        };

        let ticket = self.stream.begin();
        let Some(exchange) = self.history.append_exchange(text) else {
            self.stream.finish(&ticket);
            return SendOutcome::Rejected;
        };
        let assistant_id = exchange.assistant.id;
        self.scroll_lock.store(true, Ordering::SeqCst);
        self.emit(ChatEvent::ExchangeStart {
            user_id: exchange.user.id,
            assistant_id,
        });

        // Opening may sit in retry backoff; a cancel must not wait it out
        let opened = tokio::select! {
            biased;
            _ = ticket.token().cancelled() => None,
            opened = self.transport.open_chat(&request) => Some(opened),
        };
        let chunks = match opened {
            Some(Ok(chunks)) => chunks,
            Some(Err(e)) if !ticket.is_cancelled() => {
                let message = e.to_string();
                tracing::warn!("Failed to open chat stream: {}", message);
                self.notify(Notice::error(message.clone()));
                let outcome = StreamOutcome::Failed {
                    message: message.clone(),
                };
                self.end_stream(&ticket, assistant_id, outcome);
                return SendOutcome::OpenFailed { message };
            }
            _ => {
                tracing::debug!("Send cancelled while opening the stream");
                self.end_stream(&ticket, assistant_id, StreamOutcome::Cancelled);
                return SendOutcome::Cancelled;
            }
        };

        if self.config.lock().clear_contexts_after_send {
            self.contexts.lock().clear();
        }

        let scroll_lock = &self.scroll_lock;
        let events = &self.events;
        let outcome = consume(chunks, &self.history, ticket.token(), |event| {
            if matches!(event, ChatEvent::TurnEnd { .. }) {
                scroll_lock.store(false, Ordering::SeqCst);
            }
            let _ = events.send(event);
        })
        .await;

        if let StreamOutcome::Failed { message } = &outcome {
            self.notify(Notice::error(message.clone()));
        }
        self.end_stream(&ticket, assistant_id, outcome.clone());
        outcome.into()
    }

    /// Release the handle and report the end of the stream behind `ticket`.
    ///
    /// The scroll lock belongs to whichever exchange streams now, so it is
    /// only released when no newer send has started.
    fn end_stream(&self, ticket: &StreamTicket, assistant_id: u64, outcome: StreamOutcome) {
        if self.stream.finish(ticket) {
            self.scroll_lock.store(false, Ordering::SeqCst);
        }
        self.emit(ChatEvent::StreamEnd {
            assistant_id,
            outcome,
        });
    }

    /// Cancel the live stream. Returns `false` if nothing was streaming.
    pub fn cancel(&self) -> bool {
        self.stream.cancel()
    }

    pub fn retry(&self, idx: usize) -> Result<RetryOutcome> {
        self.controller.retry(idx)
    }

    pub fn remove(&self, idx: usize) -> Result<RemoveOutcome> {
        self.controller.remove(idx)
    }

    pub fn begin_edit(&self, idx: usize, mode: Field) -> Result<()> {
        self.controller.begin_edit(idx, mode)
    }

    pub fn set_edit_value(&self, value: impl Into<String>) -> Result<()> {
        self.controller.set_edit_value(value)
    }

    pub fn commit_edit(&self) -> Result<()> {
        self.controller.commit_edit()
    }

    pub fn cancel_edit(&self) -> bool {
        self.controller.cancel_edit()
    }

    pub fn edit_state(&self) -> Option<EditState> {
        self.controller.edit_state()
    }

    /// Copy of the current context blocks
    pub fn contexts(&self) -> ContextSet {
        self.contexts.lock().clone()
    }

    pub fn attach(&self) -> AttachAction {
        self.contexts.lock().attach()
    }

    pub fn upload(&self, content: ContextContent) -> usize {
        self.contexts.lock().upload(content)
    }

    pub fn rename_context(&self, idx: usize, name: impl Into<String>) -> Result<()> {
        self.contexts.lock().rename(idx, name)
    }

    pub fn set_context_text(&self, idx: usize, text: impl Into<String>) -> Result<()> {
        self.contexts.lock().set_text(idx, text)
    }

    pub fn append_context_text(&self, idx: usize, text: &str) -> Result<()> {
        self.contexts.lock().append_text(idx, text)
    }

    pub fn remove_context(&self, idx: usize) -> Result<()> {
        self.contexts.lock().remove(idx).map(|_| ())
    }

    pub fn clear_contexts(&self) {
        self.contexts.lock().clear();
    }

    /// Register an agent from the current conversation and contexts.
    pub async fn create_agent(&self) -> Result<AgentCreated> {
        let request = AgentCreateRequest {
            conversation: self.history.snapshot().to_conversation(),
            contexts: self.contexts.lock().to_payload(),
        };

        match self.transport.create_agent(&request).await {
            Ok(created) => {
                self.notify(Notice::success(format!(
                    "Agent created successfully! {}",
                    created.agent_uid
                )));
                if self.config.lock().clear_contexts_after_agent_create {
                    self.contexts.lock().clear();
                }
                Ok(created)
            }
            Err(e) => {
                self.notify(Notice::error(e.to_string()));
                Err(e.into())
            }
        }
    }
}
