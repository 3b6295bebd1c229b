//! Conversation history with copy-on-write snapshots.
//!
//! Every mutation produces a new generation. Readers hold [`Snapshot`]s, which
//! are never changed after publication, so a renderer can read while a stream
//! appends to the last message.

use std::ops::Deref;
use std::sync::Arc;

use flowchat_api::{ConversationTurn, Role};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

/// Author of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Assistant,
}

impl Sender {
    pub fn role(&self) -> Role {
        match self {
            Sender::User => Role::User,
            Sender::Assistant => Role::Assistant,
        }
    }
}

/// Text field of a message that streaming and editing act on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Field {
    Content,
    Thinking,
}

/// One entry of the conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: u64,
    pub content: String,
    pub thinking: String,
    pub sender: Sender,
    /// Local wall-clock time of creation, e.g. `3:07 PM`
    pub timestamp: String,
}

impl Message {
    fn new(id: u64, sender: Sender, content: String, timestamp: String) -> Self {
        Self {
            id,
            content,
            thinking: String::new(),
            sender,
            timestamp,
        }
    }

    /// Read one text field
    pub fn field(&self, field: Field) -> &str {
        match field {
            Field::Content => &self.content,
            Field::Thinking => &self.thinking,
        }
    }

    fn field_mut(&mut self, field: Field) -> &mut String {
        match field {
            Field::Content => &mut self.content,
            Field::Thinking => &mut self.thinking,
        }
    }

    /// The message as a prior turn for the server
    pub fn to_turn(&self) -> ConversationTurn {
        ConversationTurn::new(self.sender.role(), &self.content, &self.thinking)
    }
}

/// A user message and the assistant placeholder appended with it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exchange {
    pub user: Message,
    pub assistant: Message,
}

/// An immutable view of the history at one generation
#[derive(Debug, Clone)]
pub struct Snapshot {
    generation: u64,
    messages: Arc<Vec<Message>>,
}

impl Snapshot {
    /// Mutation counter; increases by one per applied change
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Prior turns in the shape `/api/chat` expects
    pub fn to_conversation(&self) -> Vec<ConversationTurn> {
        self.messages.iter().map(Message::to_turn).collect()
    }
}

impl Deref for Snapshot {
    type Target = [Message];

    fn deref(&self) -> &[Message] {
        &self.messages
    }
}

struct State {
    messages: Arc<Vec<Message>>,
    generation: u64,
    next_id: u64,
}

struct Shared {
    state: Mutex<State>,
    updates: watch::Sender<Snapshot>,
}

/// Shared, cloneable handle to the conversation history.
#[derive(Clone)]
pub struct History {
    shared: Arc<Shared>,
}

impl Default for History {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for History {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("History")
            .field("len", &state.messages.len())
            .field("generation", &state.generation)
            .finish()
    }
}

impl History {
    /// Create an empty history
    pub fn new() -> Self {
        let messages = Arc::new(Vec::new());
        let (updates, _) = watch::channel(Snapshot {
            generation: 0,
            messages: Arc::clone(&messages),
        });
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    messages,
                    generation: 0,
                    next_id: 1,
                }),
                updates,
            }),
        }
    }

    /// The current snapshot
    pub fn snapshot(&self) -> Snapshot {
        let state = self.shared.state.lock();
        Snapshot {
            generation: state.generation,
            messages: Arc::clone(&state.messages),
        }
    }

    /// Receive a snapshot after every change
    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.shared.updates.subscribe()
    }

    pub fn len(&self) -> usize {
        self.shared.state.lock().messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append a user message and an empty assistant placeholder together.
    ///
    /// Returns `None` without touching the history when `text` is blank.
    pub fn append_exchange(&self, text: &str) -> Option<Exchange> {
        if text.trim().is_empty() {
            return None;
        }

        let timestamp = chrono::Local::now().format("%-I:%M %p").to_string();
        let exchange = self.mutate(|messages, next_id| {
            let user = Message::new(*next_id, Sender::User, text.to_string(), timestamp.clone());
            let assistant =
                Message::new(*next_id + 1, Sender::Assistant, String::new(), timestamp);
            *next_id += 2;
            messages.push(user.clone());
            messages.push(assistant.clone());
            Exchange { user, assistant }
        });
        Some(exchange)
    }

    /// Concatenate `text` onto a field of the last message.
    ///
    /// Returns `false` when the history is empty; a chunk arriving after the
    /// last entry was removed is dropped.
    pub fn append_to_last(&self, field: Field, text: &str) -> bool {
        let mut state = self.shared.state.lock();
        self.push_to_last(&mut state, field, text)
    }

    /// Like [`append_to_last`](Self::append_to_last), but drops the text when
    /// `cancel` has fired.
    ///
    /// The token is checked while the history is locked. Callers that cancel
    /// before mutating the history can never see this text land on a message
    /// that became last through their own removal.
    pub fn append_to_last_unless(
        &self,
        cancel: &CancellationToken,
        field: Field,
        text: &str,
    ) -> bool {
        let mut state = self.shared.state.lock();
        if cancel.is_cancelled() {
            return false;
        }
        self.push_to_last(&mut state, field, text)
    }

    fn push_to_last(&self, state: &mut State, field: Field, text: &str) -> bool {
        let mut messages = Vec::clone(&state.messages);
        let Some(last) = messages.last_mut() else {
            return false;
        };
        last.field_mut(field).push_str(text);
        let next_id = state.next_id;
        self.publish(state, messages, next_id);
        true
    }

    /// Replace one field of the message at `idx`
    pub fn set_field(&self, idx: usize, field: Field, value: impl Into<String>) -> Result<()> {
        let value = value.into();
        self.try_mutate(|messages, _| {
            let len = messages.len();
            let message = messages
                .get_mut(idx)
                .ok_or(Error::IndexOutOfRange { index: idx, len })?;
            *message.field_mut(field) = value;
            Ok(())
        })
    }

    /// Remove the message at `idx`
    pub fn remove_at(&self, idx: usize) -> Result<Message> {
        self.try_mutate(|messages, _| {
            if idx >= messages.len() {
                return Err(Error::IndexOutOfRange {
                    index: idx,
                    len: messages.len(),
                });
            }
            Ok(messages.remove(idx))
        })
    }

    /// Remove up to `count` messages starting at `idx`
    pub fn remove_range(&self, idx: usize, count: usize) -> Result<Vec<Message>> {
        self.try_mutate(|messages, _| {
            if idx >= messages.len() {
                return Err(Error::IndexOutOfRange {
                    index: idx,
                    len: messages.len(),
                });
            }
            let end = idx.saturating_add(count).min(messages.len());
            Ok(messages.drain(idx..end).collect())
        })
    }

    fn mutate<R>(&self, f: impl FnOnce(&mut Vec<Message>, &mut u64) -> R) -> R {
        let mut state = self.shared.state.lock();
        let mut messages = Vec::clone(&state.messages);
        let mut next_id = state.next_id;
        let result = f(&mut messages, &mut next_id);
        self.publish(&mut state, messages, next_id);
        result
    }

    /// Like `mutate`, but an error leaves the current generation in place.
    fn try_mutate<R>(
        &self,
        f: impl FnOnce(&mut Vec<Message>, &mut u64) -> Result<R>,
    ) -> Result<R> {
        let mut state = self.shared.state.lock();
        let mut messages = Vec::clone(&state.messages);
        let mut next_id = state.next_id;
        let result = f(&mut messages, &mut next_id)?;
        self.publish(&mut state, messages, next_id);
        Ok(result)
    }

    fn publish(&self, state: &mut State, messages: Vec<Message>, next_id: u64) {
        state.messages = Arc::new(messages);
        state.next_id = next_id;
        state.generation += 1;
        self.shared.updates.send_replace(Snapshot {
            generation: state.generation,
            messages: Arc::clone(&state.messages),
        });
    }
}
