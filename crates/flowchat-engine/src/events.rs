//! Session events and user-facing notices

use std::sync::Arc;

use flowchat_api::ConversationTurn;
use serde::{Deserialize, Serialize};

/// How a stream consumption ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StreamOutcome {
    /// The byte stream closed normally
    Completed,
    /// The user cancelled; chunks applied before that point stay
    Cancelled,
    /// Decode or transport failure; partial content stays
    Failed { message: String },
}

/// Events emitted while a session sends and streams
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    /// A user message and its placeholder were appended
    ExchangeStart { user_id: u64, assistant_id: u64 },

    /// Reasoning text appended to the last message
    ThinkingDelta { text: String },

    /// Answer text appended to the last message
    ContentDelta { text: String },

    /// The server marked the end of the turn
    TurnEnd { conversation: Vec<ConversationTurn> },

    /// Consumption of the reply into `assistant_id` stopped.
    ///
    /// A cancelled stream can end after the next exchange has started.
    StreamEnd {
        assistant_id: u64,
        outcome: StreamOutcome,
    },
}

/// Severity of a notice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Error,
    Success,
}

/// A message meant for the user, like a toast
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Success,
            message: message.into(),
        }
    }
}

/// Callback receiving every user-visible failure or confirmation
pub type Notifier = Arc<dyn Fn(Notice) + Send + Sync>;

/// A notifier that only logs
pub fn log_notifier() -> Notifier {
    Arc::new(|notice: Notice| match notice.level {
        NoticeLevel::Error => tracing::warn!("{}", notice.message),
        NoticeLevel::Success => tracing::info!("{}", notice.message),
    })
}
