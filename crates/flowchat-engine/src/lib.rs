//! flowchat-engine: conversation state for a streaming chat client
//!
//! This crate holds the message history, the context blocks attached to the
//! next message, and the logic that streams a response into the history
//! while the user edits, retries or cancels.

pub mod consumer;
pub mod contexts;
pub mod controller;
pub mod error;
pub mod events;
pub mod handle;
pub mod history;
pub mod session;
pub mod transport;

pub use contexts::{AttachAction, ContextBlock, ContextContent, ContextSet};
pub use controller::{Controller, EditState, RemoveOutcome, RetryOutcome};
pub use error::{Error, Result};
pub use events::{ChatEvent, Notice, NoticeLevel, Notifier, StreamOutcome};
pub use handle::{StreamHandle, StreamTicket};
pub use history::{Field, History, Message, Sender, Snapshot};
pub use session::{ChatSession, SendOutcome, SessionConfig};
pub use transport::{HttpTransport, RetryConfig, Transport};
