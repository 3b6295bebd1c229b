//! User-driven edit, retry and remove actions.

use parking_lot::Mutex;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::handle::StreamHandle;
use crate::history::{Field, History, Message, Sender};

/// The single in-progress edit of one message field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditState {
    pub idx: usize,
    pub mode: Field,
    pub value: String,
}

/// What a remove request did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoveOutcome {
    /// A stream was live, so it was cancelled instead of deleting anything
    CancelledStream,
    /// The message was deleted
    Removed(Message),
}

/// Result of a retry request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryOutcome {
    /// Text to put back into the compose box
    pub text: String,
    /// Messages removed; empty unless the trailing exchange was retried
    pub removed: Vec<Message>,
    /// Whether a live stream was cancelled first
    pub cancelled_stream: bool,
}

/// Coordinates edits, retries and removals against the history and the
/// live stream.
#[derive(Clone)]
pub struct Controller {
    history: History,
    stream: StreamHandle,
    edit: Arc<Mutex<Option<EditState>>>,
}

impl Controller {
    pub fn new(history: History, stream: StreamHandle) -> Self {
        Self {
            history,
            stream,
            edit: Arc::new(Mutex::new(None)),
        }
    }

    /// The edit in progress, if any
    pub fn edit_state(&self) -> Option<EditState> {
        self.edit.lock().clone()
    }

    /// Start editing a field, replacing any edit already in progress.
    pub fn begin_edit(&self, idx: usize, mode: Field) -> Result<()> {
        let snapshot = self.history.snapshot();
        let message = snapshot.get(idx).ok_or(Error::IndexOutOfRange {
            index: idx,
            len: snapshot.len(),
        })?;
        *self.edit.lock() = Some(EditState {
            idx,
            mode,
            value: message.field(mode).to_string(),
        });
        Ok(())
    }

    /// Replace the buffered value of the edit in progress
    pub fn set_edit_value(&self, value: impl Into<String>) -> Result<()> {
        match self.edit.lock().as_mut() {
            Some(edit) => {
                edit.value = value.into();
                Ok(())
            }
            None => Err(Error::NoActiveEdit),
        }
    }

    /// Write the buffered value back into the history and end the edit.
    pub fn commit_edit(&self) -> Result<()> {
        let edit = self.edit.lock().take().ok_or(Error::NoActiveEdit)?;
        self.history.set_field(edit.idx, edit.mode, edit.value)
    }

    /// Discard the edit in progress. Returns `false` if there was none.
    pub fn cancel_edit(&self) -> bool {
        self.edit.lock().take().is_some()
    }

    /// Retry the user message at `idx`.
    ///
    /// When it belongs to the trailing exchange, any live stream is cancelled
    /// and the exchange removed. The text is returned either way.
    pub fn retry(&self, idx: usize) -> Result<RetryOutcome> {
        let snapshot = self.history.snapshot();
        let message = snapshot.get(idx).ok_or(Error::IndexOutOfRange {
            index: idx,
            len: snapshot.len(),
        })?;
        if message.sender != Sender::User {
            return Err(Error::NotAUserMessage(idx));
        }
        let text = message.content.clone();

        if idx + 2 < snapshot.len() {
            return Ok(RetryOutcome {
                text,
                removed: Vec::new(),
                cancelled_stream: false,
            });
        }

        let cancelled_stream = self.stream.cancel();
        let removed = self.history.remove_range(idx, 2)?;
        self.shift_edit(idx, removed.len());
        tracing::debug!("Retrying message {} ({} removed)", idx, removed.len());

        Ok(RetryOutcome {
            text,
            removed,
            cancelled_stream,
        })
    }

    /// Remove the message at `idx`, or cancel the live stream if there is one.
    pub fn remove(&self, idx: usize) -> Result<RemoveOutcome> {
        if self.stream.cancel() {
            return Ok(RemoveOutcome::CancelledStream);
        }
        let removed = self.history.remove_at(idx)?;
        self.shift_edit(idx, 1);
        Ok(RemoveOutcome::Removed(removed))
    }

    /// Keep the edit pointing at the same message after `count` entries at
    /// `idx` were removed; drop it if its message went away.
    fn shift_edit(&self, idx: usize, count: usize) {
        let mut edit = self.edit.lock();
        match edit.as_mut() {
            Some(e) if e.idx >= idx && e.idx < idx + count => *edit = None,
            Some(e) if e.idx >= idx + count => e.idx -= count,
            _ => {}
        }
    }
}
