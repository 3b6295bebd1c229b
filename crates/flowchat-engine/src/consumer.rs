//! Applies a chunk stream to the last message of the history.

use flowchat_api::{Chunk, ChunkStream};
use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::events::{ChatEvent, StreamOutcome};
use crate::history::{Field, History};

/// Drain `stream` into `history` until it closes, fails, or `cancel` fires.
///
/// Cancellation is checked at every chunk boundary and again under the
/// history lock, so once it is requested no further chunk is applied,
/// including chunks the transport already buffered.
pub async fn consume(
    mut stream: ChunkStream,
    history: &History,
    cancel: &CancellationToken,
    mut on_event: impl FnMut(ChatEvent),
) -> StreamOutcome {
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return StreamOutcome::Cancelled,
            next = stream.next() => next,
        };

        match next {
            None => return StreamOutcome::Completed,
            Some(Err(e)) => {
                if cancel.is_cancelled() {
                    return StreamOutcome::Cancelled;
                }
                tracing::warn!("Chat stream failed: {}", e);
                return StreamOutcome::Failed {
                    message: e.to_string(),
                };
            }
            Some(Ok(chunk)) => {
                if let Some(event) = apply_chunk(history, chunk, cancel) {
                    on_event(event);
                }
                if cancel.is_cancelled() {
                    return StreamOutcome::Cancelled;
                }
            }
        }
    }
}

/// Apply one chunk, returning the event it produced.
///
/// Text chunks are dropped without an event when `cancel` has fired or the
/// history is empty.
pub fn apply_chunk(
    history: &History,
    chunk: Chunk,
    cancel: &CancellationToken,
) -> Option<ChatEvent> {
    match chunk {
        Chunk::Content { text } => history
            .append_to_last_unless(cancel, Field::Content, &text)
            .then_some(ChatEvent::ContentDelta { text }),
        Chunk::Thinking { text } => history
            .append_to_last_unless(cancel, Field::Thinking, &text)
            .then_some(ChatEvent::ThinkingDelta { text }),
        Chunk::Conversation { conversation } => {
            if cancel.is_cancelled() {
                return None;
            }
            if let Some(last) = conversation.last() {
                let (thinking, reply) = last.split_thinking();
                tracing::debug!(
                    "Turn ended ({} turns on server, last from {}: {} chars, {} chars thinking)",
                    conversation.len(),
                    last.role.as_str(),
                    reply.len(),
                    thinking.map_or(0, str::len)
                );
            }
            Some(ChatEvent::TurnEnd { conversation })
        }
        Chunk::Unknown { kind } => {
            tracing::warn!("Ignoring chunk of unknown type '{}'", kind);
            None
        }
    }
}
