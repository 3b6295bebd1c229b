//! Cancellation handle for the in-flight response stream.

use parking_lot::Mutex;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Ticket for one stream registered on a [`StreamHandle`]
#[derive(Debug, Clone)]
pub struct StreamTicket {
    id: u64,
    token: CancellationToken,
}

impl StreamTicket {
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

#[derive(Default)]
struct Slot {
    live: Option<StreamTicket>,
    next_id: u64,
}

/// A cloneable handle to the stream currently being consumed, if any.
///
/// All clones share one slot, so a controller can cancel a stream that a
/// spawned consumer task is draining.
#[derive(Clone, Default)]
pub struct StreamHandle {
    slot: Arc<Mutex<Slot>>,
}

impl StreamHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new live stream and return its ticket.
    ///
    /// A stream still registered is cancelled first.
    pub fn begin(&self) -> StreamTicket {
        let mut slot = self.slot.lock();
        if let Some(previous) = slot.live.take() {
            tracing::warn!("Starting a stream while another is live; cancelling the old one");
            previous.token.cancel();
        }
        slot.next_id += 1;
        let ticket = StreamTicket {
            id: slot.next_id,
            token: CancellationToken::new(),
        };
        slot.live = Some(ticket.clone());
        ticket
    }

    /// Cancel the live stream. Returns `false` if the handle was idle.
    pub fn cancel(&self) -> bool {
        match self.slot.lock().live.take() {
            Some(ticket) => {
                ticket.token.cancel();
                tracing::debug!("Cancelled stream {}", ticket.id);
                true
            }
            None => false,
        }
    }

    /// Return to idle once the stream behind `ticket` has ended.
    ///
    /// Returns `false` and leaves the handle alone if a newer stream has
    /// been registered since `ticket` was issued.
    pub fn finish(&self, ticket: &StreamTicket) -> bool {
        let mut slot = self.slot.lock();
        if slot.next_id != ticket.id {
            return false;
        }
        slot.live = None;
        true
    }

    /// Whether a stream is currently live
    pub fn is_live(&self) -> bool {
        self.slot.lock().live.is_some()
    }
}
