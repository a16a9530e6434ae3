//! Transport event stream.
//!
//! The event stream is the only channel through which a transport talks to
//! the engine. All transport-internal activity emits through one
//! [`EventSink`], which serializes emission and closes the stream exactly
//! once.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;

use super::error::TransportError;
use crate::core::Player;
use crate::sync::GameState;

/// Events flowing out of a transport.
#[derive(Debug)]
pub enum TransportEvent {
    /// A (possibly partial) roster was observed.
    RosterObserved {
        /// Player count declared by the leader (0 = unknown).
        declared: usize,
        /// Players in roster order.
        players: Vec<Player>,
    },
    /// A peer transmitted a game state.
    StateChanged(GameState),
    /// Contact with a player was lost.
    PlayerLost(Player),
    /// A chat message arrived (or was echoed locally).
    ChatReceived(String),
    /// The transport hit an error.
    Error {
        /// What went wrong.
        error: TransportError,
        /// Whether the session cannot continue.
        fatal: bool,
    },
}

/// Shared emitting end of an event stream.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: Arc<Mutex<Option<mpsc::UnboundedSender<TransportEvent>>>>,
}

impl EventSink {
    /// Create a connected sink and stream.
    pub fn channel() -> (Self, EventStream) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = Self {
            tx: Arc::new(Mutex::new(Some(tx))),
        };
        (sink, EventStream { rx })
    }

    /// Emit an event. Returns false if the stream is already closed.
    pub fn emit(&self, event: TransportEvent) -> bool {
        let guard = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        match guard.as_ref() {
            Some(tx) => tx.send(event).is_ok(),
            None => {
                tracing::trace!(?event, "event dropped after close");
                false
            }
        }
    }

    /// Emit an error event.
    pub fn error(&self, error: TransportError, fatal: bool) -> bool {
        self.emit(TransportEvent::Error { error, fatal })
    }

    /// Close the stream. Returns true only for the call that closed it.
    pub fn close(&self) -> bool {
        let mut guard = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        guard.take().is_some()
    }

    /// Whether the stream has been closed.
    pub fn is_closed(&self) -> bool {
        self.tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}

/// Receiving end of a transport's events.
#[derive(Debug)]
pub struct EventStream {
    rx: mpsc::UnboundedReceiver<TransportEvent>,
}

impl EventStream {
    /// Receive the next event.
    ///
    /// Returns `None` once the transport has shut down and every event
    /// emitted before that has been delivered.
    pub async fn next(&mut self) -> Option<TransportEvent> {
        self.rx.recv().await
    }
}
