//! # Connection state of a remote bus.
//!
//! ```text
//! Disconnected ──► Connecting ──► Ready ◄──► Publishing
//!                      ▲            ▲ └───► Consuming
//!                      │            │
//!                      └── Faulted ◄┴── any transport error
//! shutdown() ──► Disconnected
//! ```
//!
//! `Publishing` and `Consuming` are entered only from `Ready` and only return to
//! `Ready`; they are activity markers, not separate connection phases.

use std::fmt;

use tokio::sync::watch;
use tracing::debug;

/// Observable connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Not connected (before connect, after shutdown).
    Disconnected,
    /// Establishing the connection, declaring and binding.
    Connecting,
    /// Connected and idle.
    Ready,
    /// A publish is in flight.
    Publishing,
    /// A delivered message is being dispatched.
    Consuming,
    /// A transport error occurred; reconnection is pending.
    Faulted,
}

impl ConnectionState {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Ready => "ready",
            ConnectionState::Publishing => "publishing",
            ConnectionState::Consuming => "consuming",
            ConnectionState::Faulted => "faulted",
        }
    }

    /// True while the connection is usable.
    pub fn is_connected(&self) -> bool {
        matches!(
            self,
            ConnectionState::Ready | ConnectionState::Publishing | ConnectionState::Consuming
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_label())
    }
}

/// Holder of the current state, with the transition rules applied.
pub(crate) struct StateCell {
    tx: watch::Sender<ConnectionState>,
}

impl StateCell {
    pub(crate) fn new() -> Self {
        let (tx, _) = watch::channel(ConnectionState::Disconnected);
        Self { tx }
    }

    pub(crate) fn get(&self) -> ConnectionState {
        *self.tx.borrow()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.tx.subscribe()
    }

    /// Unconditional transition.
    pub(crate) fn set(&self, next: ConnectionState) {
        let prev = self.tx.send_replace(next);
        if prev != next {
            debug!(from = %prev, to = %next, "connection state changed");
        }
    }

    /// `Ready` → `activity`. Returns `false` (and changes nothing) from any other state.
    pub(crate) fn begin(&self, activity: ConnectionState) -> bool {
        self.tx.send_if_modified(|state| {
            if *state == ConnectionState::Ready {
                *state = activity;
                true
            } else {
                false
            }
        })
    }

    /// `activity` → `Ready`, unless something else happened meanwhile.
    pub(crate) fn end(&self, activity: ConnectionState) {
        self.tx.send_if_modified(|state| {
            if *state == activity {
                *state = ConnectionState::Ready;
                true
            } else {
                false
            }
        });
    }

    /// Any live state → `Faulted`. No effect once disconnected or already faulted.
    pub(crate) fn fault(&self) -> bool {
        self.tx.send_if_modified(|state| match state {
            ConnectionState::Disconnected | ConnectionState::Faulted => false,
            _ => {
                *state = ConnectionState::Faulted;
                true
            }
        })
    }
}
