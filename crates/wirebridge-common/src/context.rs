//! Call context: cancellation, deadline and per-call metadata.
//!
//! A [`Context`] is cheap to clone. Deriving a context (`with_cancel`,
//! `with_timeout`, `with_transport`) never affects the parent: cancelling a
//! child leaves the parent running, cancelling a parent cancels every child.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::protocol::error::BridgeError;
use crate::selector::PeerSlot;
use crate::transport::metadata::Transport;

#[derive(Debug, Clone, Copy)]
struct Deadline {
    at: Instant,
    budget: Duration,
}

#[derive(Debug, Clone, Default)]
pub struct Context {
    token: CancellationToken,
    deadline: Option<Deadline>,
    transport: Option<Arc<Transport>>,
    peer: Option<PeerSlot>,
}

impl Context {
    /// Root context: never cancelled unless [`cancel`](Self::cancel) is called.
    pub fn background() -> Self {
        Self::default()
    }

    /// Child context with its own cancellation.
    pub fn with_cancel(&self) -> Self {
        Self {
            token: self.token.child_token(),
            ..self.clone()
        }
    }

    /// Child context that also expires after `timeout`. An earlier deadline
    /// inherited from the parent is kept. A timeout too large to represent
    /// adds no deadline.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let Some(at) = Instant::now().checked_add(timeout) else {
            return self.with_cancel();
        };
        let candidate = Deadline {
            at,
            budget: timeout,
        };
        let deadline = match self.deadline {
            Some(existing) if existing.at <= candidate.at => existing,
            _ => candidate,
        };
        Self {
            token: self.token.child_token(),
            deadline: Some(deadline),
            ..self.clone()
        }
    }

    pub fn with_transport(&self, transport: Arc<Transport>) -> Self {
        Self {
            transport: Some(transport),
            ..self.clone()
        }
    }

    pub fn with_peer(&self, peer: PeerSlot) -> Self {
        Self {
            peer: Some(peer),
            ..self.clone()
        }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline.map(|d| d.at)
    }

    pub fn transport(&self) -> Option<&Arc<Transport>> {
        self.transport.as_ref()
    }

    pub fn peer(&self) -> Option<&PeerSlot> {
        self.peer.as_ref()
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.token
    }

    /// Why the context is done, or `None` while it is still live.
    pub fn err(&self) -> Option<BridgeError> {
        if self.token.is_cancelled() {
            return Some(BridgeError::Canceled);
        }
        match self.deadline {
            Some(d) if Instant::now() >= d.at => Some(timeout_error(d)),
            _ => None,
        }
    }

    /// Resolves once the context is cancelled or its deadline passes, with the
    /// matching error.
    pub async fn done(&self) -> BridgeError {
        match self.deadline {
            Some(d) => {
                tokio::select! {
                    _ = self.token.cancelled() => BridgeError::Canceled,
                    _ = tokio::time::sleep_until(d.at) => timeout_error(d),
                }
            }
            None => {
                self.token.cancelled().await;
                BridgeError::Canceled
            }
        }
    }
}

fn timeout_error(deadline: Deadline) -> BridgeError {
    BridgeError::Timeout(deadline.budget.as_millis() as u64)
}
