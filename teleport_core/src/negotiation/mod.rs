//! Peer negotiation seam.
//!
//! The connectivity engine performs offer/answer exchange and connectivity
//! checking on its own internal tasks; this module wraps it behind traits so
//! the orchestrator can be driven against a mock, and re-expresses its
//! callback-style state notifications as a one-shot signal the orchestrator
//! blocks on with a timeout.

mod engine;
mod stats;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::oneshot;

pub use engine::WebRtcEngine;
pub use stats::{EndpointPair, StatsRecord, StatsSnapshot};

/// Result type for negotiation operations.
pub type NegotiationResult<T> = Result<T, NegotiationError>;

/// Errors from the negotiation engine and connectivity checking.
#[derive(Debug, Error)]
pub enum NegotiationError {
    /// Local session, channel, offer or description failure in the engine.
    #[error("negotiation engine: {0}")]
    Engine(String),

    /// The engine reported an explicit failed connectivity state.
    #[error("connectivity check failed")]
    ConnectivityFailed,

    /// No success or failure state arrived within the wait bound.
    #[error("timed out after {0:?} waiting for connectivity")]
    ConnectivityTimeout(Duration),

    /// The session went away before connectivity completed.
    #[error("negotiation session closed before connectivity completed")]
    SessionClosed,

    /// The statistics snapshot contained no nominated candidate pair.
    #[error("no nominated candidate pair in connectivity statistics")]
    NoNominatedPair,

    /// A nominated pair existed but did not resolve to a usable remote.
    #[error("nominated pair resolved to unusable remote endpoint {address:?}:{port}")]
    UnusableEndpoint { address: String, port: u16 },
}

/// Factory for negotiation sessions.
#[async_trait]
pub trait NegotiationEngine: Send + Sync {
    /// Opens a session configured with a single bootstrap connectivity
    /// server. The caller owns the session and must close it on every path.
    async fn open_session(
        &self,
        bootstrap_server: &str,
    ) -> NegotiationResult<Box<dyn NegotiationSession>>;
}

/// One local negotiation session, scoped to a single connection attempt.
#[async_trait]
pub trait NegotiationSession: Send + Sync {
    /// Produces the finalized local offer: creates the offer-forcing data
    /// channel, generates and applies the local description, and waits for
    /// candidate gathering to complete so the returned text is stable.
    async fn create_local_offer(&self) -> NegotiationResult<String>;

    /// Registers a connectivity observer and returns its one-shot watch.
    /// Must be called before [`apply_remote_answer`](Self::apply_remote_answer)
    /// so no state change can fire unobserved.
    async fn watch_connectivity(&self) -> ConnectivityWatch;

    /// Applies the remote answer, starting connectivity checks.
    async fn apply_remote_answer(&self, sdp: String) -> NegotiationResult<()>;

    /// Immutable snapshot of the session's connectivity statistics.
    async fn stats_snapshot(&self) -> StatsSnapshot;

    /// Releases the session's resources.
    async fn close(&self) -> NegotiationResult<()>;
}

/// Creates a linked signal/watch pair for connectivity completion.
///
/// The signal accepts any number of notifications but only the first one is
/// delivered; later ones are dropped rather than queued, so an engine that
/// keeps emitting state changes can never block on a reader that is gone.
pub fn watch_channel() -> (ConnectivitySignal, ConnectivityWatch) {
    let (tx, rx) = oneshot::channel();
    let signal = ConnectivitySignal {
        slot: Arc::new(Mutex::new(Some(tx))),
    };
    (signal, ConnectivityWatch { rx })
}

/// Producer half: single-delivery notification of connectivity outcome.
#[derive(Clone)]
pub struct ConnectivitySignal {
    slot: Arc<Mutex<Option<oneshot::Sender<NegotiationResult<()>>>>>,
}

impl ConnectivitySignal {
    /// Delivers `outcome` if nothing has been delivered yet.
    pub fn notify(&self, outcome: NegotiationResult<()>) {
        if let Some(tx) = self.slot.lock().ok().and_then(|mut slot| slot.take()) {
            let _ = tx.send(outcome);
        }
    }
}

/// Consumer half: blocks until the first notification or the timeout.
pub struct ConnectivityWatch {
    rx: oneshot::Receiver<NegotiationResult<()>>,
}

impl ConnectivityWatch {
    /// Waits for the connectivity outcome, bounded by `timeout`.
    ///
    /// A timeout is reported distinctly from an explicit failed state.
    pub async fn wait(self, timeout: Duration) -> NegotiationResult<()> {
        match tokio::time::timeout(timeout, self.rx).await {
            Err(_) => Err(NegotiationError::ConnectivityTimeout(timeout)),
            Ok(Err(_)) => Err(NegotiationError::SessionClosed),
            Ok(Ok(outcome)) => outcome,
        }
    }
}
