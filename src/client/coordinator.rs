//! Single-flight credential renewal.
//!
//! One `RefreshCoordinator` belongs to one client session. The first caller
//! that needs a renewal becomes the leader and runs it; callers that arrive
//! while it is in flight park until it settles and then share its outcome.
//! State lives behind a mutex, so callers may run on any thread.

use axum::http::StatusCode;
use std::future::Future;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// Default bound on a single renewal call.
pub const DEFAULT_RENEWAL_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshPhase {
    Idle,
    Refreshing,
}

/// Why a renewal did not produce a fresh credential pair.
///
/// Every variant ends the session: callers should send the user back to login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshError {
    /// The server refused the refresh credential.
    Rejected(String),
    /// The refresh endpoint answered with an unexpected status.
    Unexpected(StatusCode),
    /// The refresh call never reached the server.
    Transport(String),
    /// The refresh call did not settle in time.
    Timeout(Duration),
    /// The renewal was abandoned before it settled.
    Cancelled,
}

impl std::fmt::Display for RefreshError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RefreshError::Rejected(msg) => write!(f, "Refresh rejected: {}", msg),
            RefreshError::Unexpected(status) => {
                write!(f, "Refresh failed with status {}", status)
            }
            RefreshError::Transport(msg) => write!(f, "Refresh request failed: {}", msg),
            RefreshError::Timeout(d) => write!(f, "Refresh timed out after {:?}", d),
            RefreshError::Cancelled => write!(f, "Refresh was cancelled"),
        }
    }
}

impl std::error::Error for RefreshError {}

type Outcome = Result<(), RefreshError>;

struct RefreshState {
    phase: RefreshPhase,
    pending: Vec<oneshot::Sender<Outcome>>,
    /// Number of renewals settled so far.
    generation: u64,
    last_outcome: Option<Outcome>,
}

pub struct RefreshCoordinator {
    state: Mutex<RefreshState>,
    timeout: Duration,
}

impl Default for RefreshCoordinator {
    fn default() -> Self {
        Self::new(DEFAULT_RENEWAL_TIMEOUT)
    }
}

/// What a caller does after inspecting the state.
enum Turn {
    Lead,
    Wait(oneshot::Receiver<Outcome>),
    Reuse(Outcome),
}

impl RefreshCoordinator {
    pub fn new(timeout: Duration) -> Self {
        Self {
            state: Mutex::new(RefreshState {
                phase: RefreshPhase::Idle,
                pending: Vec::new(),
                generation: 0,
                last_outcome: None,
            }),
            timeout,
        }
    }

    fn lock(&self) -> MutexGuard<'_, RefreshState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn phase(&self) -> RefreshPhase {
        self.lock().phase
    }

    /// Number of callers parked behind the in-flight renewal.
    pub fn pending_len(&self) -> usize {
        self.lock().pending.len()
    }

    /// Read this before sending a request, and hand it back to `renew` if the
    /// request fails. A renewal that settled in between is reused.
    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    /// Start a new session. A request sent before this point that fails later
    /// runs a renewal of its own instead of reusing an earlier outcome.
    pub fn begin_session(&self) {
        let mut state = self.lock();
        state.generation += 1;
        state.last_outcome = None;
    }

    /// Renew the credential pair, or join the renewal already in flight.
    ///
    /// `renew` runs only if this caller becomes the leader. It is bounded by
    /// the coordinator's timeout.
    pub async fn renew<F, Fut>(&self, observed_generation: u64, renew: F) -> Outcome
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Outcome>,
    {
        let turn = {
            let mut state = self.lock();
            let settled_since = if state.generation != observed_generation {
                state.last_outcome.clone()
            } else {
                None
            };
            match (settled_since, state.phase) {
                (Some(outcome), _) => Turn::Reuse(outcome),
                (None, RefreshPhase::Idle) => {
                    state.phase = RefreshPhase::Refreshing;
                    Turn::Lead
                }
                (None, RefreshPhase::Refreshing) => {
                    let (tx, rx) = oneshot::channel();
                    state.pending.push(tx);
                    Turn::Wait(rx)
                }
            }
        };

        match turn {
            Turn::Reuse(outcome) => {
                debug!("Reusing outcome of a renewal that settled after the request was sent");
                outcome
            }
            Turn::Wait(rx) => rx.await.unwrap_or(Err(RefreshError::Cancelled)),
            Turn::Lead => {
                let guard = SettleGuard { coordinator: self };
                let outcome = match tokio::time::timeout(self.timeout, renew()).await {
                    Ok(outcome) => outcome,
                    Err(_) => {
                        warn!(timeout = ?self.timeout, "Credential renewal timed out");
                        Err(RefreshError::Timeout(self.timeout))
                    }
                };
                guard.settle(outcome.clone());
                outcome
            }
        }
    }

    /// Return to `Idle` and hand the outcome to every parked caller.
    fn settle(&self, outcome: Outcome) {
        let pending = {
            let mut state = self.lock();
            state.phase = RefreshPhase::Idle;
            state.generation += 1;
            state.last_outcome = Some(outcome.clone());
            std::mem::take(&mut state.pending)
        };

        debug!(waiters = pending.len(), ok = outcome.is_ok(), "Renewal settled");
        for tx in pending {
            // A parked caller that was itself dropped no longer needs the result.
            let _ = tx.send(outcome.clone());
        }
    }
}

/// Settles the renewal with `Cancelled` if the leader is dropped mid-flight.
struct SettleGuard<'a> {
    coordinator: &'a RefreshCoordinator,
}

impl SettleGuard<'_> {
    fn settle(self, outcome: Outcome) {
        let coordinator = self.coordinator;
        std::mem::forget(self);
        coordinator.settle(outcome);
    }
}

impl Drop for SettleGuard<'_> {
    fn drop(&mut self) {
        self.coordinator.settle(Err(RefreshError::Cancelled));
    }
}
