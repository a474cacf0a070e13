//! Singleflight gate around the credential refresher.
//!
//! The gate is either idle or holds one in-flight refresh. Every caller that
//! asks for a refresh while one is running gets a handle to that same
//! attempt. The attempt runs on its own task, so it completes (and the gate
//! returns to idle) even if every handle is dropped.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use parking_lot::Mutex;

use crate::refresher::{RefreshOutcome, RefreshTrigger, SharedRefresher};

type InFlight = Shared<BoxFuture<'static, RefreshOutcome>>;

/// Handle to a refresh attempt; resolves once that attempt settles.
#[derive(Clone)]
pub struct RefreshHandle {
    inner: InFlight,
}

impl Future for RefreshHandle {
    type Output = RefreshOutcome;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.get_mut().inner).poll(cx)
    }
}

impl std::fmt::Debug for RefreshHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshHandle").finish_non_exhaustive()
    }
}

#[derive(Default)]
struct GateState {
    /// `(attempt id, future)` of the running refresh, if any.
    current: Option<(u64, InFlight)>,
    next_id: u64,
}

/// Clears the gate when the attempt it belongs to finishes or is torn down.
struct ReturnToIdle {
    state: Arc<Mutex<GateState>>,
    id: u64,
}

impl Drop for ReturnToIdle {
    fn drop(&mut self) {
        let mut state = self.state.lock();
        if matches!(&state.current, Some((id, _)) if *id == self.id) {
            state.current = None;
        }
    }
}

/// Serializes credential refreshes: at most one in flight at any time.
pub struct RefreshGate {
    refresher: SharedRefresher,
    state: Arc<Mutex<GateState>>,
    attempts: Arc<AtomicU64>,
}

impl RefreshGate {
    pub fn new(refresher: SharedRefresher) -> Self {
        Self {
            refresher,
            state: Arc::new(Mutex::new(GateState::default())),
            attempts: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Start a refresh, or join the one already running.
    ///
    /// Must be called from within a Tokio runtime; the attempt is spawned.
    pub fn ensure_fresh(&self, trigger: RefreshTrigger) -> RefreshHandle {
        let mut state = self.state.lock();

        if let Some((_, running)) = &state.current {
            tracing::debug!(%trigger, "Refresh already in progress, joining it");
            return RefreshHandle {
                inner: running.clone(),
            };
        }

        let id = state.next_id;
        state.next_id += 1;
        self.attempts.fetch_add(1, Ordering::SeqCst);

        let refresher = Arc::clone(&self.refresher);
        let guard = ReturnToIdle {
            state: Arc::clone(&self.state),
            id,
        };

        let attempt: InFlight = async move {
            let _guard = guard;
            tracing::info!(%trigger, "Refreshing credentials");
            let outcome = refresher.refresh().await;
            match &outcome {
                RefreshOutcome::Refreshed { cookies } => {
                    tracing::info!(cookies, "Credential refresh succeeded");
                }
                RefreshOutcome::Skipped => {
                    tracing::debug!("Credential refresh skipped (headless login disabled)");
                }
                RefreshOutcome::Failed { message } => {
                    tracing::warn!(error = %message, "Credential refresh failed");
                }
            }
            outcome
        }
        .boxed()
        .shared();

        state.current = Some((id, attempt.clone()));
        drop(state);

        tokio::spawn(attempt.clone());

        RefreshHandle { inner: attempt }
    }

    /// Wait for the currently recorded refresh, if any. Resolves immediately
    /// when idle.
    pub async fn wait(&self) {
        let running = self
            .state
            .lock()
            .current
            .as_ref()
            .map(|(_, attempt)| attempt.clone());

        if let Some(attempt) = running {
            attempt.await;
        }
    }

    /// Whether a refresh is currently in flight.
    pub fn is_refreshing(&self) -> bool {
        self.state.lock().current.is_some()
    }

    /// Total number of refresh attempts started (not joined).
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for RefreshGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshGate")
            .field("refreshing", &self.is_refreshing())
            .field("attempts", &self.attempts())
            .finish()
    }
}
