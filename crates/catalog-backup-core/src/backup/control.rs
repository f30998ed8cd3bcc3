//! Cooperative run control: stop signals, progress callbacks and outcomes.

use parking_lot::{Mutex, RwLock};
use std::sync::Arc;

/// Progress callback: `(products_fetched, estimated_total)`; the estimate is
/// 0 while the API has not reported a total.
pub type ProgressFn = Arc<dyn Fn(u64, u64) + Send + Sync>;

/// Progress callback that ignores updates
pub fn no_progress() -> ProgressFn {
    Arc::new(|_, _| {})
}

/// A stop request honored at the next page boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopRequest {
    Pause,
    Cancel,
}

#[derive(Debug, Default)]
struct SignalState {
    requested: Option<StopRequest>,
    /// Set once the run loop has taken a request and is winding down
    stopping: bool,
}

/// Pause/cancel signal shared between a run and its controllers.
///
/// Requests are only inspected by the run at loop boundaries, so an in-flight
/// fetch or write always settles first.
#[derive(Debug, Default)]
pub struct RunSignal {
    state: Mutex<SignalState>,
}

impl RunSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a pause. A pending cancel takes precedence.
    pub fn request_pause(&self) {
        let mut state = self.state.lock();
        if state.requested.is_none() {
            state.requested = Some(StopRequest::Pause);
        }
    }

    /// Request a cancel, overriding a pending pause
    pub fn request_cancel(&self) {
        self.state.lock().requested = Some(StopRequest::Cancel);
    }

    /// Withdraw a pending pause before the run has honored it.
    ///
    /// Returns `false` once the run is already stopping, in which case the
    /// caller has to start a new run after this one finishes.
    pub fn withdraw_pause(&self) -> bool {
        let mut state = self.state.lock();
        if state.stopping {
            return false;
        }
        if state.requested == Some(StopRequest::Pause) {
            state.requested = None;
        }
        state.requested.is_none()
    }

    /// Called by the run loop at each boundary; a returned request is final
    pub fn take_stop(&self) -> Option<StopRequest> {
        let mut state = self.state.lock();
        if state.requested.is_some() {
            state.stopping = true;
        }
        state.requested
    }

    /// Current request without committing to it
    pub fn pending(&self) -> Option<StopRequest> {
        self.state.lock().requested
    }

    pub fn is_stopping(&self) -> bool {
        self.state.lock().stopping
    }
}

/// Per-run control block: stop signal plus a replaceable progress callback
pub struct RunControl {
    signal: Arc<RunSignal>,
    progress: RwLock<ProgressFn>,
}

impl RunControl {
    pub fn new(progress: ProgressFn) -> Self {
        Self {
            signal: Arc::new(RunSignal::new()),
            progress: RwLock::new(progress),
        }
    }

    pub fn signal(&self) -> &Arc<RunSignal> {
        &self.signal
    }

    /// Route subsequent progress updates to a new callback
    pub fn replace_progress(&self, progress: ProgressFn) {
        *self.progress.write() = progress;
    }

    pub fn report_progress(&self, fetched: u64, estimated: u64) {
        let progress = self.progress.read().clone();
        progress(fetched, estimated);
    }
}

/// Why a run ended in the partial state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartialReason {
    /// Still throttled after the single retry
    Throttled,
    /// Non-success response from the catalog API
    Api { status: u16 },
    /// Success response without the expected payload
    MissingData,
    /// Local store is full
    QuotaExceeded,
    /// Stopped by the user
    Cancelled,
    /// Anything else
    Unexpected(String),
}

/// Terminal result of one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Natural completion; `products` active products after reconciliation
    Completed { products: u64, removed: u64 },
    /// Paused at a page boundary; resumable from the cursor
    Paused { products_fetched: u64 },
    /// Stopped early
    Partial(PartialReason),
}

impl RunOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, RunOutcome::Completed { .. })
    }
}
