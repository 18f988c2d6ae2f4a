//! Outstanding calls awaiting a response.
//!
//! The table is written from two directions: the invoking side inserts, and a
//! dispatch worker, a timer or `close()` removes. Removal is the linearization
//! point, so whichever arrives first owns the callback and the rest find
//! nothing and return `false`. Resolving a call aborts its deadline timer.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use dashmap::DashMap;
use tokio::runtime::Handle;
use tokio::task::AbortHandle;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::error::{BosonError, CallError, Result};
use crate::protocol::message::Payload;
use crate::utils::metrics::global_metrics;

/// Completion callback of one call. Fires exactly once.
pub type Callback = Box<dyn FnOnce(Result<Payload>) + Send + 'static>;

pub struct PendingCall {
    pub call_id: u64,
    pub issued_at: Instant,
    pub deadline: Option<Instant>,
    callback: Mutex<Option<Callback>>,
    timer: Mutex<Option<AbortHandle>>,
}

impl PendingCall {
    pub fn new(call_id: u64, timeout: Option<Duration>, callback: Callback) -> Self {
        let issued_at = Instant::now();
        Self {
            call_id,
            issued_at,
            deadline: timeout.map(|t| issued_at + t),
            callback: Mutex::new(Some(callback)),
            timer: Mutex::new(None),
        }
    }

    fn disarm(&self) {
        let timer = self
            .timer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(timer) = timer {
            timer.abort();
        }
    }

    fn complete(self, outcome: Result<Payload>) {
        let callback = self
            .callback
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(callback) = callback {
            callback(outcome);
        }
    }
}

impl std::fmt::Debug for PendingCall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingCall")
            .field("call_id", &self.call_id)
            .field("issued_at", &self.issued_at)
            .field("deadline", &self.deadline)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Default)]
pub struct PendingCalls {
    calls: DashMap<u64, PendingCall>,
}

impl PendingCalls {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, call: PendingCall) {
        self.calls.insert(call.call_id, call);
    }

    /// Remove a call without firing its callback.
    pub fn cancel(&self, call_id: u64) -> Option<PendingCall> {
        let (_, call) = self.calls.remove(&call_id)?;
        call.disarm();
        Some(call)
    }

    /// Resolve `call_id` with `outcome`. Returns `false` if the call was already
    /// resolved (or never existed), in which case `outcome` is dropped.
    pub fn resolve(&self, call_id: u64, outcome: Result<Payload>) -> bool {
        let Some((_, call)) = self.calls.remove(&call_id) else {
            trace!(call_id, "No pending call, outcome discarded");
            return false;
        };
        call.disarm();
        Self::finish(call, outcome);
        true
    }

    fn finish(call: PendingCall, outcome: Result<Payload>) {
        let call_id = call.call_id;
        let metrics = global_metrics();
        match &outcome {
            Ok(_) => metrics.call_completed(),
            Err(BosonError::Call(CallError::Timeout)) => metrics.call_timed_out(),
            Err(_) => metrics.call_failed(),
        }
        debug!(
            call_id,
            elapsed_ms = call.issued_at.elapsed().as_millis() as u64,
            ok = outcome.is_ok(),
            "Call resolved"
        );
        call.complete(outcome);
    }

    /// Fail `call_id` with `CallError::Timeout` after `after`, unless it resolves first.
    ///
    /// The timeout callback runs on the blocking pool, never on the timer task.
    pub fn arm_timeout(self: &Arc<Self>, call_id: u64, after: Duration, runtime: &Handle) {
        let calls = Arc::downgrade(self);
        let timer = runtime
            .spawn(async move {
                tokio::time::sleep(after).await;
                let Some(calls) = calls.upgrade() else {
                    return;
                };
                // Claimed here, so a response arriving now finds nothing.
                let Some((_, call)) = calls.calls.remove(&call_id) else {
                    return;
                };
                tokio::task::spawn_blocking(move || {
                    Self::finish(call, Err(CallError::Timeout.into()));
                });
            })
            .abort_handle();

        match self.calls.get(&call_id) {
            Some(call) => {
                *call.timer.lock().unwrap_or_else(PoisonError::into_inner) = Some(timer);
            }
            None => timer.abort(),
        }
    }

    /// Fail every outstanding call. Returns how many were failed.
    pub fn fail_all<F>(&self, make_error: F) -> usize
    where
        F: Fn() -> BosonError,
    {
        let ids: Vec<u64> = self.calls.iter().map(|entry| *entry.key()).collect();
        ids.into_iter()
            .filter(|id| self.resolve(*id, Err(make_error())))
            .count()
    }

    pub fn contains(&self, call_id: u64) -> bool {
        self.calls.contains_key(&call_id)
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }
}
