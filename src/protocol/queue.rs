//! # Queueing Strategies
//!
//! Decouples frame decoding on the connection task from handler execution.
//!
//! - [`PooledStrategy`]: entries are sharded into lanes by connection id. Each
//!   lane has an unbounded queue and at most one drain worker running on the
//!   blocking pool. Lane state moves `Idle -> Scheduled -> Draining -> Idle`.
//! - [`InlineStrategy`]: dispatches immediately on the calling task.
//!
//! Both are lossy on shutdown: entries still queued are dropped and counted.
//!
//! Entries from one connection always land in the same lane and are dispatched
//! in submission order. Nothing is promised across lanes.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::runtime::Handle;
use tracing::{debug, info, trace};

use crate::config::{DispatchConfig, StrategyKind};
use crate::error::constants::ERR_NO_RUNTIME;
use crate::error::{BosonError, Result};
use crate::protocol::dispatcher::Dispatch;
use crate::protocol::message::Message;
use crate::service::connection::ConnectionContext;
use crate::utils::metrics::global_metrics;

/// A decoded message waiting for dispatch.
#[derive(Debug)]
pub struct QueueEntry {
    pub connection: ConnectionContext,
    pub message: Message,
}

/// Dispatch concurrency policy.
pub trait QueueingStrategy: Send + Sync {
    /// Hand an entry over for dispatch. Never blocks on handler execution.
    fn enqueue(&self, entry: QueueEntry);

    /// Stop dispatching and drop whatever is still queued.
    fn shutdown(&self);

    fn is_shutdown(&self) -> bool;
}

/// Build the strategy selected by `config` on the current runtime.
pub fn build_strategy(
    config: &DispatchConfig,
    dispatch: Arc<dyn Dispatch>,
) -> Result<Arc<dyn QueueingStrategy>> {
    let strategy: Arc<dyn QueueingStrategy> = match config.strategy {
        StrategyKind::Inline => Arc::new(InlineStrategy::new(dispatch)),
        StrategyKind::Pooled => {
            let runtime =
                Handle::try_current().map_err(|_| BosonError::Custom(ERR_NO_RUNTIME.to_string()))?;
            Arc::new(PooledStrategy::new(dispatch, config.workers, runtime))
        }
    };
    debug!(strategy = ?config.strategy, workers = config.workers, "Queueing strategy built");
    Ok(strategy)
}

/// Dispatch on the caller, with no queue and no hand-off.
pub struct InlineStrategy {
    dispatch: Arc<dyn Dispatch>,
    shutdown: AtomicBool,
}

impl InlineStrategy {
    pub fn new(dispatch: Arc<dyn Dispatch>) -> Self {
        Self {
            dispatch,
            shutdown: AtomicBool::new(false),
        }
    }
}

impl QueueingStrategy for InlineStrategy {
    fn enqueue(&self, entry: QueueEntry) {
        if self.is_shutdown() {
            global_metrics().entries_dropped(1);
            return;
        }
        self.dispatch.dispatch(entry);
    }

    fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
    }

    fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }
}

const IDLE: u8 = 0;
const SCHEDULED: u8 = 1;
const DRAINING: u8 = 2;

struct Lane {
    queue: Mutex<VecDeque<QueueEntry>>,
    state: AtomicU8,
}

impl Lane {
    fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            state: AtomicU8::new(IDLE),
        }
    }

    fn queue(&self) -> MutexGuard<'_, VecDeque<QueueEntry>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn clear(&self) -> usize {
        let mut queue = self.queue();
        let dropped = queue.len();
        queue.clear();
        dropped
    }
}

struct Pool {
    lanes: Vec<Lane>,
    dispatch: Arc<dyn Dispatch>,
    shutdown: AtomicBool,
    runtime: Handle,
}

impl Pool {
    fn drain(&self, index: usize) {
        let lane = &self.lanes[index];
        lane.state.store(DRAINING, Ordering::Release);
        let mut handled = 0usize;

        loop {
            if self.shutdown.load(Ordering::Acquire) {
                let dropped = lane.clear();
                if dropped > 0 {
                    global_metrics().entries_dropped(dropped as u64);
                }
                lane.state.store(IDLE, Ordering::Release);
                return;
            }

            let next = lane.queue().pop_front();
            match next {
                Some(entry) => {
                    self.dispatch.dispatch(entry);
                    handled += 1;
                }
                None => {
                    lane.state.store(IDLE, Ordering::Release);
                    // An enqueue that saw DRAINING did not schedule anyone.
                    let pending = !lane.queue().is_empty();
                    if pending
                        && lane
                            .state
                            .compare_exchange(IDLE, DRAINING, Ordering::AcqRel, Ordering::Acquire)
                            .is_ok()
                    {
                        continue;
                    }
                    trace!(lane = index, handled, "Lane drained");
                    return;
                }
            }
        }
    }
}

/// Worker-pool strategy with one drain worker per active lane.
pub struct PooledStrategy {
    pool: Arc<Pool>,
}

impl PooledStrategy {
    pub fn new(dispatch: Arc<dyn Dispatch>, workers: usize, runtime: Handle) -> Self {
        let lanes = (0..workers.max(1)).map(|_| Lane::new()).collect();
        Self {
            pool: Arc::new(Pool {
                lanes,
                dispatch,
                shutdown: AtomicBool::new(false),
                runtime,
            }),
        }
    }

    pub fn lanes(&self) -> usize {
        self.pool.lanes.len()
    }

    /// Entries waiting across all lanes.
    pub fn queued(&self) -> usize {
        self.pool.lanes.iter().map(|l| l.queue().len()).sum()
    }
}

impl QueueingStrategy for PooledStrategy {
    fn enqueue(&self, entry: QueueEntry) {
        if self.is_shutdown() {
            global_metrics().entries_dropped(1);
            return;
        }

        let index = (entry.connection.id() % self.pool.lanes.len() as u64) as usize;
        let lane = &self.pool.lanes[index];
        lane.queue().push_back(entry);

        if lane
            .state
            .compare_exchange(IDLE, SCHEDULED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            let pool = Arc::clone(&self.pool);
            self.pool.runtime.spawn_blocking(move || pool.drain(index));
        }
    }

    fn shutdown(&self) {
        if self.pool.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        let dropped: usize = self.pool.lanes.iter().map(Lane::clear).sum();
        if dropped > 0 {
            global_metrics().entries_dropped(dropped as u64);
        }
        info!(dropped, "Queueing strategy shut down");
        debug!(lanes = self.pool.lanes.len(), "Drain workers will exit");
    }

    fn is_shutdown(&self) -> bool {
        self.pool.shutdown.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;
    use crate::core::encoding::ValueCodec;
    use crate::protocol::message::Payload;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct Counting {
        seen: AtomicUsize,
    }

    impl Dispatch for Counting {
        fn dispatch(&self, _entry: QueueEntry) {
            self.seen.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn entry(ctx: &ConnectionContext, n: u64) -> QueueEntry {
        QueueEntry {
            connection: ctx.clone(),
            message: Message::one_way(n, "tick", Payload::empty()),
        }
    }

    #[tokio::test]
    async fn test_inline_dispatches_immediately() {
        let counting = Arc::new(Counting::default());
        let strategy = InlineStrategy::new(counting.clone());
        let ctx = ConnectionContext::detached(Arc::new(ValueCodec::default())).unwrap();

        strategy.enqueue(entry(&ctx, 1));
        assert_eq!(counting.seen.load(Ordering::SeqCst), 1);

        strategy.shutdown();
        strategy.enqueue(entry(&ctx, 2));
        assert_eq!(counting.seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_enqueue_after_shutdown_is_dropped() {
        let counting = Arc::new(Counting::default());
        let strategy = PooledStrategy::new(counting.clone(), 2, Handle::current());
        strategy.shutdown();
        assert!(strategy.is_shutdown());

        let ctx = ConnectionContext::detached(Arc::new(ValueCodec::default())).unwrap();
        strategy.enqueue(entry(&ctx, 1));
        assert_eq!(strategy.queued(), 0);
        assert_eq!(counting.seen.load(Ordering::SeqCst), 0);
    }
}
