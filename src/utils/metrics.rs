//! Observability and Metrics
//!
//! Process-wide counters for connections, frames, calls and dispatch.
//!
//! Uses atomic counters for thread-safe metrics collection.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Global metrics collector for protocol operations
#[derive(Debug)]
pub struct Metrics {
    /// Total connections established
    pub connections_total: AtomicU64,
    /// Currently active connections
    pub connections_active: AtomicU64,
    /// Total frames sent
    pub frames_sent: AtomicU64,
    /// Total frames received
    pub frames_received: AtomicU64,
    /// Total bytes sent (payload only)
    pub bytes_sent: AtomicU64,
    /// Total bytes received (payload only)
    pub bytes_received: AtomicU64,
    /// Calls issued that expect a response
    pub calls_issued: AtomicU64,
    /// One-way messages issued
    pub one_way_issued: AtomicU64,
    /// Calls resolved with a response
    pub calls_completed: AtomicU64,
    /// Calls resolved by their deadline
    pub calls_timed_out: AtomicU64,
    /// Calls failed by close, cancel or remote error
    pub calls_failed: AtomicU64,
    /// Queue entries handed to handlers
    pub dispatches: AtomicU64,
    /// Handler failures
    pub dispatch_errors: AtomicU64,
    /// Queue entries dropped at shutdown
    pub entries_dropped: AtomicU64,
    /// Inbound frames that failed to decode
    pub decode_errors: AtomicU64,
    /// Start time for uptime calculation
    start_time: Instant,
}

impl Metrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self {
            connections_total: AtomicU64::new(0),
            connections_active: AtomicU64::new(0),
            frames_sent: AtomicU64::new(0),
            frames_received: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            calls_issued: AtomicU64::new(0),
            one_way_issued: AtomicU64::new(0),
            calls_completed: AtomicU64::new(0),
            calls_timed_out: AtomicU64::new(0),
            calls_failed: AtomicU64::new(0),
            dispatches: AtomicU64::new(0),
            dispatch_errors: AtomicU64::new(0),
            entries_dropped: AtomicU64::new(0),
            decode_errors: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Record a new connection
    pub fn connection_established(&self) {
        self.connections_total.fetch_add(1, Ordering::Relaxed);
        self.connections_active.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a connection closed
    pub fn connection_closed(&self) {
        self.connections_active.fetch_sub(1, Ordering::Relaxed);
    }

    /// Record a frame written to the transport
    pub fn frame_sent(&self, byte_count: u64) {
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(byte_count, Ordering::Relaxed);
    }

    /// Record a frame read from the transport
    pub fn frame_received(&self, byte_count: u64) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(byte_count, Ordering::Relaxed);
    }

    pub fn call_issued(&self) {
        self.calls_issued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn one_way_issued(&self) {
        self.one_way_issued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn call_completed(&self) {
        self.calls_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn call_timed_out(&self) {
        self.calls_timed_out.fetch_add(1, Ordering::Relaxed);
    }

    pub fn call_failed(&self) {
        self.calls_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dispatched(&self) {
        self.dispatches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dispatch_error(&self) {
        self.dispatch_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn entries_dropped(&self, count: u64) {
        self.entries_dropped.fetch_add(count, Ordering::Relaxed);
    }

    pub fn decode_error(&self) {
        self.decode_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connections_total: self.connections_total.load(Ordering::Relaxed),
            connections_active: self.connections_active.load(Ordering::Relaxed),
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            calls_issued: self.calls_issued.load(Ordering::Relaxed),
            one_way_issued: self.one_way_issued.load(Ordering::Relaxed),
            calls_completed: self.calls_completed.load(Ordering::Relaxed),
            calls_timed_out: self.calls_timed_out.load(Ordering::Relaxed),
            calls_failed: self.calls_failed.load(Ordering::Relaxed),
            dispatches: self.dispatches.load(Ordering::Relaxed),
            dispatch_errors: self.dispatch_errors.load(Ordering::Relaxed),
            entries_dropped: self.entries_dropped.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }

    /// Log current metrics
    pub fn log_metrics(&self) {
        let snapshot = self.snapshot();
        info!(
            connections_total = snapshot.connections_total,
            connections_active = snapshot.connections_active,
            frames_sent = snapshot.frames_sent,
            frames_received = snapshot.frames_received,
            bytes_sent = snapshot.bytes_sent,
            bytes_received = snapshot.bytes_received,
            calls_issued = snapshot.calls_issued,
            one_way_issued = snapshot.one_way_issued,
            calls_completed = snapshot.calls_completed,
            calls_timed_out = snapshot.calls_timed_out,
            calls_failed = snapshot.calls_failed,
            dispatches = snapshot.dispatches,
            dispatch_errors = snapshot.dispatch_errors,
            entries_dropped = snapshot.entries_dropped,
            decode_errors = snapshot.decode_errors,
            uptime_seconds = snapshot.uptime_seconds,
            "Protocol metrics snapshot"
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub connections_total: u64,
    pub connections_active: u64,
    pub frames_sent: u64,
    pub frames_received: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub calls_issued: u64,
    pub one_way_issued: u64,
    pub calls_completed: u64,
    pub calls_timed_out: u64,
    pub calls_failed: u64,
    pub dispatches: u64,
    pub dispatch_errors: u64,
    pub entries_dropped: u64,
    pub decode_errors: u64,
    pub uptime_seconds: u64,
}

static METRICS: once_cell::sync::Lazy<Metrics> = once_cell::sync::Lazy::new(Metrics::new);

/// Get the global metrics instance
pub fn global_metrics() -> &'static Metrics {
    &METRICS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let metrics = Metrics::new();
        metrics.connection_established();
        metrics.frame_sent(10);
        metrics.frame_sent(5);
        metrics.call_timed_out();
        metrics.connection_closed();

        let snap = metrics.snapshot();
        assert_eq!(snap.connections_total, 1);
        assert_eq!(snap.connections_active, 0);
        assert_eq!(snap.frames_sent, 2);
        assert_eq!(snap.bytes_sent, 15);
        assert_eq!(snap.calls_timed_out, 1);
    }
}
