//! # Utility Modules
//!
//! Supporting utilities for logging, metrics and timing.
//!
//! ## Components
//! - **Logging**: `tracing-subscriber` setup from `LoggingConfig`
//! - **Metrics**: Thread-safe observability counters
//! - **Timeout**: Async timeout wrappers and default durations

pub mod logging;
pub mod metrics;
pub mod timeout;

pub use metrics::{global_metrics, MetricsSnapshot};
