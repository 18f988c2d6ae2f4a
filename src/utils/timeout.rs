//! Timeout constants and async wrappers.

use std::future::Future;
use std::time::Duration;

use crate::error::{BosonError, CallError, Result};

/// Default timeout for connection establishment
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Maximum time the server waits for connections to drain on shutdown
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Interval at which the server re-checks active connections while draining
pub const SHUTDOWN_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Await `fut`, failing with `CallError::Timeout` if it does not finish in `dur`.
pub async fn with_timeout_error<F, T>(fut: F, dur: Duration) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(dur, fut).await {
        Ok(result) => result,
        Err(_) => Err(BosonError::Call(CallError::Timeout)),
    }
}
