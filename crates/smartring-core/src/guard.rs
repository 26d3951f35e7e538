//! Deadline guard for native calls.
//!
//! The ring's native layer can resolve late or never. [`race`] bounds any
//! future by a deadline and reports [`Error::Timeout`] when the deadline
//! wins. Dropping the losing future does not cancel work already queued on
//! the hardware; the command queue issues an explicit cancel for operations
//! that need it.

use std::future::Future;
use std::time::Duration;

use tokio::time::timeout;

use crate::error::{Error, Result};

/// Race `future` against a `limit` deadline.
///
/// Returns the future's output if it settles first, otherwise
/// [`Error::Timeout`] labelled with `label`. A result that arrives after the
/// deadline is discarded.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use smartring_core::guard::race;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let value = race(async { 7 }, Duration::from_millis(50), "answer").await;
/// assert_eq!(value.unwrap(), 7);
/// # }
/// ```
pub async fn race<F, T>(future: F, limit: Duration, label: &str) -> Result<T>
where
    F: Future<Output = T>,
{
    timeout(limit, future)
        .await
        .map_err(|_| Error::timeout(label, limit))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[tokio::test(start_paused = true)]
    async fn test_fast_future_wins() {
        let result = race(async { "ok" }, Duration::from_secs(1), "fast").await;
        assert_eq!(result.unwrap(), "ok");
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_wins_over_late_future() {
        let late = async {
            tokio::time::sleep(Duration::from_secs(6)).await;
            "too late"
        };
        let err = race(late, Duration::from_secs(5), "getBatteryLevel")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert_eq!(err.operation(), Some("getBatteryLevel"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_future_times_out() {
        let start = tokio::time::Instant::now();
        let err = race(
            std::future::pending::<()>(),
            Duration::from_millis(1500),
            "cancelPendingDataRequest",
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Timeout { duration, .. } if duration == Duration::from_millis(1500)));
        assert!(start.elapsed() >= Duration::from_millis(1500));
        assert!(start.elapsed() < Duration::from_millis(1510));
    }
}
