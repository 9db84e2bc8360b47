//! Per-call store timeout.

use std::future::Future;
use std::time::Duration as StdDuration;

use accord_core::StoreResult;

use crate::error::{GovernanceError, Result};

/// Bounds every store round-trip; an elapsed call is a retryable
/// [`GovernanceError::StoreUnavailable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreDeadline(StdDuration);

impl StoreDeadline {
    /// A deadline of `timeout` per call.
    #[must_use]
    pub const fn new(timeout: StdDuration) -> Self {
        Self(timeout)
    }

    /// The configured timeout.
    #[must_use]
    pub const fn timeout(self) -> StdDuration {
        self.0
    }

    /// Await a store call under this deadline.
    pub async fn run<T, F>(self, call: F) -> Result<T>
    where
        F: Future<Output = StoreResult<T>>,
    {
        match tokio::time::timeout(self.0, call).await {
            Ok(result) => result.map_err(GovernanceError::from),
            Err(_) => Err(GovernanceError::StoreUnavailable(format!(
                "store call exceeded {}ms",
                self.0.as_millis()
            ))),
        }
    }
}

impl Default for StoreDeadline {
    fn default() -> Self {
        Self(StdDuration::from_millis(5_000))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use accord_core::StoreError;

    #[tokio::test]
    async fn test_passes_through_results() {
        let deadline = StoreDeadline::default();
        assert_eq!(deadline.run(async { Ok(7) }).await.unwrap(), 7);

        let err = deadline
            .run(async { Err::<(), _>(StoreError::unavailable("reset")) })
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test(start_paused = true)]
    async fn test_elapsed_call_is_retryable() {
        let deadline = StoreDeadline::new(StdDuration::from_millis(10));
        let err = deadline
            .run(async {
                tokio::time::sleep(StdDuration::from_secs(1)).await;
                Ok(())
            })
            .await
            .unwrap_err();
        assert_eq!(
            err,
            GovernanceError::StoreUnavailable("store call exceeded 10ms".into())
        );
    }
}
