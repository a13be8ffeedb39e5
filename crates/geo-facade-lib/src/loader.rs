//! Timeout-raced execution with cheaper fallbacks
//!
//! The most precise computation is tried first under a short budget. If it times
//! out or fails, each fallback in the chain is tried in order under a longer
//! budget. When everything fails, the primary's error is returned: it is the root
//! cause the caller needs to see, fallback errors are only logged.
//!
//! A timed-out future is dropped; if the remote call it was waiting on completes
//! later, its result is never observed.

use crate::{FacadeError, Result};
use futures::future::BoxFuture;
use std::future::Future;
use std::time::Duration;

/// A reusable fallback operation: each call starts a fresh attempt
pub type Fallback<'a, T> = Box<dyn Fn() -> BoxFuture<'a, Result<T>> + Send + Sync + 'a>;

/// Runs a primary operation with a fallback chain
///
/// The loader itself is stateless; the same fallback chain can be passed to any
/// number of `run` calls.
#[derive(Debug, Clone, Copy)]
pub struct ProgressiveLoader {
    primary_timeout: Duration,
    fallback_timeout: Duration,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl ProgressiveLoader {
    /// Create a loader with the given primary and per-fallback budgets
    pub fn new(primary_timeout: Duration, fallback_timeout: Duration) -> Self {
        Self {
            primary_timeout,
            fallback_timeout,
        }
    }

    /// Budget of the primary attempt
    pub fn primary_timeout(&self) -> Duration {
        self.primary_timeout
    }

    /// Budget of each fallback attempt
    pub fn fallback_timeout(&self) -> Duration {
        self.fallback_timeout
    }

    /// Race `primary` against its budget, then walk `fallbacks` left to right
    ///
    /// Returns the first successful result. Fails with the primary's own error (or
    /// a [`FacadeError::Timeout`] if it timed out) once every fallback failed too.
    pub async fn run<T, F>(
        &self,
        operation: &str,
        primary: F,
        fallbacks: &[Fallback<'_, T>],
    ) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let primary_error = match tokio::time::timeout(self.primary_timeout, primary).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(err)) => err,
            Err(_) => FacadeError::Timeout {
                operation: operation.to_string(),
                budget: self.primary_timeout,
            },
        };

        if fallbacks.is_empty() {
            return Err(primary_error);
        }
        tracing::warn!(
            "'{}' primary attempt failed ({}), trying {} fallback(s)",
            operation,
            primary_error,
            fallbacks.len()
        );

        for (index, fallback) in fallbacks.iter().enumerate() {
            match tokio::time::timeout(self.fallback_timeout, fallback()).await {
                Ok(Ok(value)) => {
                    tracing::info!("'{}' served by fallback #{}", operation, index + 1);
                    return Ok(value);
                }
                Ok(Err(err)) => {
                    tracing::warn!("'{}' fallback #{} failed: {}", operation, index + 1, err);
                }
                Err(_) => {
                    tracing::warn!(
                        "'{}' fallback #{} timed out after {:?}",
                        operation,
                        index + 1,
                        self.fallback_timeout
                    );
                }
            }
        }

        Err(primary_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RemoteError;
    use futures::FutureExt;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn loader() -> ProgressiveLoader {
        ProgressiveLoader::new(Duration::from_secs(5), Duration::from_secs(10))
    }

    async fn hang() -> Result<u32> {
        futures::future::pending().await
    }

    fn failing_fallback() -> Fallback<'static, u32> {
        Box::new(|| {
            async { Err::<u32, _>(RemoteError::Transport("connection reset".to_string()).into()) }
                .boxed()
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_primary_wins_within_budget() {
        let value = loader()
            .run("ndvi", async { Ok::<u32, FacadeError>(1) }, &[failing_fallback()])
            .await
            .unwrap();
        assert_eq!(value, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_fallback_wins_after_timeout() {
        let fallbacks = vec![
            failing_fallback(),
            Box::new(|| async { Ok::<u32, FacadeError>(2) }.boxed()) as Fallback<'static, u32>,
        ];
        let value = loader().run("ndvi", hang(), &fallbacks).await.unwrap();
        assert_eq!(value, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_primary_error_is_reported() {
        let slow_fallback: Fallback<'static, u32> = Box::new(|| hang().boxed());
        let fallbacks = vec![failing_fallback(), slow_fallback];

        let err = loader().run("ndvi", hang(), &fallbacks).await.unwrap_err();
        match err {
            FacadeError::Timeout { operation, budget } => {
                assert_eq!(operation, "ndvi");
                assert_eq!(budget, Duration::from_secs(5));
            }
            other => panic!("expected the primary timeout, got {other}"),
        }

        let rejected = async { Err::<u32, _>(RemoteError::Auth("expired token".to_string()).into()) };
        let err = loader().run("ndvi", rejected, &fallbacks).await.unwrap_err();
        assert!(matches!(err, FacadeError::Remote(RemoteError::Auth(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fallback_chain_is_reusable() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let fallbacks: Vec<Fallback<'static, u32>> = vec![Box::new(move || {
            let n = counter.fetch_add(1, Ordering::SeqCst) as u32;
            async move { Ok::<u32, FacadeError>(100 + n) }.boxed()
        })];

        let loader = loader();
        assert_eq!(loader.run("a", hang(), &fallbacks).await.unwrap(), 100);
        assert_eq!(loader.run("b", hang(), &fallbacks).await.unwrap(), 101);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_fallbacks() {
        let err = loader().run("ndvi", hang(), &[]).await.unwrap_err();
        assert!(err.is_timeout());
    }
}
