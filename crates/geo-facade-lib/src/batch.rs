//! Chunked parallel batch execution with per-item failure isolation
//!
//! Queued operations run in fixed-size chunks. Every operation of a chunk is
//! polled concurrently and the chunk always settles completely (a failure never
//! short-circuits its siblings); the next chunk starts only afterwards. Failures
//! are recorded per item instead of failing the batch.

use crate::{FacadeError, Result};
use futures::future::{BoxFuture, FutureExt, join_all};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

/// Per-item failure recorded by [`BatchProcessor::process`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("batch item '{id}' failed: {message}")]
pub struct BatchItemError {
    pub id: String,
    pub message: String,
    /// Whether the item failed because a remote call ran out of time
    pub timed_out: bool,
}

impl BatchItemError {
    fn new(id: &str, error: &FacadeError) -> Self {
        Self {
            id: id.to_string(),
            message: error.to_string(),
            timed_out: error.is_timeout(),
        }
    }
}

/// Result of one batch item
pub type BatchOutcome<T> = std::result::Result<T, BatchItemError>;

/// Resets the processing flag even if `process` is dropped mid-batch
struct ProcessingGuard<'a>(&'a AtomicBool);

impl Drop for ProcessingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Fixed-concurrency executor over independent operations
pub struct BatchProcessor<'a, T> {
    queued: Mutex<Vec<(String, BoxFuture<'a, Result<T>>)>>,
    last_results: Mutex<HashMap<String, BatchOutcome<T>>>,
    processing: AtomicBool,
    chunk_size: usize,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl<'a, T: Clone + Send + 'a> BatchProcessor<'a, T> {
    /// Create a processor running `chunk_size` operations at a time (minimum 1)
    pub fn new(chunk_size: usize) -> Self {
        Self {
            queued: Mutex::new(Vec::new()),
            last_results: Mutex::new(HashMap::new()),
            processing: AtomicBool::new(false),
            chunk_size: chunk_size.max(1),
        }
    }

    /// Queue an operation under `id`; it does not start until [`Self::process`]
    ///
    /// Ids should be unique within a batch: a later item with the same id
    /// overwrites the earlier one's result.
    pub fn add<F>(&self, id: impl Into<String>, operation: F)
    where
        F: Future<Output = Result<T>> + Send + 'a,
    {
        crate::cache::lock(&self.queued).push((id.into(), operation.boxed()));
    }

    /// Number of operations waiting for the next `process` call
    pub fn len(&self) -> usize {
        crate::cache::lock(&self.queued).len()
    }

    /// Check if no operation is queued
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether a batch is currently in flight
    pub fn is_processing(&self) -> bool {
        self.processing.load(Ordering::Acquire)
    }

    /// Run every queued operation and return one outcome per id
    ///
    /// Never fails because of an individual item. Fails with
    /// [`FacadeError::ConcurrentBatch`] if a previous batch is still running.
    pub async fn process(&self) -> Result<HashMap<String, BatchOutcome<T>>> {
        if self.processing.swap(true, Ordering::AcqRel) {
            return Err(FacadeError::ConcurrentBatch);
        }
        let _guard = ProcessingGuard(&self.processing);

        let items = std::mem::take(&mut *crate::cache::lock(&self.queued));
        let total = items.len();
        tracing::debug!(
            "Processing batch of {} item(s) in chunks of {}",
            total,
            self.chunk_size
        );

        let mut results = HashMap::with_capacity(total);
        let mut failures = 0usize;
        let mut items = items.into_iter();
        loop {
            let chunk: Vec<_> = items.by_ref().take(self.chunk_size).collect();
            if chunk.is_empty() {
                break;
            }

            let (ids, operations): (Vec<String>, Vec<_>) = chunk.into_iter().unzip();
            let settled = join_all(operations).await;

            for (id, outcome) in ids.into_iter().zip(settled) {
                let outcome = outcome.map_err(|err| {
                    failures += 1;
                    tracing::warn!("Batch item '{}' failed: {}", id, err);
                    BatchItemError::new(&id, &err)
                });
                results.insert(id, outcome);
            }
        }

        tracing::info!(
            "Batch finished: {} succeeded, {} failed",
            total - failures,
            failures
        );
        *crate::cache::lock(&self.last_results) = results.clone();
        Ok(results)
    }

    /// Outcomes of the most recent `process` call
    pub fn last_results(&self) -> HashMap<String, BatchOutcome<T>> {
        crate::cache::lock(&self.last_results).clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RemoteError;
    use std::time::Duration;
    use tokio::sync::Notify;

    #[tokio::test]
    async fn test_partial_failure_isolation() {
        let processor = BatchProcessor::new(5);
        for i in 1..=5u32 {
            processor.add(format!("item-{i}"), async move {
                if i == 3 {
                    Err(RemoteError::MalformedQuery("bad band".to_string()).into())
                } else {
                    Ok::<u32, FacadeError>(i * 10)
                }
            });
        }

        let results = processor.process().await.unwrap();
        assert_eq!(results.len(), 5);
        assert_eq!(results.values().filter(|r| r.is_ok()).count(), 4);

        let failure = results["item-3"].as_ref().unwrap_err();
        assert_eq!(failure.id, "item-3");
        assert!(failure.message.contains("bad band"));
        assert!(!failure.timed_out);
        assert_eq!(results["item-5"], Ok(50));
    }

    #[tokio::test(start_paused = true)]
    async fn test_chunks_run_in_order() {
        let log = Mutex::new(Vec::new());
        let processor = BatchProcessor::new(2);
        for i in 0..5u64 {
            let log = &log;
            processor.add(i.to_string(), async move {
                log.lock().unwrap().push(format!("start {i}"));
                tokio::time::sleep(Duration::from_millis(10 * (5 - i))).await;
                log.lock().unwrap().push(format!("end {i}"));
                Ok::<u64, FacadeError>(i)
            });
        }

        let results = processor.process().await.unwrap();
        assert_eq!(results.len(), 5);
        drop(processor);

        let log = log.into_inner().unwrap();
        let pos = |event: &str| log.iter().position(|e| e == event).unwrap();
        // Both items of the first chunk start before either finishes
        assert!(pos("start 1") < pos("end 0"));
        // The second chunk waits for the whole first chunk
        assert!(pos("start 2") > pos("end 0"));
        assert!(pos("start 2") > pos("end 1"));
        assert!(pos("start 4") > pos("end 3"));
    }

    #[tokio::test]
    async fn test_concurrent_process_is_rejected() {
        let release = Notify::new();
        let processor = BatchProcessor::new(5);
        processor.add("slow", async {
            release.notified().await;
            Ok::<u8, FacadeError>(1)
        });

        let (first, second) = tokio::join!(processor.process(), async {
            let second = processor.process().await;
            release.notify_one();
            second
        });

        assert!(matches!(second, Err(FacadeError::ConcurrentBatch)));
        assert_eq!(first.unwrap()["slow"], Ok(1));
        assert!(!processor.is_processing());
    }

    #[tokio::test]
    async fn test_queue_cleared_results_persist() {
        let processor = BatchProcessor::new(3);
        processor.add("a", async { Ok::<_, FacadeError>("done".to_string()) });
        assert_eq!(processor.len(), 1);

        processor.process().await.unwrap();
        assert!(processor.is_empty());
        assert_eq!(processor.last_results()["a"], Ok("done".to_string()));

        let empty = processor.process().await.unwrap();
        assert!(empty.is_empty());
        assert!(processor.last_results().is_empty());
    }
}
