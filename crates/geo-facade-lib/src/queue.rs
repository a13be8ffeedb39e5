//! Bounded-concurrency admission control for remote calls
//!
//! The remote service throttles or degrades under bursty load, so every call goes
//! through a [`RequestQueue`]: at most `limit` operations run at once and the rest
//! wait in FIFO arrival order. The pending list is unbounded, nothing is ever
//! cancelled or reordered, and whichever active operation finishes first (success
//! or failure) frees its slot for the next waiter.

use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tokio::sync::Semaphore;

/// Snapshot of the queue counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct QueueStats {
    pub limit: usize,
    pub active: usize,
    pub pending: usize,
    pub peak_active: usize,
    pub completed: u64,
}

/// FIFO admission gate in front of the remote service
#[derive(Debug)]
pub struct RequestQueue {
    /// Tokio's semaphore is fair: waiters are granted permits in arrival order
    semaphore: Semaphore,
    limit: usize,
    active: AtomicUsize,
    pending: AtomicUsize,
    peak_active: AtomicUsize,
    completed: AtomicU64,
}

/// Decrements a counter when dropped, so cancelled waiters and tasks are accounted for
struct CounterGuard<'a>(&'a AtomicUsize);

impl Drop for CounterGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl RequestQueue {
    /// Create a queue admitting at most `limit` concurrent operations (minimum 1)
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            semaphore: Semaphore::new(limit),
            limit,
            active: AtomicUsize::new(0),
            pending: AtomicUsize::new(0),
            peak_active: AtomicUsize::new(0),
            completed: AtomicU64::new(0),
        }
    }

    /// Run `operation` once a slot is free and return its output unchanged
    ///
    /// Errors are not interpreted here: an operation returning `Err` simply frees
    /// its slot like any other.
    pub async fn add<F, Fut, T>(&self, operation: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        self.pending.fetch_add(1, Ordering::AcqRel);
        let waiting = CounterGuard(&self.pending);
        let permit = match self.semaphore.acquire().await {
            Ok(permit) => Some(permit),
            Err(_) => {
                tracing::warn!("Request queue semaphore closed; running without admission control");
                None
            }
        };
        drop(waiting);

        let now_active = self.active.fetch_add(1, Ordering::AcqRel) + 1;
        self.peak_active.fetch_max(now_active, Ordering::AcqRel);
        let _running = CounterGuard(&self.active);

        let output = operation().await;

        self.completed.fetch_add(1, Ordering::Relaxed);
        drop(permit);
        output
    }

    /// Maximum number of concurrently running operations
    #[inline]
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Operations currently running
    #[inline]
    pub fn active(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    /// Operations waiting for a slot
    #[inline]
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    /// Highest number of simultaneously running operations observed
    #[inline]
    pub fn peak_active(&self) -> usize {
        self.peak_active.load(Ordering::Acquire)
    }

    /// Operations that ran to completion (successfully or not)
    #[inline]
    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    /// All counters at once
    pub fn stats(&self) -> QueueStats {
        QueueStats {
            limit: self.limit,
            active: self.active(),
            pending: self.pending(),
            peak_active: self.peak_active(),
            completed: self.completed(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tokio::sync::Notify;

    #[tokio::test]
    async fn test_admission_bound() {
        let queue = Arc::new(RequestQueue::new(3));
        let gate = Arc::new(Semaphore::new(0));
        let running = Arc::new(AtomicUsize::new(0));
        let max_running = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let queue = queue.clone();
                let gate = gate.clone();
                let running = running.clone();
                let max_running = max_running.clone();
                tokio::spawn(async move {
                    queue
                        .add(|| async move {
                            let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                            max_running.fetch_max(now, Ordering::SeqCst);
                            // Block until the test releases one permit for this task
                            gate.acquire().await.unwrap().forget();
                            running.fetch_sub(1, Ordering::SeqCst);
                        })
                        .await
                })
            })
            .collect();

        // Let every task reach the queue
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(queue.active(), 3);
        assert_eq!(queue.pending(), 5);
        assert_eq!(running.load(Ordering::SeqCst), 3);

        gate.add_permits(8);
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(max_running.load(Ordering::SeqCst), 3);
        assert_eq!(queue.peak_active(), 3);
        assert_eq!(queue.active(), 0);
        assert_eq!(queue.pending(), 0);
        assert_eq!(queue.completed(), 8);
    }

    #[tokio::test]
    async fn test_fifo_admission() {
        let queue = Arc::new(RequestQueue::new(1));
        let order = Arc::new(Mutex::new(Vec::new()));
        let release = Arc::new(Notify::new());

        // Occupy the only slot so every later task has to queue
        let blocker = {
            let queue = queue.clone();
            let release = release.clone();
            tokio::spawn(async move { queue.add(|| async move { release.notified().await }).await })
        };
        tokio::task::yield_now().await;

        let handles: Vec<_> = (0..5)
            .map(|i| {
                let queue = queue.clone();
                let order = order.clone();
                tokio::spawn(async move {
                    queue
                        .add(|| async move { order.lock().unwrap().push(i) })
                        .await
                })
            })
            .collect();
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
        assert_eq!(queue.pending(), 5);

        release.notify_one();
        blocker.await.unwrap();
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_failure_frees_slot() {
        let queue = RequestQueue::new(1);
        let failed: Result<(), &str> = queue.add(|| async { Err("quota exceeded") }).await;
        assert!(failed.is_err());

        let ok: Result<u32, &str> = queue.add(|| async { Ok(7) }).await;
        assert_eq!(ok, Ok(7));
        assert_eq!(queue.active(), 0);
        assert_eq!(queue.completed(), 2);
        assert_eq!(
            queue.stats(),
            QueueStats {
                limit: 1,
                active: 0,
                pending: 0,
                peak_active: 1,
                completed: 2,
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_task_releases_slot() {
        let queue = RequestQueue::new(1);
        let slow = queue.add(|| tokio::time::sleep(std::time::Duration::from_secs(60)));
        let timed_out = tokio::time::timeout(std::time::Duration::from_secs(1), slow).await;
        assert!(timed_out.is_err());
        assert_eq!(queue.active(), 0);

        assert_eq!(queue.add(|| async { 1 }).await, 1);
    }

    #[test]
    fn test_zero_limit_is_clamped() {
        assert_eq!(RequestQueue::new(0).limit(), 1);
    }
}
