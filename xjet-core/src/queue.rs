// Copyright (c) The xJet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! A bounded-concurrency FIFO task queue with per-runner cancellation.
//!
//! Mirrors the suite-dispatch loop the teacher crate drives through a channel-mediated executor
//! (`runner/executor.rs`), generalized here to a queue with a dynamic `removeTasksByRunner`:
//! dropping queued (not running) tasks for a runner is what `bail` uses to cancel a runner's
//! remaining suites without touching in-flight ones (§4.D, §5).

use futures::future::BoxFuture;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex as AsyncMutex, Semaphore};

/// A queued unit of work: a future producing `T`, tagged with an optional runner id used by
/// [`TaskQueue::remove_tasks_by_runner`].
struct QueuedTask<T> {
    runner_id: Option<String>,
    future: BoxFuture<'static, T>,
    result_tx: oneshot::Sender<T>,
}

/// Bounded-concurrency FIFO scheduler.
///
/// `enqueue` never blocks the caller beyond acquiring the internal lock; admission into the
/// `maxConcurrency` window happens when a queue-draining task observes a free semaphore permit.
/// Tasks dropped by [`clear`](Self::clear) or [`remove_tasks_by_runner`](
/// Self::remove_tasks_by_runner) simply never run: their `oneshot::Receiver` is dropped along
/// with them, so a caller `await`ing `enqueue`'s returned receiver sees a closed channel rather
/// than a value — by design, matching §4.D's "abandoned, neither resolve nor reject".
pub struct TaskQueue<T> {
    inner: Arc<AsyncMutex<QueueState<T>>>,
    semaphore: Arc<Semaphore>,
    running: Arc<AtomicUsize>,
    paused: Arc<std::sync::atomic::AtomicBool>,
}

struct QueueState<T> {
    pending: VecDeque<QueuedTask<T>>,
}

impl<T: Send + 'static> TaskQueue<T> {
    /// Creates a queue admitting at most `max_concurrency` tasks at once. Clamped to at least 1.
    pub fn new(max_concurrency: usize) -> Self {
        let max_concurrency = max_concurrency.max(1);
        Self {
            inner: Arc::new(AsyncMutex::new(QueueState {
                pending: VecDeque::new(),
            })),
            semaphore: Arc::new(Semaphore::new(max_concurrency)),
            running: Arc::new(AtomicUsize::new(0)),
            paused: Arc::new(std::sync::atomic::AtomicBool::new(false)),
        }
    }

    /// Enqueues `future`, optionally tagged with a `runner_id` for later cancellation, and
    /// returns a receiver that resolves with its output once it runs. The receiver errs
    /// (`RecvError`) if the task is dropped from the queue before it gets a chance to run.
    pub async fn enqueue(
        &self,
        runner_id: Option<String>,
        future: BoxFuture<'static, T>,
    ) -> oneshot::Receiver<T> {
        let (tx, rx) = oneshot::channel();
        {
            let mut state = self.inner.lock().await;
            state.pending.push_back(QueuedTask {
                runner_id,
                future,
                result_tx: tx,
            });
        }
        self.drain();
        rx
    }

    /// Gates further dequeues. Tasks already running are unaffected.
    pub fn stop(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    /// Resumes dequeuing after [`stop`](Self::stop), draining any tasks queued in the meantime.
    pub fn start(&self) {
        self.paused.store(false, Ordering::SeqCst);
        self.drain();
    }

    /// Drops every currently-queued (not running) task, returning how many were dropped.
    pub async fn clear(&self) -> usize {
        let mut state = self.inner.lock().await;
        let count = state.pending.len();
        state.pending.clear();
        count
    }

    /// Drops every queued task tagged with `runner_id`, leaving other runners' queued tasks and
    /// all in-flight tasks untouched. This is the primitive `bail` uses on the first observed
    /// failure for a runner (§5).
    pub async fn remove_tasks_by_runner(&self, runner_id: &str) -> usize {
        let mut state = self.inner.lock().await;
        let before = state.pending.len();
        state
            .pending
            .retain(|task| task.runner_id.as_deref() != Some(runner_id));
        before - state.pending.len()
    }

    /// Number of tasks queued but not yet running.
    pub async fn size(&self) -> usize {
        self.inner.lock().await.pending.len()
    }

    /// Number of tasks currently running.
    pub fn running(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }

    /// Whether [`stop`](Self::stop) has been called without a matching [`start`](Self::start).
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// Spawns as many pending tasks as the semaphore currently allows.
    fn drain(&self) {
        if self.paused.load(Ordering::SeqCst) {
            return;
        }
        let inner = Arc::clone(&self.inner);
        let semaphore = Arc::clone(&self.semaphore);
        let running = Arc::clone(&self.running);
        tokio::spawn(async move {
            loop {
                let Ok(permit) = semaphore.clone().try_acquire_owned() else {
                    return;
                };
                let task = {
                    let mut state = inner.lock().await;
                    state.pending.pop_front()
                };
                let Some(task) = task else {
                    drop(permit);
                    return;
                };
                running.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(async move {
                    let output = task.future.await;
                    let _ = task.result_tx.send(output);
                    drop(permit);
                    running.fetch_sub(1, Ordering::SeqCst);
                });
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn respects_max_concurrency() {
        let queue: TaskQueue<u32> = TaskQueue::new(2);
        let counter = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let mut receivers = Vec::new();
        for i in 0..5 {
            let counter = Arc::clone(&counter);
            let peak = Arc::clone(&peak);
            let rx = queue
                .enqueue(
                    None,
                    Box::pin(async move {
                        let cur = counter.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(cur, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        counter.fetch_sub(1, Ordering::SeqCst);
                        i
                    }),
                )
                .await;
            receivers.push(rx);
        }
        for rx in receivers {
            rx.await.unwrap();
        }
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn remove_tasks_by_runner_drops_only_matching_queued_tasks() {
        let queue: TaskQueue<&'static str> = TaskQueue::new(1);
        queue.stop();
        let _slow = queue
            .enqueue(
                Some("a".into()),
                Box::pin(async { "first" }),
            )
            .await;
        let second = queue
            .enqueue(Some("a".into()), Box::pin(async { "second" }))
            .await;
        let third = queue
            .enqueue(Some("b".into()), Box::pin(async { "third" }))
            .await;
        let removed = queue.remove_tasks_by_runner("a").await;
        // "first" is popped to running only once drained; while stopped both "a" tasks are
        // still queued, so exactly one ("second") is removed here alongside the non-started
        // "first" — leaving "third" (runner "b") untouched.
        assert_eq!(removed, 2);
        queue.start();
        assert!(second.await.is_err());
        assert_eq!(third.await.unwrap(), "third");
    }

    #[tokio::test]
    async fn clear_drops_all_queued_tasks() {
        let queue: TaskQueue<u32> = TaskQueue::new(1);
        queue.stop();
        let rx = queue.enqueue(None, Box::pin(async { 1u32 })).await;
        let dropped = queue.clear().await;
        assert_eq!(dropped, 1);
        assert!(rx.await.is_err());
    }
}
