//! Tracked background work
//!
//! Every unit of work launched here runs on the tokio runtime captured at
//! construction, so `launch` may be called from any thread, including
//! threads outside the runtime. Units are isolated from each other: a
//! panic ends only the unit that raised it. Completed, cancelled and failed
//! units leave the live set on their own.

use futures::FutureExt;
use parking_lot::RwLock;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Why a unit of work did not produce a value
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    #[error("Task was cancelled")]
    Cancelled,

    #[error("Task panicked: {0}")]
    Panicked(String),
}

/// Handle to one launched unit of work
///
/// Dropping the handle does not stop the unit.
#[derive(Debug)]
pub struct TaskHandle<T> {
    id: u64,
    token: CancellationToken,
    join: JoinHandle<Result<T, TaskError>>,
}

impl<T> TaskHandle<T> {
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Request cooperative cancellation; the unit stops at its next
    /// suspension point.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Wait for the unit's outcome
    pub async fn join(self) -> Result<T, TaskError> {
        match self.join.await {
            Ok(outcome) => outcome,
            Err(err) if err.is_panic() => Err(TaskError::Panicked(err.to_string())),
            Err(_) => Err(TaskError::Cancelled),
        }
    }
}

/// Launches and tracks background work
pub struct TaskTracker {
    tracker: tokio_util::task::TaskTracker,
    runtime: Handle,
    root: CancellationToken,
    // Launches hold this shared; drain takes it exclusively to observe an
    // empty live set with no launch in flight.
    gate: RwLock<()>,
    next_id: AtomicU64,
}

impl TaskTracker {
    #[must_use]
    pub fn new(runtime: Handle) -> Self {
        Self {
            tracker: tokio_util::task::TaskTracker::new(),
            runtime,
            root: CancellationToken::new(),
            gate: RwLock::new(()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Start `future` concurrently and register it in the live set
    pub fn launch<F, T>(&self, name: &'static str, future: F) -> TaskHandle<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let token = self.root.child_token();
        let cancelled = token.clone();

        let _gate = self.gate.read();
        let join = self.tracker.spawn_on(
            async move {
                tokio::select! {
                    biased;
                    () = cancelled.cancelled() => {
                        debug!(task_id = id, task = name, "Task cancelled");
                        Err(TaskError::Cancelled)
                    }
                    outcome = AssertUnwindSafe(future).catch_unwind() => {
                        outcome.map_err(|payload| {
                            let message = panic_message(payload.as_ref());
                            warn!(task_id = id, task = name, error = %message, "Task panicked");
                            TaskError::Panicked(message)
                        })
                    }
                }
            },
            &self.runtime,
        );

        TaskHandle { id, token, join }
    }

    /// Wait until the live set is empty
    ///
    /// Units launched while draining are waited for as well. Safe to call
    /// from several places at once; the tracker stays usable afterwards.
    ///
    /// The inner tracker stays closed afterwards; it still accepts new
    /// units. It is never reopened, since a concurrent drain's `wait()`
    /// only completes on a closed tracker.
    pub async fn drain(&self) {
        loop {
            self.tracker.close();
            self.tracker.wait().await;
            if self.tracker_is_idle() {
                return;
            }
            debug!(live = self.tracker.len(), "Units launched during drain, waiting again");
        }
    }

    // No launch can be between its gate check and its spawn while the
    // write half is held.
    fn tracker_is_idle(&self) -> bool {
        let _gate = self.gate.write();
        self.tracker.is_empty()
    }

    /// Number of live units
    #[must_use]
    pub fn size(&self) -> usize {
        self.tracker.len()
    }

    /// Cancel every live unit and every unit launched afterwards
    pub fn cancel_all(&self) {
        self.root.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.root.is_cancelled()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize};
    use std::sync::Arc;
    use std::time::Duration;

    fn tracker() -> Arc<TaskTracker> {
        Arc::new(TaskTracker::new(Handle::current()))
    }

    #[tokio::test]
    async fn test_launch_and_join() {
        let tracker = tracker();
        let handle = tracker.launch("answer", async { 42 });
        assert_eq!(handle.join().await, Ok(42));
        tracker.drain().await;
        assert_eq!(tracker.size(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_drain_waits_for_units_from_many_threads() {
        let tracker = tracker();
        let completed = Arc::new(AtomicUsize::new(0));

        let threads: Vec<_> = (0..8)
            .map(|_| {
                let tracker = Arc::clone(&tracker);
                let completed = Arc::clone(&completed);
                std::thread::spawn(move || {
                    for _ in 0..25 {
                        let completed = Arc::clone(&completed);
                        tracker.launch("counter", async move {
                            tokio::time::sleep(Duration::from_millis(5)).await;
                            completed.fetch_add(1, Ordering::SeqCst);
                        });
                    }
                })
            })
            .collect();
        for thread in threads {
            thread.join().unwrap();
        }

        tracker.drain().await;
        assert_eq!(tracker.size(), 0);
        assert_eq!(completed.load(Ordering::SeqCst), 200);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_drain_includes_units_launched_during_drain() {
        let tracker = tracker();
        let inner_done = Arc::new(AtomicBool::new(false));

        let spawner = Arc::clone(&tracker);
        let flag = Arc::clone(&inner_done);
        tracker.launch("outer", async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            spawner.launch("inner", async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                flag.store(true, Ordering::SeqCst);
            });
        });

        tracker.drain().await;
        assert!(inner_done.load(Ordering::SeqCst));
        assert_eq!(tracker.size(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_panicking_unit_does_not_affect_siblings() {
        let tracker = tracker();
        let sibling_done = Arc::new(AtomicBool::new(false));

        let failing = tracker.launch("failing", async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            panic!("boom");
        });
        let flag = Arc::clone(&sibling_done);
        let sibling = tracker.launch("sibling", async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            flag.store(true, Ordering::SeqCst);
            7
        });

        assert_eq!(failing.join().await, Err(TaskError::Panicked("boom".to_string())));
        assert_eq!(sibling.join().await, Ok(7));
        tracker.drain().await;
        assert!(sibling_done.load(Ordering::SeqCst));
        assert_eq!(tracker.size(), 0);
    }

    #[tokio::test]
    async fn test_cancel_removes_unit() {
        let tracker = tracker();
        let handle = tracker.launch("forever", std::future::pending::<()>());
        tokio::task::yield_now().await;
        assert_eq!(tracker.size(), 1);

        handle.cancel();
        assert_eq!(handle.join().await, Err(TaskError::Cancelled));
        tracker.drain().await;
        assert_eq!(tracker.size(), 0);
    }

    #[tokio::test]
    async fn test_cancel_all_stops_later_launches() {
        let tracker = tracker();
        tracker.cancel_all();
        assert!(tracker.is_cancelled());
        let handle = tracker.launch("late", std::future::pending::<()>());
        assert_eq!(handle.join().await, Err(TaskError::Cancelled));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_drains() {
        let tracker = tracker();
        for _ in 0..10 {
            tracker.launch("sleep", tokio::time::sleep(Duration::from_millis(10)));
        }
        let first = Arc::clone(&tracker);
        let second = Arc::clone(&tracker);
        let (a, b) = tokio::join!(
            tokio::spawn(async move { first.drain().await }),
            tokio::spawn(async move { second.drain().await }),
        );
        a.unwrap();
        b.unwrap();
        assert_eq!(tracker.size(), 0);

        // still usable after a drain
        let handle = tracker.launch("after", async { "ok" });
        assert_eq!(handle.join().await, Ok("ok"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_many_concurrent_drains_never_hang() {
        let tracker = tracker();
        for round in 0..1000 {
            if round % 10 == 0 {
                tracker.launch("short", tokio::task::yield_now());
            }
            let drains: Vec<_> = (0..16)
                .map(|_| {
                    let tracker = Arc::clone(&tracker);
                    tokio::spawn(async move { tracker.drain().await })
                })
                .collect();
            let all = futures::future::join_all(drains);
            let joined = tokio::time::timeout(Duration::from_secs(2), all)
                .await
                .unwrap_or_else(|_| panic!("drain hung on round {round}, size={}", tracker.size()));
            assert!(joined.iter().all(Result::is_ok));
            assert_eq!(tracker.size(), 0);
        }
    }

    #[tokio::test]
    async fn test_drain_after_drain_waits_for_new_units() {
        let tracker = tracker();
        tracker.drain().await;

        let done = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&done);
        tracker.launch("late", async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            flag.store(true, Ordering::SeqCst);
        });
        assert_eq!(tracker.size(), 1);

        tracker.drain().await;
        assert!(done.load(Ordering::SeqCst));
        assert_eq!(tracker.size(), 0);
    }
}
