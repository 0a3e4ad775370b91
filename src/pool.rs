//! Parallel execution substrate.
//!
//! # Worker Pool
//!
//! Every numerical operation in the crate funnels through a [`ThreadPool`]: a fixed
//! set of worker threads, built once, that executes index-range work and arbitrary
//! callables.
//!
//! It supports:
//! - `submit` — enqueue a callable and get a [`TaskHandle`] to block on its result
//! - `parallel_for` — visit every index of a range exactly once, one contiguous slice
//!   per worker, blocking until all slices are done
//! - `parallel_chunks_mut` — the same partitioning over a mutable buffer split into
//!   disjoint rows, so workers can write without sharing a destination cell
//! - `shutdown` — stop accepting work and drain what is already queued
//!
//! ## Design Highlights
//! - Backed by a [`rayon`] pool; `parallel_*` calls run inside a rayon scope so the
//!   closures may borrow from the caller's stack
//! - A panic inside any task is captured and returned as [`Error::TaskFailed`] to the
//!   thread that waits on it; workers never die silently
//! - The handle is cheap to clone; the pool lives until the last clone is dropped, at
//!   which point queued tasks are drained before the workers are released. When that
//!   last clone was captured by a task, the drop happens on a worker and does not
//!   block; the queued tasks still run before the workers exit
//! - There is no global instance: the program entry point constructs one pool and
//!   hands clones to everything that computes
//!
//! ## Example
//!
//! ```rust
//! use feedforward::pool::ThreadPool;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! let pool = ThreadPool::new(4).unwrap();
//! let visited = AtomicUsize::new(0);
//! pool.parallel_for(0..100, |_| {
//!     visited.fetch_add(1, Ordering::Relaxed);
//! }).unwrap();
//! assert_eq!(visited.load(Ordering::Relaxed), 100);
//!
//! let answer = pool.submit(|| 6 * 7).unwrap().wait().unwrap();
//! assert_eq!(answer, 42);
//! ```

use std::any::Any;
use std::fmt;
use std::num::NonZeroUsize;
use std::ops::Range;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use rayon::{Scope, ThreadPoolBuilder};
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Environment variable that overrides the derived thread count.
pub const THREADS_ENV: &str = "FEEDFORWARD_THREADS";

/// Handle to a fixed-size worker pool.
///
/// Cloning the handle shares the same workers.
#[derive(Clone)]
pub struct ThreadPool {
    inner: Arc<Inner>,
}

struct Inner {
    workers: rayon::ThreadPool,
    tracker: Arc<Tracker>,
}

/// Counts submitted tasks so shutdown can drain them.
#[derive(Default)]
struct Tracker {
    state: Mutex<TrackerState>,
    idle: Condvar,
}

#[derive(Default)]
struct TrackerState {
    stopped: bool,
    in_flight: usize,
}

impl Tracker {
    fn lock(&self) -> MutexGuard<'_, TrackerState> {
        // the guarded state is two plain fields; a poisoned lock still holds valid data
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_running(&self) -> Result<()> {
        if self.lock().stopped {
            return Err(stopped_error());
        }
        Ok(())
    }

    fn begin(&self) -> Result<()> {
        let mut state = self.lock();
        if state.stopped {
            return Err(stopped_error());
        }
        state.in_flight += 1;
        Ok(())
    }

    fn finish(&self) {
        let mut state = self.lock();
        state.in_flight -= 1;
        if state.in_flight == 0 {
            self.idle.notify_all();
        }
    }

    /// Returns `true` if this call performed the transition to stopped.
    fn stop(&self) -> bool {
        let mut state = self.lock();
        let was_running = !state.stopped;
        state.stopped = true;
        was_running
    }

    /// Returns `true` if this call performed the transition to stopped.
    fn stop_and_drain(&self) -> bool {
        let mut state = self.lock();
        let was_running = !state.stopped;
        state.stopped = true;
        while state.in_flight > 0 {
            state = self
                .idle
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        was_running
    }
}

fn stopped_error() -> Error {
    Error::InvalidState("worker pool has been shut down".to_owned())
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_owned()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "task panicked with a non-string payload".to_owned()
    }
}

/// Splits `range` into at most `parts` contiguous, non-empty slices.
fn split_range(range: Range<usize>, parts: usize) -> Vec<Range<usize>> {
    let len = range.len();
    if len == 0 {
        return Vec::new();
    }
    let per_part = len.div_ceil(parts.max(1));
    (0..parts)
        .map(|p| {
            let start = range.start + p * per_part;
            let end = (start + per_part).min(range.end);
            start..end
        })
        .filter(|slice| slice.start < slice.end)
        .collect()
}

impl ThreadPool {
    /// Starts a pool with exactly `threads` workers.
    ///
    /// # Errors
    /// - [`Error::InvalidArgument`] if `threads` is zero.
    /// - [`Error::InvalidState`] if the operating system refuses to spawn the workers.
    pub fn new(threads: usize) -> Result<Self> {
        if threads == 0 {
            return Err(Error::invalid("worker pool needs at least one thread"));
        }

        let workers = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("feedforward-worker-{i}"))
            .build()
            .map_err(|e| Error::InvalidState(format!("failed to start worker pool: {e}")))?;

        debug!(threads, "worker pool started");

        Ok(Self {
            inner: Arc::new(Inner {
                workers,
                tracker: Arc::new(Tracker::default()),
            }),
        })
    }

    /// Starts a pool sized from the hardware.
    ///
    /// If [`THREADS_ENV`] holds a positive integer it wins; otherwise the count comes
    /// from [`std::thread::available_parallelism`], falling back to one thread.
    ///
    /// # Errors
    /// Same as [`ThreadPool::new`].
    pub fn with_available_parallelism() -> Result<Self> {
        let from_env = std::env::var(THREADS_ENV)
            .ok()
            .and_then(|raw| raw.trim().parse::<usize>().ok())
            .filter(|&n| n > 0);

        let threads = from_env.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(NonZeroUsize::get)
                .unwrap_or(1)
        });

        Self::new(threads)
    }

    /// Number of worker threads.
    #[must_use]
    pub fn threads(&self) -> usize {
        self.inner.workers.current_num_threads()
    }

    /// Whether [`ThreadPool::shutdown`] has been called on any clone of this handle.
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.inner.tracker.ensure_running().is_err()
    }

    /// Enqueues `job` and returns a handle to its result.
    ///
    /// # Errors
    /// [`Error::InvalidState`] if the pool has been shut down.
    pub fn submit<F, T>(&self, job: F) -> Result<TaskHandle<T>>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        if let Err(err) = self.inner.tracker.begin() {
            warn!("rejected task submitted after worker pool shutdown");
            return Err(err);
        }

        let (sender, receiver) = mpsc::sync_channel(1);
        let tracker = Arc::clone(&self.inner.tracker);

        self.inner.workers.spawn(move || {
            let outcome = panic::catch_unwind(AssertUnwindSafe(job)).map_err(panic_message);
            // a dropped handle just means nobody wants the result
            let _ = sender.send(outcome);
            tracker.finish();
        });

        Ok(TaskHandle { receiver })
    }

    /// Calls `body(i)` for every `i` in `range`, exactly once, and blocks until done.
    ///
    /// The range is cut into one contiguous slice per worker. No ordering holds between
    /// slices. An empty range returns immediately.
    ///
    /// # Errors
    /// - [`Error::InvalidState`] if the pool has been shut down.
    /// - [`Error::TaskFailed`] if `body` panicked for some index.
    pub fn parallel_for<F>(&self, range: Range<usize>, body: F) -> Result<()>
    where
        F: Fn(usize) + Sync,
    {
        self.inner.tracker.ensure_running()?;
        if range.is_empty() {
            return Ok(());
        }

        let slices = split_range(range, self.threads());
        let body = &body;

        self.scoped(move |scope| {
            for slice in slices {
                scope.spawn(move |_| slice.for_each(body));
            }
        })
    }

    /// Splits `data` into rows of `chunk_len` and calls `body(row_index, row)` for each.
    ///
    /// Rows are grouped into one contiguous run per worker, so every worker owns a
    /// disjoint part of the buffer. Blocks until all rows are processed.
    ///
    /// # Errors
    /// - [`Error::InvalidArgument`] if `chunk_len` is zero or does not divide the buffer.
    /// - [`Error::InvalidState`] if the pool has been shut down.
    /// - [`Error::TaskFailed`] if `body` panicked.
    pub fn parallel_chunks_mut<T, F>(&self, data: &mut [T], chunk_len: usize, body: F) -> Result<()>
    where
        T: Send,
        F: Fn(usize, &mut [T]) + Sync,
    {
        self.inner.tracker.ensure_running()?;
        if data.is_empty() {
            return Ok(());
        }
        if chunk_len == 0 || data.len() % chunk_len != 0 {
            return Err(Error::invalid(format!(
                "buffer of {} elements cannot be split into rows of {chunk_len}",
                data.len()
            )));
        }

        let rows = data.len() / chunk_len;
        let rows_per_worker = rows.div_ceil(self.threads());
        let body = &body;

        self.scoped(move |scope| {
            for (group, run) in data.chunks_mut(rows_per_worker * chunk_len).enumerate() {
                scope.spawn(move |_| {
                    let first_row = group * rows_per_worker;
                    for (offset, row) in run.chunks_mut(chunk_len).enumerate() {
                        body(first_row + offset, row);
                    }
                });
            }
        })
    }

    /// Stops accepting work and blocks until every submitted task has run.
    ///
    /// Idempotent. Must not be called from inside a task running on this pool.
    pub fn shutdown(&self) {
        if self.inner.tracker.stop_and_drain() {
            debug!("worker pool drained and stopped");
        }
    }

    fn scoped<'scope, OP>(&self, op: OP) -> Result<()>
    where
        OP: FnOnce(&Scope<'scope>) + Send,
    {
        panic::catch_unwind(AssertUnwindSafe(|| self.inner.workers.scope(op)))
            .map_err(|payload| Error::TaskFailed(panic_message(payload)))
    }
}

impl fmt::Debug for ThreadPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadPool")
            .field("threads", &self.threads())
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        // The last handle can be released by a task that captured it. Waiting here
        // would block on that task's own in-flight count; rayon still runs whatever
        // is queued before its workers exit.
        if self.workers.current_thread_index().is_some() {
            if self.tracker.stop() {
                debug!("worker pool stopped from one of its own tasks");
            }
            return;
        }
        if self.tracker.stop_and_drain() {
            debug!("worker pool drained and stopped");
        }
    }
}

/// Blocking handle to the result of a [`ThreadPool::submit`] call.
#[derive(Debug)]
pub struct TaskHandle<T> {
    receiver: Receiver<std::result::Result<T, String>>,
}

impl<T> TaskHandle<T> {
    /// Blocks until the task has run and returns its value.
    ///
    /// # Errors
    /// - [`Error::TaskFailed`] if the task panicked; the panic message is kept.
    /// - [`Error::InvalidState`] if the task was discarded without running.
    pub fn wait(self) -> Result<T> {
        match self.receiver.recv() {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(msg)) => Err(Error::TaskFailed(msg)),
            Err(_) => Err(Error::InvalidState(
                "task was dropped before it produced a result".to_owned(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn split_range_covers_every_index_once() {
        for len in 0..40 {
            for parts in 1..9 {
                let slices = split_range(3..3 + len, parts);
                assert!(slices.len() <= parts);
                let flat: Vec<usize> = slices.into_iter().flatten().collect();
                assert_eq!(flat, (3..3 + len).collect::<Vec<_>>());
            }
        }
    }

    #[test]
    fn zero_threads_is_rejected() {
        assert!(matches!(ThreadPool::new(0), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn parallel_chunks_mut_rejects_uneven_rows() {
        let pool = ThreadPool::new(2).unwrap();
        let mut data = vec![0.0_f64; 7];
        let result = pool.parallel_chunks_mut(&mut data, 3, |_, _| {});
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn drop_drains_outstanding_tasks() {
        let counter = Arc::new(AtomicUsize::new(0));
        {
            let pool = ThreadPool::new(2).unwrap();
            for _ in 0..8 {
                let counter = Arc::clone(&counter);
                pool.submit(move || {
                    std::thread::sleep(Duration::from_millis(5));
                    counter.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap();
            }
        }
        assert_eq!(counter.load(Ordering::SeqCst), 8);
    }
}
