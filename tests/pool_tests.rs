use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, mpsc};
use std::time::Duration;

use feedforward::Error;
use feedforward::pool::{THREADS_ENV, ThreadPool};

fn visits(pool: &ThreadPool, n: usize) -> Vec<usize> {
    let counters: Vec<AtomicUsize> = (0..n).map(|_| AtomicUsize::new(0)).collect();
    pool.parallel_for(0..n, |i| {
        counters[i].fetch_add(1, Ordering::Relaxed);
    })
    .unwrap();
    counters.into_iter().map(AtomicUsize::into_inner).collect()
}

#[test]
fn test_parallel_for_visits_each_index_once() {
    for threads in [1, 2, 3, 8] {
        let pool = ThreadPool::new(threads).unwrap();
        for n in [0, 1, 2, 7, 64, 1001] {
            let counts = visits(&pool, n);
            assert_eq!(counts.len(), n);
            assert!(counts.iter().all(|&c| c == 1), "threads={threads} n={n}");
        }
    }
}

#[test]
fn test_parallel_for_empty_range_never_calls_body() {
    let pool = ThreadPool::new(2).unwrap();
    pool.parallel_for(5..5, |_| panic!("called")).unwrap();
}

#[test]
fn test_parallel_chunks_mut_writes_disjoint_rows() {
    let pool = ThreadPool::new(3).unwrap();
    let mut data = vec![0usize; 40];
    pool.parallel_chunks_mut(&mut data, 4, |row, cells| {
        for (c, cell) in cells.iter_mut().enumerate() {
            *cell = row * 4 + c;
        }
    })
    .unwrap();
    assert_eq!(data, (0..40).collect::<Vec<_>>());
}

#[test]
fn test_submit_returns_value() {
    let pool = ThreadPool::new(2).unwrap();
    let handles: Vec<_> = (0..10).map(|i| pool.submit(move || i * i).unwrap()).collect();
    let results: Vec<i32> = handles.into_iter().map(|h| h.wait().unwrap()).collect();
    assert_eq!(results, (0..10).map(|i| i * i).collect::<Vec<_>>());
}

#[test]
fn test_panic_in_task_reaches_the_waiter() {
    let pool = ThreadPool::new(2).unwrap();
    let handle = pool.submit(|| -> u32 { panic!("boom") }).unwrap();
    match handle.wait() {
        Err(Error::TaskFailed(msg)) => assert!(msg.contains("boom")),
        other => panic!("expected a task failure, got {other:?}"),
    }
    // the pool keeps working afterwards
    assert_eq!(pool.submit(|| 1).unwrap().wait().unwrap(), 1);
}

#[test]
fn test_panic_in_parallel_for_is_reported() {
    let pool = ThreadPool::new(2).unwrap();
    let result = pool.parallel_for(0..10, |i| assert!(i != 7, "index seven"));
    assert!(matches!(result, Err(Error::TaskFailed(_))));
}

#[test]
fn test_shutdown_drains_then_rejects() {
    let pool = ThreadPool::new(2).unwrap();
    let done = Arc::new(AtomicUsize::new(0));
    for _ in 0..16 {
        let done = Arc::clone(&done);
        pool.submit(move || {
            std::thread::sleep(Duration::from_millis(2));
            done.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
    }

    pool.shutdown();
    assert_eq!(done.load(Ordering::SeqCst), 16);
    assert!(pool.is_shut_down());

    assert!(matches!(pool.submit(|| ()), Err(Error::InvalidState(_))));
    assert!(matches!(pool.parallel_for(0..4, |_| ()), Err(Error::InvalidState(_))));

    // idempotent
    pool.shutdown();
}

#[test]
fn test_clones_share_workers() {
    let pool = ThreadPool::new(3).unwrap();
    let other = pool.clone();
    assert_eq!(other.threads(), 3);
    other.shutdown();
    assert!(pool.is_shut_down());
}

/// Reports on a channel when the value holding it is dropped.
struct DropSignal(mpsc::Sender<()>);

impl Drop for DropSignal {
    fn drop(&mut self) {
        let _ = self.0.send(());
    }
}

#[test]
fn test_last_handle_released_by_a_task() {
    let pool = ThreadPool::new(1).unwrap();
    let (signal, released) = mpsc::channel();
    let captured = (pool.clone(), DropSignal(signal));

    let first = pool
        .submit(move || {
            let captured = captured;
            std::thread::sleep(Duration::from_millis(200));
            captured.0.threads()
        })
        .unwrap();
    let queued = pool.submit(|| 5).unwrap();
    drop(pool);

    assert_eq!(first.wait().unwrap(), 1);
    released
        .recv_timeout(Duration::from_secs(5))
        .expect("worker stuck releasing the pool");
    // work queued behind the releasing task still runs
    assert_eq!(queued.wait().unwrap(), 5);
}

#[test]
fn test_thread_count_from_environment() {
    let hardware = std::thread::available_parallelism().map_or(1, NonZeroUsize::get);

    // SAFETY: no other test in this binary reads or writes the variable
    unsafe { std::env::remove_var(THREADS_ENV) };
    assert_eq!(ThreadPool::with_available_parallelism().unwrap().threads(), hardware);

    unsafe { std::env::set_var(THREADS_ENV, " 3 ") };
    assert_eq!(ThreadPool::with_available_parallelism().unwrap().threads(), 3);

    // zero and garbage fall back to the hardware count
    for raw in ["0", "-2", "many", ""] {
        unsafe { std::env::set_var(THREADS_ENV, raw) };
        assert_eq!(ThreadPool::with_available_parallelism().unwrap().threads(), hardware, "{raw:?}");
    }

    unsafe { std::env::remove_var(THREADS_ENV) };
}
