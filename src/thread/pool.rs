//! Worker pool for the preemptive model.
//!
//! Workers pull ready items off the shared [`WorkQueue`] and park briefly
//! when it runs dry. The pool can grow and shrink at runtime; shrinking
//! retires workers as they next wake.

use crate::error::{Error, ErrorKind, Result};
use crate::thread::work::WorkQueue;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

struct PoolShared {
    queue: Arc<WorkQueue>,
    target: AtomicUsize,
    alive: AtomicUsize,
    stop: AtomicBool,
}

/// A fixed-purpose worker pool draining the work queue.
pub struct ThreadPool {
    shared: Arc<PoolShared>,
    workers: Mutex<Vec<std::thread::JoinHandle<()>>>,
    next_worker: AtomicUsize,
}

impl ThreadPool {
    /// Spawns a pool of `size` workers over `queue`.
    #[must_use]
    pub fn new(queue: Arc<WorkQueue>, size: usize) -> Self {
        let shared = Arc::new(PoolShared {
            queue,
            target: AtomicUsize::new(size),
            alive: AtomicUsize::new(0),
            stop: AtomicBool::new(false),
        });
        let pool = Self {
            shared,
            workers: Mutex::new(Vec::new()),
            next_worker: AtomicUsize::new(0),
        };
        pool.spawn_to_target();
        pool
    }

    fn spawn_to_target(&self) {
        let mut workers = self.workers.lock();
        while self.shared.alive.load(Ordering::SeqCst) < self.shared.target.load(Ordering::SeqCst) {
            let shared = Arc::clone(&self.shared);
            shared.alive.fetch_add(1, Ordering::SeqCst);
            let index = self.next_worker.fetch_add(1, Ordering::SeqCst);
            let handle = std::thread::Builder::new()
                .name(format!("halcyon-worker-{index}"))
                .spawn(move || loop {
                    if shared.stop.load(Ordering::SeqCst) {
                        shared.alive.fetch_sub(1, Ordering::SeqCst);
                        break;
                    }
                    // Retire when the pool shrank below our headcount. The
                    // compare-exchange claims exactly one retirement so
                    // concurrent workers cannot overshoot the target.
                    let alive = shared.alive.load(Ordering::SeqCst);
                    if alive > shared.target.load(Ordering::SeqCst) {
                        if shared
                            .alive
                            .compare_exchange(alive, alive - 1, Ordering::SeqCst, Ordering::SeqCst)
                            .is_ok()
                        {
                            break;
                        }
                        continue;
                    }
                    if !shared.queue.run_one() {
                        shared.queue.wait_for_work(Duration::from_millis(10));
                    }
                })
                .expect("spawn pool worker");
            workers.push(handle);
        }
    }

    /// Current worker count.
    #[must_use]
    pub fn size(&self) -> usize {
        self.shared.alive.load(Ordering::SeqCst)
    }

    /// Resizes the pool. Shrinking takes effect as workers next wake.
    pub fn resize(&self, size: usize) -> Result<()> {
        if size == 0 {
            return Err(Error::new(
                ErrorKind::InvalidParameters,
                "pool size must be nonzero",
            ));
        }
        self.shared.target.store(size, Ordering::SeqCst);
        self.shared.queue.wake_all();
        self.spawn_to_target();
        Ok(())
    }

    /// Stops every worker and joins them.
    pub fn shutdown(&self) {
        self.shared.stop.store(true, Ordering::SeqCst);
        self.shared.queue.wake_all();
        let mut workers = self.workers.lock();
        for handle in workers.drain(..) {
            let _ = handle.join();
        }
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl core::fmt::Debug for ThreadPool {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ThreadPool")
            .field("size", &self.size())
            .finish()
    }
}
