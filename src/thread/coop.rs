//! Cooperative scheduler.
//!
//! On models without a worker pool, the embedder drives execution by
//! calling [`CoopScheduler::tick`] from its main loop. A tick runs ready
//! work for one quantum and returns; nothing runs between ticks.

use crate::thread::work::WorkQueue;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Quantum-bounded executor over the work queue.
#[derive(Debug)]
pub struct CoopScheduler {
    queue: Arc<WorkQueue>,
    quantum: Duration,
}

impl CoopScheduler {
    /// Creates a scheduler with the given quantum.
    #[must_use]
    pub fn new(queue: Arc<WorkQueue>, quantum: Duration) -> Self {
        Self { queue, quantum }
    }

    /// The configured quantum.
    #[must_use]
    pub const fn quantum(&self) -> Duration {
        self.quantum
    }

    /// Runs ready work until the quantum elapses or the queue runs dry.
    /// Returns the number of items executed.
    pub fn tick(&self) -> usize {
        let deadline = Instant::now() + self.quantum;
        let mut executed = 0;
        while Instant::now() < deadline {
            if self.queue.run_one() {
                executed += 1;
            } else {
                break;
            }
        }
        executed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::thread::work::{WorkItem, WorkPriority};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn tick_runs_ready_work() {
        let queue = Arc::new(WorkQueue::new(false));
        let scheduler = CoopScheduler::new(Arc::clone(&queue), Duration::from_millis(10));
        let ran = Arc::new(AtomicUsize::new(0));
        for _ in 0..5 {
            let ran = Arc::clone(&ran);
            queue
                .submit(WorkItem::new("tick-job", WorkPriority::Normal, move || {
                    ran.fetch_add(1, Ordering::SeqCst);
                }))
                .expect("submit");
        }
        let executed = scheduler.tick();
        assert_eq!(executed, 5);
        assert_eq!(ran.load(Ordering::SeqCst), 5);
        assert_eq!(scheduler.tick(), 0, "queue is dry");
    }

    #[test]
    fn nothing_runs_between_ticks() {
        let queue = Arc::new(WorkQueue::new(false));
        let _scheduler = CoopScheduler::new(Arc::clone(&queue), Duration::from_millis(1));
        let ran = Arc::new(AtomicUsize::new(0));
        let ran2 = Arc::clone(&ran);
        queue
            .submit(WorkItem::new("pending", WorkPriority::Normal, move || {
                ran2.fetch_add(1, Ordering::SeqCst);
            }))
            .expect("submit");
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }
}
