//! Threading façade.
//!
//! One contract over four execution models. The broker selects the model
//! at construction (platform cores + optional override), hands out
//! model-gated primitives, and runs the work queue on whatever execution
//! substrate the model allows: a worker pool on preemptive platforms, the
//! cooperative `tick` everywhere else.

pub mod coop;
pub mod model;
pub mod pool;
pub mod primitives;
pub mod work;

pub use coop::CoopScheduler;
pub use model::{select_model, ThreadingModel};
pub use pool::ThreadPool;
pub use primitives::{
    HalBarrier, HalCondVar, HalEvent, HalMutex, HalRecursiveMutex, HalRwLock, HalSemaphore,
    PrimitiveKind, SyncPrimitives,
};
pub use work::{WorkHandle, WorkId, WorkItem, WorkMode, WorkPriority, WorkQueue, WorkStats, WorkStatus};

use crate::error::{Error, ErrorKind, Result};
use crate::types::platform::PlatformInfo;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// The threading façade.
pub struct ThreadBroker {
    model: ThreadingModel,
    primitives: SyncPrimitives,
    work: Arc<WorkQueue>,
    scheduler: CoopScheduler,
    pool: Mutex<Option<ThreadPool>>,
}

impl ThreadBroker {
    /// Builds the broker for a platform.
    ///
    /// `requested` overrides model auto-detection; `quantum` is the
    /// cooperative tick budget; `pool_size` overrides the preemptive
    /// default of `max(1, cores - 1)`.
    pub fn new(
        platform: &PlatformInfo,
        requested: Option<ThreadingModel>,
        quantum: Duration,
        pool_size: Option<usize>,
    ) -> Result<Self> {
        let model = select_model(platform, requested)?;
        let work = Arc::new(WorkQueue::new(model.may_block()));
        let pool = if model == ThreadingModel::Preemptive {
            let size = pool_size.unwrap_or_else(|| platform.cpu_cores.saturating_sub(1).max(1));
            Some(ThreadPool::new(Arc::clone(&work), size))
        } else {
            None
        };
        Ok(Self {
            model,
            primitives: SyncPrimitives::new(model),
            scheduler: CoopScheduler::new(Arc::clone(&work), quantum),
            work,
            pool: Mutex::new(pool),
        })
    }

    /// The selected model. Immutable after construction.
    #[must_use]
    pub const fn model(&self) -> ThreadingModel {
        self.model
    }

    /// Model-gated primitive factory.
    #[must_use]
    pub const fn primitives(&self) -> &SyncPrimitives {
        &self.primitives
    }

    /// The shared work queue.
    #[must_use]
    pub fn work(&self) -> Arc<WorkQueue> {
        Arc::clone(&self.work)
    }

    /// Runs ready work for one quantum. The only execution path on
    /// non-preemptive models; harmless (and occasionally useful) on
    /// preemptive ones.
    pub fn tick(&self) -> usize {
        self.scheduler.tick()
    }

    /// Current worker pool size (1 on non-preemptive models).
    #[must_use]
    pub fn pool_size(&self) -> usize {
        self.pool.lock().as_ref().map_or(1, ThreadPool::size)
    }

    /// Resizes the worker pool. Preemptive only.
    pub fn resize_pool(&self, size: usize) -> Result<()> {
        match self.pool.lock().as_ref() {
            Some(pool) => pool.resize(size),
            None => Err(Error::new(
                ErrorKind::FeatureNotSupported,
                "pool resize requires the preemptive model",
            )
            .with_operation("resize_pool")),
        }
    }

    /// Stops the pool and wakes every waiter.
    pub fn shutdown(&self) -> Result<()> {
        if let Some(pool) = self.pool.lock().take() {
            pool.shutdown();
        }
        self.work.wake_all();
        Ok(())
    }
}

impl core::fmt::Debug for ThreadBroker {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ThreadBroker")
            .field("model", &self.model)
            .field("pool_size", &self.pool_size())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::capability::Capability;
    use crate::types::platform::PlatformProbe;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn preemptive_broker() -> ThreadBroker {
        let platform = PlatformProbe::detect()
            .with_cpu_cores(4)
            .with_capability(Capability::Threading)
            .finish()
            .expect("probe");
        ThreadBroker::new(&platform, None, Duration::from_millis(1), Some(2)).expect("broker")
    }

    fn single_threaded_broker() -> ThreadBroker {
        let platform = PlatformProbe::minimal().finish().expect("probe");
        ThreadBroker::new(&platform, None, Duration::from_millis(1), None).expect("broker")
    }

    #[test]
    fn preemptive_pool_executes_work() {
        let broker = preemptive_broker();
        assert_eq!(broker.model(), ThreadingModel::Preemptive);
        assert_eq!(broker.pool_size(), 2);
        let ran = Arc::new(AtomicUsize::new(0));
        let ran2 = Arc::clone(&ran);
        let handle = broker
            .work()
            .submit(WorkItem::new("job", WorkPriority::Normal, move || {
                ran2.fetch_add(1, Ordering::SeqCst);
            }))
            .expect("submit");
        broker
            .work()
            .wait(handle, Duration::from_secs(5))
            .expect("wait");
        assert_eq!(ran.load(Ordering::SeqCst), 1);
        broker.shutdown().expect("shutdown");
    }

    #[test]
    fn single_threaded_runs_via_tick() {
        let broker = single_threaded_broker();
        assert_eq!(broker.model(), ThreadingModel::SingleThreaded);
        assert_eq!(broker.pool_size(), 1);
        let ran = Arc::new(AtomicUsize::new(0));
        let ran2 = Arc::clone(&ran);
        broker
            .work()
            .submit(WorkItem::new("job", WorkPriority::Normal, move || {
                ran2.fetch_add(1, Ordering::SeqCst);
            }))
            .expect("submit");
        assert_eq!(ran.load(Ordering::SeqCst), 0);
        assert_eq!(broker.tick(), 1);
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn resize_is_preemptive_only() {
        let broker = single_threaded_broker();
        assert_eq!(
            broker.resize_pool(4).unwrap_err().kind(),
            ErrorKind::FeatureNotSupported
        );
        let broker = preemptive_broker();
        broker.resize_pool(3).expect("resize");
        assert_eq!(broker.pool_size(), 3);
        broker.shutdown().expect("shutdown");
    }

    #[test]
    fn primitives_follow_the_model() {
        let broker = single_threaded_broker();
        assert_eq!(
            broker.primitives().mutex(()).unwrap_err().kind(),
            ErrorKind::FeatureNotSupported
        );
        assert!(broker.primitives().event().is_ok());
    }
}
