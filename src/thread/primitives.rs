//! Model-gated synchronization primitives.
//!
//! One contract, four behaviors:
//!
//! - **Preemptive** — standard blocking semantics.
//! - **Cooperative** — operations succeed when they can complete without
//!   blocking and otherwise yield to the scheduler in a loop; timed
//!   variants give up with `Timeout`.
//! - **WebWorkers** — like cooperative, minus primitives that require a
//!   shared blocking wait (condition variables, barriers).
//! - **SingleThreaded** — only the recursive mutex and the event exist;
//!   everything else fails at construction with `FeatureNotSupported`.
//!
//! Construction is where gating happens, so per-operation paths stay
//! branch-light.

use crate::error::{Error, ErrorKind, Result};
use crate::thread::model::ThreadingModel;
use parking_lot::{Condvar, Mutex, MutexGuard, ReentrantMutex, ReentrantMutexGuard, RwLock};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// The closed set of primitive kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum PrimitiveKind {
    /// Mutual exclusion.
    Mutex,
    /// Re-entrant mutual exclusion.
    RecursiveMutex,
    /// Counting semaphore.
    Semaphore,
    /// Binary semaphore.
    BinarySemaphore,
    /// Condition variable.
    CondVar,
    /// Manual-reset event.
    Event,
    /// N-party barrier.
    Barrier,
    /// Reader-writer lock.
    RwLock,
}

impl PrimitiveKind {
    /// Every kind, in declaration order.
    pub const ALL: [Self; 8] = [
        Self::Mutex,
        Self::RecursiveMutex,
        Self::Semaphore,
        Self::BinarySemaphore,
        Self::CondVar,
        Self::Event,
        Self::Barrier,
        Self::RwLock,
    ];

    /// True if the kind exists under the given model.
    #[must_use]
    pub const fn available_on(self, model: ThreadingModel) -> bool {
        match model {
            ThreadingModel::Preemptive => true,
            ThreadingModel::Cooperative => !matches!(self, Self::CondVar),
            ThreadingModel::WebWorkers => !matches!(self, Self::CondVar | Self::Barrier),
            ThreadingModel::SingleThreaded => matches!(self, Self::RecursiveMutex | Self::Event),
        }
    }
}

fn gate(model: ThreadingModel, kind: PrimitiveKind) -> Result<()> {
    if kind.available_on(model) {
        Ok(())
    } else {
        Err(Error::new(
            ErrorKind::FeatureNotSupported,
            "primitive unavailable under this threading model",
        ))
    }
}

/// Yield-loop acquire shared by the non-blocking models.
fn yield_until<T>(
    deadline: Option<Instant>,
    mut attempt: impl FnMut() -> Option<T>,
) -> Result<T> {
    loop {
        if let Some(value) = attempt() {
            return Ok(value);
        }
        if let Some(deadline) = deadline {
            if Instant::now() >= deadline {
                return Err(Error::new(ErrorKind::Timeout, "acquire timed out"));
            }
        }
        std::thread::yield_now();
    }
}

/// Mutual exclusion over a value.
#[derive(Debug)]
pub struct HalMutex<T> {
    model: ThreadingModel,
    inner: Mutex<T>,
}

impl<T> HalMutex<T> {
    fn new(model: ThreadingModel, value: T) -> Self {
        Self {
            model,
            inner: Mutex::new(value),
        }
    }

    /// Acquires the lock, blocking or yielding per the model.
    pub fn lock(&self) -> Result<MutexGuard<'_, T>> {
        if self.model.may_block() {
            Ok(self.inner.lock())
        } else {
            yield_until(None, || self.inner.try_lock())
        }
    }

    /// Acquires the lock or gives up after `timeout`.
    pub fn lock_timeout(&self, timeout: Duration) -> Result<MutexGuard<'_, T>> {
        if self.model.may_block() {
            self.inner
                .try_lock_for(timeout)
                .ok_or_else(|| Error::new(ErrorKind::Timeout, "lock timed out"))
        } else {
            yield_until(Some(Instant::now() + timeout), || self.inner.try_lock())
        }
    }

    /// Acquires the lock only if free right now.
    pub fn try_lock(&self) -> Result<MutexGuard<'_, T>> {
        self.inner
            .try_lock()
            .ok_or_else(|| Error::new(ErrorKind::WouldBlock, "mutex is held"))
    }
}

/// Re-entrant mutual exclusion over a value.
#[derive(Debug)]
pub struct HalRecursiveMutex<T> {
    model: ThreadingModel,
    inner: ReentrantMutex<T>,
}

impl<T> HalRecursiveMutex<T> {
    fn new(model: ThreadingModel, value: T) -> Self {
        Self {
            model,
            inner: ReentrantMutex::new(value),
        }
    }

    /// Acquires the lock; re-entry from the owning context succeeds.
    pub fn lock(&self) -> Result<ReentrantMutexGuard<'_, T>> {
        if self.model.may_block() {
            Ok(self.inner.lock())
        } else {
            yield_until(None, || self.inner.try_lock())
        }
    }

    /// Acquires the lock only if available to this context right now.
    pub fn try_lock(&self) -> Result<ReentrantMutexGuard<'_, T>> {
        self.inner
            .try_lock()
            .ok_or_else(|| Error::new(ErrorKind::WouldBlock, "recursive mutex is held"))
    }
}

/// Counting semaphore.
#[derive(Debug)]
pub struct HalSemaphore {
    model: ThreadingModel,
    max: usize,
    permits: Mutex<usize>,
    available: Condvar,
}

impl HalSemaphore {
    fn new(model: ThreadingModel, initial: usize, max: usize) -> Self {
        Self {
            model,
            max,
            permits: Mutex::new(initial.min(max)),
            available: Condvar::new(),
        }
    }

    /// Takes a permit, waiting up to `timeout` when given.
    pub fn acquire(&self, timeout: Option<Duration>) -> Result<()> {
        if self.model.may_block() {
            let mut permits = self.permits.lock();
            let deadline = timeout.map(|t| Instant::now() + t);
            while *permits == 0 {
                match deadline {
                    Some(deadline) => {
                        if self.available.wait_until(&mut permits, deadline).timed_out() {
                            return Err(Error::new(ErrorKind::Timeout, "semaphore acquire timed out"));
                        }
                    }
                    None => self.available.wait(&mut permits),
                }
            }
            *permits -= 1;
            Ok(())
        } else {
            let deadline = timeout.map(|t| Instant::now() + t);
            yield_until(deadline, || {
                let mut permits = self.permits.try_lock()?;
                if *permits > 0 {
                    *permits -= 1;
                    Some(())
                } else {
                    None
                }
            })
        }
    }

    /// Takes a permit only if one is free right now.
    pub fn try_acquire(&self) -> Result<()> {
        let mut permits = self.permits.lock();
        if *permits > 0 {
            *permits -= 1;
            Ok(())
        } else {
            Err(Error::new(ErrorKind::WouldBlock, "no permits available"))
        }
    }

    /// Returns a permit.
    pub fn release(&self) {
        let mut permits = self.permits.lock();
        if *permits < self.max {
            *permits += 1;
        }
        self.available.notify_one();
    }

    /// Permits currently available.
    #[must_use]
    pub fn permits(&self) -> usize {
        *self.permits.lock()
    }
}

/// Manual-reset event.
#[derive(Debug)]
pub struct HalEvent {
    model: ThreadingModel,
    set: Mutex<bool>,
    signal: Condvar,
}

impl HalEvent {
    fn new(model: ThreadingModel) -> Self {
        Self {
            model,
            set: Mutex::new(false),
            signal: Condvar::new(),
        }
    }

    /// Signals the event, releasing every waiter.
    pub fn set(&self) {
        *self.set.lock() = true;
        self.signal.notify_all();
    }

    /// Clears the event.
    pub fn reset(&self) {
        *self.set.lock() = false;
    }

    /// True if currently signaled.
    #[must_use]
    pub fn is_set(&self) -> bool {
        *self.set.lock()
    }

    /// Waits for the event.
    ///
    /// Under a non-blocking model an untimed wait on an unset event fails
    /// with `WouldBlock` rather than stalling the only context.
    pub fn wait(&self, timeout: Option<Duration>) -> Result<()> {
        if self.model.may_block() {
            let mut set = self.set.lock();
            let deadline = timeout.map(|t| Instant::now() + t);
            while !*set {
                match deadline {
                    Some(deadline) => {
                        if self.signal.wait_until(&mut set, deadline).timed_out() {
                            return Err(Error::new(ErrorKind::Timeout, "event wait timed out"));
                        }
                    }
                    None => self.signal.wait(&mut set),
                }
            }
            Ok(())
        } else if self.is_set() {
            Ok(())
        } else {
            match timeout {
                None => Err(Error::new(
                    ErrorKind::WouldBlock,
                    "untimed event wait would stall this context",
                )),
                Some(timeout) => {
                    yield_until(Some(Instant::now() + timeout), || self.is_set().then_some(()))
                }
            }
        }
    }
}

/// N-party barrier.
#[derive(Debug)]
pub struct HalBarrier {
    model: ThreadingModel,
    parties: usize,
    state: Mutex<(usize, u64)>,
    released: Condvar,
}

impl HalBarrier {
    fn new(model: ThreadingModel, parties: usize) -> Self {
        Self {
            model,
            parties,
            state: Mutex::new((0, 0)),
            released: Condvar::new(),
        }
    }

    /// Arrives at the barrier and waits for the full party.
    ///
    /// Returns true for exactly one arrival per generation (the leader).
    pub fn wait(&self) -> Result<bool> {
        let mut state = self.state.lock();
        let generation = state.1;
        state.0 += 1;
        if state.0 == self.parties {
            state.0 = 0;
            state.1 += 1;
            self.released.notify_all();
            return Ok(true);
        }
        if self.model.may_block() {
            while state.1 == generation {
                self.released.wait(&mut state);
            }
            Ok(false)
        } else {
            drop(state);
            yield_until(None, || {
                let state = self.state.try_lock()?;
                (state.1 != generation).then_some(false)
            })
        }
    }
}

/// Reader-writer lock over a value.
#[derive(Debug)]
pub struct HalRwLock<T> {
    model: ThreadingModel,
    inner: RwLock<T>,
}

impl<T> HalRwLock<T> {
    fn new(model: ThreadingModel, value: T) -> Self {
        Self {
            model,
            inner: RwLock::new(value),
        }
    }

    /// Acquires shared access.
    pub fn read(&self) -> Result<parking_lot::RwLockReadGuard<'_, T>> {
        if self.model.may_block() {
            Ok(self.inner.read())
        } else {
            yield_until(None, || self.inner.try_read())
        }
    }

    /// Acquires exclusive access.
    pub fn write(&self) -> Result<parking_lot::RwLockWriteGuard<'_, T>> {
        if self.model.may_block() {
            Ok(self.inner.write())
        } else {
            yield_until(None, || self.inner.try_write())
        }
    }

    /// Acquires shared access only if free right now.
    pub fn try_read(&self) -> Result<parking_lot::RwLockReadGuard<'_, T>> {
        self.inner
            .try_read()
            .ok_or_else(|| Error::new(ErrorKind::WouldBlock, "rwlock is write-held"))
    }
}

/// Condition variable paired with [`HalMutex`] guards.
///
/// Preemptive only: a shared blocking wait has no non-blocking rendition.
#[derive(Debug, Default)]
pub struct HalCondVar {
    inner: Condvar,
}

impl HalCondVar {
    /// Waits on the guard until notified or `timeout` passes.
    pub fn wait_for<T>(&self, guard: &mut MutexGuard<'_, T>, timeout: Duration) -> Result<()> {
        if self.inner.wait_for(guard, timeout).timed_out() {
            Err(Error::new(ErrorKind::Timeout, "condvar wait timed out"))
        } else {
            Ok(())
        }
    }

    /// Wakes one waiter.
    pub fn notify_one(&self) {
        self.inner.notify_one();
    }

    /// Wakes every waiter.
    pub fn notify_all(&self) {
        self.inner.notify_all();
    }
}

/// Factory for model-gated primitives.
#[derive(Debug, Clone, Copy)]
pub struct SyncPrimitives {
    model: ThreadingModel,
}

impl SyncPrimitives {
    /// Creates a factory for the given model.
    #[must_use]
    pub const fn new(model: ThreadingModel) -> Self {
        Self { model }
    }

    /// The model this factory gates on.
    #[must_use]
    pub const fn model(&self) -> ThreadingModel {
        self.model
    }

    /// Creates a mutex.
    pub fn mutex<T>(&self, value: T) -> Result<HalMutex<T>> {
        gate(self.model, PrimitiveKind::Mutex)?;
        Ok(HalMutex::new(self.model, value))
    }

    /// Creates a recursive mutex.
    pub fn recursive_mutex<T>(&self, value: T) -> Result<HalRecursiveMutex<T>> {
        gate(self.model, PrimitiveKind::RecursiveMutex)?;
        Ok(HalRecursiveMutex::new(self.model, value))
    }

    /// Creates a counting semaphore.
    pub fn semaphore(&self, initial: usize, max: usize) -> Result<HalSemaphore> {
        gate(self.model, PrimitiveKind::Semaphore)?;
        if max == 0 || initial > max {
            return Err(Error::new(
                ErrorKind::InvalidParameters,
                "semaphore permits out of range",
            ));
        }
        Ok(HalSemaphore::new(self.model, initial, max))
    }

    /// Creates a binary semaphore.
    pub fn binary_semaphore(&self, initially_available: bool) -> Result<HalSemaphore> {
        gate(self.model, PrimitiveKind::BinarySemaphore)?;
        Ok(HalSemaphore::new(
            self.model,
            usize::from(initially_available),
            1,
        ))
    }

    /// Creates a condition variable.
    pub fn condvar(&self) -> Result<HalCondVar> {
        gate(self.model, PrimitiveKind::CondVar)?;
        Ok(HalCondVar::default())
    }

    /// Creates a manual-reset event.
    pub fn event(&self) -> Result<HalEvent> {
        gate(self.model, PrimitiveKind::Event)?;
        Ok(HalEvent::new(self.model))
    }

    /// Creates an N-party barrier.
    pub fn barrier(&self, parties: usize) -> Result<HalBarrier> {
        gate(self.model, PrimitiveKind::Barrier)?;
        if parties == 0 {
            return Err(Error::new(
                ErrorKind::InvalidParameters,
                "barrier needs at least one party",
            ));
        }
        Ok(HalBarrier::new(self.model, parties))
    }

    /// Creates a reader-writer lock.
    pub fn rwlock<T>(&self, value: T) -> Result<HalRwLock<T>> {
        gate(self.model, PrimitiveKind::RwLock)?;
        Ok(HalRwLock::new(self.model, value))
    }
}
