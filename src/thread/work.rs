//! Priority work queue with DAG dependencies.
//!
//! Work items carry a priority, a scheduling mode, and dependencies on
//! previously submitted items. Dependency graphs are validated at submit:
//! unknown dependencies are `NotFound` and cycles within a batch are
//! rejected wholesale with `CyclicDependency` before anything enqueues.
//!
//! Each item runs at most once. Cancellation before start succeeds
//! silently; after start it is best-effort — the item runs to completion
//! and its completion signal is marked cancelled.

use crate::error::{Error, ErrorKind, Result};
use parking_lot::{Condvar, Mutex};
use std::collections::{BinaryHeap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Identifies a submitted work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkId(u64);

/// Scheduling priority, lowest to highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(u8)]
pub enum WorkPriority {
    /// Background work.
    Low = 0,
    /// Default.
    #[default]
    Normal = 1,
    /// Ahead of normal work.
    High = 2,
    /// Ahead of everything.
    Critical = 3,
}

/// Scheduling mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WorkMode {
    /// Run on the submitting thread if dependencies are met; otherwise
    /// behaves as `Deferred`.
    Immediate,
    /// Queue for a worker or the cooperative tick.
    #[default]
    Deferred,
    /// Queue; any worker may run it.
    Parallel,
    /// Queue; at most one sequential item runs at a time, FIFO.
    Sequential,
    /// Run inline when the queue is idle, otherwise defer.
    Adaptive,
}

/// Lifecycle of a work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkStatus {
    /// Waiting on dependencies or a worker.
    Pending,
    /// Executing.
    Running,
    /// Finished normally.
    Completed,
    /// Cancelled (possibly after running, if cancellation raced the run).
    Cancelled,
}

type Job = Box<dyn FnOnce() + Send>;

/// A unit of work.
pub struct WorkItem {
    name: &'static str,
    priority: WorkPriority,
    mode: WorkMode,
    deps: Vec<WorkId>,
    job: Job,
}

impl WorkItem {
    /// Creates a work item.
    #[must_use]
    pub fn new(
        name: &'static str,
        priority: WorkPriority,
        job: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            name,
            priority,
            mode: WorkMode::default(),
            deps: Vec::new(),
            job: Box::new(job),
        }
    }

    /// Sets the scheduling mode.
    #[must_use]
    pub fn with_mode(mut self, mode: WorkMode) -> Self {
        self.mode = mode;
        self
    }

    /// Adds a dependency on a previously submitted item.
    #[must_use]
    pub fn after(mut self, dep: WorkId) -> Self {
        self.deps.push(dep);
        self
    }
}

impl core::fmt::Debug for WorkItem {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("WorkItem")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("mode", &self.mode)
            .field("deps", &self.deps)
            .finish_non_exhaustive()
    }
}

/// Handle for waiting on or cancelling a submitted item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkHandle {
    id: WorkId,
}

impl WorkHandle {
    /// The item's id.
    #[must_use]
    pub const fn id(&self) -> WorkId {
        self.id
    }
}

/// Queue counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WorkStats {
    /// Items accepted by submit.
    pub submitted: u64,
    /// Items that ran to completion.
    pub completed: u64,
    /// Items cancelled (before or during execution).
    pub cancelled: u64,
}

struct Task {
    name: &'static str,
    priority: WorkPriority,
    mode: WorkMode,
    status: WorkStatus,
    job: Option<Job>,
    dependents: Vec<u64>,
    blockers: usize,
    cancel_requested: bool,
}

#[derive(PartialEq, Eq)]
struct ReadyKey {
    priority: WorkPriority,
    seq: u64,
    id: u64,
}

impl Ord for ReadyKey {
    fn cmp(&self, other: &Self) -> core::cmp::Ordering {
        // Higher priority first; FIFO within a priority.
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for ReadyKey {
    fn partial_cmp(&self, other: &Self) -> Option<core::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Default)]
struct State {
    tasks: HashMap<u64, Task>,
    ready: BinaryHeap<ReadyKey>,
    next_id: u64,
    next_seq: u64,
    sequential_active: bool,
}

/// The work queue.
pub struct WorkQueue {
    state: Mutex<State>,
    work_cv: Condvar,
    done_cv: Condvar,
    blocking: bool,
    submitted: AtomicU64,
    completed: AtomicU64,
    cancelled: AtomicU64,
}

impl WorkQueue {
    /// Creates a queue. `blocking` selects condvar waits (preemptive) or
    /// yield loops (everything else) for [`WorkQueue::wait`].
    #[must_use]
    pub fn new(blocking: bool) -> Self {
        Self {
            state: Mutex::new(State::default()),
            work_cv: Condvar::new(),
            done_cv: Condvar::new(),
            blocking,
            submitted: AtomicU64::new(0),
            completed: AtomicU64::new(0),
            cancelled: AtomicU64::new(0),
        }
    }

    /// Submits one item.
    pub fn submit(&self, item: WorkItem) -> Result<WorkHandle> {
        let run_inline;
        let handle;
        {
            let mut state = self.state.lock();
            let mut blockers = 0;
            for dep in &item.deps {
                match state.tasks.get(&dep.0) {
                    None => {
                        return Err(Error::new(ErrorKind::NotFound, "unknown work dependency"))
                    }
                    Some(task)
                        if matches!(task.status, WorkStatus::Completed | WorkStatus::Cancelled) => {
                    }
                    Some(_) => blockers += 1,
                }
            }
            state.next_id += 1;
            let id = state.next_id;
            handle = WorkHandle { id: WorkId(id) };
            run_inline = blockers == 0
                && match item.mode {
                    WorkMode::Immediate => true,
                    WorkMode::Adaptive => state.ready.is_empty(),
                    _ => false,
                };
            let mut task = Task {
                name: item.name,
                priority: item.priority,
                mode: item.mode,
                status: if run_inline {
                    WorkStatus::Running
                } else {
                    WorkStatus::Pending
                },
                job: Some(item.job),
                dependents: Vec::new(),
                blockers,
                cancel_requested: false,
            };
            for dep in &item.deps {
                if let Some(dep_task) = state.tasks.get_mut(&dep.0) {
                    if !matches!(dep_task.status, WorkStatus::Completed | WorkStatus::Cancelled) {
                        dep_task.dependents.push(id);
                    }
                }
            }
            let job = if run_inline { task.job.take() } else { None };
            state.tasks.insert(id, task);
            if !run_inline && blockers == 0 {
                state.next_seq += 1;
                let key = ReadyKey {
                    priority: item.priority,
                    seq: state.next_seq,
                    id,
                };
                state.ready.push(key);
            }
            self.submitted.fetch_add(1, Ordering::Relaxed);
            if run_inline {
                drop(state);
                if let Some(job) = job {
                    job();
                }
                self.finish(handle.id.0);
                return Ok(handle);
            }
        }
        self.work_cv.notify_one();
        Ok(handle)
    }

    /// Submits a batch whose items may depend on each other.
    ///
    /// `edges` are `(from, to)` index pairs: `to` waits for `from`. Cycles
    /// reject the whole batch; nothing is enqueued. Inline modes behave as
    /// `Deferred` within a batch.
    pub fn submit_graph(
        &self,
        items: Vec<WorkItem>,
        edges: &[(usize, usize)],
    ) -> Result<Vec<WorkHandle>> {
        let n = items.len();
        for &(from, to) in edges {
            if from >= n || to >= n {
                return Err(Error::new(ErrorKind::InvalidParameters, "edge index out of range"));
            }
        }
        // Kahn's algorithm over the batch-local edges.
        let mut indegree = vec![0usize; n];
        let mut adjacency = vec![Vec::new(); n];
        for &(from, to) in edges {
            indegree[to] += 1;
            adjacency[from].push(to);
        }
        let mut frontier: Vec<usize> = (0..n).filter(|&i| indegree[i] == 0).collect();
        let mut visited = 0;
        while let Some(node) = frontier.pop() {
            visited += 1;
            for &next in &adjacency[node] {
                indegree[next] -= 1;
                if indegree[next] == 0 {
                    frontier.push(next);
                }
            }
        }
        if visited != n {
            return Err(Error::new(
                ErrorKind::CyclicDependency,
                "work graph contains a cycle",
            ));
        }

        let mut handles = Vec::with_capacity(n);
        {
            let mut state = self.state.lock();
            // External dependencies are validated up front so a bad batch
            // enqueues nothing.
            for item in &items {
                for dep in &item.deps {
                    if !state.tasks.contains_key(&dep.0) {
                        return Err(Error::new(ErrorKind::NotFound, "unknown work dependency"));
                    }
                }
            }
            let first_id = state.next_id + 1;
            for (i, item) in items.into_iter().enumerate() {
                state.next_id += 1;
                let id = state.next_id;
                let external_blockers = item
                    .deps
                    .iter()
                    .filter(|dep| {
                        state.tasks.get(&dep.0).is_some_and(|t| {
                            !matches!(t.status, WorkStatus::Completed | WorkStatus::Cancelled)
                        })
                    })
                    .count();
                for dep in &item.deps {
                    if let Some(dep_task) = state.tasks.get_mut(&dep.0) {
                        if !matches!(
                            dep_task.status,
                            WorkStatus::Completed | WorkStatus::Cancelled
                        ) {
                            dep_task.dependents.push(id);
                        }
                    }
                }
                let batch_blockers = edges.iter().filter(|&&(_, to)| to == i).count();
                state.tasks.insert(
                    id,
                    Task {
                        name: item.name,
                        priority: item.priority,
                        mode: item.mode,
                        status: WorkStatus::Pending,
                        job: Some(item.job),
                        dependents: Vec::new(),
                        blockers: external_blockers + batch_blockers,
                        cancel_requested: false,
                    },
                );
                handles.push(WorkHandle { id: WorkId(id) });
                self.submitted.fetch_add(1, Ordering::Relaxed);
            }
            for &(from, to) in edges {
                let from_id = first_id + from as u64;
                let to_id = first_id + to as u64;
                if let Some(task) = state.tasks.get_mut(&from_id) {
                    task.dependents.push(to_id);
                }
            }
            let ready_ids: Vec<(WorkPriority, u64)> = handles
                .iter()
                .filter_map(|h| {
                    let task = state.tasks.get(&h.id.0)?;
                    (task.blockers == 0).then_some((task.priority, h.id.0))
                })
                .collect();
            for (priority, id) in ready_ids {
                state.next_seq += 1;
                let key = ReadyKey {
                    priority,
                    seq: state.next_seq,
                    id,
                };
                state.ready.push(key);
            }
        }
        self.work_cv.notify_all();
        Ok(handles)
    }

    /// Pops the next runnable job, honoring the sequential lane.
    fn take_ready(&self) -> Option<(u64, Job)> {
        let mut state = self.state.lock();
        let mut deferred = Vec::new();
        let mut taken = None;
        while let Some(key) = state.ready.pop() {
            let sequential_active = state.sequential_active;
            let Some(task) = state.tasks.get_mut(&key.id) else {
                continue;
            };
            if task.status != WorkStatus::Pending {
                continue;
            }
            if task.mode == WorkMode::Sequential && sequential_active {
                deferred.push(key);
                continue;
            }
            task.status = WorkStatus::Running;
            let is_sequential = task.mode == WorkMode::Sequential;
            let job = task.job.take();
            if is_sequential {
                state.sequential_active = true;
            }
            taken = job.map(|job| (key.id, job));
            break;
        }
        for key in deferred {
            state.ready.push(key);
        }
        taken
    }

    fn finish(&self, id: u64) {
        let mut state = self.state.lock();
        let Some(task) = state.tasks.get_mut(&id) else {
            return;
        };
        let cancelled = task.cancel_requested;
        task.status = if cancelled {
            WorkStatus::Cancelled
        } else {
            WorkStatus::Completed
        };
        if task.mode == WorkMode::Sequential {
            state.sequential_active = false;
        }
        let dependents = state
            .tasks
            .get(&id)
            .map(|t| t.dependents.clone())
            .unwrap_or_default();
        let mut unblocked = Vec::new();
        for dep_id in dependents {
            if let Some(dep) = state.tasks.get_mut(&dep_id) {
                dep.blockers = dep.blockers.saturating_sub(1);
                if dep.blockers == 0 && dep.status == WorkStatus::Pending {
                    unblocked.push((dep.priority, dep_id));
                }
            }
        }
        for (priority, dep_id) in unblocked {
            state.next_seq += 1;
            let key = ReadyKey {
                priority,
                seq: state.next_seq,
                id: dep_id,
            };
            state.ready.push(key);
        }
        drop(state);
        if cancelled {
            self.cancelled.fetch_add(1, Ordering::Relaxed);
        } else {
            self.completed.fetch_add(1, Ordering::Relaxed);
        }
        self.work_cv.notify_all();
        self.done_cv.notify_all();
    }

    /// Runs one ready item on the calling thread. Returns false when
    /// nothing was runnable.
    pub fn run_one(&self) -> bool {
        match self.take_ready() {
            Some((id, job)) => {
                job();
                self.finish(id);
                true
            }
            None => false,
        }
    }

    /// Parks the caller until work may be available or `timeout` passes.
    pub(crate) fn wait_for_work(&self, timeout: Duration) {
        let mut state = self.state.lock();
        if state.ready.is_empty() {
            self.work_cv.wait_for(&mut state, timeout);
        }
    }

    /// Current status of an item.
    pub fn status(&self, handle: WorkHandle) -> Result<WorkStatus> {
        self.state
            .lock()
            .tasks
            .get(&handle.id.0)
            .map(|t| t.status)
            .ok_or_else(|| Error::new(ErrorKind::NotFound, "no such work item"))
    }

    /// Waits for an item to complete or be cancelled.
    ///
    /// On non-blocking models the wait loop helps execute queued work.
    pub fn wait(&self, handle: WorkHandle, timeout: Duration) -> Result<WorkStatus> {
        let deadline = Instant::now() + timeout;
        if self.blocking {
            let mut state = self.state.lock();
            loop {
                match state.tasks.get(&handle.id.0) {
                    None => return Err(Error::new(ErrorKind::NotFound, "no such work item")),
                    Some(task)
                        if matches!(task.status, WorkStatus::Completed | WorkStatus::Cancelled) =>
                    {
                        return Ok(task.status)
                    }
                    Some(_) => {}
                }
                if self.done_cv.wait_until(&mut state, deadline).timed_out() {
                    return Err(Error::new(ErrorKind::Timeout, "work wait timed out"));
                }
            }
        } else {
            loop {
                match self.status(handle)? {
                    status @ (WorkStatus::Completed | WorkStatus::Cancelled) => return Ok(status),
                    _ => {
                        if !self.run_one() {
                            std::thread::yield_now();
                        }
                        if Instant::now() >= deadline {
                            return Err(Error::new(ErrorKind::Timeout, "work wait timed out"));
                        }
                    }
                }
            }
        }
    }

    /// Cancels an item.
    ///
    /// Before start the item never runs; during execution the request is
    /// best-effort and the completion signal is marked cancelled. Returns
    /// the status the item will settle in.
    pub fn cancel(&self, handle: WorkHandle) -> Result<WorkStatus> {
        let mut state = self.state.lock();
        let Some(task) = state.tasks.get_mut(&handle.id.0) else {
            return Err(Error::new(ErrorKind::NotFound, "no such work item"));
        };
        match task.status {
            WorkStatus::Pending => {
                task.status = WorkStatus::Cancelled;
                task.job = None;
                let dependents = task.dependents.clone();
                let mut unblocked = Vec::new();
                for dep_id in dependents {
                    if let Some(dep) = state.tasks.get_mut(&dep_id) {
                        dep.blockers = dep.blockers.saturating_sub(1);
                        if dep.blockers == 0 && dep.status == WorkStatus::Pending {
                            unblocked.push((dep.priority, dep_id));
                        }
                    }
                }
                for (priority, dep_id) in unblocked {
                    state.next_seq += 1;
                    let key = ReadyKey {
                        priority,
                        seq: state.next_seq,
                        id: dep_id,
                    };
                    state.ready.push(key);
                }
                drop(state);
                self.cancelled.fetch_add(1, Ordering::Relaxed);
                self.done_cv.notify_all();
                self.work_cv.notify_all();
                Ok(WorkStatus::Cancelled)
            }
            WorkStatus::Running => {
                task.cancel_requested = true;
                Ok(WorkStatus::Running)
            }
            status @ (WorkStatus::Completed | WorkStatus::Cancelled) => Ok(status),
        }
    }

    /// Number of items waiting or ready.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.state
            .lock()
            .tasks
            .values()
            .filter(|t| matches!(t.status, WorkStatus::Pending | WorkStatus::Running))
            .count()
    }

    /// Queue counters.
    #[must_use]
    pub fn stats(&self) -> WorkStats {
        WorkStats {
            submitted: self.submitted.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
        }
    }

    /// Wakes every parked worker (used at shutdown).
    pub(crate) fn wake_all(&self) {
        self.work_cv.notify_all();
    }

    /// Name of an item, for diagnostics.
    pub fn name_of(&self, handle: WorkHandle) -> Result<&'static str> {
        self.state
            .lock()
            .tasks
            .get(&handle.id.0)
            .map(|t| t.name)
            .ok_or_else(|| Error::new(ErrorKind::NotFound, "no such work item"))
    }
}

impl core::fmt::Debug for WorkQueue {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("WorkQueue")
            .field("pending", &self.pending())
            .field("stats", &self.stats())
            .finish()
    }
}
