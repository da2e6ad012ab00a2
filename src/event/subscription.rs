//! Subscription bookkeeping and fan-out.
//!
//! Subscriptions pair a filter with a callback and a delivery mode declared
//! up front:
//!
//! - **Sync** callbacks run on the dispatching thread (or inside `pump`)
//!   and must not re-enter the event system.
//! - **Async** callbacks have their matches parked in a per-subscriber
//!   queue, delivered later by the work queue or the next pump.
//!
//! With batching enabled, sync matches accumulate until the batch size or
//! deadline is reached and arrive as one slice.

use crate::error::{Error, ErrorKind, Result};
use crate::event::event::Event;
use crate::event::filter::EventFilter;
use core::fmt;
use parking_lot::Mutex;
use std::collections::BTreeMap;

/// How matched events reach the subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeliveryMode {
    /// Callback runs on the dispatch path.
    #[default]
    Sync,
    /// Matches park in a per-subscriber queue, delivered off the dispatch
    /// path.
    Async,
}

/// Identifies a subscription for revocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

/// Batching parameters: flush at `size` events or after `timeout_ns`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchPolicy {
    /// Maximum events per batch.
    pub size: usize,
    /// Maximum time the first buffered event waits.
    pub timeout_ns: u64,
}

type BatchCallback = Box<dyn FnMut(&[Event]) + Send>;

struct Entry {
    filter: EventFilter,
    delivery: DeliveryMode,
    callback: BatchCallback,
    batch: Vec<Event>,
    batch_deadline_ns: Option<u64>,
    pending: Vec<Event>,
}

#[derive(Default)]
struct Inner {
    entries: BTreeMap<u64, Entry>,
    next_id: u64,
}

/// The subscription table.
#[derive(Default)]
pub struct SubscriptionManager {
    inner: Mutex<Inner>,
}

impl SubscriptionManager {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a subscription and returns its id.
    pub fn subscribe(
        &self,
        filter: EventFilter,
        delivery: DeliveryMode,
        callback: impl FnMut(&[Event]) + Send + 'static,
    ) -> SubscriptionId {
        let mut inner = self.inner.lock();
        inner.next_id += 1;
        let id = inner.next_id;
        inner.entries.insert(
            id,
            Entry {
                filter,
                delivery,
                callback: Box::new(callback),
                batch: Vec::new(),
                batch_deadline_ns: None,
                pending: Vec::new(),
            },
        );
        SubscriptionId(id)
    }

    /// Revokes a subscription. Buffered matches are discarded.
    pub fn unsubscribe(&self, id: SubscriptionId) -> Result<()> {
        if self.inner.lock().entries.remove(&id.0).is_some() {
            Ok(())
        } else {
            Err(Error::new(ErrorKind::NotFound, "no such subscription"))
        }
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// True if no subscriptions exist.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fans a slice of events out to every matching subscriber.
    ///
    /// Sync subscribers are invoked inline (batched per `policy` when
    /// given); async subscribers accumulate pending matches. Returns ids of
    /// async subscribers that now have pending events.
    pub fn dispatch(
        &self,
        events: &[Event],
        policy: Option<BatchPolicy>,
        now_ns: u64,
    ) -> Vec<SubscriptionId> {
        let mut with_pending = Vec::new();
        let mut inner = self.inner.lock();
        for (&id, entry) in &mut inner.entries {
            let matched: Vec<&Event> = events.iter().filter(|e| entry.filter.matches(e)).collect();
            if matched.is_empty() {
                continue;
            }
            match entry.delivery {
                DeliveryMode::Async => {
                    entry.pending.extend(matched.into_iter().cloned());
                    with_pending.push(SubscriptionId(id));
                }
                DeliveryMode::Sync => match policy {
                    None => {
                        for event in matched {
                            (entry.callback)(std::slice::from_ref(event));
                        }
                    }
                    Some(policy) => {
                        for event in matched {
                            if entry.batch.is_empty() {
                                entry.batch_deadline_ns = Some(now_ns + policy.timeout_ns);
                            }
                            entry.batch.push(event.clone());
                            if entry.batch.len() >= policy.size {
                                let batch = std::mem::take(&mut entry.batch);
                                entry.batch_deadline_ns = None;
                                (entry.callback)(&batch);
                            }
                        }
                    }
                },
            }
        }
        with_pending
    }

    /// Flushes sync batches whose deadline has passed. Returns the number
    /// of batches flushed.
    pub fn flush_due(&self, now_ns: u64) -> usize {
        let mut flushed = 0;
        let mut inner = self.inner.lock();
        for entry in inner.entries.values_mut() {
            if let Some(deadline) = entry.batch_deadline_ns {
                if now_ns >= deadline && !entry.batch.is_empty() {
                    let batch = std::mem::take(&mut entry.batch);
                    entry.batch_deadline_ns = None;
                    (entry.callback)(&batch);
                    flushed += 1;
                }
            }
        }
        flushed
    }

    /// Earliest pending batch deadline, if any.
    #[must_use]
    pub fn next_deadline(&self) -> Option<u64> {
        self.inner
            .lock()
            .entries
            .values()
            .filter_map(|e| e.batch_deadline_ns)
            .min()
    }

    /// Delivers an async subscriber's pending events as one slice.
    ///
    /// A revoked id is a silent no-op: the work item may outlive the
    /// subscription.
    pub fn drain_async(&self, id: SubscriptionId) -> usize {
        let mut inner = self.inner.lock();
        let Some(entry) = inner.entries.get_mut(&id.0) else {
            return 0;
        };
        if entry.pending.is_empty() {
            return 0;
        }
        let pending = std::mem::take(&mut entry.pending);
        let count = pending.len();
        (entry.callback)(&pending);
        count
    }

    /// Delivers every async subscriber's pending events. Returns the
    /// number of events delivered.
    pub fn drain_all_async(&self) -> usize {
        let ids: Vec<SubscriptionId> = {
            let inner = self.inner.lock();
            inner
                .entries
                .iter()
                .filter(|(_, e)| !e.pending.is_empty())
                .map(|(&id, _)| SubscriptionId(id))
                .collect()
        };
        ids.into_iter().map(|id| self.drain_async(id)).sum()
    }
}

impl fmt::Debug for SubscriptionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionManager")
            .field("subscriptions", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::event::{EventCategory, EventPayload, EventSeverity};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn event(severity: EventSeverity) -> Event {
        Event::new(
            EventCategory::Hardware,
            severity,
            "test",
            EventPayload::None,
        )
    }

    #[test]
    fn sync_delivery_per_event_without_batching() {
        let subs = SubscriptionManager::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let seen2 = Arc::clone(&seen);
        subs.subscribe(EventFilter::any(), DeliveryMode::Sync, move |batch| {
            assert_eq!(batch.len(), 1);
            seen2.fetch_add(1, Ordering::SeqCst);
        });
        subs.dispatch(
            &[event(EventSeverity::Info), event(EventSeverity::Warning)],
            None,
            0,
        );
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn filter_gates_delivery() {
        let subs = SubscriptionManager::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let seen2 = Arc::clone(&seen);
        subs.subscribe(
            EventFilter::any().min_severity(EventSeverity::Warning),
            DeliveryMode::Sync,
            move |batch| {
                seen2.fetch_add(batch.len(), Ordering::SeqCst);
            },
        );
        subs.dispatch(
            &[
                event(EventSeverity::Info),
                event(EventSeverity::Warning),
                event(EventSeverity::Critical),
            ],
            None,
            0,
        );
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn batching_flushes_at_size() {
        let subs = SubscriptionManager::new();
        let batches = Arc::new(Mutex::new(Vec::new()));
        let batches2 = Arc::clone(&batches);
        subs.subscribe(EventFilter::any(), DeliveryMode::Sync, move |batch| {
            batches2.lock().push(batch.len());
        });
        let policy = Some(BatchPolicy {
            size: 2,
            timeout_ns: 1_000_000,
        });
        subs.dispatch(
            &[
                event(EventSeverity::Info),
                event(EventSeverity::Info),
                event(EventSeverity::Info),
            ],
            policy,
            0,
        );
        // Two flushed as a full batch, one still buffered.
        assert_eq!(*batches.lock(), vec![2]);
        // Deadline flush delivers the remainder.
        assert_eq!(subs.flush_due(2_000_000), 1);
        assert_eq!(*batches.lock(), vec![2, 1]);
    }

    #[test]
    fn batch_deadline_not_due_early() {
        let subs = SubscriptionManager::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls2 = Arc::clone(&calls);
        subs.subscribe(EventFilter::any(), DeliveryMode::Sync, move |_| {
            calls2.fetch_add(1, Ordering::SeqCst);
        });
        let policy = Some(BatchPolicy {
            size: 10,
            timeout_ns: 5_000_000,
        });
        subs.dispatch(&[event(EventSeverity::Info)], policy, 0);
        assert_eq!(subs.flush_due(1_000_000), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(subs.next_deadline(), Some(5_000_000));
    }

    #[test]
    fn async_parks_until_drained() {
        let subs = SubscriptionManager::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let seen2 = Arc::clone(&seen);
        let id = {
            subs.subscribe(EventFilter::any(), DeliveryMode::Async, move |batch| {
                seen2.fetch_add(batch.len(), Ordering::SeqCst);
            })
        };
        let pending = subs.dispatch(&[event(EventSeverity::Info)], None, 0);
        assert_eq!(pending, vec![id]);
        assert_eq!(seen.load(Ordering::SeqCst), 0, "not delivered inline");
        assert_eq!(subs.drain_async(id), 1);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert_eq!(subs.drain_async(id), 0, "idempotent when empty");
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let subs = SubscriptionManager::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let seen2 = Arc::clone(&seen);
        let id = subs.subscribe(EventFilter::any(), DeliveryMode::Sync, move |_| {
            seen2.fetch_add(1, Ordering::SeqCst);
        });
        subs.unsubscribe(id).expect("unsubscribe");
        assert_eq!(
            subs.unsubscribe(id).unwrap_err().kind(),
            ErrorKind::NotFound
        );
        subs.dispatch(&[event(EventSeverity::Info)], None, 0);
        assert_eq!(seen.load(Ordering::SeqCst), 0);
    }
}
