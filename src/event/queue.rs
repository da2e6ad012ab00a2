//! Lock-free event ring.
//!
//! A fixed-capacity ring used under an SPSC discipline: the publish side is
//! a single logical producer (the bus serializes sources through one ingest
//! path) and the dispatch side is the single consumer. The ring itself is a
//! `crossbeam` array queue, so occasional multi-producer bursts stay safe;
//! the SPSC discipline is what the ordering guarantee rests on.
//!
//! Overflow policy is drop-newest by default: a full ring rejects the
//! incoming event. Drop-oldest displaces the oldest instead. Either way
//! `events_dropped` counts exactly the number lost.

use crate::event::event::Event;
use crossbeam_queue::ArrayQueue;
use std::sync::atomic::{AtomicU64, Ordering};

/// What to do when the ring is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum OverflowPolicy {
    /// Reject the incoming event.
    #[default]
    DropNewest,
    /// Displace the oldest queued event.
    DropOldest,
}

/// Fixed-capacity event ring with drop accounting.
#[derive(Debug)]
pub struct EventQueue {
    ring: ArrayQueue<Event>,
    policy: OverflowPolicy,
    dropped: AtomicU64,
}

impl EventQueue {
    /// Creates a ring of `capacity` slots.
    #[must_use]
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        Self {
            ring: ArrayQueue::new(capacity.max(1)),
            policy,
            dropped: AtomicU64::new(0),
        }
    }

    /// Enqueues an event. Returns false if an event was dropped (the
    /// incoming one under drop-newest, the oldest under drop-oldest).
    pub fn push(&self, event: Event) -> bool {
        match self.policy {
            OverflowPolicy::DropNewest => {
                if self.ring.push(event).is_err() {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!("event ring full, dropping newest");
                    false
                } else {
                    true
                }
            }
            OverflowPolicy::DropOldest => {
                if self.ring.force_push(event).is_some() {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!("event ring full, dropped oldest");
                    false
                } else {
                    true
                }
            }
        }
    }

    /// Dequeues the oldest event.
    pub fn pop(&self) -> Option<Event> {
        self.ring.pop()
    }

    /// Current queue depth.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    /// True if the ring is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Ring capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }

    /// Number of events lost to overflow so far.
    #[must_use]
    pub fn events_dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// The overflow policy in effect.
    #[must_use]
    pub const fn policy(&self) -> OverflowPolicy {
        self.policy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::event::{EventCategory, EventPayload, EventSeverity};

    fn event(n: u64) -> Event {
        let mut e = Event::new(
            EventCategory::System,
            EventSeverity::Info,
            "test",
            EventPayload::Counter {
                name: "n",
                value: n,
            },
        );
        e.id = n;
        e
    }

    #[test]
    fn fifo_order() {
        let queue = EventQueue::new(8, OverflowPolicy::DropNewest);
        for n in 0..5 {
            assert!(queue.push(event(n)));
        }
        for n in 0..5 {
            assert_eq!(queue.pop().expect("pop").id, n);
        }
        assert!(queue.pop().is_none());
    }

    #[test]
    fn drop_newest_rejects_incoming() {
        let queue = EventQueue::new(2, OverflowPolicy::DropNewest);
        assert!(queue.push(event(1)));
        assert!(queue.push(event(2)));
        assert!(!queue.push(event(3)));
        assert_eq!(queue.events_dropped(), 1);
        // The survivors are the earliest two.
        assert_eq!(queue.pop().expect("pop").id, 1);
        assert_eq!(queue.pop().expect("pop").id, 2);
    }

    #[test]
    fn drop_oldest_displaces() {
        let queue = EventQueue::new(2, OverflowPolicy::DropOldest);
        queue.push(event(1));
        queue.push(event(2));
        assert!(!queue.push(event(3)));
        assert_eq!(queue.events_dropped(), 1);
        // The survivors are the latest two.
        assert_eq!(queue.pop().expect("pop").id, 2);
        assert_eq!(queue.pop().expect("pop").id, 3);
    }

    #[test]
    fn dropped_counts_exactly() {
        let queue = EventQueue::new(4, OverflowPolicy::DropNewest);
        let mut dropped = 0;
        for n in 0..10 {
            if !queue.push(event(n)) {
                dropped += 1;
            }
        }
        assert_eq!(queue.events_dropped(), dropped);
        assert_eq!(queue.len(), 4);
        assert!(queue.len() <= queue.capacity());
    }

    #[test]
    fn live_size_never_exceeds_capacity() {
        let queue = EventQueue::new(3, OverflowPolicy::DropOldest);
        for n in 0..50 {
            queue.push(event(n));
            assert!(queue.len() <= queue.capacity());
        }
    }
}
