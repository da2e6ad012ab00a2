//! Platform event sources.
//!
//! A source feeds hardware or system events into the bus. The lifecycle is
//! `init → start → (emit) → stop → shutdown`; the bus enforces the order
//! and rejects out-of-order transitions with `InvalidState`.
//!
//! Push-based sources keep the [`Ingest`] handle given to `start` and call
//! it from their own context; pollable sources return events from `poll`,
//! which the bus invokes on its dispatch path. Timestamps are stamped at
//! ingest, so events from a single source are monotone non-decreasing.

use crate::error::Result;
use crate::event::event::{CategorySet, Event};
use crate::event::Ingest;

/// Lifecycle states of a registered source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceState {
    /// Registered but not initialized.
    Created,
    /// Initialized, not yet emitting.
    Ready,
    /// Emitting.
    Running,
    /// Stopped; may be started again.
    Stopped,
    /// Torn down.
    Shutdown,
}

/// A platform event source.
pub trait EventSource: Send {
    /// Stable source name; becomes the `source` field of emitted events.
    fn name(&self) -> &'static str;

    /// Categories this source emits.
    fn categories(&self) -> CategorySet;

    /// One-time initialization.
    fn init(&mut self) -> Result<()> {
        Ok(())
    }

    /// Begins emission. Push-based sources keep the ingest handle.
    fn start(&mut self, ingest: Ingest) -> Result<()>;

    /// Polls for the next event, if this source is pollable.
    ///
    /// Called from the dispatch path while the source is running.
    fn poll(&mut self) -> Option<Event> {
        None
    }

    /// Stops emission. The source may be started again.
    fn stop(&mut self) -> Result<()>;

    /// Final teardown.
    fn shutdown(&mut self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::{CategorySet, Event, EventSource, Ingest};
    use crate::error::Result;
    use crate::event::event::{EventCategory, EventPayload, EventSeverity};
    use std::collections::VecDeque;

    /// Pollable source fed from a scripted queue.
    pub struct ScriptedSource {
        pub name: &'static str,
        pub script: VecDeque<Event>,
        pub started: bool,
    }

    impl ScriptedSource {
        pub fn new(name: &'static str, count: u64) -> Self {
            let script = (0..count)
                .map(|n| {
                    Event::new(
                        EventCategory::Hardware,
                        EventSeverity::Info,
                        name,
                        EventPayload::Counter {
                            name: "tick",
                            value: n,
                        },
                    )
                })
                .collect();
            Self {
                name,
                script,
                started: false,
            }
        }
    }

    impl EventSource for ScriptedSource {
        fn name(&self) -> &'static str {
            self.name
        }

        fn categories(&self) -> CategorySet {
            CategorySet::of(&[EventCategory::Hardware])
        }

        fn start(&mut self, _ingest: Ingest) -> Result<()> {
            self.started = true;
            Ok(())
        }

        fn poll(&mut self) -> Option<Event> {
            if self.started {
                self.script.pop_front()
            } else {
                None
            }
        }

        fn stop(&mut self) -> Result<()> {
            self.started = false;
            Ok(())
        }
    }
}
