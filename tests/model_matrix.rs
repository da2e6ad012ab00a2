//! The same behavioral suite, run against each threading model.
//!
//! The core is model-parametric: work execution, event delivery, and
//! primitive gating must hold whether the platform preempts, cooperates,
//! or runs a single context.

use halcyon::thread::PrimitiveKind;
use halcyon::{
    Capability, Configuration, DeliveryMode, Event, EventCategory, EventFilter, EventPayload,
    EventSeverity, EventSink, Hal, PlatformProbe, ThreadingModel, WorkItem, WorkPriority,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn hal_for(model: ThreadingModel) -> Hal {
    let probe = match model {
        ThreadingModel::SingleThreaded => PlatformProbe::minimal(),
        ThreadingModel::Cooperative => PlatformProbe::detect()
            .with_cpu_cores(1)
            .with_capability(Capability::Threading),
        ThreadingModel::WebWorkers | ThreadingModel::Preemptive => PlatformProbe::detect()
            .with_cpu_cores(4)
            .with_capability(Capability::Threading),
    };
    let platform = probe.finish().expect("probe");
    let config = Configuration::builder()
        .threading_model(model)
        .pool_size(2)
        .build()
        .expect("config");
    Hal::with_platform(platform, config).expect("hal")
}

const MODELS: [ThreadingModel; 3] = [
    ThreadingModel::SingleThreaded,
    ThreadingModel::Cooperative,
    ThreadingModel::Preemptive,
];

/// Drives the model's execution substrate until the counter reaches
/// `expected` or the deadline passes.
fn drive(hal: &Hal, counter: &AtomicUsize, expected: usize) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while counter.load(Ordering::SeqCst) < expected && Instant::now() < deadline {
        hal.tick();
        hal.pump_events(64);
        std::thread::yield_now();
    }
}

#[test]
fn work_completes_under_every_model() {
    for model in MODELS {
        let hal = hal_for(model);
        assert_eq!(hal.services().thread.model(), model);
        let ran = Arc::new(AtomicUsize::new(0));
        for _ in 0..8 {
            let ran = Arc::clone(&ran);
            hal.services()
                .thread
                .work()
                .submit(WorkItem::new("matrix-job", WorkPriority::Normal, move || {
                    ran.fetch_add(1, Ordering::SeqCst);
                }))
                .expect("submit");
        }
        drive(&hal, &ran, 8);
        assert_eq!(ran.load(Ordering::SeqCst), 8, "model {model}");
        hal.shutdown_all().expect("shutdown");
    }
}

#[test]
fn events_deliver_under_every_model() {
    for model in MODELS {
        let hal = hal_for(model);
        let seen = Arc::new(AtomicUsize::new(0));
        let seen2 = Arc::clone(&seen);
        hal.services().events.subscribe(
            EventFilter::any().category(EventCategory::Application),
            DeliveryMode::Sync,
            move |batch| {
                seen2.fetch_add(batch.len(), Ordering::SeqCst);
            },
        );
        for _ in 0..5 {
            EventSink::publish(
                &*hal.services().events,
                Event::new(
                    EventCategory::Application,
                    EventSeverity::Info,
                    "matrix",
                    EventPayload::None,
                ),
            );
        }
        drive(&hal, &seen, 5);
        assert_eq!(seen.load(Ordering::SeqCst), 5, "model {model}");
        hal.shutdown_all().expect("shutdown");
    }
}

#[test]
fn primitive_gating_matches_the_documented_table() {
    for model in MODELS {
        let hal = hal_for(model);
        let prims = hal.services().thread.primitives();
        for kind in PrimitiveKind::ALL {
            let expected = kind.available_on(model);
            let actual = match kind {
                PrimitiveKind::Mutex => prims.mutex(()).is_ok(),
                PrimitiveKind::RecursiveMutex => prims.recursive_mutex(()).is_ok(),
                PrimitiveKind::Semaphore => prims.semaphore(1, 2).is_ok(),
                PrimitiveKind::BinarySemaphore => prims.binary_semaphore(true).is_ok(),
                PrimitiveKind::CondVar => prims.condvar().is_ok(),
                PrimitiveKind::Event => prims.event().is_ok(),
                PrimitiveKind::Barrier => prims.barrier(2).is_ok(),
                PrimitiveKind::RwLock => prims.rwlock(()).is_ok(),
            };
            assert_eq!(actual, expected, "model {model}, primitive {kind:?}");
        }
        hal.shutdown_all().expect("shutdown");
    }
}

#[test]
fn async_subscriptions_deliver_under_every_model() {
    for model in MODELS {
        let hal = hal_for(model);
        let seen = Arc::new(AtomicUsize::new(0));
        let seen2 = Arc::clone(&seen);
        hal.services().events.subscribe(
            EventFilter::any(),
            DeliveryMode::Async,
            move |batch| {
                seen2.fetch_add(batch.len(), Ordering::SeqCst);
            },
        );
        for _ in 0..3 {
            EventSink::publish(
                &*hal.services().events,
                Event::new(
                    EventCategory::System,
                    EventSeverity::Info,
                    "matrix",
                    EventPayload::None,
                ),
            );
        }
        drive(&hal, &seen, 3);
        assert_eq!(seen.load(Ordering::SeqCst), 3, "model {model}");
        hal.shutdown_all().expect("shutdown");
    }
}
