//! Subscriber Runtime
//!
//! Each event-consuming component gets its own unbounded FIFO queue and a
//! dedicated worker thread that pulls events one at a time and invokes the
//! component's handler. The pending-event counter implements the idle
//! barrier: enqueue increments, handler completion (success or error)
//! decrements, and waiters park on a condvar until it reaches zero.

use crate::engine::events::Event;
use anyhow::Result;
use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, error, warn};

/// Handler supplied by the component behind a subscriber.
///
/// `on_event` is invoked sequentially, one event at a time, on the
/// subscriber's worker thread. Errors are routed to `on_error` and the
/// worker continues with the next event; they never abort the run.
pub trait EventHandler: Send {
    /// Component name for logging and diagnostics.
    fn name(&self) -> &str;

    /// Handle one dequeued event.
    fn on_event(&mut self, event: &Event) -> Result<()>;

    /// Called when `on_event` returns an error. The event still counts as
    /// completed for barrier accounting.
    fn on_error(&mut self, error: anyhow::Error, event: &Event) {
        error!(
            handler = self.name(),
            kind = event.kind().as_str(),
            error = %error,
            "event handler failed"
        );
    }

    /// Called exactly once at shutdown, after the sentinel is observed and
    /// every queued event has been handled.
    fn cleanup(&mut self) {}
}

enum WorkerMsg {
    Event(Arc<Event>),
    Shutdown,
}

/// Counter of enqueued-but-not-completed events, with parked waiters.
struct PendingCounter {
    count: Mutex<u64>,
    idle: Condvar,
}

impl PendingCounter {
    fn new() -> Self {
        Self {
            count: Mutex::new(0),
            idle: Condvar::new(),
        }
    }

    fn enqueued(&self) {
        *self.count.lock() += 1;
    }

    fn completed(&self) {
        let mut count = self.count.lock();
        debug_assert!(*count > 0, "pending counter underflow");
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.idle.notify_all();
        }
    }

    fn wait_until_zero(&self) {
        let mut count = self.count.lock();
        while *count > 0 {
            self.idle.wait(&mut count);
        }
    }

    fn is_zero(&self) -> bool {
        *self.count.lock() == 0
    }
}

static NEXT_SUBSCRIBER_ID: AtomicU64 = AtomicU64::new(0);

/// Handle to a running subscriber worker. Shared via `Arc`; identity (for
/// idempotent subscribe/unsubscribe) is the numeric `id`.
pub struct Subscriber {
    id: u64,
    name: String,
    tx: Sender<WorkerMsg>,
    pending: Arc<PendingCounter>,
    closing: AtomicBool,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Subscriber {
    /// Start a worker thread over an unbounded queue, moving `handler` into
    /// it.
    pub fn spawn(handler: Box<dyn EventHandler>) -> Arc<Self> {
        let name = handler.name().to_string();
        let (tx, rx) = channel::unbounded::<WorkerMsg>();
        let pending = Arc::new(PendingCounter::new());

        let worker = {
            let pending = Arc::clone(&pending);
            let thread_name = name.clone();
            std::thread::Builder::new()
                .name(thread_name.clone())
                .spawn(move || worker_loop(handler, rx, pending))
                .unwrap_or_else(|e| panic!("failed to spawn worker '{thread_name}': {e}"))
        };

        Arc::new(Self {
            id: NEXT_SUBSCRIBER_ID.fetch_add(1, Ordering::Relaxed),
            name,
            tx,
            pending,
            closing: AtomicBool::new(false),
            worker: Mutex::new(Some(worker)),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Non-blocking enqueue. Events arriving after shutdown begins are
    /// dropped (logged, never fatal).
    pub fn receive(&self, event: Arc<Event>) {
        if self.closing.load(Ordering::Acquire) {
            warn!(
                subscriber = %self.name,
                kind = event.kind().as_str(),
                "dropping event published after shutdown"
            );
            return;
        }
        self.pending.enqueued();
        if self.tx.send(WorkerMsg::Event(event)).is_err() {
            // Worker already exited; restore the counter so waiters are not
            // stranded.
            self.pending.completed();
            warn!(subscriber = %self.name, "dropping event: worker stopped");
        }
    }

    /// Block until the queue is empty and no event is mid-handler.
    pub fn wait_until_idle(&self) {
        self.pending.wait_until_zero();
    }

    /// True when nothing is queued or in-flight right now.
    pub fn is_idle(&self) -> bool {
        self.pending.is_zero()
    }

    /// Enqueue the shutdown sentinel, let the worker drain everything queued
    /// before it, run `cleanup`, then join the worker. Idempotent.
    pub fn shutdown(&self) {
        self.closing.store(true, Ordering::Release);
        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            let _ = self.tx.send(WorkerMsg::Shutdown);
            if handle.join().is_err() {
                error!(subscriber = %self.name, "worker panicked during shutdown");
            }
            debug!(subscriber = %self.name, "subscriber stopped");
        }
    }
}

fn worker_loop(
    mut handler: Box<dyn EventHandler>,
    rx: Receiver<WorkerMsg>,
    pending: Arc<PendingCounter>,
) {
    while let Ok(msg) = rx.recv() {
        match msg {
            WorkerMsg::Event(event) => {
                if let Err(err) = handler.on_event(&event) {
                    handler.on_error(err, &event);
                }
                pending.completed();
            }
            WorkerMsg::Shutdown => {
                handler.cleanup();
                break;
            }
        }
    }
    // Account for anything that slipped in behind the sentinel so idle
    // waiters cannot be stranded.
    while let Ok(msg) = rx.try_recv() {
        if let WorkerMsg::Event(event) = msg {
            warn!(
                handler = handler.name(),
                kind = event.kind().as_str(),
                "discarding event received after shutdown sentinel"
            );
            pending.completed();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::events::{BarPeriod, BarReceived};
    use anyhow::anyhow;
    use std::sync::Mutex as StdMutex;

    fn bar_event(ts: i64) -> Arc<Event> {
        Arc::new(Event::BarReceived(BarReceived {
            symbol: "AAA".into(),
            period: BarPeriod::Minute,
            open: 1.0,
            high: 1.0,
            low: 1.0,
            close: 1.0,
            volume: 1,
            ts_event: ts,
            ts_created: ts,
        }))
    }

    struct Probe {
        seen: Arc<StdMutex<Vec<i64>>>,
        errors: Arc<StdMutex<Vec<String>>>,
        cleaned: Arc<StdMutex<u32>>,
        fail_on: Option<i64>,
    }

    impl Probe {
        fn new() -> (
            Self,
            Arc<StdMutex<Vec<i64>>>,
            Arc<StdMutex<Vec<String>>>,
            Arc<StdMutex<u32>>,
        ) {
            let seen = Arc::new(StdMutex::new(Vec::new()));
            let errors = Arc::new(StdMutex::new(Vec::new()));
            let cleaned = Arc::new(StdMutex::new(0));
            (
                Self {
                    seen: Arc::clone(&seen),
                    errors: Arc::clone(&errors),
                    cleaned: Arc::clone(&cleaned),
                    fail_on: None,
                },
                seen,
                errors,
                cleaned,
            )
        }
    }

    impl EventHandler for Probe {
        fn name(&self) -> &str {
            "probe"
        }

        fn on_event(&mut self, event: &Event) -> Result<()> {
            let ts = event.ts_event();
            if self.fail_on == Some(ts) {
                return Err(anyhow!("boom at {ts}"));
            }
            self.seen.lock().unwrap().push(ts);
            Ok(())
        }

        fn on_error(&mut self, error: anyhow::Error, _event: &Event) {
            self.errors.lock().unwrap().push(error.to_string());
        }

        fn cleanup(&mut self) {
            *self.cleaned.lock().unwrap() += 1;
        }
    }

    #[test]
    fn test_fifo_processing() {
        let (probe, seen, _, _) = Probe::new();
        let sub = Subscriber::spawn(Box::new(probe));
        for ts in 0..100 {
            sub.receive(bar_event(ts));
        }
        sub.wait_until_idle();
        assert_eq!(*seen.lock().unwrap(), (0..100).collect::<Vec<_>>());
        sub.shutdown();
    }

    #[test]
    fn test_error_isolation_and_barrier_accounting() {
        let (mut probe, seen, errors, _) = Probe::new();
        probe.fail_on = Some(1);
        let sub = Subscriber::spawn(Box::new(probe));
        for ts in 0..3 {
            sub.receive(bar_event(ts));
        }
        // Completes despite the failing event: the error path still counts
        // toward the barrier.
        sub.wait_until_idle();
        assert_eq!(*seen.lock().unwrap(), vec![0, 2]);
        assert_eq!(errors.lock().unwrap().len(), 1);
        sub.shutdown();
    }

    #[test]
    fn test_shutdown_drains_then_cleans_up_once() {
        let (probe, seen, _, cleaned) = Probe::new();
        let sub = Subscriber::spawn(Box::new(probe));
        for ts in 0..10 {
            sub.receive(bar_event(ts));
        }
        sub.shutdown();
        sub.shutdown(); // idempotent
        assert_eq!(seen.lock().unwrap().len(), 10);
        assert_eq!(*cleaned.lock().unwrap(), 1);
    }

    #[test]
    fn test_receive_after_shutdown_is_dropped() {
        let (probe, seen, _, _) = Probe::new();
        let sub = Subscriber::spawn(Box::new(probe));
        sub.shutdown();
        sub.receive(bar_event(42));
        assert!(sub.is_idle());
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_wait_until_idle_on_fresh_subscriber_returns() {
        let (probe, _, _, _) = Probe::new();
        let sub = Subscriber::spawn(Box::new(probe));
        sub.wait_until_idle();
        assert!(sub.is_idle());
        sub.shutdown();
    }
}
