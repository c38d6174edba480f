//! The `Reporter` external interface (spec §6) plus two implementations:
//! an in-process (synchronous, same-thread) reporter and a broadcast
//! reporter backed by a bounded `crossbeam-channel`, matching `oxidized`'s
//! split between a direct tracing emitter and a channel-fed background
//! publisher thread.

use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use crate::error::StructuredError;

/// `on_progress`/`on_error` (spec §6). Implementations must tolerate calls
/// from worker threads (spec §5).
pub trait Reporter: Send + Sync {
    fn on_progress(&self, step_name: &str, cumulative_fraction: f64, status: ProgressStatus);
    fn on_error(&self, step_name: &str, error: &StructuredError);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressStatus {
    Started,
    Running,
    Complete,
    Warning,
}

/// Calls back synchronously on whichever thread reports. Useful for tests
/// and simple CLI progress bars that don't need cross-thread delivery.
pub struct InProcessReporter<F, G> {
    on_progress: Mutex<F>,
    on_error: Mutex<G>,
}

impl<F, G> InProcessReporter<F, G>
where
    F: FnMut(&str, f64, ProgressStatus) + Send,
    G: FnMut(&str, &StructuredError) + Send,
{
    pub fn new(on_progress: F, on_error: G) -> Self {
        Self { on_progress: Mutex::new(on_progress), on_error: Mutex::new(on_error) }
    }
}

impl<F, G> Reporter for InProcessReporter<F, G>
where
    F: FnMut(&str, f64, ProgressStatus) + Send,
    G: FnMut(&str, &StructuredError) + Send,
{
    fn on_progress(&self, step_name: &str, cumulative_fraction: f64, status: ProgressStatus) {
        (self.on_progress.lock().unwrap())(step_name, cumulative_fraction, status);
    }

    fn on_error(&self, step_name: &str, error: &StructuredError) {
        (self.on_error.lock().unwrap())(step_name, error);
    }
}

enum Event {
    Progress { step_name: Arc<str>, cumulative_fraction: f64, status: ProgressStatus },
    Error { step_name: Arc<str>, error: StructuredError },
}

/// Broadcasts progress over a bounded channel drained by a background
/// thread. If the channel is full, the oldest *progress* event is dropped;
/// errors always block until there's room (spec §5).
pub struct BroadcastReporter {
    sender: crossbeam_channel::Sender<Event>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl BroadcastReporter {
    /// `capacity` bounds the in-flight event queue; `sink` runs on the
    /// background thread and receives every event in delivery order.
    pub fn new(capacity: usize, mut sink: impl FnMut(&str, f64, ProgressStatus) + Send + 'static, mut error_sink: impl FnMut(&str, &StructuredError) + Send + 'static) -> Self {
        let (sender, receiver) = crossbeam_channel::bounded(capacity);
        let worker = std::thread::spawn(move || {
            for event in receiver {
                match event {
                    Event::Progress { step_name, cumulative_fraction, status } => sink(&step_name, cumulative_fraction, status),
                    Event::Error { step_name, error } => error_sink(&step_name, &error),
                }
            }
        });
        Self { sender, worker: Mutex::new(Some(worker)) }
    }
}

impl Reporter for BroadcastReporter {
    fn on_progress(&self, step_name: &str, cumulative_fraction: f64, status: ProgressStatus) {
        let event = Event::Progress { step_name: Arc::from(step_name), cumulative_fraction, status };
        if self.sender.try_send(event).is_err() {
            // Channel full: progress events are best-effort, drop the newest
            // rather than block the reporting step.
        }
    }

    fn on_error(&self, step_name: &str, error: &StructuredError) {
        let event = Event::Error { step_name: Arc::from(step_name), error: error.clone() };
        // Errors are never dropped; block until the background thread drains.
        let _ = self.sender.send(event);
    }
}

impl Drop for BroadcastReporter {
    fn drop(&mut self) {
        if let Some(handle) = self.worker.lock().unwrap().take() {
            drop(handle.join());
        }
    }
}

/// A reporter that discards every event. Useful as a default for callers
/// that don't care about progress.
pub struct NoopReporter;

impl Reporter for NoopReporter {
    fn on_progress(&self, _step_name: &str, _cumulative_fraction: f64, _status: ProgressStatus) {}
    fn on_error(&self, _step_name: &str, _error: &StructuredError) {}
}
