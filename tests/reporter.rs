use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use wallwright::error::{ErrorKind, StructuredError};
use wallwright::reporter::{BroadcastReporter, InProcessReporter, NoopReporter, ProgressStatus, Reporter};

#[test]
fn in_process_reporter_invokes_closures_on_call() {
    let progress_calls = Arc::new(AtomicUsize::new(0));
    let progress_calls2 = Arc::clone(&progress_calls);
    let reporter = InProcessReporter::new(
        move |_step, _frac, _status| {
            progress_calls2.fetch_add(1, Ordering::SeqCst);
        },
        |_step, _err| {},
    );
    reporter.on_progress("palette", 0.5, ProgressStatus::Running);
    assert_eq!(progress_calls.load(Ordering::SeqCst), 1);
}

#[test]
fn broadcast_reporter_delivers_errors() {
    let received = Arc::new(Mutex::new(Vec::new()));
    let received2 = Arc::clone(&received);
    let reporter = BroadcastReporter::new(
        4,
        |_step, _frac, _status| {},
        move |step, _err| received2.lock().unwrap().push(step.to_string()),
    );
    let err = StructuredError::new("apply", ErrorKind::ApplyFailed { reason: Arc::from("boom") });
    reporter.on_error("apply", &err);
    drop(reporter);
    assert_eq!(*received.lock().unwrap(), vec!["apply".to_string()]);
}

#[test]
fn noop_reporter_does_not_panic() {
    let reporter = NoopReporter;
    reporter.on_progress("x", 1.0, ProgressStatus::Complete);
}
