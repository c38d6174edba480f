use std::path::Path;
use std::sync::Arc;

use wallwright::applier::{Applier, MonitorSelector};
use wallwright::error::{ErrorKind, StructuredError};

struct RecordingApplier {
    calls: std::sync::Mutex<Vec<(std::path::PathBuf, MonitorSelector)>>,
    fail: bool,
}

impl Applier for RecordingApplier {
    fn set(&self, image_path: &Path, monitor_selector: &MonitorSelector) -> Result<(), StructuredError> {
        self.calls.lock().unwrap().push((image_path.to_path_buf(), monitor_selector.clone()));
        if self.fail {
            return Err(StructuredError::new("apply", ErrorKind::ApplyFailed { reason: Arc::from("no compositor") }));
        }
        Ok(())
    }
}

#[test]
fn records_the_requested_selector() {
    let applier = RecordingApplier { calls: std::sync::Mutex::new(Vec::new()), fail: false };
    applier.set(Path::new("/tmp/wall.png"), &MonitorSelector::Named("eDP-1".into())).unwrap();
    let calls = applier.calls.lock().unwrap();
    assert_eq!(calls[0].1, MonitorSelector::Named("eDP-1".into()));
}

#[test]
fn propagates_apply_failure() {
    let applier = RecordingApplier { calls: std::sync::Mutex::new(Vec::new()), fail: true };
    let err = applier.set(Path::new("/tmp/wall.png"), &MonitorSelector::All).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::ApplyFailed { .. }));
}
