//! Per-fingerprint advisory locking (spec §4.6/§5): cooperating processes
//! take an exclusive `fs2` file lock before writing a cache entry, so at
//! most one computation per fingerprint proceeds at a time.

use std::fs::{File, OpenOptions};
use std::path::Path;
use std::time::{Duration, Instant};

use fs2::FileExt;

/// Holds an exclusive advisory lock for as long as it's alive; the lock is
/// released when the file handle is dropped.
pub struct FingerprintLock {
    _file: File,
}

/// Attempts to take an exclusive lock on `lock_path`, retrying with a short
/// sleep until `timeout` elapses. Returns `None` (not an error) if the
/// timeout is reached with the lock still held elsewhere — callers treat
/// this as "proceed without caching for this run" (spec §4.6).
pub fn acquire_exclusive(lock_path: &Path, timeout: Duration) -> std::io::Result<Option<FingerprintLock>> {
    if let Some(parent) = lock_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new().create(true).truncate(false).write(true).open(lock_path)?;

    let deadline = Instant::now() + timeout;
    loop {
        match file.try_lock_exclusive() {
            Ok(()) => return Ok(Some(FingerprintLock { _file: file })),
            Err(_) if Instant::now() >= deadline => return Ok(None),
            Err(_) => std::thread::sleep(Duration::from_millis(25)),
        }
    }
}
