//! Background worker (spec.md §4.7).
//!
//! Drains the watcher's path queue with a debounce: block for one event,
//! then keep draining until `debounce` passes without a new one, then do a
//! final non-blocking sweep. Mirrors the original tool's `background_worker`
//! loop mechanics exactly (block-then-drain, not a fixed polling interval).

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};

/// Runs until `shutdown` is set or the channel disconnects. `on_batch` is
/// called with the de-duplicated set of paths seen in one debounce window,
/// in first-seen order.
pub fn run(receiver: &Receiver<PathBuf>, shutdown: &AtomicBool, debounce: Duration, mut on_batch: impl FnMut(&[PathBuf])) {
    let poll_interval = Duration::from_millis(200);

    while !shutdown.load(Ordering::Relaxed) {
        let first = match receiver.recv_timeout(poll_interval) {
            Ok(p) => p,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };

        let mut batch = vec![first];
        let deadline = Instant::now() + debounce;
        while let Some(remaining) = deadline.checked_duration_since(Instant::now()) {
            match receiver.recv_timeout(remaining) {
                Ok(p) => batch.push(p),
                Err(RecvTimeoutError::Timeout) => break,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        while let Ok(p) = receiver.try_recv() {
            batch.push(p);
        }

        let mut unique: Vec<PathBuf> = Vec::new();
        for p in batch {
            if !unique.contains(&p) {
                unique.push(p);
            }
        }
        on_batch(&unique);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::channel;

    #[test]
    fn batches_bursts_within_one_debounce_window() {
        let (tx, rx) = channel();
        tx.send(PathBuf::from("a.rs")).unwrap();
        tx.send(PathBuf::from("b.rs")).unwrap();
        drop(tx);

        let shutdown = AtomicBool::new(false);
        let mut batches: Vec<Vec<PathBuf>> = Vec::new();
        run(&rx, &shutdown, Duration::from_millis(20), |batch| batches.push(batch.to_vec()));

        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0], vec![PathBuf::from("a.rs"), PathBuf::from("b.rs")]);
    }
}
