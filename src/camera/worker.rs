//! Capture threads that may outlive the handle that started them.
//!
//! A thread stuck inside a driver call cannot be interrupted. Owners wait a
//! bounded time for it to exit and otherwise detach it into a
//! [`WorkerRegistry`], which keeps the device marked busy until the thread
//! actually finishes.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, TryRecvError};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// A spawned thread whose exit can be awaited with a timeout.
#[derive(Debug)]
pub struct Worker {
    handle: Option<JoinHandle<()>>,
    // Never sent on; disconnects when the thread exits, panics included
    done: Receiver<()>,
}

impl Worker {
    pub fn spawn<F>(f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let (done_tx, done) = mpsc::channel::<()>();
        let handle = thread::spawn(move || {
            let _done = done_tx;
            f();
        });
        Self {
            handle: Some(handle),
            done,
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.done.try_recv(), Err(TryRecvError::Disconnected))
    }

    /// Wait up to `timeout` for the thread to exit and join it.
    ///
    /// Returns `false` if it is still running.
    pub fn wait(&mut self, timeout: Duration) -> bool {
        match self.done.recv_timeout(timeout) {
            Err(RecvTimeoutError::Timeout) => false,
            _ => {
                if let Some(handle) = self.handle.take() {
                    let _ = handle.join();
                }
                true
            }
        }
    }
}

/// Detached workers, keyed by the device they hold.
///
/// Clones share the same set.
#[derive(Debug, Clone, Default)]
pub struct WorkerRegistry {
    lingering: Arc<Mutex<Vec<(String, Worker)>>>,
}

impl WorkerRegistry {
    /// Wait up to `timeout` for `worker` to exit; detach it if it does not.
    ///
    /// Returns `true` when the thread was joined.
    pub fn retire(&self, key: &str, mut worker: Worker, timeout: Duration) -> bool {
        if worker.wait(timeout) {
            return true;
        }
        log::warn!("Capture thread for camera {} is stuck; detaching it", key);
        if let Ok(mut lingering) = self.lingering.lock() {
            lingering.push((key.to_string(), worker));
        }
        false
    }

    /// Wait up to `timeout` for detached workers on `key` to exit.
    ///
    /// Returns `true` when none remain. Finished workers on other keys are
    /// pruned along the way.
    pub fn wait_clear(&self, key: &str, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let Ok(mut lingering) = self.lingering.lock() else {
            return false;
        };
        lingering.retain_mut(|(k, worker)| {
            if k != key {
                return !worker.is_finished();
            }
            !worker.wait(deadline.saturating_duration_since(Instant::now()))
        });
        !lingering.iter().any(|(k, _)| k == key)
    }

    /// Detached workers not yet known to have exited.
    pub fn lingering(&self) -> usize {
        self.lingering.lock().map(|l| l.len()).unwrap_or(0)
    }
}
