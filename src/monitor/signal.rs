//! One-way signals between the monitor thread and its host.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};

/// Cooperative cancellation with an interruptible sleep.
///
/// Clones share the same flag. `cancel` may be called from any thread; a
/// sleeping monitor wakes immediately.
#[derive(Debug, Clone)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
    wake_tx: Sender<()>,
    wake_rx: Receiver<()>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    /// Creates an uncancelled token.
    #[must_use]
    pub fn new() -> Self {
        let (wake_tx, wake_rx) = bounded(1);
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            wake_tx,
            wake_rx,
        }
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        // Full buffer means a wake-up is already pending.
        let _ = self.wake_tx.try_send(());
    }

    /// True once `cancel` has been called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Sleeps for `timeout` unless cancelled first.
    ///
    /// Returns true if the full timeout elapsed without cancellation.
    pub fn sleep(&self, timeout: Duration) -> bool {
        if self.is_cancelled() {
            return false;
        }
        match self.wake_rx.recv_timeout(timeout) {
            Ok(()) => {
                // Keep the wake-up for any other sleeper sharing this token.
                let _ = self.wake_tx.try_send(());
                false
            }
            Err(RecvTimeoutError::Timeout) => !self.is_cancelled(),
            Err(RecvTimeoutError::Disconnected) => false,
        }
    }
}

/// Single-write "initial load complete" flag.
#[derive(Debug, Clone)]
pub struct LoadSignal {
    set: Arc<AtomicBool>,
    tx: Sender<()>,
    rx: Receiver<()>,
}

impl Default for LoadSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl LoadSignal {
    /// Creates an unset signal.
    #[must_use]
    pub fn new() -> Self {
        let (tx, rx) = bounded(1);
        Self {
            set: Arc::new(AtomicBool::new(false)),
            tx,
            rx,
        }
    }

    /// Sets the flag. Returns true only for the first call.
    pub fn set(&self) -> bool {
        if self.set.swap(true, Ordering::SeqCst) {
            return false;
        }
        let _ = self.tx.try_send(());
        true
    }

    /// True once set.
    #[must_use]
    pub fn is_set(&self) -> bool {
        self.set.load(Ordering::SeqCst)
    }

    /// Blocks until set or `timeout` elapses. Returns whether it is set.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        if self.is_set() {
            return true;
        }
        match self.rx.recv_timeout(timeout) {
            Ok(()) => {
                let _ = self.tx.try_send(());
                true
            }
            Err(_) => self.is_set(),
        }
    }
}
