//! Debounce timers scoped to one attached session
//!
//! [`Debouncer`] is trailing: every call replaces the pending one and restarts
//! the window, so a burst collapses into a single call at its end.
//! [`PressDebouncer`] is leading: the first press passes, presses inside the
//! window are dropped and push the window further out.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

pub struct Debouncer {
    window: Duration,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: Mutex::new(None),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Schedule `fut` to run once the window has passed without another call.
    ///
    /// Must be called from within a tokio runtime. Once the window elapses the
    /// future runs on its own task, so a later `cancel` does not interrupt it.
    pub fn call<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let window = self.window;
        let mut pending = self.lock();
        if let Some(previous) = pending.take() {
            previous.abort();
        }
        *pending = Some(tokio::spawn(async move {
            tokio::time::sleep(window).await;
            tokio::spawn(fut);
        }));
    }

    /// Drop the pending call, if any
    pub fn cancel(&self) {
        if let Some(pending) = self.lock().take() {
            pending.abort();
        }
    }

    pub fn is_pending(&self) -> bool {
        self.lock()
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}

pub struct PressDebouncer {
    window: Duration,
    last_press: Mutex<Option<Instant>>,
    closed: AtomicBool,
}

impl PressDebouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_press: Mutex::new(None),
            closed: AtomicBool::new(false),
        }
    }

    /// Record a press; `true` if it should be acted on
    pub fn try_press(&self) -> bool {
        if self.closed.load(Ordering::SeqCst) {
            return false;
        }

        let now = Instant::now();
        let mut last = self.last_press.lock().unwrap_or_else(|e| e.into_inner());
        let accepted = match *last {
            Some(previous) => now.duration_since(previous) >= self.window,
            None => true,
        };
        *last = Some(now);
        accepted
    }

    /// Reject every later press
    pub fn cancel(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}
