//! Run-scoped cancellation context
//!
//! The run context is the sole cancellation authority: stop requests, the
//! run deadline, and fatal errors all cancel it, and every blocking sleep
//! in the engine waits on it so a stop returns promptly.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

pub struct RunContext {
    cancelled: AtomicBool,
    deadline: Mutex<Option<Instant>>,
    sleep_lock: Mutex<()>,
    sleep_cvar: Condvar,
}

impl RunContext {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            cancelled: AtomicBool::new(false),
            deadline: Mutex::new(None),
            sleep_lock: Mutex::new(()),
            sleep_cvar: Condvar::new(),
        })
    }

    /// Installs the run deadline. The controller owns this; workers only
    /// observe it through [`RunContext::is_cancelled`].
    pub fn set_deadline(&self, at: Instant) {
        *self
            .deadline
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(at);
    }

    pub fn deadline(&self) -> Option<Instant> {
        *self.deadline.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.sleep_cvar.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        if self.cancelled.load(Ordering::SeqCst) {
            return true;
        }
        match self.deadline() {
            Some(at) => Instant::now() >= at,
            None => false,
        }
    }

    /// Cancellable sleep. Returns `true` when the full duration elapsed,
    /// `false` when interrupted by cancellation or the deadline.
    pub fn sleep(&self, dur: Duration) -> bool {
        let wake_at = Instant::now() + dur;
        let mut guard = self
            .sleep_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        loop {
            if self.is_cancelled() {
                return false;
            }
            let now = Instant::now();
            if now >= wake_at {
                return true;
            }
            let mut wait = wake_at - now;
            if let Some(at) = self.deadline() {
                if at > now {
                    wait = wait.min(at - now);
                }
            }
            let (g, _) = self
                .sleep_cvar
                .wait_timeout(guard, wait)
                .unwrap_or_else(PoisonError::into_inner);
            guard = g;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_sleep_completes_without_cancel() {
        let ctx = RunContext::new();
        let start = Instant::now();
        assert!(ctx.sleep(Duration::from_millis(30)));
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn test_cancel_interrupts_sleep_promptly() {
        let ctx = RunContext::new();
        let waker = ctx.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            waker.cancel();
        });
        let start = Instant::now();
        assert!(!ctx.sleep(Duration::from_secs(10)));
        assert!(start.elapsed() < Duration::from_secs(2));
        handle.join().unwrap();
    }

    #[test]
    fn test_deadline_cancels() {
        let ctx = RunContext::new();
        ctx.set_deadline(Instant::now() + Duration::from_millis(40));
        assert!(!ctx.is_cancelled());
        let start = Instant::now();
        assert!(!ctx.sleep(Duration::from_secs(10)));
        assert!(start.elapsed() < Duration::from_secs(2));
        assert!(ctx.is_cancelled());
    }

    #[test]
    fn test_cancel_is_sticky() {
        let ctx = RunContext::new();
        ctx.cancel();
        assert!(ctx.is_cancelled());
        assert!(!ctx.sleep(Duration::from_millis(10)));
        assert!(ctx.is_cancelled());
    }
}
