//! One-time signals shared between a thread handle and its thread body
//!
//! [`StartGate`] is the barrier used when a platform can only configure a
//! thread after it has started: the body blocks on the gate until the owner
//! has applied every scheduling property, then either runs or, if
//! configuration failed, returns without running the user closure.
//! It is the only mutable state the owner and the body share besides the
//! result channel.
//!
//! [`Completion`] is set by the body as its last action and lets the owner
//! wait for it with a deadline.

use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GateState {
    Closed,
    Open,
    Cancelled,
}

/// Single-use barrier released by the owning thread
#[derive(Debug)]
pub struct StartGate {
    state: Mutex<GateState>,
    cond: Condvar,
}

impl Default for StartGate {
    fn default() -> Self {
        Self::new()
    }
}

impl StartGate {
    /// Create a closed gate
    pub fn new() -> Self {
        Self {
            state: Mutex::new(GateState::Closed),
            cond: Condvar::new(),
        }
    }

    /// Release the waiter and let it run
    pub fn open(&self) {
        self.release(GateState::Open);
    }

    /// Release the waiter and tell it not to run
    pub fn cancel(&self) {
        self.release(GateState::Cancelled);
    }

    /// Block until released. Returns `true` if the gate was opened.
    pub fn wait(&self) -> bool {
        let mut state = self.state.lock();
        while *state == GateState::Closed {
            self.cond.wait(&mut state);
        }
        *state == GateState::Open
    }

    /// Whether the gate has been opened or cancelled
    pub fn is_released(&self) -> bool {
        *self.state.lock() != GateState::Closed
    }

    fn release(&self, to: GateState) {
        let mut state = self.state.lock();
        debug_assert_eq!(*state, GateState::Closed, "start gate released twice");
        *state = to;
        self.cond.notify_all();
    }
}

/// Latch set once a thread body has finished
#[derive(Debug, Default)]
pub struct Completion {
    done: Mutex<bool>,
    cond: Condvar,
}

impl Completion {
    /// Create an unset latch
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the body as finished
    pub fn finish(&self) {
        let mut done = self.done.lock();
        *done = true;
        self.cond.notify_all();
    }

    /// Whether the body has finished
    pub fn is_finished(&self) -> bool {
        *self.done.lock()
    }

    /// Wait up to `timeout` for the body to finish. Returns whether it did.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut done = self.done.lock();
        if !*done {
            self.cond.wait_while_for(&mut done, |done| !*done, timeout);
        }
        *done
    }
}

/// Sets a [`Completion`] when dropped, whichever way the body exits
#[derive(Debug)]
pub(crate) struct CompletionGuard(pub(crate) Arc<Completion>);

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        self.0.finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;

    #[test]
    fn test_gate_blocks_until_opened() {
        let gate = Arc::new(StartGate::new());
        let ran = Arc::new(AtomicBool::new(false));

        let waiter = {
            let gate = Arc::clone(&gate);
            let ran = Arc::clone(&ran);
            thread::spawn(move || {
                if gate.wait() {
                    ran.store(true, Ordering::SeqCst);
                }
            })
        };

        thread::sleep(Duration::from_millis(30));
        assert!(!ran.load(Ordering::SeqCst));
        assert!(!gate.is_released());

        gate.open();
        waiter.join().unwrap();
        assert!(ran.load(Ordering::SeqCst));
    }

    #[test]
    fn test_cancelled_gate_reports_false() {
        let gate = StartGate::new();
        gate.cancel();
        assert!(gate.is_released());
        assert!(!gate.wait());
    }

    #[test]
    fn test_open_before_wait() {
        let gate = StartGate::new();
        gate.open();
        assert!(gate.wait());
    }

    #[test]
    fn test_completion_timeout() {
        let completion = Completion::new();
        assert!(!completion.wait_timeout(Duration::from_millis(10)));

        completion.finish();
        assert!(completion.is_finished());
        assert!(completion.wait_timeout(Duration::from_millis(10)));
    }

    #[test]
    fn test_guard_sets_completion_on_panic() {
        let completion = Arc::new(Completion::new());
        let guarded = Arc::clone(&completion);

        let result = thread::spawn(move || {
            let _guard = CompletionGuard(guarded);
            panic!("body failed");
        })
        .join();

        assert!(result.is_err());
        assert!(completion.is_finished());
    }
}
