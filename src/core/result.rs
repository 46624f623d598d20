//! One-shot handoff of a thread's outcome to its owner
//!
//! [`channel`] returns a sender that the thread body fulfills exactly once
//! (enforced by [`ResultSender::fulfill`] taking `self`) and a receiver the
//! owner reads exactly once. The slot is a bounded crossbeam channel of
//! capacity one, so the write never blocks the worker.

use crate::core::{Result, ThreadError};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Duration;

/// What a thread body produced
#[derive(Debug)]
pub enum Outcome<T> {
    /// The closure returned normally
    Value(T),
    /// The closure panicked; carries the panic message
    Panicked(String),
}

impl<T> Outcome<T> {
    /// Run `f`, capturing a panic instead of unwinding
    pub fn capture<F>(f: F) -> Self
    where
        F: FnOnce() -> T,
    {
        match catch_unwind(AssertUnwindSafe(f)) {
            Ok(value) => Outcome::Value(value),
            Err(payload) => Outcome::Panicked(panic_message(payload.as_ref())),
        }
    }

    /// Whether the closure returned normally
    pub fn is_value(&self) -> bool {
        matches!(self, Outcome::Value(_))
    }

    /// Convert into the value, or a [`ThreadError::WorkerPanic`]
    pub fn into_result(self) -> Result<T> {
        match self {
            Outcome::Value(value) => Ok(value),
            Outcome::Panicked(message) => Err(ThreadError::worker_panic(message)),
        }
    }
}

/// Extract a readable message from a panic payload
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}

/// Create a connected sender/receiver pair
pub fn channel<T>() -> (ResultSender<T>, ResultReceiver<T>) {
    let (tx, rx) = crossbeam_channel::bounded(1);
    (
        ResultSender { tx },
        ResultReceiver {
            state: ReceiverState::Pending(rx),
        },
    )
}

/// Worker side of the channel
#[derive(Debug)]
pub struct ResultSender<T> {
    tx: Sender<Outcome<T>>,
}

impl<T> ResultSender<T> {
    /// Publish the outcome. Consumes the sender, so it can only happen once.
    pub fn fulfill(self, outcome: Outcome<T>) {
        if self.tx.send(outcome).is_err() {
            log::trace!("result receiver dropped before the thread finished");
        }
    }
}

#[derive(Debug)]
enum ReceiverState<T> {
    Unbound,
    Pending(Receiver<Outcome<T>>),
    Consumed,
}

/// Owner side of the channel
#[derive(Debug)]
pub struct ResultReceiver<T> {
    state: ReceiverState<T>,
}

impl<T> Default for ResultReceiver<T> {
    /// A receiver with no thread behind it
    fn default() -> Self {
        Self {
            state: ReceiverState::Unbound,
        }
    }
}

impl<T> ResultReceiver<T> {
    /// Block until the outcome arrives and take it.
    ///
    /// # Errors
    ///
    /// - [`ThreadError::WorkerPanic`] if the thread body panicked
    /// - [`ThreadError::ResultUnavailable`] if the result was already taken,
    ///   no thread was started, or the thread ended without producing one
    pub fn await_result(&mut self) -> Result<T> {
        let rx = self.take_receiver()?;
        match rx.recv() {
            Ok(outcome) => outcome.into_result(),
            Err(_) => Err(exited_without_result()),
        }
    }

    /// Like [`await_result`](Self::await_result) but gives up after `timeout`.
    ///
    /// On timeout the slot is left intact and may be read again later.
    pub fn await_result_timeout(&mut self, timeout: Duration) -> Result<T> {
        let outcome = match &self.state {
            ReceiverState::Pending(rx) => rx.recv_timeout(timeout),
            _ => return Err(self.unreadable()),
        };
        match outcome {
            Ok(outcome) => {
                self.state = ReceiverState::Consumed;
                outcome.into_result()
            }
            Err(RecvTimeoutError::Timeout) => Err(ThreadError::result_unavailable(format!(
                "no result within {}ms",
                timeout.as_millis()
            ))),
            Err(RecvTimeoutError::Disconnected) => {
                self.state = ReceiverState::Consumed;
                Err(exited_without_result())
            }
        }
    }

    /// Take the outcome if it has already arrived
    pub fn try_result(&mut self) -> Option<Result<T>> {
        let outcome = match &self.state {
            ReceiverState::Pending(rx) => rx.try_recv(),
            _ => return Some(Err(self.unreadable())),
        };
        match outcome {
            Ok(outcome) => {
                self.state = ReceiverState::Consumed;
                Some(outcome.into_result())
            }
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                self.state = ReceiverState::Consumed;
                Some(Err(exited_without_result()))
            }
        }
    }

    /// Whether an outcome is waiting to be read
    pub fn is_ready(&self) -> bool {
        match &self.state {
            ReceiverState::Pending(rx) => !rx.is_empty(),
            _ => false,
        }
    }

    /// Whether the outcome has already been taken
    pub fn is_consumed(&self) -> bool {
        matches!(self.state, ReceiverState::Consumed)
    }

    fn take_receiver(&mut self) -> Result<Receiver<Outcome<T>>> {
        match std::mem::replace(&mut self.state, ReceiverState::Consumed) {
            ReceiverState::Pending(rx) => Ok(rx),
            other => {
                self.state = other;
                Err(self.unreadable())
            }
        }
    }

    fn unreadable(&self) -> ThreadError {
        match self.state {
            ReceiverState::Unbound => ThreadError::result_unavailable("no thread was started"),
            _ => ThreadError::result_unavailable("result already taken"),
        }
    }
}

fn exited_without_result() -> ThreadError {
    ThreadError::result_unavailable("thread exited without producing a result")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_value_crosses_threads() {
        let (tx, mut rx) = channel();
        let worker = thread::spawn(move || tx.fulfill(Outcome::capture(|| 6 * 7)));

        assert_eq!(rx.await_result().unwrap(), 42);
        worker.join().unwrap();
    }

    #[test]
    fn test_unit_value_is_distinct_from_empty() {
        let (tx, mut rx) = channel::<()>();
        assert!(!rx.is_ready());
        assert!(rx.try_result().is_none());

        tx.fulfill(Outcome::capture(|| ()));
        assert!(rx.is_ready());
        assert!(matches!(rx.try_result(), Some(Ok(()))));
    }

    #[test]
    fn test_panic_is_captured() {
        let outcome: Outcome<u32> = Outcome::capture(|| panic!("bad input {}", 7));
        assert!(!outcome.is_value());

        let (tx, mut rx) = channel();
        tx.fulfill(outcome);
        match rx.await_result() {
            Err(ThreadError::WorkerPanic { message }) => assert_eq!(message, "bad input 7"),
            other => panic!("expected worker panic, got {:?}", other),
        }
    }

    #[test]
    fn test_second_read_is_an_error() {
        let (tx, mut rx) = channel();
        tx.fulfill(Outcome::Value("once"));

        assert_eq!(rx.await_result().unwrap(), "once");
        assert!(rx.is_consumed());
        assert!(matches!(
            rx.await_result(),
            Err(ThreadError::ResultUnavailable { .. })
        ));
    }

    #[test]
    fn test_dropped_sender_reports_unavailable() {
        let (tx, mut rx) = channel::<i32>();
        drop(tx);
        let err = rx.await_result().unwrap_err();
        assert!(err.to_string().contains("without producing a result"));
    }

    #[test]
    fn test_unbound_receiver() {
        let mut rx = ResultReceiver::<i32>::default();
        let err = rx.await_result().unwrap_err();
        assert!(err.to_string().contains("no thread was started"));
        assert!(!rx.is_consumed());
    }

    #[test]
    fn test_timeout_keeps_slot() {
        let (tx, mut rx) = channel();
        assert!(rx
            .await_result_timeout(Duration::from_millis(10))
            .is_err());

        tx.fulfill(Outcome::Value(5u8));
        assert_eq!(rx.await_result_timeout(Duration::from_millis(10)).unwrap(), 5);
    }
}
