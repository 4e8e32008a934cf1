//! One-shot rendezvous between a reply callback and a blocked caller.

use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::error::{Result, RpcError};
use crate::messenger::BinaryMessenger;

pub(crate) type Done<T> = Box<dyn FnOnce(Result<T>) + Send + 'static>;

/// Issue a call through `issue` and block until it reports its outcome.
///
/// Refused on the messenger's dispatch thread, where the reply could never
/// be processed. Bounded by the messenger's call timeout when it has one;
/// on expiry the messenger is told to release overdue sends.
pub(crate) fn call_blocking<T: Send + 'static>(
    messenger: &dyn BinaryMessenger,
    issue: impl FnOnce(Done<T>),
) -> Result<T> {
    if messenger.is_dispatch_thread() {
        return Err(RpcError::WouldDeadlock);
    }
    let completion = Arc::new(Completion::new());
    let done = Arc::clone(&completion);
    issue(Box::new(move |outcome| done.complete(outcome)));
    let Some(timeout) = messenger.call_timeout() else {
        return completion.wait();
    };
    match completion.wait_timeout(timeout) {
        Some(outcome) => outcome,
        None => {
            messenger.expire_overdue();
            Err(RpcError::Timeout(timeout))
        }
    }
}

pub(crate) struct Completion<T> {
    slot: Mutex<Option<T>>,
    ready: Condvar,
}

impl<T> Completion<T> {
    pub(crate) fn new() -> Self {
        Self {
            slot: Mutex::new(None),
            ready: Condvar::new(),
        }
    }

    /// Store the outcome and wake the waiter. Later completions are ignored.
    pub(crate) fn complete(&self, value: T) {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_none() {
            *slot = Some(value);
            self.ready.notify_all();
        }
    }

    /// Block until completed.
    pub(crate) fn wait(&self) -> T {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if let Some(value) = slot.take() {
                return value;
            }
            slot = self
                .ready
                .wait(slot)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Block until completed or `timeout` elapses.
    pub(crate) fn wait_timeout(&self, timeout: Duration) -> Option<T> {
        let deadline = Instant::now() + timeout;
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if let Some(value) = slot.take() {
                return Some(value);
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            slot = self
                .ready
                .wait_timeout(slot, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    #[test]
    fn wakes_waiter_from_other_thread() {
        let completion = Arc::new(Completion::new());
        let c = Arc::clone(&completion);
        let handle = thread::spawn(move || c.complete(7));
        assert_eq!(completion.wait(), 7);
        handle.join().unwrap();
    }

    #[test]
    fn first_completion_wins() {
        let completion = Completion::new();
        completion.complete("first");
        completion.complete("second");
        assert_eq!(completion.wait(), "first");
    }

    #[test]
    fn times_out_without_completion() {
        let completion = Completion::<u8>::new();
        assert_eq!(completion.wait_timeout(Duration::from_millis(20)), None);
    }
}
