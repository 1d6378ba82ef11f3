//! Cross-thread notification primitive.
//!
//! Three independent [`EventSignal`]s wire the producer and consumer sides
//! together without forcing every producer to wake the worker on every
//! commit (see [`crate::worker`] for why that matters):
//!
//! - the *queue-full* event: producers -> worker, "there may be work, or a
//!   producer is blocked on fullness".
//! - the *queue-drained* event: worker -> blocked producers, "you may retry
//!   your push".
//! - the *panic-done* event: worker -> the thread that called
//!   [`crate::logger::Logger::panic_flush`], "it is safe to proceed".
//!
//! Grounded on the condvar pairing `BlockingWaitStrategy`
//! (`flux/src/disruptor/wait_strategy.rs`) uses for its consumer-side wait,
//! generalized from "wait for a sequence" to a plain level-triggered flag.

use parking_lot::{Condvar, Mutex};
use std::time::Duration;

/// A single-flag, level-triggered, multi-waiter notification.
///
/// `signal()` is idempotent and cheap to call from many threads at once;
/// `wait` consumes the flag it observes, so a signal sent while nobody is
/// waiting is not lost, but is only delivered to the first waiter that
/// wakes after it.
pub struct EventSignal {
    state: Mutex<bool>,
    condvar: Condvar,
}

impl EventSignal {
    /// Create a new, unsignalled event.
    pub fn new() -> Self {
        Self { state: Mutex::new(false), condvar: Condvar::new() }
    }

    /// Set the flag and wake every waiter.
    pub fn signal(&self) {
        let mut flag = self.state.lock();
        *flag = true;
        self.condvar.notify_all();
    }

    /// Wait for the flag to be set, then clear it.
    ///
    /// `timeout_ms == 0` waits indefinitely, matching the spec's
    /// `wait(timeout_ms)` contract. Returns `true` if the flag was observed
    /// set, `false` if the timeout elapsed first.
    pub fn wait(&self, timeout_ms: u64) -> bool {
        let mut flag = self.state.lock();
        if *flag {
            *flag = false;
            return true;
        }
        if timeout_ms == 0 {
            self.condvar.wait(&mut flag);
            *flag = false;
            return true;
        }
        let timeout = Duration::from_millis(timeout_ms);
        let result = self.condvar.wait_for(&mut flag, timeout);
        if *flag {
            *flag = false;
            true
        } else {
            !result.timed_out()
        }
    }
}

impl Default for EventSignal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    #[test]
    fn signal_before_wait_is_observed() {
        let event = EventSignal::new();
        event.signal();
        assert!(event.wait(10));
    }

    #[test]
    fn wait_times_out_when_never_signalled() {
        let event = EventSignal::new();
        let start = Instant::now();
        assert!(!event.wait(20));
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn cross_thread_signal_wakes_waiter() {
        let event = Arc::new(EventSignal::new());
        let sender = event.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            sender.signal();
        });
        assert!(event.wait(0));
        handle.join().unwrap();
    }

    #[test]
    fn flag_is_consumed_by_first_waiter() {
        let event = EventSignal::new();
        event.signal();
        assert!(event.wait(10));
        assert!(!event.wait(10));
    }
}
