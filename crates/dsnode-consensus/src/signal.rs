// Typed one-to-many notification with a bounded blocking wait.
//
// Waiters take a ticket (the current generation) before doing whatever may
// trigger the notification, then wait for a generation newer than their
// ticket. A notification raised between taking the ticket and waiting is not
// lost, and a spurious condvar wakeup never satisfies the wait.

use parking_lot::{Condvar, Mutex};
use std::time::Duration;

/// Opaque position in a signal's notification sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket(u64);

struct SignalState<T> {
    generation: u64,
    latest: Option<T>,
}

pub struct Signal<T> {
    state: Mutex<SignalState<T>>,
    cv: Condvar,
}

impl<T: Clone> Signal<T> {
    pub fn new() -> Self {
        Signal {
            state: Mutex::new(SignalState {
                generation: 0,
                latest: None,
            }),
            cv: Condvar::new(),
        }
    }

    pub fn ticket(&self) -> Ticket {
        Ticket(self.state.lock().generation)
    }

    /// Publish `value` and wake every waiter.
    pub fn notify(&self, value: T) {
        let mut state = self.state.lock();
        state.generation += 1;
        state.latest = Some(value);
        self.cv.notify_all();
    }

    /// Block until a notification newer than `ticket` arrives or `timeout` elapses.
    ///
    /// Returns the most recent value on notification, `None` on timeout.
    pub fn wait(&self, ticket: Ticket, timeout: Duration) -> Option<T> {
        let mut state = self.state.lock();
        let result = self
            .cv
            .wait_while_for(&mut state, |state| state.generation <= ticket.0, timeout);
        if result.timed_out() && state.generation <= ticket.0 {
            return None;
        }
        state.latest.clone()
    }

    /// Value of the most recent notification, if any.
    pub fn latest(&self) -> Option<T> {
        self.state.lock().latest.clone()
    }
}

impl<T: Clone> Default for Signal<T> {
    fn default() -> Self {
        Self::new()
    }
}
