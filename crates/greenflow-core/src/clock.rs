//! Virtual simulation clock.
//!
//! The engine owns the clock and advances it; every node receives a cloned
//! [`SimClock`] handle at construction so it can read "now" outside of a
//! scheduled update (for example when a reporting call forces a counter
//! refresh). Clones share the same underlying time.

use std::cell::Cell;
use std::rc::Rc;

/// Simulated time in milliseconds.
pub type Millis = u64;

/// Returned from `on_update` to mean "only wake me on invalidation".
pub const NEVER: Millis = Millis::MAX;

/// Errors raised by clock manipulation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClockError {
    #[error("clock cannot move backwards from {now} ms to {requested} ms")]
    Regression { now: Millis, requested: Millis },
}

/// Shared handle to a monotonic virtual clock.
#[derive(Debug, Clone, Default)]
pub struct SimClock {
    now: Rc<Cell<Millis>>,
}

impl SimClock {
    /// Create a clock starting at `start` milliseconds.
    pub fn new(start: Millis) -> Self {
        Self {
            now: Rc::new(Cell::new(start)),
        }
    }

    /// Current simulated time.
    pub fn now(&self) -> Millis {
        self.now.get()
    }

    /// Move the clock forward to `t`. Moving to the current time is a no-op.
    pub fn advance_to(&self, t: Millis) -> Result<(), ClockError> {
        let now = self.now.get();
        if t < now {
            return Err(ClockError::Regression { now, requested: t });
        }
        self.now.set(t);
        Ok(())
    }

    /// Returns true if both handles observe the same clock.
    pub fn same_clock(&self, other: &SimClock) -> bool {
        Rc::ptr_eq(&self.now, &other.now)
    }
}
