use std::cell::Cell;
use std::time::Duration;

use web_time::Instant;

pub trait Clock: 'static {
    fn now(&self) -> Instant;

    /// Blocks until `deadline`. Called when the loop has nothing to do but
    /// wait for a timer.
    fn wait_until(&self, deadline: Instant);
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn wait_until(&self, deadline: Instant) {
        let now = Instant::now();
        if deadline > now {
            std::thread::sleep(deadline - now);
        }
    }
}

/// A clock you drive by hand. Waiting jumps straight to the deadline.
pub struct TestClock {
    t: Cell<Instant>,
}

impl TestClock {
    pub fn new() -> Self {
        Self {
            t: Cell::new(Instant::now()),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.t.set(self.t.get() + by);
    }
}

impl Default for TestClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TestClock {
    fn now(&self) -> Instant {
        self.t.get()
    }

    fn wait_until(&self, deadline: Instant) {
        if deadline > self.t.get() {
            self.t.set(deadline);
        }
    }
}
