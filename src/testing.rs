//! Deterministic stand-ins for the platform services, shared by the unit
//! tests.

use std::sync::{
    atomic::{AtomicI64, Ordering},
    Arc,
};

use parking_lot::Mutex;

use crate::system::{time::Nanoseconds, Clock, DeadlineTimer};

/// A clock that only moves when told to.
#[derive(Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(start: Nanoseconds) -> Arc<Self> {
        Arc::new(Self {
            now: AtomicI64::new(start.0),
        })
    }

    pub fn set(&self, now: Nanoseconds) {
        self.now.store(now.0, Ordering::SeqCst);
    }

    pub fn advance(&self, by: Nanoseconds) {
        self.now.fetch_add(by.0, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Nanoseconds {
        Nanoseconds(self.now.load(Ordering::SeqCst))
    }
}

/// Records every wait and jumps the manual clock to the deadline instead of
/// blocking.
pub struct RecordingTimer {
    clock: Arc<ManualClock>,
    waits: Mutex<Vec<(Nanoseconds, Nanoseconds)>>,
}

impl RecordingTimer {
    pub fn new(clock: Arc<ManualClock>) -> Arc<Self> {
        Arc::new(Self {
            clock,
            waits: Mutex::new(Vec::new()),
        })
    }

    /// `(now, deadline)` of every wait that had to block.
    pub fn waits(&self) -> Vec<(Nanoseconds, Nanoseconds)> {
        self.waits.lock().clone()
    }
}

impl DeadlineTimer for RecordingTimer {
    fn wait_until(&self, now: Nanoseconds, deadline: Nanoseconds) {
        if deadline <= now {
            return;
        }

        self.waits.lock().push((now, deadline));
        self.clock.set(deadline);
    }
}
