//! Shared per-run coordination state.
//!
//! One [`RunContext`] exists per graph run and is handed to every
//! worker and row set at construction time, never reached through a
//! process-wide singleton. It carries the cooperative stop flag and the
//! poll interval that bounds how long any blocking wait goes without
//! re-checking that flag.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Coordination state shared by every participant of one graph run.
#[derive(Debug)]
pub struct RunContext {
    stop: AtomicBool,
    poll_interval: Duration,
}

impl RunContext {
    #[must_use]
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            stop: AtomicBool::new(false),
            poll_interval,
        }
    }

    /// Raise the stop flag. Idempotent; visible to all workers within
    /// one poll interval.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    /// Upper bound on any single blocking wait.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new(Duration::from_millis(20))
    }
}

/// Start barrier releasing all workers simultaneously.
///
/// Workers park here until the controller has spawned every one of
/// them; a fast early step can therefore never mark its outputs done
/// before a slow downstream step has begun listening. The wait is
/// timed against the stop flag like every other wait in the engine, so
/// an aborted start never strands a spawned worker.
#[derive(Debug, Default)]
pub(crate) struct StartGate {
    opened: parking_lot::Mutex<bool>,
    released: parking_lot::Condvar,
}

impl StartGate {
    /// Release every parked worker. Idempotent.
    pub(crate) fn open(&self) {
        let mut opened = self.opened.lock();
        *opened = true;
        self.released.notify_all();
    }

    /// Park until the gate opens or a stop is pending.
    pub(crate) fn wait_open(&self, ctx: &RunContext) {
        let mut opened = self.opened.lock();
        while !*opened && !ctx.stop_requested() {
            self.released.wait_for(&mut opened, ctx.poll_interval());
        }
    }
}
