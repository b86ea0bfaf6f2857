//! Periodic counter sampling for throughput and buffer-fill
//! observability.
//!
//! The sampler thread snapshots every step copy at a fixed interval
//! into a bounded history. Sampling reads atomics and per-set fill
//! gauges only; it never blocks a worker and has no effect on
//! scheduling or backpressure.

use std::collections::VecDeque;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use rowflow_types::{SnapshotDelta, StepSnapshot};

use crate::graph::GraphMonitor;

#[derive(Default)]
struct Shared {
    history: Mutex<VecDeque<Vec<StepSnapshot>>>,
    stop: Mutex<bool>,
    stop_signal: Condvar,
}

/// Periodic sampler over one graph's step runtimes.
pub struct PerformanceSampler {
    shared: Arc<Shared>,
    handle: Option<JoinHandle<()>>,
}

impl PerformanceSampler {
    /// Start sampling `monitor` every `interval`, retaining the most
    /// recent `history_cap` sample sets (oldest evicted).
    #[must_use]
    pub fn start(monitor: GraphMonitor, interval: Duration, history_cap: usize) -> Self {
        let shared = Arc::new(Shared::default());
        let thread_shared = Arc::clone(&shared);
        let history_cap = history_cap.max(1);

        let handle = std::thread::Builder::new()
            .name("rowflow-sampler".to_string())
            .spawn(move || {
                loop {
                    {
                        let mut stopped = thread_shared.stop.lock();
                        if !*stopped {
                            thread_shared
                                .stop_signal
                                .wait_for(&mut stopped, interval);
                        }
                        if *stopped {
                            break;
                        }
                    }

                    let sample = monitor.snapshot();
                    tracing::trace!(steps = sample.len(), "performance sample taken");
                    let mut history = thread_shared.history.lock();
                    if history.len() >= history_cap {
                        history.pop_front();
                    }
                    history.push_back(sample);
                }
            })
            .expect("failed to spawn sampler thread");

        Self {
            shared,
            handle: Some(handle),
        }
    }

    /// The most recent sample set, if any was taken yet.
    #[must_use]
    pub fn latest(&self) -> Option<Vec<StepSnapshot>> {
        self.shared.history.lock().back().cloned()
    }

    /// All retained sample sets, oldest first.
    #[must_use]
    pub fn history(&self) -> Vec<Vec<StepSnapshot>> {
        self.shared.history.lock().iter().cloned().collect()
    }

    /// Interval deltas between the two most recent sample sets, keyed
    /// per step copy. With fewer than two samples, deltas against an
    /// absent previous snapshot (absolute values, zero elapsed time).
    #[must_use]
    pub fn deltas(&self) -> Vec<SnapshotDelta> {
        let history = self.shared.history.lock();
        let Some(curr) = history.back() else {
            return Vec::new();
        };
        let prev = history.len().checked_sub(2).and_then(|i| history.get(i));
        curr.iter()
            .map(|snapshot| {
                let previous = prev.and_then(|set| {
                    set.iter()
                        .find(|p| p.step == snapshot.step && p.copy == snapshot.copy)
                });
                SnapshotDelta::between(snapshot, previous)
            })
            .collect()
    }

    /// Stop the sampler and join its thread. The retained history
    /// stays readable afterwards.
    pub fn stop(&mut self) {
        {
            let mut stopped = self.shared.stop.lock();
            *stopped = true;
            self.shared.stop_signal.notify_all();
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for PerformanceSampler {
    fn drop(&mut self) {
        self.stop();
    }
}
