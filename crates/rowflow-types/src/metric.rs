//! Performance snapshots and interval diffs.
//!
//! The sampler captures a [`StepSnapshot`] per step copy at a fixed
//! interval; [`SnapshotDelta::between`] turns two ordered snapshots of
//! the same step into interval throughput figures. Observability only:
//! nothing here feeds back into scheduling or backpressure.

use serde::{Deserialize, Serialize};

use crate::state::StepState;

/// Immutable point-in-time copy of one step copy's cumulative counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepSnapshot {
    pub step: String,
    pub copy: u32,
    pub state: StepState,
    /// Milliseconds since the Unix epoch at capture time.
    pub timestamp_ms: u64,
    pub rows_read: u64,
    pub rows_written: u64,
    pub rows_updated: u64,
    pub rows_rejected: u64,
    pub errors: u64,
    /// Occupied slots across the step's input row sets at sample time.
    pub input_fill: usize,
    /// Occupied slots across the step's output row sets at sample time.
    pub output_fill: usize,
}

/// Interval figures between two ordered snapshots of the same step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotDelta {
    pub step: String,
    pub copy: u32,
    /// Interval length; zero when no previous snapshot existed.
    pub elapsed_ms: u64,
    pub rows_read: u64,
    pub rows_written: u64,
    pub rows_updated: u64,
    pub rows_rejected: u64,
    pub errors: u64,
    /// Fill figures carried from the current snapshot, never diffed.
    pub input_fill: usize,
    pub output_fill: usize,
}

impl SnapshotDelta {
    /// Diff `curr` against `prev`.
    ///
    /// With no `prev`, the delta equals the absolute cumulative values
    /// and a zero time delta. Counters are monotonic, so saturating
    /// subtraction only matters if snapshots are passed out of order.
    #[must_use]
    pub fn between(curr: &StepSnapshot, prev: Option<&StepSnapshot>) -> Self {
        match prev {
            None => Self {
                step: curr.step.clone(),
                copy: curr.copy,
                elapsed_ms: 0,
                rows_read: curr.rows_read,
                rows_written: curr.rows_written,
                rows_updated: curr.rows_updated,
                rows_rejected: curr.rows_rejected,
                errors: curr.errors,
                input_fill: curr.input_fill,
                output_fill: curr.output_fill,
            },
            Some(prev) => Self {
                step: curr.step.clone(),
                copy: curr.copy,
                elapsed_ms: curr.timestamp_ms.saturating_sub(prev.timestamp_ms),
                rows_read: curr.rows_read.saturating_sub(prev.rows_read),
                rows_written: curr.rows_written.saturating_sub(prev.rows_written),
                rows_updated: curr.rows_updated.saturating_sub(prev.rows_updated),
                rows_rejected: curr.rows_rejected.saturating_sub(prev.rows_rejected),
                errors: curr.errors.saturating_sub(prev.errors),
                input_fill: curr.input_fill,
                output_fill: curr.output_fill,
            },
        }
    }

    /// Rows read per second over the interval; `None` for a zero-length
    /// interval.
    #[must_use]
    pub fn read_rate(&self) -> Option<f64> {
        self.rate(self.rows_read)
    }

    /// Rows written per second over the interval; `None` for a
    /// zero-length interval.
    #[must_use]
    pub fn write_rate(&self) -> Option<f64> {
        self.rate(self.rows_written)
    }

    #[allow(clippy::cast_precision_loss)]
    fn rate(&self, count: u64) -> Option<f64> {
        if self.elapsed_ms == 0 {
            return None;
        }
        Some(count as f64 * 1_000.0 / self.elapsed_ms as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(timestamp_ms: u64, rows_read: u64, rows_written: u64) -> StepSnapshot {
        StepSnapshot {
            step: "gen".into(),
            copy: 0,
            state: StepState::Running,
            timestamp_ms,
            rows_read,
            rows_written,
            rows_updated: 0,
            rows_rejected: 0,
            errors: 0,
            input_fill: 0,
            output_fill: 3,
        }
    }

    #[test]
    fn diff_without_previous_equals_absolute_values() {
        let s = snapshot(5_000, 1_234, 1_200);
        let d = SnapshotDelta::between(&s, None);
        assert_eq!(d.rows_read, s.rows_read);
        assert_eq!(d.rows_written, s.rows_written);
        assert_eq!(d.elapsed_ms, 0);
    }

    #[test]
    fn diff_subtracts_counters_and_timestamps() {
        let s1 = snapshot(1_000, 100, 90);
        let s2 = snapshot(3_000, 350, 330);
        let d = SnapshotDelta::between(&s2, Some(&s1));
        assert_eq!(d.rows_read, s2.rows_read - s1.rows_read);
        assert_eq!(d.rows_written, 240);
        assert_eq!(d.elapsed_ms, 2_000);
    }

    #[test]
    fn fill_is_carried_not_diffed() {
        let s1 = snapshot(1_000, 0, 0);
        let s2 = snapshot(2_000, 10, 10);
        let d = SnapshotDelta::between(&s2, Some(&s1));
        assert_eq!(d.output_fill, 3);
    }

    #[test]
    fn rates_over_the_interval() {
        let s1 = snapshot(0, 0, 0);
        let s2 = snapshot(2_000, 500, 400);
        let d = SnapshotDelta::between(&s2, Some(&s1));
        assert_eq!(d.read_rate(), Some(250.0));
        assert_eq!(d.write_rate(), Some(200.0));
        assert_eq!(SnapshotDelta::between(&s1, None).read_rate(), None);
    }

    #[test]
    fn serde_roundtrip() {
        let s = snapshot(42, 7, 6);
        let json = serde_json::to_string(&s).unwrap();
        let back: StepSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(s, back);
    }
}
