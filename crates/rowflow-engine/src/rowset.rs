//! Bounded blocking row queue joining one producer step copy to one
//! consumer step copy.
//!
//! Backpressure is the queue bound: `put` blocks while full, `get`
//! blocks while empty. Every blocking wait is a timed wait re-evaluated
//! against the run's stop flag, so no caller ever blocks past a stop
//! request by more than one poll interval; this is the engine's
//! primary deadlock-avoidance mechanism.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};
use rowflow_types::Row;

use crate::context::RunContext;

#[derive(Debug)]
struct Inner {
    queue: VecDeque<Row>,
    producer_done: bool,
    consumer_done: bool,
}

/// Bounded single-producer/single-consumer row queue.
#[derive(Debug)]
pub struct RowSet {
    name: String,
    capacity: usize,
    inner: Mutex<Inner>,
    not_empty: Condvar,
    not_full: Condvar,
    ctx: Arc<RunContext>,
}

impl RowSet {
    /// A row set of the given capacity, bound to one run's context.
    ///
    /// # Panics
    ///
    /// Panics on a zero capacity; the definition validator rejects that
    /// before any row set is built.
    #[must_use]
    pub fn new(name: impl Into<String>, capacity: usize, ctx: Arc<RunContext>) -> Self {
        assert!(capacity > 0, "row set capacity must be at least 1");
        Self {
            name: name.into(),
            capacity,
            inner: Mutex::new(Inner {
                queue: VecDeque::with_capacity(capacity),
                producer_done: false,
                consumer_done: false,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            ctx,
        }
    }

    /// Enqueue a row, blocking while the queue is at capacity.
    ///
    /// Returns `false` without enqueueing once the consumer has been
    /// marked done or the run's stop flag is set.
    pub fn put(&self, row: Row) -> bool {
        self.offer(row).is_ok()
    }

    /// Like [`put`](Self::put), but hands the row back on refusal so a
    /// dispatcher can redirect it to another live target.
    pub(crate) fn offer(&self, row: Row) -> Result<(), Row> {
        let mut inner = self.inner.lock();
        loop {
            if inner.consumer_done || self.ctx.stop_requested() {
                return Err(row);
            }
            if inner.queue.len() < self.capacity {
                inner.queue.push_back(row);
                self.not_empty.notify_one();
                return Ok(());
            }
            self.not_full
                .wait_for(&mut inner, self.ctx.poll_interval());
        }
    }

    /// Dequeue a row, blocking while the queue is empty and the
    /// producer has not signaled done.
    ///
    /// Returns `None` once the queue is drained and the producer is
    /// done, or once the stop flag is set.
    pub fn get(&self) -> Option<Row> {
        let mut inner = self.inner.lock();
        loop {
            if self.ctx.stop_requested() {
                return None;
            }
            if let Some(row) = inner.queue.pop_front() {
                self.not_full.notify_one();
                return Some(row);
            }
            if inner.producer_done {
                return None;
            }
            self.not_empty
                .wait_for(&mut inner, self.ctx.poll_interval());
        }
    }

    /// Non-blocking dequeue; `None` when nothing is buffered.
    pub fn try_get(&self) -> Option<Row> {
        let mut inner = self.inner.lock();
        let row = inner.queue.pop_front();
        if row.is_some() {
            self.not_full.notify_one();
        }
        row
    }

    /// Park the caller for at most `max_wait` until data may be
    /// available. Used by fair multi-input polling; returns immediately
    /// if data is buffered, the producer is done, or a stop is pending.
    pub(crate) fn wait_for_data(&self, max_wait: std::time::Duration) {
        let mut inner = self.inner.lock();
        if !inner.queue.is_empty() || inner.producer_done || self.ctx.stop_requested() {
            return;
        }
        self.not_empty.wait_for(&mut inner, max_wait);
    }

    /// Producer signals that no further rows will arrive. Idempotent;
    /// wakes any blocked consumer so it can drain and observe
    /// end-of-stream.
    pub fn mark_producer_done(&self) {
        let mut inner = self.inner.lock();
        inner.producer_done = true;
        self.not_empty.notify_all();
    }

    /// Consumer signals that it will take no further rows. Idempotent;
    /// wakes any blocked producer so its `put` can return `false`.
    pub fn mark_consumer_done(&self) {
        let mut inner = self.inner.lock();
        inner.consumer_done = true;
        self.not_full.notify_all();
    }

    #[must_use]
    pub fn producer_done(&self) -> bool {
        self.inner.lock().producer_done
    }

    #[must_use]
    pub fn consumer_done(&self) -> bool {
        self.inner.lock().consumer_done
    }

    /// `true` once the producer is done and the buffer is drained:
    /// nothing will ever come out of this row set again.
    #[must_use]
    pub fn exhausted(&self) -> bool {
        let inner = self.inner.lock();
        inner.producer_done && inner.queue.is_empty()
    }

    /// Currently buffered row count.
    #[must_use]
    pub fn fill(&self) -> usize {
        self.inner.lock().queue.len()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}
