//! The shared commit queue advertising committed frames to the consumer
//! (spec.md §3/§4.2, "SharedCommitQueue").
//!
//! Bounded MPSC handoff of [`CommitExtent`]s, built on
//! `crossbeam::queue::ArrayQueue`, the same crate family the teacher already
//! depends on (`flux`'s root `Cargo.toml`) for its own lock-free structures.
//! The termination sentinel (`{null, null}` in the original) becomes
//! `None` in the queue's `Option<CommitExtent>` element type — an idiomatic
//! substitution, not a behavior change.

use crate::input_buffer::InputBuffer;
use crate::signal::EventSignal;
use crossbeam::queue::ArrayQueue;
use std::sync::Arc;

/// A committed frame range: everything a producer has written and
/// published up to `commit_end` in `buffer`.
#[derive(Clone)]
pub struct CommitExtent {
    /// The producing thread's input buffer.
    pub buffer: Arc<InputBuffer>,
    /// The write offset, exclusive, up to which frames are ready to read.
    pub commit_end: usize,
}

/// Bounded MPSC queue of [`CommitExtent`]s, capacity fixed at construction.
pub struct CommitQueue {
    inner: ArrayQueue<Option<CommitExtent>>,
    queue_full_event: Arc<EventSignal>,
    queue_drained_event: Arc<EventSignal>,
}

impl CommitQueue {
    /// Create a queue of the given element capacity.
    pub fn new(
        capacity: usize,
        queue_full_event: Arc<EventSignal>,
        queue_drained_event: Arc<EventSignal>,
    ) -> Self {
        Self { inner: ArrayQueue::new(capacity), queue_full_event, queue_drained_event }
    }

    /// Producer-side, lock-free. Returns `false` when full.
    pub fn push(&self, extent: Option<CommitExtent>) -> bool {
        self.inner.push(extent).is_ok()
    }

    /// Producer-side: repeatedly signal the queue-full event and wait on
    /// the queue-drained event until `push` succeeds (spec.md §4.2's
    /// "producer protocol on full").
    pub fn push_blocking(&self, mut extent: Option<CommitExtent>) {
        loop {
            match self.inner.push(extent) {
                Ok(()) => return,
                Err(rejected) => {
                    extent = rejected;
                    self.queue_full_event.signal();
                    self.queue_drained_event.wait(0);
                }
            }
        }
    }

    /// Consumer-side, lock-free. Returns `None` when empty.
    pub fn pop(&self) -> Option<Option<CommitExtent>> {
        self.inner.pop()
    }

    /// Consumer-visible emptiness, used by `close`'s post-drain assertion.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
