use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex, MutexGuard, PoisonError,
    },
};

use tokio::sync::{futures::Notified, Notify};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentState {
    Pending,
    InFlight,
    Done,
    /// Failed more often than the retry limit allows.
    Abandoned,
}

/// Result of [TaskQueue::next].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Next {
    /// The index is now in flight and owned by the caller.
    Got(usize),
    /// Nothing is queued, but some segments are still in flight and may be requeued.
    EmptyPending,
    /// Every segment is settled.
    EmptyDone,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requeue {
    /// Pushed back to the tail of the queue. `failures` counts every failure so far.
    Requeued { failures: u32 },
    Abandoned,
    /// The index was not in flight and is left untouched.
    Ignored,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct QueueSnapshot {
    pub pending: Vec<usize>,
    pub in_flight: Vec<usize>,
    pub done: Vec<usize>,
    pub abandoned: Vec<usize>,
}

struct QueueState {
    pending: VecDeque<usize>,
    states: Vec<SegmentState>,
    failures: Vec<u32>,
}

/// Shared queue of segment indices waiting to be downloaded.
///
/// The lock is only held to move an index between states, never while downloading.
pub struct TaskQueue {
    state: Mutex<QueueState>,
    total: usize,
    completed: AtomicUsize,
    abandoned: AtomicUsize,
    /// Maximum number of retries of a single segment. `None` retries forever.
    retries: Option<u32>,
    changed: Notify,
}

impl TaskQueue {
    pub fn new(total: usize, retries: Option<u32>) -> Self {
        Self::with_done(total, retries, [])
    }

    /// Create a queue where `done` indices were completed by an earlier run.
    pub fn with_done<I>(total: usize, retries: Option<u32>, done: I) -> Self
    where
        I: IntoIterator<Item = usize>,
    {
        let mut states = vec![SegmentState::Pending; total];
        let mut completed = 0;
        for index in done {
            if let Some(state @ SegmentState::Pending) = states.get_mut(index) {
                *state = SegmentState::Done;
                completed += 1;
            }
        }
        let pending = (0..total)
            .filter(|i| states[*i] == SegmentState::Pending)
            .collect();

        Self {
            state: Mutex::new(QueueState {
                pending,
                states,
                failures: vec![0; total],
            }),
            total,
            completed: AtomicUsize::new(completed),
            abandoned: AtomicUsize::new(0),
            retries,
            changed: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn total(&self) -> usize {
        self.total
    }

    /// Number of segments successfully stored.
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::Acquire)
    }

    pub fn abandoned(&self) -> usize {
        self.abandoned.load(Ordering::Acquire)
    }

    fn is_settled(&self) -> bool {
        self.completed() + self.abandoned() == self.total
    }

    /// Pop the next pending index.
    pub fn next(&self) -> Next {
        let mut state = self.lock();
        match state.pending.pop_front() {
            Some(index) => {
                state.states[index] = SegmentState::InFlight;
                Next::Got(index)
            }
            None if self.is_settled() => Next::EmptyDone,
            None => Next::EmptyPending,
        }
    }

    /// Mark an in-flight index as stored. Returns `false` if it was not in flight.
    pub fn complete(&self, index: usize) -> bool {
        {
            let mut state = self.lock();
            match state.states.get_mut(index) {
                Some(s @ SegmentState::InFlight) => *s = SegmentState::Done,
                _ => {
                    tracing::warn!("Segment {index} completed but was not in flight.");
                    return false;
                }
            }
        }

        self.completed.fetch_add(1, Ordering::AcqRel);
        self.changed.notify_waiters();
        true
    }

    /// Push a failed in-flight index back to the tail of the queue, unless it ran out of retries.
    pub fn requeue(&self, index: usize) -> Requeue {
        let result = {
            let mut state = self.lock();
            if state.states.get(index) != Some(&SegmentState::InFlight) {
                tracing::warn!("Segment {index} requeued but was not in flight.");
                return Requeue::Ignored;
            }
            let failures = &mut state.failures[index];
            *failures += 1;
            let failures = *failures;

            match self.retries {
                Some(retries) if failures > retries => {
                    state.states[index] = SegmentState::Abandoned;
                    Requeue::Abandoned
                }
                _ => {
                    state.states[index] = SegmentState::Pending;
                    state.pending.push_back(index);
                    Requeue::Requeued { failures }
                }
            }
        };

        if result == Requeue::Abandoned {
            self.abandoned.fetch_add(1, Ordering::AcqRel);
        }
        self.changed.notify_waiters();
        result
    }

    /// Future resolved on the next completion, requeue or [TaskQueue::wake].
    ///
    /// Create and `enable` it before calling [TaskQueue::next] so that a change happening
    /// in between is not missed.
    pub fn changed(&self) -> Notified<'_> {
        self.changed.notified()
    }

    /// Wake every task waiting on [TaskQueue::changed].
    pub fn wake(&self) {
        self.changed.notify_waiters();
    }

    pub fn state(&self, index: usize) -> Option<SegmentState> {
        self.lock().states.get(index).copied()
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        let state = self.lock();
        let mut snapshot = QueueSnapshot {
            pending: state.pending.iter().copied().collect(),
            ..Default::default()
        };
        for (index, s) in state.states.iter().enumerate() {
            match s {
                SegmentState::Pending => {}
                SegmentState::InFlight => snapshot.in_flight.push(index),
                SegmentState::Done => snapshot.done.push(index),
                SegmentState::Abandoned => snapshot.abandoned.push(index),
            }
        }
        snapshot
    }
}
