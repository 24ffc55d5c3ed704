//! Pending event queue and sync-post completion latches.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;

use crate::args::ArgList;
use crate::sync_util::lock_ignore_poison;

/// Outcome of dispatching one pending event.
///
/// `Pending` is only ever produced when a settled transition schedules an
/// entry-point drilldown; the latch signal is deferred until the drilldown
/// chain resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EventStatus {
    Pending,
    Done,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EventKind<E> {
    /// A client-posted event.
    Normal(E),
    /// An entry-point drilldown continuation, prepended by the engine so a
    /// compound transition stays atomic with respect to new posts.
    EntryPoint,
}

pub(crate) struct PendingEvent<E> {
    pub(crate) kind: EventKind<E>,
    pub(crate) args: Arc<ArgList>,
    pub(crate) latch: Option<Arc<CompletionLatch>>,
}

/// One-shot synchronisation object carrying a sync-posted event's final
/// status back to the poster. Shared between the poster and any drilldown
/// continuations; the first terminal signal wins.
pub(crate) struct CompletionLatch {
    status: Mutex<EventStatus>,
    signalled: Condvar,
}

impl CompletionLatch {
    pub(crate) fn new() -> Self {
        Self {
            status: Mutex::new(EventStatus::Pending),
            signalled: Condvar::new(),
        }
    }

    /// Records a terminal status and wakes the poster. Later signals and
    /// `Pending` are discarded.
    pub(crate) fn signal(&self, status: EventStatus) {
        if status == EventStatus::Pending {
            return;
        }
        let mut current = lock_ignore_poison(&self.status);
        if *current == EventStatus::Pending {
            *current = status;
            self.signalled.notify_all();
        }
    }

    /// Blocks until a terminal status is recorded. With a timeout the
    /// result may still be `Pending`, in which case the event stays queued
    /// and may execute later.
    pub(crate) fn wait(&self, timeout: Option<Duration>) -> EventStatus {
        let guard = lock_ignore_poison(&self.status);
        match timeout {
            Some(limit) => {
                let (guard, _timed_out) = self
                    .signalled
                    .wait_timeout_while(guard, limit, |status| *status == EventStatus::Pending)
                    .unwrap_or_else(PoisonError::into_inner);
                *guard
            }
            None => {
                let guard = self
                    .signalled
                    .wait_while(guard, |status| *status == EventStatus::Pending)
                    .unwrap_or_else(PoisonError::into_inner);
                *guard
            }
        }
    }
}

#[cfg(feature = "threadsafe")]
struct QueueLock<T>(Mutex<T>);

#[cfg(feature = "threadsafe")]
impl<T> QueueLock<T> {
    fn new(value: T) -> Self {
        Self(Mutex::new(value))
    }

    fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut guard = lock_ignore_poison(&self.0);
        f(&mut guard)
    }
}

/// Single-thread builds swap the queue mutex for a borrow-checked cell;
/// posting and dispatching must then happen on one thread.
#[cfg(not(feature = "threadsafe"))]
struct QueueLock<T>(core::cell::RefCell<T>);

#[cfg(not(feature = "threadsafe"))]
impl<T> QueueLock<T> {
    fn new(value: T) -> Self {
        Self(core::cell::RefCell::new(value))
    }

    fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut self.0.borrow_mut())
    }
}

/// FIFO of pending events. The lock is held only for queue surgery, never
/// across latch signalling or client callbacks.
pub(crate) struct EventQueue<E> {
    pending: QueueLock<VecDeque<PendingEvent<E>>>,
}

impl<E: Copy> EventQueue<E> {
    pub(crate) fn new() -> Self {
        Self {
            pending: QueueLock::new(VecDeque::new()),
        }
    }

    /// Appends an event, optionally dropping the queued normal backlog
    /// first (one atomic step, so the cleared queue cannot be repopulated
    /// by a racing poster in between). Dropped sync events are failed after
    /// the lock is released. Drilldown continuations survive a clear; they
    /// are in-progress transitions, not backlog.
    pub(crate) fn enqueue(&self, event: PendingEvent<E>, clear_first: bool) {
        let dropped = self.pending.with(|queue| {
            let mut latches = Vec::new();
            if clear_first {
                queue.retain(|pending| match pending.kind {
                    EventKind::EntryPoint => true,
                    EventKind::Normal(_) => {
                        if let Some(latch) = &pending.latch {
                            latches.push(Arc::clone(latch));
                        }
                        false
                    }
                });
            }
            queue.push_back(event);
            latches
        });
        for latch in dropped {
            latch.signal(EventStatus::Failed);
        }
    }

    /// Prepends a drilldown continuation ahead of any queued posts.
    pub(crate) fn push_front(&self, event: PendingEvent<E>) {
        self.pending.with(|queue| queue.push_front(event));
    }

    pub(crate) fn pop_front(&self) -> Option<PendingEvent<E>> {
        self.pending.with(VecDeque::pop_front)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.pending.with(|queue| queue.is_empty())
    }

    pub(crate) fn len(&self) -> usize {
        self.pending.with(|queue| queue.len())
    }

    /// Snapshot of the queued event kinds, for hypothetical replay.
    pub(crate) fn kinds(&self) -> Vec<EventKind<E>> {
        self.pending
            .with(|queue| queue.iter().map(|pending| pending.kind).collect())
    }

    /// Engine teardown: every latch still queued resolves `Failed` so no
    /// sync poster is left waiting.
    pub(crate) fn fail_all(&self) {
        let dropped: Vec<Arc<CompletionLatch>> = self
            .pending
            .with(|queue| queue.drain(..).filter_map(|pending| pending.latch).collect());
        for latch in dropped {
            latch.signal(EventStatus::Failed);
        }
    }
}
