//! The state machine facade and transition engine.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};
use std::time::Duration;

use crate::args::ArgList;
use crate::dispatcher::{DispatcherRef, HandlerId};
use crate::queue::{CompletionLatch, EventKind, EventQueue, EventStatus, PendingEvent};
use crate::sync_util::{lock_ignore_poison, read_ignore_poison, write_ignore_poison};
use crate::topology::{
    StateHooks, StructureError, Topology, TransitionAction, TransitionEdge, TransitionGuard,
};
use crate::{EventId, StateId};

/// Failed [`StateMachine::initialize`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitError {
    /// The dispatcher's `start()` returned `false`.
    DispatcherStart,
    /// A dispatcher is already bound; call [`StateMachine::release`] first.
    AlreadyInitialized,
}

impl fmt::Display for InitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InitError::DispatcherStart => write!(f, "dispatcher failed to start"),
            InitError::AlreadyInitialized => write!(f, "a dispatcher is already bound"),
        }
    }
}

impl std::error::Error for InitError {}

struct Binding {
    dispatcher: DispatcherRef,
    handler: HandlerId,
}

/// A hierarchical finite state machine bound to a host event dispatcher.
///
/// Generic over the client's state and event enumerations. All `register_*`
/// and `transition*` operations take `&self`; share the machine across
/// threads with an [`Arc`] when posters live elsewhere.
///
/// Callbacks (`on_exiting`, actions, guards, `on_entering`,
/// `on_state_changed`) execute on the dispatcher's thread, serialised.
/// Posting contends only on the internal queue lock.
pub struct StateMachine<S: StateId, E: EventId> {
    inner: Arc<Inner<S, E>>,
}

struct Inner<S: StateId, E: EventId> {
    topology: RwLock<Topology<S, E>>,
    current: Mutex<S>,
    queue: EventQueue<E>,
    binding: Mutex<Option<Binding>>,
    stop_dispatching: AtomicBool,
}

struct ResolvedTarget<S> {
    target: S,
    /// The state whose edge matched; an ancestor of the source when the
    /// event bubbled.
    owner: S,
    /// `None` for entry-point drilldown, which has no action or guard.
    edge: Option<Arc<TransitionEdge<S>>>,
}

impl<S: StateId, E: EventId> StateMachine<S, E> {
    /// Creates a machine resting in `initial_state`. Nothing dispatches
    /// until [`initialize`](Self::initialize) binds a dispatcher.
    #[must_use]
    pub fn new(initial_state: S) -> Self {
        Self {
            inner: Arc::new(Inner {
                topology: RwLock::new(Topology::new()),
                current: Mutex::new(initial_state),
                queue: EventQueue::new(),
                binding: Mutex::new(None),
                stop_dispatching: AtomicBool::new(false),
            }),
        }
    }

    /// Starts the dispatcher and registers the engine's wake handler with
    /// it. The handler holds only a weak reference, so the dispatcher
    /// never keeps a dropped machine alive.
    pub fn initialize(&self, dispatcher: DispatcherRef) -> Result<(), InitError> {
        let mut binding = lock_ignore_poison(&self.inner.binding);
        if binding.is_some() {
            return Err(InitError::AlreadyInitialized);
        }
        if !dispatcher.start() {
            log::error!("failed to start dispatcher");
            return Err(InitError::DispatcherStart);
        }

        let weak: Weak<Inner<S, E>> = Arc::downgrade(&self.inner);
        let handler = dispatcher.register_event_handler(Box::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.dispatch_pending();
            }
        }));
        *binding = Some(Binding {
            dispatcher,
            handler,
        });
        self.inner.stop_dispatching.store(false, Ordering::SeqCst);
        Ok(())
    }

    /// Unbinds the dispatcher and stops dispatching; the machine is inert
    /// afterwards. Idempotent. Must be called on the dispatcher's thread
    /// if callbacks might still be in flight.
    pub fn release(&self) {
        self.inner.release();
    }

    /// Attaches callbacks to a state. Idempotent; the last registration
    /// carrying at least one hook wins. States referenced by transitions
    /// or substate relations need no explicit registration.
    pub fn register_state(&self, state: S, hooks: StateHooks) {
        write_ignore_poison(&self.inner.topology).register_state(state, hooks);
    }

    /// Declares `substate` a child of `parent`. The parent's entry point
    /// must already exist (see [`register_entry_point`](Self::register_entry_point)).
    ///
    /// # Errors
    /// Rejects relations that would break the substate forest; with the
    /// `safe-structure` feature disabled only [`StructureError::SelfParent`]
    /// is still reported and malformed topologies are the caller's problem.
    pub fn register_substate(&self, parent: S, substate: S) -> Result<(), StructureError> {
        write_ignore_poison(&self.inner.topology).register_substate(parent, substate, false)
    }

    /// Declares `substate` the entry point of `parent`: the child entered
    /// automatically whenever `parent` becomes current.
    ///
    /// # Errors
    /// See [`register_substate`](Self::register_substate); additionally at
    /// most one entry point may exist per parent.
    pub fn register_entry_point(&self, parent: S, substate: S) -> Result<(), StructureError> {
        write_ignore_poison(&self.inner.topology).register_substate(parent, substate, true)
    }

    /// Adds a transition edge. Duplicate `(from, event)` edges are allowed
    /// and tried in insertion order; the first whose guard accepts (or
    /// which has no guard) wins.
    pub fn register_transition(
        &self,
        from: S,
        to: S,
        on_event: E,
        action: TransitionAction,
        guard: TransitionGuard,
    ) {
        write_ignore_poison(&self.inner.topology).register_transition(from, to, on_event, action, guard);
    }

    #[must_use]
    pub fn current_state(&self) -> S {
        *lock_ignore_poison(&self.inner.current)
    }

    /// Posts an event asynchronously.
    pub fn transition(&self, event: E, args: ArgList) {
        self.transition_ex(event, false, false, None, args);
    }

    /// Drops the queued normal backlog, then posts. Sync posters whose
    /// events were dropped observe `false`.
    pub fn transition_with_queue_clear(&self, event: E, args: ArgList) {
        self.transition_ex(event, true, false, None, args);
    }

    /// Posts an event and blocks until it resolves or `timeout` elapses
    /// (`None` waits indefinitely). Returns `true` iff the event's whole
    /// transition — including any entry-point drilldown — completed. On
    /// timeout the event stays queued and may still execute later.
    #[must_use]
    pub fn transition_sync(&self, event: E, timeout: Option<Duration>, args: ArgList) -> bool {
        self.transition_ex(event, false, true, timeout, args)
    }

    /// The fully-parameterised posting primitive behind the other three.
    /// Async posts always report `true` at posting time; posting before
    /// `initialize` or after `release` is a no-op reporting `false`.
    pub fn transition_ex(
        &self,
        event: E,
        clear_queue: bool,
        sync: bool,
        timeout: Option<Duration>,
        args: ArgList,
    ) -> bool {
        let inner = &self.inner;
        if inner.stop_dispatching.load(Ordering::SeqCst) {
            log::warn!("event {event:?} posted after release; ignored");
            return false;
        }
        let dispatcher = {
            let binding = lock_ignore_poison(&inner.binding);
            match binding.as_ref() {
                Some(binding) => Arc::clone(&binding.dispatcher),
                None => {
                    log::warn!("event {event:?} posted before initialize; ignored");
                    return false;
                }
            }
        };

        let latch = if sync {
            Some(Arc::new(CompletionLatch::new()))
        } else {
            None
        };
        inner.queue.enqueue(
            PendingEvent {
                kind: EventKind::Normal(event),
                args: Arc::new(args),
                latch: latch.clone(),
            },
            clear_queue,
        );
        dispatcher.emit_event();

        match latch {
            Some(latch) => latch.wait(timeout) == EventStatus::Done,
            None => true,
        }
    }

    /// Answers whether `event` would resolve to a transition once the
    /// current queue has (hypothetically) drained. Read-only: neither the
    /// queue nor the state advances, though guards do run.
    ///
    /// Queued events are replayed with the *candidate's* argument list,
    /// not their own — historical behavior, kept so existing guard logic
    /// sees no change.
    #[must_use]
    pub fn is_transition_possible(&self, event: E, args: &ArgList) -> bool {
        let inner = &self.inner;
        let mut hypothetical = *lock_ignore_poison(&inner.current);

        for kind in inner.queue.kinds() {
            let next = match kind {
                EventKind::Normal(queued) => inner
                    .find_transition_target(hypothetical, queued, args)
                    .map(|resolved| resolved.target),
                EventKind::EntryPoint => {
                    read_ignore_poison(&inner.topology).entry_point_of(hypothetical)
                }
            };
            match next {
                Some(state) => hypothetical = state,
                None => return false,
            }
        }

        inner
            .find_transition_target(hypothetical, event, args)
            .is_some()
    }
}

impl<S: StateId, E: EventId> Drop for StateMachine<S, E> {
    fn drop(&mut self) {
        self.inner.release();
    }
}

impl<S: StateId, E: EventId> Inner<S, E> {
    fn release(&self) {
        self.stop_dispatching.store(true, Ordering::SeqCst);
        if let Some(binding) = lock_ignore_poison(&self.binding).take() {
            binding.dispatcher.unregister_event_handler(binding.handler);
        }
    }

    /// One dispatcher turn: pop a single event, run it, resolve its latch,
    /// and re-emit if work remains. Processing one event per turn keeps
    /// the queue lock out of callback scope and lets callbacks post
    /// re-entrantly.
    fn dispatch_pending(&self) {
        if self.stop_dispatching.load(Ordering::SeqCst) {
            return;
        }
        if let Some(event) = self.queue.pop_front() {
            log::debug!("dispatching one event; {} left queued", self.queue.len());
            let status = self.do_transition(&event);
            if status != EventStatus::Pending {
                if let Some(latch) = &event.latch {
                    latch.signal(status);
                }
            }
        }

        if !self.stop_dispatching.load(Ordering::SeqCst) && !self.queue.is_empty() {
            let dispatcher = lock_ignore_poison(&self.binding)
                .as_ref()
                .map(|binding| Arc::clone(&binding.dispatcher));
            if let Some(dispatcher) = dispatcher {
                dispatcher.emit_event();
            }
        }
    }

    fn do_transition(&self, event: &PendingEvent<E>) -> EventStatus {
        let current = *lock_ignore_poison(&self.current);

        let resolved = match &event.kind {
            EventKind::EntryPoint => read_ignore_poison(&self.topology)
                .entry_point_of(current)
                .map(|target| ResolvedTarget {
                    target,
                    owner: current,
                    edge: None,
                }),
            EventKind::Normal(posted) => self.find_transition_target(current, *posted, &event.args),
        };

        let Some(resolved) = resolved else {
            if let EventKind::Normal(posted) = &event.kind {
                log::debug!("event {posted:?} in state {current:?} was ignored");
            }
            return EventStatus::Failed;
        };

        if resolved.target == current {
            // A self-transition is action-only; without an action there is
            // nothing to do and the event counts as unhandled.
            return match resolved.edge.as_ref().and_then(|edge| edge.action.as_ref()) {
                Some(action) => {
                    action(&event.args);
                    EventStatus::Done
                }
                None => EventStatus::Failed,
            };
        }

        // Exit the source and, for bubbled events, every ancestor up to the
        // state owning the edge. Any refusal aborts with the state cursor
        // untouched.
        let exited = self.exit_chain(current, resolved.owner);
        for state in exited.iter().copied() {
            if !self.invoke_exiting(state) {
                log::debug!("exit from {state:?} refused; event dropped");
                return EventStatus::Failed;
            }
        }

        if let Some(action) = resolved.edge.as_ref().and_then(|edge| edge.action.as_ref()) {
            action(&event.args);
        }

        if !self.invoke_entering(resolved.target, &event.args) {
            // Roll back by re-entering every state the exit side left,
            // outermost first, so paired exit/enter hooks stay balanced.
            // Empty args, and no veto allowed, so the same enter guard
            // cannot loop the engine.
            log::debug!(
                "enter into {:?} refused; rolling back to {current:?}",
                resolved.target
            );
            let empty = ArgList::new();
            for state in exited.iter().rev().copied() {
                let _ = self.invoke_entering(state, &empty);
                self.invoke_state_changed(state, &empty);
            }
            return EventStatus::Failed;
        }

        *lock_ignore_poison(&self.current) = resolved.target;
        self.invoke_state_changed(resolved.target, &event.args);

        let entry_point = read_ignore_poison(&self.topology).entry_point_of(resolved.target);
        if entry_point.is_some() {
            // The settled target is composite: continue into its entry
            // point ahead of any queued posts, carrying the same args and
            // latch. The latch stays unsignalled until the chain resolves.
            self.queue.push_front(PendingEvent {
                kind: EventKind::EntryPoint,
                args: Arc::clone(&event.args),
                latch: event.latch.clone(),
            });
            return EventStatus::Pending;
        }

        EventStatus::Done
    }

    /// Resolves `(from, event)` by walking the parent chain. The walk
    /// stops at the first state with any edge set for the event; if every
    /// guard there refuses, the event is unhandled rather than bubbling
    /// further.
    fn find_transition_target(
        &self,
        from: S,
        event: E,
        args: &ArgList,
    ) -> Option<ResolvedTarget<S>> {
        let mut cursor = from;
        loop {
            let (edges, parent) = {
                let topology = read_ignore_poison(&self.topology);
                (topology.edges_for(cursor, event), topology.parent_of(cursor))
            };
            match edges {
                Some(edges) => {
                    return edges
                        .into_iter()
                        .find(|edge| edge.guard.as_ref().map_or(true, |guard| guard(args)))
                        .map(|edge| ResolvedTarget {
                            target: edge.target,
                            owner: cursor,
                            edge: Some(edge),
                        });
                }
                None => cursor = parent?,
            }
        }
    }

    /// States to exit, source first, edge owner last.
    fn exit_chain(&self, from: S, owner: S) -> Vec<S> {
        let topology = read_ignore_poison(&self.topology);
        let mut chain = vec![from];
        let mut cursor = from;
        while cursor != owner {
            match topology.parent_of(cursor) {
                Some(parent) => {
                    chain.push(parent);
                    cursor = parent;
                }
                None => break,
            }
        }
        chain
    }

    fn invoke_exiting(&self, state: S) -> bool {
        let hooks = read_ignore_poison(&self.topology).hooks_for(state);
        match hooks.as_ref().and_then(|hooks| hooks.on_exiting.as_ref()) {
            Some(callback) => callback(),
            None => true,
        }
    }

    fn invoke_entering(&self, state: S, args: &ArgList) -> bool {
        let hooks = read_ignore_poison(&self.topology).hooks_for(state);
        match hooks.as_ref().and_then(|hooks| hooks.on_entering.as_ref()) {
            Some(callback) => callback(args),
            None => true,
        }
    }

    fn invoke_state_changed(&self, state: S, args: &ArgList) {
        let hooks = read_ignore_poison(&self.topology).hooks_for(state);
        match hooks
            .as_ref()
            .and_then(|hooks| hooks.on_state_changed.as_ref())
        {
            Some(callback) => callback(args),
            None => log::debug!("no state-changed callback registered for {state:?}"),
        }
    }
}

impl<S: StateId, E: EventId> Drop for Inner<S, E> {
    fn drop(&mut self) {
        // No poster can outlive the machine holding only a latch; resolve
        // anything still queued so sync waiters unblock.
        self.queue.fail_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args;
    use crate::args::ArgValue;
    use crate::dispatch::ManualDispatcher;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum S {
        A,
        B,
        C,
        Outer,
        Inner,
        Innermost,
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum E {
        Go,
        Descend,
    }

    fn machine_with_dispatcher() -> (StateMachine<S, E>, Arc<ManualDispatcher>) {
        let machine = StateMachine::new(S::A);
        let dispatcher = Arc::new(ManualDispatcher::new());
        machine
            .initialize(dispatcher.clone())
            .expect("manual dispatcher starts");
        (machine, dispatcher)
    }

    #[test]
    fn posting_before_initialize_is_rejected() {
        let machine: StateMachine<S, E> = StateMachine::new(S::A);
        assert!(!machine.transition_sync(E::Go, Some(Duration::from_millis(10)), args![]));
        assert!(!machine.transition_ex(E::Go, false, false, None, args![]));
    }

    #[test]
    fn initialize_twice_is_rejected() {
        let (machine, dispatcher) = machine_with_dispatcher();
        assert_eq!(
            machine.initialize(dispatcher),
            Err(InitError::AlreadyInitialized)
        );
    }

    #[test]
    fn release_is_idempotent_and_stops_posting() {
        let (machine, dispatcher) = machine_with_dispatcher();
        machine.register_transition(S::A, S::B, E::Go, None, None);

        machine.release();
        machine.release();

        assert!(!machine.transition_sync(E::Go, Some(Duration::from_millis(10)), args![]));
        machine.transition(E::Go, args![]);
        dispatcher.pump();
        assert_eq!(machine.current_state(), S::A);
    }

    #[test]
    fn drilldown_settles_in_the_deepest_entry_point() {
        let (machine, dispatcher) = machine_with_dispatcher();
        machine.register_entry_point(S::Outer, S::Inner).unwrap();
        machine.register_entry_point(S::Inner, S::Innermost).unwrap();
        machine.register_transition(S::A, S::Outer, E::Descend, None, None);

        machine.transition(E::Descend, args![]);
        dispatcher.pump();

        assert_eq!(machine.current_state(), S::Innermost);
    }

    #[test]
    fn refused_guards_do_not_bubble_past_their_level() {
        let (machine, dispatcher) = machine_with_dispatcher();
        machine.register_entry_point(S::Outer, S::Inner).unwrap();
        machine.register_transition(S::A, S::Outer, E::Descend, None, None);
        // The parent could handle Go, but the child level declares a guarded
        // edge, so resolution stops there when the guard refuses.
        machine.register_transition(S::Outer, S::B, E::Go, None, None);
        machine.register_transition(
            S::Inner,
            S::C,
            E::Go,
            None,
            Some(Box::new(|_args| false)),
        );

        machine.transition(E::Descend, args![]);
        dispatcher.pump();
        assert_eq!(machine.current_state(), S::Inner);

        machine.transition(E::Go, args![]);
        dispatcher.pump();
        assert_eq!(machine.current_state(), S::Inner);
    }

    #[test]
    fn unresolvable_event_leaves_the_machine_usable() {
        let (machine, dispatcher) = machine_with_dispatcher();
        machine.register_transition(S::B, S::C, E::Go, None, None);

        machine.transition(E::Go, args![]);
        dispatcher.pump();
        assert_eq!(machine.current_state(), S::A);

        machine.register_transition(S::A, S::B, E::Descend, None, None);
        machine.transition(E::Descend, args![]);
        dispatcher.pump();
        assert_eq!(machine.current_state(), S::B);
    }

    #[test]
    fn lookahead_walks_the_queue_with_candidate_args() {
        let (machine, dispatcher) = machine_with_dispatcher();
        machine.register_transition(
            S::A,
            S::B,
            E::Go,
            None,
            Some(Box::new(|hypothetical_args| {
                hypothetical_args.first().and_then(ArgValue::as_int) == Some(1)
            })),
        );
        machine.register_transition(S::B, S::C, E::Descend, None, None);

        // Queue a Go whose own args would refuse the guard.
        machine.transition(E::Go, args![2]);

        // Lookahead replays the queued Go with the candidate's args, which
        // the guard accepts, so Descend appears reachable.
        assert!(machine.is_transition_possible(E::Descend, &args![1]));
        assert!(!machine.is_transition_possible(E::Descend, &args![2]));

        // Actually draining the queue uses the queued args; Go fails and
        // the machine never leaves A.
        dispatcher.pump();
        assert_eq!(machine.current_state(), S::A);
    }

    #[test]
    fn lookahead_is_read_only() {
        let (machine, dispatcher) = machine_with_dispatcher();
        machine.register_transition(S::A, S::B, E::Go, None, None);

        machine.transition(E::Go, args![]);
        // The queued Go hypothetically lands in B, where no further Go edge
        // exists; the probe must not consume the queue or move the cursor.
        assert!(!machine.is_transition_possible(E::Go, &args![]));
        assert_eq!(machine.current_state(), S::A);

        dispatcher.pump();
        assert_eq!(machine.current_state(), S::B);
    }
}
