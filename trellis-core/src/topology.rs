//! Topology registry: state hooks, substate relations, transition edges.
//!
//! The registry is written during the client's registration phase and read
//! by the transition engine on every dispatch. Hooks and edges are stored
//! behind [`Arc`] so the engine can clone them out of the registry lock and
//! invoke client code with no lock held.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::args::ArgList;
use crate::{EventId, StateId};

// Callback types come in two flavors: `threadsafe` builds require
// `Send + Sync` so the topology can be shared with a dispatcher thread;
// single-thread builds drop the bounds so callbacks may capture non-`Sync`
// handles (the machine itself included).

/// Callback fired once a state is settled (no drilldown pending).
#[cfg(feature = "threadsafe")]
pub type StateChangedFn = Box<dyn Fn(&ArgList) + Send + Sync>;
/// Callback fired once a state is settled (no drilldown pending).
#[cfg(not(feature = "threadsafe"))]
pub type StateChangedFn = Box<dyn Fn(&ArgList)>;

/// Callback asked for permission to enter a state. Returning `false` rolls
/// the transition back to the previous state.
#[cfg(feature = "threadsafe")]
pub type StateEnterFn = Box<dyn Fn(&ArgList) -> bool + Send + Sync>;
/// Callback asked for permission to enter a state. Returning `false` rolls
/// the transition back to the previous state.
#[cfg(not(feature = "threadsafe"))]
pub type StateEnterFn = Box<dyn Fn(&ArgList) -> bool>;

/// Callback asked for permission to leave a state. Returning `false`
/// aborts the transition before anything has changed.
#[cfg(feature = "threadsafe")]
pub type StateExitFn = Box<dyn Fn() -> bool + Send + Sync>;
/// Callback asked for permission to leave a state. Returning `false`
/// aborts the transition before anything has changed.
#[cfg(not(feature = "threadsafe"))]
pub type StateExitFn = Box<dyn Fn() -> bool>;

/// Side-effecting callback attached to a transition edge, executed between
/// exit and enter.
#[cfg(feature = "threadsafe")]
pub type TransitionAction = Option<Box<dyn Fn(&ArgList) + Send + Sync>>;
/// Side-effecting callback attached to a transition edge, executed between
/// exit and enter.
#[cfg(not(feature = "threadsafe"))]
pub type TransitionAction = Option<Box<dyn Fn(&ArgList)>>;

/// Predicate on event arguments that gates a transition edge.
#[cfg(feature = "threadsafe")]
pub type TransitionGuard = Option<Box<dyn Fn(&ArgList) -> bool + Send + Sync>>;
/// Predicate on event arguments that gates a transition edge.
#[cfg(not(feature = "threadsafe"))]
pub type TransitionGuard = Option<Box<dyn Fn(&ArgList) -> bool>>;

/// The up-to-three callbacks attached to a state, assembled with a
/// consuming builder:
///
/// ```rust
/// use trellis_core::StateHooks;
///
/// let hooks = StateHooks::new()
///     .on_entering(|_args| true)
///     .on_state_changed(|_args| {});
/// ```
#[derive(Default)]
pub struct StateHooks {
    pub(crate) on_state_changed: Option<StateChangedFn>,
    pub(crate) on_entering: Option<StateEnterFn>,
    pub(crate) on_exiting: Option<StateExitFn>,
}

impl StateHooks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(feature = "threadsafe")]
    #[must_use]
    pub fn on_state_changed(mut self, callback: impl Fn(&ArgList) + Send + Sync + 'static) -> Self {
        self.on_state_changed = Some(Box::new(callback));
        self
    }

    #[cfg(not(feature = "threadsafe"))]
    #[must_use]
    pub fn on_state_changed(mut self, callback: impl Fn(&ArgList) + 'static) -> Self {
        self.on_state_changed = Some(Box::new(callback));
        self
    }

    #[cfg(feature = "threadsafe")]
    #[must_use]
    pub fn on_entering(
        mut self,
        callback: impl Fn(&ArgList) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.on_entering = Some(Box::new(callback));
        self
    }

    #[cfg(not(feature = "threadsafe"))]
    #[must_use]
    pub fn on_entering(mut self, callback: impl Fn(&ArgList) -> bool + 'static) -> Self {
        self.on_entering = Some(Box::new(callback));
        self
    }

    #[cfg(feature = "threadsafe")]
    #[must_use]
    pub fn on_exiting(mut self, callback: impl Fn() -> bool + Send + Sync + 'static) -> Self {
        self.on_exiting = Some(Box::new(callback));
        self
    }

    #[cfg(not(feature = "threadsafe"))]
    #[must_use]
    pub fn on_exiting(mut self, callback: impl Fn() -> bool + 'static) -> Self {
        self.on_exiting = Some(Box::new(callback));
        self
    }

    fn is_empty(&self) -> bool {
        self.on_state_changed.is_none() && self.on_entering.is_none() && self.on_exiting.is_none()
    }
}

impl fmt::Debug for StateHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateHooks")
            .field("on_state_changed", &self.on_state_changed.is_some())
            .field("on_entering", &self.on_entering.is_some())
            .field("on_exiting", &self.on_exiting.is_some())
            .finish()
    }
}

/// Rejected substate registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StructureError {
    /// A state cannot be its own parent.
    SelfParent,
    /// The child already has a parent; the relation is a forest.
    ParentConflict,
    /// The relation would make the child an ancestor of its parent.
    CycleDetected,
    /// A parent needs its entry point declared before regular substates.
    EntryPointMissing,
    /// The parent already has an entry point.
    EntryPointConflict,
}

impl fmt::Display for StructureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StructureError::SelfParent => write!(f, "a state cannot be its own substate"),
            StructureError::ParentConflict => write!(f, "substate already has a parent"),
            StructureError::CycleDetected => {
                write!(f, "registration would create a substate cycle")
            }
            StructureError::EntryPointMissing => {
                write!(f, "parent needs an entry point before regular substates")
            }
            StructureError::EntryPointConflict => write!(f, "parent already has an entry point"),
        }
    }
}

impl std::error::Error for StructureError {}

/// One `(from, event) -> target` edge with its optional action and guard.
pub(crate) struct TransitionEdge<S> {
    pub(crate) target: S,
    pub(crate) action: TransitionAction,
    pub(crate) guard: TransitionGuard,
}

/// The static structure of a machine. Owned by the engine behind a
/// registry lock; see module docs for the snapshot discipline.
pub(crate) struct Topology<S, E> {
    hooks: HashMap<S, Arc<StateHooks>>,
    edges: HashMap<(S, E), Vec<Arc<TransitionEdge<S>>>>,
    parents: HashMap<S, S>,
    entry_points: HashMap<S, S>,
}

impl<S: StateId, E: EventId> Topology<S, E> {
    pub(crate) fn new() -> Self {
        Self {
            hooks: HashMap::new(),
            edges: HashMap::new(),
            parents: HashMap::new(),
            entry_points: HashMap::new(),
        }
    }

    /// Last registration with at least one hook wins; a hookless
    /// registration leaves any earlier hooks in place.
    pub(crate) fn register_state(&mut self, state: S, hooks: StateHooks) {
        if hooks.is_empty() {
            return;
        }
        self.hooks.insert(state, Arc::new(hooks));
        log::debug!("registered hooks for state {state:?} ({} total)", self.hooks.len());
    }

    pub(crate) fn register_substate(
        &mut self,
        parent: S,
        substate: S,
        is_entry_point: bool,
    ) -> Result<(), StructureError> {
        if parent == substate {
            return Err(StructureError::SelfParent);
        }

        #[cfg(feature = "safe-structure")]
        {
            if self.parents.contains_key(&substate) {
                return Err(StructureError::ParentConflict);
            }
            let mut cursor = parent;
            while let Some(&ancestor) = self.parents.get(&cursor) {
                if ancestor == substate {
                    return Err(StructureError::CycleDetected);
                }
                cursor = ancestor;
            }
            match (is_entry_point, self.entry_points.contains_key(&parent)) {
                (false, false) => return Err(StructureError::EntryPointMissing),
                (true, true) => return Err(StructureError::EntryPointConflict),
                _ => {}
            }
        }

        if is_entry_point {
            self.entry_points.insert(parent, substate);
        }
        self.parents.insert(substate, parent);
        Ok(())
    }

    /// Always succeeds; duplicate `(from, event)` edges are kept and
    /// disambiguated by guard plus insertion order.
    pub(crate) fn register_transition(
        &mut self,
        from: S,
        to: S,
        on_event: E,
        action: TransitionAction,
        guard: TransitionGuard,
    ) {
        self.edges
            .entry((from, on_event))
            .or_default()
            .push(Arc::new(TransitionEdge {
                target: to,
                action,
                guard,
            }));
    }

    /// `None` means no edge is declared for `(from, event)` and the caller
    /// should bubble to the parent; an empty set never occurs.
    pub(crate) fn edges_for(&self, from: S, event: E) -> Option<Vec<Arc<TransitionEdge<S>>>> {
        self.edges.get(&(from, event)).cloned()
    }

    pub(crate) fn parent_of(&self, state: S) -> Option<S> {
        self.parents.get(&state).copied()
    }

    pub(crate) fn entry_point_of(&self, state: S) -> Option<S> {
        self.entry_points.get(&state).copied()
    }

    pub(crate) fn hooks_for(&self, state: S) -> Option<Arc<StateHooks>> {
        self.hooks.get(&state).cloned()
    }
}
