// Copyright 2026 the trellis authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! # trellis-core
//!
//! A runtime for hierarchical finite state machines (HFSMs) designed to be
//! embedded in long-lived applications: event-loop UIs, daemons, firmware
//! supervisors. A client declares states, events, substate nesting, entry
//! points, and guarded transition edges; the runtime drives transitions in
//! response to asynchronously posted events and invokes client callbacks on
//! state exit, transition, entry, and settled-state change.
//!
//! Execution is bound to a host *event dispatcher* — an abstract loop the
//! engine only knows through the [`EventDispatcher`] trait. Three backends
//! ship in [`dispatch`]: a client-pumped polling dispatcher, a dedicated
//! worker-thread dispatcher, and (behind the `dispatch-tokio` feature) a
//! tokio-task dispatcher.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use trellis_core::dispatch::ManualDispatcher;
//! use trellis_core::{args, StateHooks, StateMachine};
//!
//! #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
//! enum Light { Red, Green }
//!
//! #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
//! enum Signal { Switch }
//!
//! let machine = StateMachine::new(Light::Red);
//! let dispatcher = Arc::new(ManualDispatcher::new());
//! machine.initialize(dispatcher.clone()).unwrap();
//!
//! machine.register_state(
//!     Light::Green,
//!     StateHooks::new().on_state_changed(|_args| println!("go")),
//! );
//! machine.register_transition(Light::Red, Light::Green, Signal::Switch, None, None);
//! machine.register_transition(Light::Green, Light::Red, Signal::Switch, None, None);
//!
//! machine.transition(Signal::Switch, args![]);
//! dispatcher.pump();
//! assert_eq!(machine.current_state(), Light::Green);
//! ```

pub mod args;
pub mod dispatch;
pub mod dispatcher;
pub mod machine;
pub mod topology;

mod queue;
mod sync_util;

pub use args::{ArgList, ArgValue};
pub use dispatcher::{
    DispatcherRef, EventDispatcher, EventHandler, HandlerId, TimerHandler, TimerId,
};
pub use machine::{InitError, StateMachine};
pub use topology::{StateHooks, StructureError, TransitionAction, TransitionGuard};

/// Bound set for the caller-supplied state enumeration.
///
/// Blanket-implemented; any `#[derive(Clone, Copy, PartialEq, Eq, Hash,
/// Debug)]` field-less enum qualifies.
pub trait StateId:
    Copy + Eq + core::hash::Hash + core::fmt::Debug + Send + Sync + 'static
{
}

impl<T> StateId for T where
    T: Copy + Eq + core::hash::Hash + core::fmt::Debug + Send + Sync + 'static
{
}

/// Bound set for the caller-supplied event enumeration. Same shape as
/// [`StateId`]; the two are kept distinct so signatures read as intended.
pub trait EventId:
    Copy + Eq + core::hash::Hash + core::fmt::Debug + Send + Sync + 'static
{
}

impl<T> EventId for T where
    T: Copy + Eq + core::hash::Hash + core::fmt::Debug + Send + Sync + 'static
{
}
