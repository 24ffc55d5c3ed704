//! Host event loop contract.
//!
//! The engine never owns a thread. It binds to a dispatcher — any
//! implementation of [`EventDispatcher`] — and asks to be woken with
//! [`EventDispatcher::emit_event`] whenever the queue gains work. The
//! contract an implementation must honor:
//!
//! - `emit_event` causes every registered handler to be invoked once, on
//!   the dispatcher's own thread, after the current call turn.
//! - Handler invocations are serialised; they never overlap.
//! - Several `emit_event` calls before the next turn may coalesce into a
//!   single invocation. The engine compensates by re-emitting while its
//!   queue is non-empty.

use std::sync::Arc;
use std::time::Duration;

/// Identifies a registered wake handler within a dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(pub u64);

/// Identifies a timer within a dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(pub u32);

/// Wake callback handed to [`EventDispatcher::register_event_handler`].
#[cfg(feature = "threadsafe")]
pub type EventHandler = Box<dyn Fn() + Send + Sync + 'static>;

/// Wake callback handed to [`EventDispatcher::register_event_handler`].
///
/// Single-thread builds drop the `Send + Sync` bounds; the dispatcher and
/// everything it wakes live on one thread.
#[cfg(not(feature = "threadsafe"))]
pub type EventHandler = Box<dyn Fn() + 'static>;

/// Callback a backend owner installs to observe timer expiry.
#[cfg(feature = "threadsafe")]
pub type TimerHandler = Box<dyn Fn(TimerId) + Send + Sync + 'static>;

/// Callback a backend owner installs to observe timer expiry.
#[cfg(not(feature = "threadsafe"))]
pub type TimerHandler = Box<dyn Fn(TimerId) + 'static>;

/// Shared dispatcher handle consumed by [`StateMachine::initialize`].
///
/// [`StateMachine::initialize`]: crate::StateMachine::initialize
#[cfg(feature = "threadsafe")]
pub type DispatcherRef = Arc<dyn EventDispatcher + Send + Sync>;

/// Shared dispatcher handle consumed by [`StateMachine::initialize`].
///
/// [`StateMachine::initialize`]: crate::StateMachine::initialize
#[cfg(not(feature = "threadsafe"))]
pub type DispatcherRef = Arc<dyn EventDispatcher>;

#[cfg(feature = "threadsafe")]
pub(crate) type SharedHandler = Arc<dyn Fn() + Send + Sync>;
#[cfg(not(feature = "threadsafe"))]
pub(crate) type SharedHandler = Arc<dyn Fn()>;

#[cfg(feature = "threadsafe")]
pub(crate) type SharedTimerHandler = Arc<dyn Fn(TimerId) + Send + Sync>;
#[cfg(not(feature = "threadsafe"))]
pub(crate) type SharedTimerHandler = Arc<dyn Fn(TimerId)>;

/// Minimal interface a host event loop exposes to the engine.
pub trait EventDispatcher {
    /// Prepares the host loop. Idempotent; returning `false` aborts
    /// [`StateMachine::initialize`].
    ///
    /// [`StateMachine::initialize`]: crate::StateMachine::initialize
    fn start(&self) -> bool;

    /// Attaches a wake callback and returns its id.
    fn register_event_handler(&self, handler: EventHandler) -> HandlerId;

    /// Detaches a wake callback. Unknown ids are ignored.
    fn unregister_event_handler(&self, id: HandlerId);

    /// Requests that registered handlers be invoked on the dispatcher's
    /// thread at the next loop turn.
    fn emit_event(&self);

    /// Arms (or re-arms) a timer. Expiry is delivered to the backend's
    /// timer callback; see the shipped backends in [`crate::dispatch`].
    fn start_timer(&self, timer: TimerId, interval: Duration, single_shot: bool);

    /// Disarms a timer. Unknown ids are ignored.
    fn stop_timer(&self, timer: TimerId);
}
