//! Shipped dispatcher backends.
//!
//! The engine only requires the [`EventDispatcher`] contract; these
//! backends cover the common hosting shapes so most applications need no
//! custom implementation:
//!
//! - [`ManualDispatcher`] — no thread of its own; the owner pumps it from
//!   a loop it controls. The polling option for bare-metal style hosts,
//!   and the deterministic option for tests.
//! - [`ThreadDispatcher`] — a dedicated worker thread with condvar wakeup
//!   and timer scheduling (`threadsafe` builds).
//! - [`TokioDispatcher`] — dispatching as a tokio task (`dispatch-tokio`
//!   feature).
//!
//! [`EventDispatcher`]: crate::EventDispatcher

mod manual;
pub use manual::ManualDispatcher;

#[cfg(feature = "threadsafe")]
mod thread;
#[cfg(feature = "threadsafe")]
pub use self::thread::ThreadDispatcher;

#[cfg(feature = "dispatch-tokio")]
mod tokio;
#[cfg(feature = "dispatch-tokio")]
pub use self::tokio::TokioDispatcher;
