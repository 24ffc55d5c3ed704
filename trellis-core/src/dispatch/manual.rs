//! Client-pumped dispatcher backend.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::dispatcher::{
    EventDispatcher, EventHandler, HandlerId, SharedHandler, SharedTimerHandler, TimerHandler,
    TimerId,
};
use crate::sync_util::lock_ignore_poison;

struct ArmedTimer {
    interval: Duration,
    single_shot: bool,
}

/// Dispatcher with no thread of its own.
///
/// `emit_event` only records a pending wake-up; the owner drains it by
/// calling [`pump`](Self::pump) from whatever loop it controls, which is
/// where handlers run. Timers are recorded but not scheduled — the owner
/// fires due timers explicitly via [`fire_timer`](Self::fire_timer),
/// matching hosts that multiplex their own clock.
///
/// Handlers are serialised as long as `pump` is not called concurrently
/// from several threads, which a polling host has no reason to do.
pub struct ManualDispatcher {
    handlers: Mutex<HashMap<u64, SharedHandler>>,
    timers: Mutex<HashMap<TimerId, ArmedTimer>>,
    timer_handler: Mutex<Option<SharedTimerHandler>>,
    next_handler: AtomicU64,
    wake: AtomicBool,
}

impl ManualDispatcher {
    #[must_use]
    pub fn new() -> Self {
        Self {
            handlers: Mutex::new(HashMap::new()),
            timers: Mutex::new(HashMap::new()),
            timer_handler: Mutex::new(None),
            next_handler: AtomicU64::new(0),
            wake: AtomicBool::new(false),
        }
    }

    /// Invokes registered handlers until no wake-up is pending. Handlers
    /// that re-emit (the engine does, while its queue is non-empty) are
    /// simply invoked again before `pump` returns.
    pub fn pump(&self) {
        while self.wake.swap(false, Ordering::SeqCst) {
            let snapshot: Vec<SharedHandler> =
                lock_ignore_poison(&self.handlers).values().cloned().collect();
            for handler in snapshot {
                handler();
            }
        }
    }

    /// Whether an `emit_event` is waiting for a pump.
    #[must_use]
    pub fn wake_pending(&self) -> bool {
        self.wake.load(Ordering::SeqCst)
    }

    /// Installs the callback that [`fire_timer`](Self::fire_timer) delivers
    /// expiry to.
    pub fn set_timer_handler(&self, handler: TimerHandler) {
        *lock_ignore_poison(&self.timer_handler) = Some(Arc::from(handler));
    }

    /// Delivers one expiry of `timer` if it is armed; single-shot timers
    /// disarm. Returns whether the timer was armed.
    pub fn fire_timer(&self, timer: TimerId) -> bool {
        let armed = {
            let mut timers = lock_ignore_poison(&self.timers);
            match timers.get(&timer) {
                Some(entry) if entry.single_shot => {
                    timers.remove(&timer);
                    true
                }
                Some(_) => true,
                None => false,
            }
        };
        if armed {
            let handler = lock_ignore_poison(&self.timer_handler).clone();
            if let Some(handler) = handler {
                handler(timer);
            }
        }
        armed
    }

    /// Whether `timer` is currently armed.
    #[must_use]
    pub fn timer_armed(&self, timer: TimerId) -> bool {
        lock_ignore_poison(&self.timers).contains_key(&timer)
    }

    /// The armed interval of `timer`, if any.
    #[must_use]
    pub fn timer_interval(&self, timer: TimerId) -> Option<Duration> {
        lock_ignore_poison(&self.timers)
            .get(&timer)
            .map(|entry| entry.interval)
    }
}

impl Default for ManualDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl EventDispatcher for ManualDispatcher {
    fn start(&self) -> bool {
        true
    }

    fn register_event_handler(&self, handler: EventHandler) -> HandlerId {
        let id = self.next_handler.fetch_add(1, Ordering::Relaxed);
        lock_ignore_poison(&self.handlers).insert(id, Arc::from(handler));
        HandlerId(id)
    }

    fn unregister_event_handler(&self, id: HandlerId) {
        lock_ignore_poison(&self.handlers).remove(&id.0);
    }

    fn emit_event(&self) {
        self.wake.store(true, Ordering::SeqCst);
    }

    fn start_timer(&self, timer: TimerId, interval: Duration, single_shot: bool) {
        lock_ignore_poison(&self.timers).insert(
            timer,
            ArmedTimer {
                interval,
                single_shot,
            },
        );
    }

    fn stop_timer(&self, timer: TimerId) {
        lock_ignore_poison(&self.timers).remove(&timer);
    }
}
