//! Worker-thread dispatcher backend.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::dispatcher::{
    EventDispatcher, EventHandler, HandlerId, SharedHandler, SharedTimerHandler, TimerHandler,
    TimerId,
};
use crate::sync_util::lock_ignore_poison;

struct TimerEntry {
    deadline: Instant,
    interval: Duration,
    single_shot: bool,
}

struct LoopState {
    stopping: bool,
    wake_pending: bool,
    handlers: HashMap<u64, SharedHandler>,
    timers: HashMap<TimerId, TimerEntry>,
    timer_handler: Option<SharedTimerHandler>,
}

struct Shared {
    state: Mutex<LoopState>,
    wakeup: Condvar,
}

/// Dispatcher running on a dedicated worker thread.
///
/// `start` spawns the worker; `emit_event` and timer deadlines wake it
/// through a condvar. Handlers and timer callbacks run on the worker with
/// no lock held, so they may freely re-emit, post events, or release the
/// machine. Dropping the dispatcher (or calling [`stop`](Self::stop))
/// joins the worker.
pub struct ThreadDispatcher {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
    next_handler: AtomicU64,
}

impl ThreadDispatcher {
    #[must_use]
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(LoopState {
                    stopping: false,
                    wake_pending: false,
                    handlers: HashMap::new(),
                    timers: HashMap::new(),
                    timer_handler: None,
                }),
                wakeup: Condvar::new(),
            }),
            worker: Mutex::new(None),
            next_handler: AtomicU64::new(0),
        }
    }

    /// Installs the callback that receives timer expiry, replacing any
    /// previous one.
    pub fn set_timer_handler(&self, handler: TimerHandler) {
        lock_ignore_poison(&self.shared.state).timer_handler = Some(Arc::from(handler));
    }

    /// Stops and joins the worker thread. Armed timers are discarded.
    /// The dispatcher can be started again afterwards.
    pub fn stop(&self) {
        let worker = {
            let mut slot = lock_ignore_poison(&self.worker);
            let mut state = lock_ignore_poison(&self.shared.state);
            state.stopping = true;
            state.timers.clear();
            self.shared.wakeup.notify_all();
            slot.take()
        };
        if let Some(worker) = worker {
            // A callback can drop the last dispatcher handle on the worker
            // itself; the worker cannot join its own thread, so it detaches
            // and exits through the stopping flag instead.
            if worker.thread().id() == std::thread::current().id() {
                return;
            }
            let _ = worker.join();
        }
    }

    fn run(shared: &Shared) {
        let mut state = lock_ignore_poison(&shared.state);
        loop {
            if state.stopping {
                break;
            }

            let now = Instant::now();
            let mut due: Vec<TimerId> = Vec::new();
            state.timers.retain(|id, entry| {
                if entry.deadline > now {
                    return true;
                }
                due.push(*id);
                if entry.single_shot {
                    false
                } else {
                    entry.deadline = now + entry.interval;
                    true
                }
            });

            let handlers: Vec<SharedHandler> = if state.wake_pending {
                state.wake_pending = false;
                state.handlers.values().cloned().collect()
            } else {
                Vec::new()
            };

            if !due.is_empty() || !handlers.is_empty() {
                let timer_handler = state.timer_handler.clone();
                drop(state);
                if let Some(timer_handler) = &timer_handler {
                    for id in due {
                        timer_handler(id);
                    }
                }
                for handler in handlers {
                    handler();
                }
                state = lock_ignore_poison(&shared.state);
                continue;
            }

            // Plain waits: every notification (emit, timer arm/disarm,
            // stop) re-runs the full loop, which re-derives due timers and
            // the next deadline from scratch. Spurious wakeups only cost a
            // re-derivation.
            let next_deadline = state.timers.values().map(|entry| entry.deadline).min();
            state = match next_deadline {
                Some(deadline) => {
                    let wait = deadline.saturating_duration_since(now);
                    let (guard, _timed_out) = shared
                        .wakeup
                        .wait_timeout(state, wait)
                        .unwrap_or_else(PoisonError::into_inner);
                    guard
                }
                None => shared
                    .wakeup
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner),
            };
        }
    }
}

impl Default for ThreadDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl EventDispatcher for ThreadDispatcher {
    fn start(&self) -> bool {
        let mut worker = lock_ignore_poison(&self.worker);
        if worker.is_some() {
            return true;
        }
        lock_ignore_poison(&self.shared.state).stopping = false;

        let shared = Arc::clone(&self.shared);
        match std::thread::Builder::new()
            .name("trellis-dispatcher".to_owned())
            .spawn(move || Self::run(&shared))
        {
            Ok(handle) => {
                *worker = Some(handle);
                true
            }
            Err(error) => {
                log::error!("failed to spawn dispatcher thread: {error}");
                false
            }
        }
    }

    fn register_event_handler(&self, handler: EventHandler) -> HandlerId {
        let id = self.next_handler.fetch_add(1, Ordering::Relaxed);
        lock_ignore_poison(&self.shared.state)
            .handlers
            .insert(id, Arc::from(handler));
        HandlerId(id)
    }

    fn unregister_event_handler(&self, id: HandlerId) {
        lock_ignore_poison(&self.shared.state).handlers.remove(&id.0);
    }

    fn emit_event(&self) {
        let mut state = lock_ignore_poison(&self.shared.state);
        state.wake_pending = true;
        self.shared.wakeup.notify_all();
    }

    fn start_timer(&self, timer: TimerId, interval: Duration, single_shot: bool) {
        let mut state = lock_ignore_poison(&self.shared.state);
        state.timers.insert(
            timer,
            TimerEntry {
                deadline: Instant::now() + interval,
                interval,
                single_shot,
            },
        );
        // Wake the worker so it recomputes its sleep deadline.
        self.shared.wakeup.notify_all();
    }

    fn stop_timer(&self, timer: TimerId) {
        let mut state = lock_ignore_poison(&self.shared.state);
        state.timers.remove(&timer);
        self.shared.wakeup.notify_all();
    }
}

impl Drop for ThreadDispatcher {
    fn drop(&mut self) {
        self.stop();
    }
}
