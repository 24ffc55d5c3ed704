//! Tokio-task dispatcher backend.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;

use crate::dispatcher::{
    EventDispatcher, EventHandler, HandlerId, SharedHandler, SharedTimerHandler, TimerHandler,
    TimerId,
};
use crate::sync_util::lock_ignore_poison;

enum Command {
    Wake,
    TimerFired(TimerId),
}

struct TokioShared {
    handlers: Mutex<HashMap<u64, SharedHandler>>,
    timer_handler: Mutex<Option<SharedTimerHandler>>,
}

/// Dispatcher that parks dispatching on a tokio task.
///
/// `start` must run inside a tokio runtime; the captured runtime handle is
/// then used for timer tasks, so `start_timer` may be called from any
/// thread. Handlers run serialised on the pump task. Note that handlers
/// are synchronous closures — the engine's callbacks block the pump task
/// while they run, which is the same run-to-completion guarantee the other
/// backends give.
pub struct TokioDispatcher {
    shared: Arc<TokioShared>,
    sender: UnboundedSender<Command>,
    receiver: Mutex<Option<UnboundedReceiver<Command>>>,
    runtime: Mutex<Option<tokio::runtime::Handle>>,
    pump: Mutex<Option<JoinHandle<()>>>,
    timers: Mutex<HashMap<TimerId, JoinHandle<()>>>,
    next_handler: AtomicU64,
}

impl TokioDispatcher {
    #[must_use]
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            shared: Arc::new(TokioShared {
                handlers: Mutex::new(HashMap::new()),
                timer_handler: Mutex::new(None),
            }),
            sender,
            receiver: Mutex::new(Some(receiver)),
            runtime: Mutex::new(None),
            pump: Mutex::new(None),
            timers: Mutex::new(HashMap::new()),
            next_handler: AtomicU64::new(0),
        }
    }

    /// Installs the callback that receives timer expiry on the pump task.
    pub fn set_timer_handler(&self, handler: TimerHandler) {
        *lock_ignore_poison(&self.shared.timer_handler) = Some(Arc::from(handler));
    }
}

impl Default for TokioDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl EventDispatcher for TokioDispatcher {
    fn start(&self) -> bool {
        let Some(mut receiver) = lock_ignore_poison(&self.receiver).take() else {
            return true; // already started
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            log::error!("TokioDispatcher::start requires a tokio runtime context");
            // Put the receiver back so a later start can succeed.
            *lock_ignore_poison(&self.receiver) = Some(receiver);
            return false;
        };

        let shared = Arc::clone(&self.shared);
        let pump = runtime.spawn(async move {
            while let Some(command) = receiver.recv().await {
                match command {
                    Command::Wake => {
                        let snapshot: Vec<SharedHandler> = lock_ignore_poison(&shared.handlers)
                            .values()
                            .cloned()
                            .collect();
                        for handler in snapshot {
                            handler();
                        }
                    }
                    Command::TimerFired(id) => {
                        let handler = lock_ignore_poison(&shared.timer_handler).clone();
                        if let Some(handler) = handler {
                            handler(id);
                        }
                    }
                }
            }
        });

        *lock_ignore_poison(&self.pump) = Some(pump);
        *lock_ignore_poison(&self.runtime) = Some(runtime);
        true
    }

    fn register_event_handler(&self, handler: EventHandler) -> HandlerId {
        let id = self.next_handler.fetch_add(1, Ordering::Relaxed);
        lock_ignore_poison(&self.shared.handlers).insert(id, Arc::from(handler));
        HandlerId(id)
    }

    fn unregister_event_handler(&self, id: HandlerId) {
        lock_ignore_poison(&self.shared.handlers).remove(&id.0);
    }

    fn emit_event(&self) {
        // Each wake is delivered as its own turn; the engine tolerates the
        // absence of coalescing just as it tolerates its presence.
        let _ = self.sender.send(Command::Wake);
    }

    fn start_timer(&self, timer: TimerId, interval: Duration, single_shot: bool) {
        let Some(runtime) = lock_ignore_poison(&self.runtime).clone() else {
            log::warn!("start_timer called before TokioDispatcher::start; ignored");
            return;
        };

        let sender = self.sender.clone();
        let task = runtime.spawn(async move {
            if single_shot {
                tokio::time::sleep(interval).await;
                let _ = sender.send(Command::TimerFired(timer));
            } else {
                let mut ticker = tokio::time::interval(interval);
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                ticker.tick().await; // completes immediately
                loop {
                    ticker.tick().await;
                    let _ = sender.send(Command::TimerFired(timer));
                }
            }
        });

        if let Some(previous) = lock_ignore_poison(&self.timers).insert(timer, task) {
            previous.abort();
        }
    }

    fn stop_timer(&self, timer: TimerId) {
        if let Some(task) = lock_ignore_poison(&self.timers).remove(&timer) {
            task.abort();
        }
    }
}

impl Drop for TokioDispatcher {
    fn drop(&mut self) {
        if let Some(pump) = lock_ignore_poison(&self.pump).take() {
            pump.abort();
        }
        for (_, task) in lock_ignore_poison(&self.timers).drain() {
            task.abort();
        }
    }
}
