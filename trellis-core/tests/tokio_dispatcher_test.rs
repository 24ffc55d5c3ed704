//! Tokio backend integration.

#![cfg(feature = "dispatch-tokio")]

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{TestEvent, TestState};
use trellis_core::dispatch::TokioDispatcher;
use trellis_core::{args, EventDispatcher, StateMachine, TimerId};

async fn wait_for_state(
    machine: &StateMachine<TestState, TestEvent>,
    expected: TestState,
) -> bool {
    for _ in 0..200 {
        if machine.current_state() == expected {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn transitions_dispatch_on_the_pump_task() {
    let machine = Arc::new(StateMachine::new(TestState::A));
    let dispatcher = Arc::new(TokioDispatcher::new());
    machine
        .initialize(dispatcher)
        .expect("tokio dispatcher starts");

    machine.register_transition(TestState::A, TestState::B, TestEvent::Toggle, None, None);
    machine.register_transition(TestState::B, TestState::C, TestEvent::Go, None, None);

    machine.transition(TestEvent::Toggle, args![]);
    machine.transition(TestEvent::Go, args![]);

    assert!(wait_for_state(&machine, TestState::C).await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn sync_posts_work_from_blocking_tasks() {
    let machine = Arc::new(StateMachine::new(TestState::A));
    let dispatcher = Arc::new(TokioDispatcher::new());
    machine
        .initialize(dispatcher)
        .expect("tokio dispatcher starts");
    machine.register_transition(TestState::A, TestState::B, TestEvent::Go, None, None);

    let poster = Arc::clone(&machine);
    let completed = tokio::task::spawn_blocking(move || {
        poster.transition_sync(TestEvent::Go, Some(Duration::from_secs(5)), args![])
    })
    .await
    .expect("blocking task");

    assert!(completed);
    assert_eq!(machine.current_state(), TestState::B);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn timers_deliver_to_the_installed_handler() {
    let dispatcher = Arc::new(TokioDispatcher::new());
    assert!(dispatcher.start());

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<TimerId>();
    dispatcher.set_timer_handler(Box::new(move |id| {
        let _ = tx.send(id);
    }));

    dispatcher.start_timer(TimerId(9), Duration::from_millis(20), true);
    let fired = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timer fired in time");
    assert_eq!(fired, Some(TimerId(9)));

    dispatcher.start_timer(TimerId(4), Duration::from_millis(15), false);
    for _ in 0..3 {
        let fired = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("repeating timer fired");
        assert_eq!(fired, Some(TimerId(4)));
    }
    dispatcher.stop_timer(TimerId(4));
}
