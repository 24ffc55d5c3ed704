//! Synchronous posting semantics on the worker-thread dispatcher.

#![cfg(feature = "threadsafe")]

mod common;

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use common::{TestEvent, TestState};
use trellis_core::dispatch::ThreadDispatcher;
use trellis_core::{args, StateHooks, StateMachine};

fn fixture() -> Arc<StateMachine<TestState, TestEvent>> {
    let machine = Arc::new(StateMachine::new(TestState::A));
    let dispatcher = Arc::new(ThreadDispatcher::new());
    machine
        .initialize(dispatcher)
        .expect("thread dispatcher starts");
    machine
}

#[test]
fn sync_post_reports_completion() {
    let machine = fixture();
    machine.register_transition(TestState::A, TestState::B, TestEvent::Go, None, None);

    assert!(machine.transition_sync(TestEvent::Go, Some(Duration::from_secs(5)), args![]));
    assert_eq!(machine.current_state(), TestState::B);
}

#[test]
fn sync_post_reports_unresolvable_events() {
    let machine = fixture();
    assert!(!machine.transition_sync(TestEvent::Go, Some(Duration::from_secs(5)), args![]));
    assert_eq!(machine.current_state(), TestState::A);
}

#[test]
fn sync_post_reports_refused_entry() {
    let machine = fixture();
    machine.register_state(
        TestState::B,
        StateHooks::new().on_entering(|_args| false),
    );
    machine.register_transition(TestState::A, TestState::B, TestEvent::Go, None, None);

    assert!(!machine.transition_sync(TestEvent::Go, Some(Duration::from_secs(5)), args![]));
    assert_eq!(machine.current_state(), TestState::A);
}

#[test]
fn self_transition_without_action_reports_failure() {
    let machine = fixture();
    machine.register_transition(TestState::A, TestState::A, TestEvent::Go, None, None);

    assert!(!machine.transition_sync(TestEvent::Go, Some(Duration::from_secs(5)), args![]));
    assert_eq!(machine.current_state(), TestState::A);
}

#[test]
fn sync_post_resolves_after_the_drilldown_chain() {
    let machine = fixture();
    machine
        .register_entry_point(TestState::Parent, TestState::Child1)
        .unwrap();
    machine.register_transition(TestState::A, TestState::Parent, TestEvent::Enter, None, None);

    assert!(machine.transition_sync(TestEvent::Enter, Some(Duration::from_secs(5)), args![]));
    assert_eq!(machine.current_state(), TestState::Child1);
}

#[test]
fn sync_timeout_leaves_the_event_queued() {
    let machine = fixture();
    machine.register_transition(
        TestState::A,
        TestState::B,
        TestEvent::Toggle,
        Some(Box::new(|_args| thread::sleep(Duration::from_millis(400)))),
        None,
    );
    machine.register_transition(TestState::B, TestState::C, TestEvent::Go, None, None);

    // Occupy the dispatcher thread with the slow action.
    machine.transition(TestEvent::Toggle, args![]);
    thread::sleep(Duration::from_millis(100));

    let started = Instant::now();
    assert!(!machine.transition_sync(TestEvent::Go, Some(Duration::from_millis(50)), args![]));
    assert!(started.elapsed() < Duration::from_millis(350));

    // The timed-out event was not removed; it runs once the dispatcher
    // thread resumes.
    thread::sleep(Duration::from_millis(600));
    assert_eq!(machine.current_state(), TestState::C);
}

#[test]
fn queue_clear_fails_queued_sync_posters() {
    let machine = fixture();
    machine.register_transition(
        TestState::A,
        TestState::B,
        TestEvent::Toggle,
        Some(Box::new(|_args| thread::sleep(Duration::from_millis(500)))),
        None,
    );
    machine.register_transition(TestState::B, TestState::C, TestEvent::Go, None, None);
    machine.register_transition(TestState::B, TestState::A, TestEvent::Reset, None, None);

    machine.transition(TestEvent::Toggle, args![]);
    thread::sleep(Duration::from_millis(100));

    let waiter = {
        let machine = Arc::clone(&machine);
        thread::spawn(move || {
            machine.transition_sync(TestEvent::Go, Some(Duration::from_secs(10)), args![])
        })
    };
    thread::sleep(Duration::from_millis(150));

    let started = Instant::now();
    machine.transition_with_queue_clear(TestEvent::Reset, args![]);

    let result = waiter.join().expect("sync poster thread");
    assert!(!result);
    // The latch resolved from the clear, long before its ten-second limit.
    assert!(started.elapsed() < Duration::from_secs(5));

    thread::sleep(Duration::from_millis(700));
    assert_eq!(machine.current_state(), TestState::A);
}

#[test]
fn posting_across_threads_keeps_fifo_order_per_thread() {
    let machine = fixture();
    machine.register_transition(TestState::A, TestState::B, TestEvent::Toggle, None, None);
    machine.register_transition(TestState::B, TestState::A, TestEvent::Toggle, None, None);

    let posters: Vec<_> = (0..4)
        .map(|_| {
            let machine = Arc::clone(&machine);
            thread::spawn(move || {
                for _ in 0..50 {
                    machine.transition(TestEvent::Toggle, args![]);
                }
            })
        })
        .collect();
    for poster in posters {
        poster.join().expect("poster thread");
    }

    // 200 toggles in total: an even count always returns to A.
    assert!(machine.transition_sync(TestEvent::Toggle, Some(Duration::from_secs(10)), args![]));
    assert_eq!(machine.current_state(), TestState::B);
}

#[test]
fn release_twice_matches_release_once() {
    let machine = fixture();
    machine.register_transition(TestState::A, TestState::B, TestEvent::Go, None, None);

    machine.release();
    machine.release();

    assert!(!machine.transition_sync(TestEvent::Go, Some(Duration::from_millis(50)), args![]));
    assert_eq!(machine.current_state(), TestState::A);
}

#[test]
fn machine_can_rebind_after_release() {
    let machine = fixture();
    machine.register_transition(TestState::A, TestState::B, TestEvent::Go, None, None);
    machine.release();

    let dispatcher = Arc::new(ThreadDispatcher::new());
    machine
        .initialize(dispatcher)
        .expect("rebinding after release");

    assert!(machine.transition_sync(TestEvent::Go, Some(Duration::from_secs(5)), args![]));
    assert_eq!(machine.current_state(), TestState::B);
}
