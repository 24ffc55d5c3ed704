//! Two states, one event, a worker-thread dispatcher.
//!
//! Run with: `cargo run --example helloworld`

use std::sync::Arc;
use std::time::Duration;

use trellis_core::dispatch::ThreadDispatcher;
use trellis_core::{args, StateHooks, StateMachine};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Power {
    Off,
    On,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Input {
    Switch,
}

fn main() {
    let machine = StateMachine::new(Power::Off);
    let dispatcher = Arc::new(ThreadDispatcher::new());
    machine.initialize(dispatcher).expect("dispatcher starts");

    machine.register_state(
        Power::Off,
        StateHooks::new().on_state_changed(|_args| println!("off")),
    );
    machine.register_state(
        Power::On,
        StateHooks::new().on_state_changed(|_args| println!("on")),
    );
    machine.register_transition(Power::Off, Power::On, Input::Switch, None, None);
    machine.register_transition(Power::On, Power::Off, Input::Switch, None, None);

    for _ in 0..6 {
        let flipped = machine.transition_sync(Input::Switch, Some(Duration::from_secs(1)), args![]);
        assert!(flipped);
        std::thread::sleep(Duration::from_millis(500));
    }

    machine.release();
}
