//! A nested machine: a composite `Playing` state with an entry point,
//! guarded transitions, and event arguments.
//!
//! Run with: `cargo run --example media_player`

use std::sync::Arc;
use std::time::Duration;

use trellis_core::dispatch::ThreadDispatcher;
use trellis_core::{args, ArgValue, StateHooks, StateMachine};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Player {
    Stopped,
    Playing,
    Track,
    Paused,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Control {
    Play,
    Pause,
    Stop,
}

fn main() {
    let machine = StateMachine::new(Player::Stopped);
    let dispatcher = Arc::new(ThreadDispatcher::new());
    machine.initialize(dispatcher).expect("dispatcher starts");

    machine.register_state(
        Player::Playing,
        StateHooks::new().on_state_changed(|args| {
            let track = args.first().and_then(ArgValue::as_str).unwrap_or("?");
            println!("playing ({track})");
        }),
    );
    machine.register_state(
        Player::Track,
        StateHooks::new().on_state_changed(|_args| println!("  track cursor at 0:00")),
    );
    machine.register_state(
        Player::Paused,
        StateHooks::new().on_state_changed(|_args| println!("paused")),
    );
    machine.register_state(
        Player::Stopped,
        StateHooks::new().on_state_changed(|_args| println!("stopped")),
    );

    // `Playing` is composite: entering it continues into `Track`.
    machine
        .register_entry_point(Player::Playing, Player::Track)
        .expect("well-formed topology");

    // Play only starts when a track name is supplied.
    machine.register_transition(
        Player::Stopped,
        Player::Playing,
        Control::Play,
        None,
        Some(Box::new(|args| {
            args.first().and_then(ArgValue::as_str).is_some()
        })),
    );
    // Pause and Stop are declared on the composite parent; substates
    // bubble up to it.
    machine.register_transition(Player::Playing, Player::Paused, Control::Pause, None, None);
    machine.register_transition(Player::Playing, Player::Stopped, Control::Stop, None, None);
    machine.register_transition(Player::Paused, Player::Playing, Control::Play, None, None);

    let timeout = Some(Duration::from_secs(1));

    // Refused by the guard: no track argument.
    assert!(!machine.transition_sync(Control::Play, timeout, args![]));

    assert!(machine.transition_sync(Control::Play, timeout, args!["solitude.flac"]));
    assert_eq!(machine.current_state(), Player::Track);

    // Posted while in Track; handled by the Playing parent.
    assert!(machine.transition_sync(Control::Pause, timeout, args![]));
    assert!(machine.transition_sync(Control::Play, timeout, args!["solitude.flac"]));
    assert!(machine.transition_sync(Control::Stop, timeout, args![]));
    assert_eq!(machine.current_state(), Player::Stopped);

    machine.release();
}
