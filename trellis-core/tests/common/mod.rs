//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TestState {
    A,
    B,
    C,
    Parent,
    Child1,
    Child2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TestEvent {
    Toggle,
    Enter,
    Leave,
    Go,
    Reset,
}

/// Thread-safe callback journal; clones share the same log.
#[derive(Clone, Default)]
pub struct Recorder {
    entries: Arc<Mutex<Vec<String>>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, entry: impl Into<String>) {
        self.entries
            .lock()
            .expect("recorder lock")
            .push(entry.into());
    }

    /// Returns the journal and clears it.
    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.entries.lock().expect("recorder lock"))
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.entries.lock().expect("recorder lock").clone()
    }
}
