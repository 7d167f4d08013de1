//! src/state.rs
//!
//! `NodeState`: the node lifecycle variable. Polled rather than subscribed
//! to, so plain atomics with acquire/release ordering are sufficient;
//! there is no need for a broadcast channel here.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum State {
    Gossiping = 0,
    CatchingUp = 1,
    Shutdown = 2,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            State::Gossiping => write!(f, "gossiping"),
            State::CatchingUp => write!(f, "catching-up"),
            State::Shutdown => write!(f, "shutdown"),
        }
    }
}

impl State {
    fn from_u8(v: u8) -> State {
        match v {
            0 => State::Gossiping,
            1 => State::CatchingUp,
            _ => State::Shutdown,
        }
    }
}

/// Node lifecycle state plus the one-shot "starting" flag. `Shutdown` is a
/// sink: once observed, further `set` calls are no-ops.
pub struct NodeState {
    state: AtomicU8,
    starting: AtomicBool,
}

impl NodeState {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(State::Gossiping as u8),
            starting: AtomicBool::new(true),
        }
    }

    pub fn get(&self) -> State {
        State::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn set(&self, next: State) {
        // Shutdown is terminal: never transition out of it.
        let _ = self
            .state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |cur| {
                if State::from_u8(cur) == State::Shutdown {
                    None
                } else {
                    Some(next as u8)
                }
            });
    }

    pub fn is_starting(&self) -> bool {
        self.starting.load(Ordering::Acquire)
    }

    pub fn clear_starting(&self) {
        self.starting.store(false, Ordering::Release);
    }
}

impl Default for NodeState {
    fn default() -> Self {
        Self::new()
    }
}
