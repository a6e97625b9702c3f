//! # App-State Machine
//!
//! ```text
//!   Initializing ──(level load dispatched)──► Loading ──(update pool idle)──► Simulating
//! ```
//!
//! The update thread is the only writer. Other threads read the current
//! state for statistics through [`SharedAppState`].

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// Phase of the engine's update thread.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum AppState {
    /// Entry state: nothing loaded, no level requested yet.
    Initializing = 0,
    /// Level load dispatched; waiting for the update pool to drain.
    Loading = 1,
    /// Level loaded; the scene is simulated every tick.
    Simulating = 2,
}

impl AppState {
    /// The only state this one may move to.
    #[must_use]
    pub const fn next(self) -> Option<AppState> {
        match self {
            AppState::Initializing => Some(AppState::Loading),
            AppState::Loading => Some(AppState::Simulating),
            AppState::Simulating => None,
        }
    }

    /// Whether `self → to` is a legal transition.
    #[must_use]
    pub fn can_transition_to(self, to: AppState) -> bool {
        self.next() == Some(to)
    }

    /// Lower-case name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            AppState::Initializing => "initializing",
            AppState::Loading => "loading",
            AppState::Simulating => "simulating",
        }
    }

    const fn from_u8(value: u8) -> AppState {
        match value {
            0 => AppState::Initializing,
            1 => AppState::Loading,
            _ => AppState::Simulating,
        }
    }
}

impl fmt::Display for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current [`AppState`], readable from any thread.
#[derive(Debug)]
pub struct SharedAppState(AtomicU8);

impl Default for SharedAppState {
    fn default() -> Self {
        Self(AtomicU8::new(AppState::Initializing as u8))
    }
}

impl SharedAppState {
    /// Current state.
    #[must_use]
    pub fn get(&self) -> AppState {
        AppState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Moves to `to`. Returns false, leaving the state unchanged, for an
    /// illegal transition (debug builds assert).
    pub fn transition(&self, to: AppState) -> bool {
        let from = self.get();
        debug_assert!(
            from.can_transition_to(to),
            "illegal app-state transition {from} -> {to}"
        );
        if !from.can_transition_to(to) {
            tracing::error!(%from, %to, "illegal app-state transition ignored");
            return false;
        }
        self.0.store(to as u8, Ordering::Release);
        tracing::info!(%from, %to, "app state changed");
        true
    }
}
