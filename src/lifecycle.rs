//! # Process Lifecycle
//!
//! Tracks the bridge through `Booting`, `Running` and `Terminated`.
//!
//! `Terminated` is final. The only transitions are:
//! - `Booting -> Running` once the virtual device exists
//! - `Booting -> Terminated` when bootstrap fails
//! - `Running -> Terminated` on a fatal write failure or a signal

use std::fmt;
use tracing::info;

use crate::error::{JoystickError, Result};

/// Lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Booting,
    Running,
    Terminated,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            State::Booting => "booting",
            State::Running => "running",
            State::Terminated => "terminated",
        })
    }
}

impl State {
    fn can_become(self, next: State) -> bool {
        matches!(
            (self, next),
            (State::Booting, State::Running)
                | (State::Booting, State::Terminated)
                | (State::Running, State::Terminated)
        )
    }
}

/// Why the bridge stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shutdown {
    /// SIGINT (Ctrl+C)
    Interrupt,
    /// SIGTERM
    Terminate,
    /// Bootstrap or runtime failure
    Fault,
}

impl fmt::Display for Shutdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Shutdown::Interrupt => "interrupted",
            Shutdown::Terminate => "terminated by signal",
            Shutdown::Fault => "fault",
        })
    }
}

/// Lifecycle state machine
#[derive(Debug)]
pub struct Lifecycle {
    state: State,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    /// Start in `Booting`
    pub fn new() -> Self {
        Self { state: State::Booting }
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Move to `next`.
    ///
    /// # Errors
    ///
    /// Returns [`JoystickError::InvalidTransition`] for any transition not
    /// listed in the module docs; the state is left unchanged.
    pub fn transition(&mut self, next: State) -> Result<()> {
        if !self.state.can_become(next) {
            return Err(JoystickError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }

        info!("Lifecycle: {} -> {}", self.state, next);
        self.state = next;
        Ok(())
    }

    /// Move to `Terminated`, logging the reason. No-op if already there.
    pub fn terminate(&mut self, reason: Shutdown) {
        if self.state == State::Terminated {
            return;
        }
        info!("Shutting down ({})", reason);
        self.state = State::Terminated;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_booting() {
        assert_eq!(Lifecycle::new().state(), State::Booting);
        assert_eq!(Lifecycle::default().state(), State::Booting);
    }

    #[test]
    fn test_normal_run() {
        let mut lifecycle = Lifecycle::new();
        lifecycle.transition(State::Running).unwrap();
        assert_eq!(lifecycle.state(), State::Running);
        lifecycle.transition(State::Terminated).unwrap();
        assert_eq!(lifecycle.state(), State::Terminated);
    }

    #[test]
    fn test_bootstrap_failure() {
        let mut lifecycle = Lifecycle::new();
        lifecycle.transition(State::Terminated).unwrap();
        assert_eq!(lifecycle.state(), State::Terminated);
    }

    #[test]
    fn test_terminated_is_final() {
        let mut lifecycle = Lifecycle::new();
        lifecycle.transition(State::Terminated).unwrap();

        for next in [State::Booting, State::Running, State::Terminated] {
            let err = lifecycle.transition(next).unwrap_err();
            assert!(matches!(err, JoystickError::InvalidTransition { .. }));
        }
        assert_eq!(lifecycle.state(), State::Terminated);
    }

    #[test]
    fn test_no_return_to_booting() {
        let mut lifecycle = Lifecycle::new();
        lifecycle.transition(State::Running).unwrap();

        let err = lifecycle.transition(State::Booting).unwrap_err();
        assert_eq!(err.to_string(), "Invalid lifecycle transition: running -> booting");
        assert_eq!(lifecycle.state(), State::Running);
    }

    #[test]
    fn test_self_transition_rejected() {
        let mut lifecycle = Lifecycle::new();
        assert!(lifecycle.transition(State::Booting).is_err());
    }

    #[test]
    fn test_terminate_is_idempotent() {
        let mut lifecycle = Lifecycle::new();
        lifecycle.transition(State::Running).unwrap();
        lifecycle.terminate(Shutdown::Interrupt);
        lifecycle.terminate(Shutdown::Fault);
        assert_eq!(lifecycle.state(), State::Terminated);
    }

    #[test]
    fn test_display() {
        assert_eq!(State::Running.to_string(), "running");
        assert_eq!(Shutdown::Terminate.to_string(), "terminated by signal");
    }
}
