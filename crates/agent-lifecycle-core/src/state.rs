//! Agent lifecycle states and the transition matrix.
//!
//! This module defines the states an agent instance moves through and the
//! validation logic that keeps the state machine consistent.
//!
//! # State Machine
//!
//! ```text
//!     ┌──────────┐
//!     │ Unknown  │
//!     └────┬─────┘
//!          │ start
//!          ▼
//!     ┌──────────┐  hook failed   ┌──────────┐
//!     │ Starting │───────────────▶│  Failed  │◄─────────────┐
//!     └────┬─────┘                └────┬─────┘              │
//!          │ hook ok                   │ restart            │
//!          ▼                           ▼                    │
//!     ┌──────────┐   pause   ┌──────────┐                   │
//!     │ Running  │──────────▶│  Paused  │───────────────────┤
//!     │          │◄──────────│          │                   │
//!     └────┬─────┘  resume   └────┬─────┘                   │
//!          │ stop                 │ stop                    │
//!          ▼                      ▼                         │
//!     ┌──────────────────────────────┐                      │
//!     │           Stopping           │──────────────────────┘
//!     └──────────────┬───────────────┘
//!                    ▼
//!               ┌──────────┐
//!               │ Stopped  │──▶ Starting (restart)
//!               └──────────┘
//! ```
//!
//! `Starting` may also move to `Stopping` when a stop request races an
//! in-flight start.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::{LifecycleError, Result};

/// Lifecycle states for an agent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum State {
    /// Freshly built, never started.
    #[default]
    Unknown,
    /// The start hook is running.
    Starting,
    /// Started and doing work.
    Running,
    /// Temporarily suspended; resumable.
    Paused,
    /// The stop hook is running.
    Stopping,
    /// Stopped cleanly. Restartable.
    Stopped,
    /// A hook failed or a fault was reported. Restartable.
    Failed,
}

impl State {
    /// Every state, in declaration order.
    pub const ALL: [Self; 7] = [
        Self::Unknown,
        Self::Starting,
        Self::Running,
        Self::Paused,
        Self::Stopping,
        Self::Stopped,
        Self::Failed,
    ];

    /// Lower-case name of the state, as used in logs and serialized forms.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unrecognised state name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown agent state: {0}")]
pub struct ParseStateError(pub String);

impl FromStr for State {
    type Err = ParseStateError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|state| state.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ParseStateError(s.to_string()))
    }
}

/// Validates a state transition and returns the target state if valid.
///
/// # Errors
///
/// Returns `LifecycleError::InvalidTransition` if the transition is not allowed.
pub fn validate_transition(agent_id: &str, from: State, to: State) -> Result<State> {
    if is_valid_transition(from, to) {
        Ok(to)
    } else {
        Err(LifecycleError::InvalidTransition {
            agent_id: agent_id.to_string(),
            from,
            to,
        })
    }
}

/// Check if a state transition is valid according to the state machine.
#[must_use]
pub const fn is_valid_transition(from: State, to: State) -> bool {
    use State::{Failed, Paused, Running, Starting, Stopped, Stopping, Unknown};

    matches!(
        (from, to),
        // Fresh, stopped and failed agents can all (re)start
        (Unknown | Stopped | Failed, Starting)
            // Starting resolves to Running or Failed depending on the hook
            | (Starting, Running | Failed)
            // Running can pause, stop or fail
            | (Running, Stopping | Paused | Failed)
            // Paused can resume, stop or fail
            | (Paused, Running | Stopping | Failed)
            // A stop racing an in-flight start
            | (Starting, Stopping)
            // Stopping resolves to Stopped or Failed
            | (Stopping, Stopped | Failed)
    )
}

/// Returns the list of valid target states from the given state.
#[must_use]
pub fn valid_transitions_from(state: State) -> Vec<State> {
    State::ALL
        .into_iter()
        .filter(|&to| is_valid_transition(state, to))
        .collect()
}

/// Returns true if the agent is in a terminal state (stopped or failed).
///
/// Terminal only means no further progress happens without an explicit
/// start; both terminal states are restartable.
#[must_use]
pub const fn is_terminal(state: State) -> bool {
    matches!(state, State::Stopped | State::Failed)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MATRIX: &[(State, State)] = &[
        (State::Unknown, State::Starting),
        (State::Starting, State::Running),
        (State::Starting, State::Failed),
        (State::Starting, State::Stopping),
        (State::Running, State::Stopping),
        (State::Running, State::Paused),
        (State::Running, State::Failed),
        (State::Paused, State::Running),
        (State::Paused, State::Stopping),
        (State::Paused, State::Failed),
        (State::Stopping, State::Stopped),
        (State::Stopping, State::Failed),
        (State::Stopped, State::Starting),
        (State::Failed, State::Starting),
    ];

    #[test]
    fn matrix_is_exhaustive() {
        for from in State::ALL {
            for to in State::ALL {
                let expected = MATRIX.contains(&(from, to));
                assert_eq!(
                    is_valid_transition(from, to),
                    expected,
                    "{from} -> {to} should be {}",
                    if expected { "valid" } else { "invalid" }
                );
            }
        }
    }

    #[test]
    fn invalid_transitions() {
        // Can't skip Starting
        assert!(!is_valid_transition(State::Unknown, State::Running));
        // Can't resume a stopped agent
        assert!(!is_valid_transition(State::Stopped, State::Running));
        // Self transitions are never valid
        assert!(!is_valid_transition(State::Running, State::Running));
        // Nothing goes back to Unknown
        assert!(!is_valid_transition(State::Failed, State::Unknown));
    }

    #[test]
    fn validate_transition_ok() {
        let result = validate_transition("a1", State::Running, State::Paused);
        assert_eq!(result.unwrap(), State::Paused);
    }

    #[test]
    fn validate_transition_err() {
        let result = validate_transition("a1", State::Stopped, State::Running);

        match result {
            Err(LifecycleError::InvalidTransition { agent_id, from, to }) => {
                assert_eq!(agent_id, "a1");
                assert_eq!(from, State::Stopped);
                assert_eq!(to, State::Running);
            }
            _ => panic!("expected InvalidTransition error"),
        }
    }

    #[test]
    fn terminal_states() {
        assert!(is_terminal(State::Stopped));
        assert!(is_terminal(State::Failed));
        assert!(!is_terminal(State::Unknown));
        assert!(!is_terminal(State::Running));
        assert!(!is_terminal(State::Stopping));
    }

    #[test]
    fn valid_transitions_from_running() {
        let transitions = valid_transitions_from(State::Running);
        assert_eq!(
            transitions,
            vec![State::Paused, State::Stopping, State::Failed]
        );
    }

    #[test]
    fn terminal_states_restart() {
        assert_eq!(valid_transitions_from(State::Stopped), vec![State::Starting]);
        assert_eq!(valid_transitions_from(State::Failed), vec![State::Starting]);
    }

    #[test]
    fn display_and_parse() {
        for state in State::ALL {
            assert_eq!(state.to_string().parse::<State>().unwrap(), state);
        }
        assert_eq!("RUNNING".parse::<State>().unwrap(), State::Running);
        assert_eq!(
            "hibernating".parse::<State>(),
            Err(ParseStateError("hibernating".to_string()))
        );
    }

    #[test]
    fn serde_snake_case() {
        let json = serde_json::to_string(&State::Stopping).unwrap();
        assert_eq!(json, "\"stopping\"");
        let state: State = serde_json::from_str("\"failed\"").unwrap();
        assert_eq!(state, State::Failed);
    }
}
