//! Error types for agent lifecycle operations.
//!
//! Every error carries an [`ErrorKind`] tag. Callers branch on the kind and
//! reach the underlying cause, when there is one, through
//! [`std::error::Error::source`].

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::state::State;

/// A result type using `LifecycleError`.
pub type Result<T> = std::result::Result<T, LifecycleError>;

/// The error type returned by lifecycle hooks.
pub type HookError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Coarse classification attached to every [`LifecycleError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The requested transition is not in the transition matrix.
    Conflict,
    /// Builder input was missing or malformed.
    Validation,
    /// The caller's context was already cancelled.
    Timeout,
    /// A lifecycle hook failed.
    Internal,
    /// The agent (or one of its dependencies) is not serving.
    Unavailable,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Conflict => "conflict",
            Self::Validation => "validation",
            Self::Timeout => "timeout",
            Self::Internal => "internal",
            Self::Unavailable => "unavailable",
        };
        f.write_str(name)
    }
}

/// Errors that can occur while building or driving an agent.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// The requested state transition is not valid.
    #[error("invalid state transition for agent {agent_id}: cannot transition from {from} to {to}")]
    InvalidTransition {
        /// The agent being transitioned.
        agent_id: String,
        /// The current state.
        from: State,
        /// The requested target state.
        to: State,
    },

    /// A required builder field was empty.
    #[error("{field} is required")]
    MissingField {
        /// Name of the missing field.
        field: &'static str,
    },

    /// A builder field was present but unusable.
    #[error("invalid {field}: {reason}")]
    InvalidField {
        /// Name of the offending field.
        field: &'static str,
        /// Why the value was rejected.
        reason: String,
    },

    /// The caller cancelled before the operation began.
    #[error("{operation} cancelled for agent {agent_id} before it began")]
    Cancelled {
        /// The agent the operation targeted.
        agent_id: String,
        /// The lifecycle operation that was requested.
        operation: &'static str,
    },

    /// A registered lifecycle hook returned an error.
    #[error("{hook} hook failed for agent {agent_id}: {source}")]
    HookFailed {
        /// The agent whose hook failed.
        agent_id: String,
        /// Which hook failed (`on_start`, `on_stop`, ...).
        hook: &'static str,
        /// The error returned by the hook.
        #[source]
        source: HookError,
    },

    /// The agent is not running.
    #[error("agent {agent_id} is unavailable, current state is {state}")]
    Unavailable {
        /// The agent that was checked.
        agent_id: String,
        /// The state it was found in.
        state: State,
    },

    /// A dependency health check failed.
    #[error("dependency {name} is unavailable: {reason}")]
    Dependency {
        /// Name of the dependency.
        name: String,
        /// What went wrong.
        reason: String,
    },
}

impl LifecycleError {
    /// Returns the kind tag for this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidTransition { .. } => ErrorKind::Conflict,
            Self::MissingField { .. } | Self::InvalidField { .. } => ErrorKind::Validation,
            Self::Cancelled { .. } => ErrorKind::Timeout,
            Self::HookFailed { .. } => ErrorKind::Internal,
            Self::Unavailable { .. } | Self::Dependency { .. } => ErrorKind::Unavailable,
        }
    }

    /// Returns the appropriate HTTP status code for this error.
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self.kind() {
            ErrorKind::Conflict => 409,
            ErrorKind::Validation => 400,
            ErrorKind::Timeout => 504,
            ErrorKind::Internal => 500,
            ErrorKind::Unavailable => 503,
        }
    }

    /// Returns true if this error might be resolved by retrying.
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Timeout | ErrorKind::Unavailable)
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error as _;
    use std::io;

    use super::*;

    #[test]
    fn error_kinds_and_status_codes() {
        let conflict = LifecycleError::InvalidTransition {
            agent_id: "a1".to_string(),
            from: State::Running,
            to: State::Starting,
        };
        assert_eq!(conflict.kind(), ErrorKind::Conflict);
        assert_eq!(conflict.http_status_code(), 409);
        assert!(!conflict.is_retriable());

        let missing = LifecycleError::MissingField { field: "id" };
        assert_eq!(missing.kind(), ErrorKind::Validation);
        assert_eq!(missing.http_status_code(), 400);

        let cancelled = LifecycleError::Cancelled {
            agent_id: "a1".to_string(),
            operation: "start",
        };
        assert_eq!(cancelled.kind(), ErrorKind::Timeout);
        assert_eq!(cancelled.http_status_code(), 504);
        assert!(cancelled.is_retriable());

        let unavailable = LifecycleError::Unavailable {
            agent_id: "a1".to_string(),
            state: State::Paused,
        };
        assert_eq!(unavailable.kind(), ErrorKind::Unavailable);
        assert_eq!(unavailable.http_status_code(), 503);
    }

    #[test]
    fn hook_failure_keeps_source() {
        let err = LifecycleError::HookFailed {
            agent_id: "a1".to_string(),
            hook: "on_start",
            source: Box::new(io::Error::other("db down")),
        };

        assert_eq!(err.kind(), ErrorKind::Internal);
        assert_eq!(err.http_status_code(), 500);
        assert_eq!(
            err.to_string(),
            "on_start hook failed for agent a1: db down"
        );

        let source = err.source().expect("hook error should be the source");
        let io_err = source.downcast_ref::<io::Error>().unwrap();
        assert_eq!(io_err.to_string(), "db down");
    }

    #[test]
    fn unavailable_message_mentions_state() {
        let err = LifecycleError::Unavailable {
            agent_id: "a1".to_string(),
            state: State::Stopped,
        };
        assert_eq!(
            err.to_string(),
            "agent a1 is unavailable, current state is stopped"
        );
    }
}
