//! Core types for agent lifecycle management.
//!
//! This crate provides the leaf types shared by every lifecycle component:
//!
//! - **States**: the [`State`] enum and its transition matrix
//! - **Capabilities**: what an agent advertises, with extensible metadata
//! - **Error types**: the tagged [`LifecycleError`] taxonomy
//!
//! # Example
//!
//! ```
//! use agent_lifecycle_core::{is_terminal, is_valid_transition, State};
//!
//! assert!(is_valid_transition(State::Unknown, State::Starting));
//! assert!(!is_valid_transition(State::Stopped, State::Running));
//! assert!(is_terminal(State::Failed));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod capability;
pub mod error;
pub mod state;

pub use capability::{Capability, Metadata, MetadataValue};
pub use error::{ErrorKind, HookError, LifecycleError, Result};
pub use state::{
    is_terminal, is_valid_transition, valid_transitions_from, validate_transition,
    ParseStateError, State,
};
