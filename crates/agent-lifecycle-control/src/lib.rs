//! Lifecycle controller for long-running agents.
//!
//! This crate provides the state machine that governs how an agent instance
//! moves between its operational states, runs the agent's hooks during each
//! transition, and notifies observers.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │        Orchestrator / entry point / signal handler          │
//! └─────────────────────────────────────────────────────────────┘
//!                              │ start / stop / pause / resume
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                           Agent                             │
//! │  ┌─────────────┐ ┌──────────────────┐ ┌─────────────────┐   │
//! │  │  Transition │ │  Hooks           │ │  Observers      │   │
//! │  │  matrix     │ │  (outside lock)  │ │  (under lock)   │   │
//! │  └─────────────┘ └──────────────────┘ └─────────────────┘   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```
//! use agent_lifecycle_control::{AgentBuilder, State};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> agent_lifecycle_control::Result<()> {
//! let agent = AgentBuilder::new("a1", "svc", "1.0.0").build()?;
//! let ctx = CancellationToken::new();
//!
//! agent.start(&ctx).await?;
//! assert_eq!(agent.state(), State::Running);
//!
//! agent.stop(&ctx).await?;
//! agent.stop(&ctx).await?; // no-op
//! assert_eq!(agent.state(), State::Stopped);
//! # Ok(())
//! # }
//! ```
//!
//! # State Machine
//!
//! - `Unknown`, `Stopped`, `Failed` → `Starting`
//! - `Starting` → `Running`, `Failed`, or `Stopping`
//! - `Running` → `Paused`, `Stopping`, or `Failed`
//! - `Paused` → `Running`, `Stopping`, or `Failed`
//! - `Stopping` → `Stopped` or `Failed`
//!
//! See [`agent_lifecycle_core::state`] for the transition helpers.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod agent;
pub mod builder;
pub mod health;
pub mod hooks;
pub mod info;

pub use agent::Agent;
pub use builder::AgentBuilder;
pub use health::{Chained, FnHealthCheck, HealthCheck, HealthCheckExt};
pub use hooks::{Hook, HookPoint, HookSet, StateChangeHandler, TransitionRecorder};
pub use info::AgentInfo;

// Re-export commonly used types from the core crate for convenience
pub use agent_lifecycle_core::{
    Capability, ErrorKind, HookError, LifecycleError, Metadata, MetadataValue, Result, State,
};
