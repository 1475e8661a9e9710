//! The agent lifecycle state machine.
//!
//! An [`Agent`] owns its current [`State`], capability list and start
//! timestamp behind a single lock. Lifecycle operations validate every move
//! against the transition matrix, run the matching hook outside the lock,
//! and notify observers under the lock so they see transitions in the order
//! they were committed.
//!
//! Agents are produced by [`AgentBuilder`](crate::AgentBuilder) and are
//! meant to be shared behind an `Arc`; every method takes `&self`.

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use agent_lifecycle_core::{
    is_terminal, valid_transitions_from, validate_transition, Capability, LifecycleError, Result,
    State,
};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::instrument::WithSubscriber;
use tracing::{field, Dispatch, Instrument};

use crate::hooks::{HookPoint, HookSet, StateChangeHandler};
use crate::info::AgentInfo;

/// Mutable agent state, only touched while holding the lock.
#[derive(Debug)]
struct Inner {
    state: State,
    capabilities: Vec<Capability>,
    started_at: Option<DateTime<Utc>>,
    /// Bumped on every committed transition.
    epoch: u64,
}

/// A long-running worker whose lifecycle is governed by a state machine.
pub struct Agent {
    id: String,
    name: String,
    version: String,
    inner: RwLock<Inner>,
    hooks: HookSet,
    observers: Vec<Arc<dyn StateChangeHandler>>,
    dispatch: Dispatch,
}

impl Agent {
    pub(crate) fn new(
        id: String,
        name: String,
        version: String,
        capabilities: Vec<Capability>,
        hooks: HookSet,
        observers: Vec<Arc<dyn StateChangeHandler>>,
        dispatch: Dispatch,
    ) -> Self {
        Self {
            id,
            name,
            version,
            inner: RwLock::new(Inner {
                state: State::Unknown,
                capabilities,
                started_at: None,
                epoch: 0,
            }),
            hooks,
            observers,
            dispatch,
        }
    }

    // =========================================================================
    // Identity
    // =========================================================================

    /// Agent identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Human-readable name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Agent version.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    // =========================================================================
    // State accessors
    // =========================================================================

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> State {
        self.inner.read().state
    }

    /// States reachable from the current state.
    #[must_use]
    pub fn valid_transitions(&self) -> Vec<State> {
        valid_transitions_from(self.state())
    }

    /// An independent copy of the advertised capabilities.
    #[must_use]
    pub fn capabilities(&self) -> Vec<Capability> {
        self.inner.read().capabilities.clone()
    }

    /// A copy of the named capability, if advertised.
    #[must_use]
    pub fn capability(&self, name: &str) -> Option<Capability> {
        self.inner
            .read()
            .capabilities
            .iter()
            .find(|c| c.name == name)
            .cloned()
    }

    /// Check if the named capability is advertised.
    #[must_use]
    pub fn has_capability(&self, name: &str) -> bool {
        self.inner
            .read()
            .capabilities
            .iter()
            .any(|c| c.name == name)
    }

    /// When the agent last finished starting. Cleared on stop.
    #[must_use]
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.inner.read().started_at
    }

    /// Time since the agent started, while it is running.
    #[must_use]
    pub fn uptime(&self) -> Option<Duration> {
        let inner = self.inner.read();
        if inner.state == State::Running {
            inner.started_at.map(elapsed_since)
        } else {
            None
        }
    }

    /// A consistent snapshot of identity, state and capabilities.
    #[must_use]
    pub fn info(&self) -> AgentInfo {
        let inner = self.inner.read();
        let uptime = if inner.state == State::Running {
            inner.started_at.map(elapsed_since).unwrap_or_default()
        } else {
            Duration::ZERO
        };

        AgentInfo {
            id: self.id.clone(),
            name: self.name.clone(),
            version: self.version.clone(),
            state: inner.state,
            capabilities: inner.capabilities.clone(),
            started_at: inner.started_at,
            uptime,
        }
    }

    /// Base health check: healthy only while running.
    ///
    /// Agents with their own dependencies should compose this with their
    /// checks through [`HealthCheckExt`](crate::HealthCheckExt) so the state
    /// gate always runs first.
    ///
    /// # Errors
    ///
    /// Returns `LifecycleError::Unavailable` with the current state otherwise.
    pub fn health(&self) -> Result<()> {
        match self.state() {
            State::Running => Ok(()),
            state => Err(LifecycleError::Unavailable {
                agent_id: self.id.clone(),
                state,
            }),
        }
    }

    // =========================================================================
    // Transitions
    // =========================================================================

    /// Move the agent to `to` and notify observers.
    ///
    /// This is the primitive every lifecycle operation is built on. It is
    /// public so embedding agents can force e.g. `Failed` when they detect
    /// an internal fault.
    ///
    /// # Errors
    ///
    /// Returns `LifecycleError::InvalidTransition` without changing anything
    /// if the move is not in the transition matrix.
    pub fn set_state(&self, to: State) -> Result<()> {
        self.apply(to, |_| true, |_| {}).map(|_| ())
    }

    /// Commit `to` if `accept` and the matrix allow it. Returns the epoch of
    /// the new state.
    fn apply(
        &self,
        to: State,
        accept: impl FnOnce(&Inner) -> bool,
        effect: impl FnOnce(&mut Inner),
    ) -> Result<u64> {
        self.scoped(|| {
            let mut inner = self.inner.write();
            let from = inner.state;

            if !accept(&*inner) {
                return Err(LifecycleError::InvalidTransition {
                    agent_id: self.id.clone(),
                    from,
                    to,
                });
            }
            validate_transition(&self.id, from, to)?;

            inner.state = to;
            inner.epoch = inner.epoch.wrapping_add(1);
            effect(&mut *inner);

            tracing::debug!(agent_id = %self.id, %from, %to, "State transition");

            // Still under the lock: observers see transitions in commit order.
            self.notify(from, to);
            Ok(inner.epoch)
        })
    }

    fn notify(&self, from: State, to: State) {
        for (index, observer) in self.observers.iter().enumerate() {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                observer.on_state_change(from, to);
            }));

            if let Err(payload) = outcome {
                tracing::error!(
                    agent_id = %self.id,
                    %from,
                    %to,
                    observer = index,
                    panic = panic_message(payload.as_ref()),
                    "State change observer panicked"
                );
            }
        }
    }

    // =========================================================================
    // Lifecycle operations
    // =========================================================================

    /// Start (or restart) the agent.
    ///
    /// Walks `Unknown | Stopped | Failed -> Starting -> Running`, running the
    /// start hook in between.
    ///
    /// # Errors
    ///
    /// - `LifecycleError::Cancelled` if `ctx` is already cancelled.
    /// - `LifecycleError::InvalidTransition` if the agent cannot start from
    ///   its current state, or if a concurrent [`stop`](Self::stop) took the
    ///   agent over while the start hook ran. The error names the state that
    ///   won.
    /// - `LifecycleError::HookFailed` if the start hook fails; the agent is
    ///   left in `Failed`.
    pub async fn start(&self, ctx: &CancellationToken) -> Result<()> {
        self.traced("start", async {
            self.ensure_not_cancelled(ctx, "start")?;
            let epoch = self.apply(State::Starting, |_| true, |_| {})?;
            tracing::info!(agent_id = %self.id, "Starting agent");

            self.run_hook(HookPoint::Start, epoch, ctx).await?;

            // A concurrent stop may have taken over while the hook ran.
            self.apply(
                State::Running,
                |inner| inner.epoch == epoch,
                |inner| inner.started_at = Some(Utc::now()),
            )?;
            tracing::info!(agent_id = %self.id, "Agent running");
            Ok(())
        })
        .await
    }

    /// Stop the agent.
    ///
    /// Calling this on an agent that is already stopped or failed is a no-op,
    /// so shutdown paths can call it unconditionally.
    ///
    /// # Errors
    ///
    /// - `LifecycleError::Cancelled` if `ctx` is already cancelled.
    /// - `LifecycleError::InvalidTransition` if the agent is neither running,
    ///   paused nor starting.
    /// - `LifecycleError::HookFailed` if the stop hook fails; the agent is
    ///   left in `Failed`.
    pub async fn stop(&self, ctx: &CancellationToken) -> Result<()> {
        self.traced("stop", async {
            let current = self.state();
            if is_terminal(current) {
                tracing::debug!(agent_id = %self.id, state = %current, "Agent already stopped");
                return Ok(());
            }

            self.ensure_not_cancelled(ctx, "stop")?;
            let epoch = self.apply(State::Stopping, |_| true, |_| {})?;
            tracing::info!(agent_id = %self.id, "Stopping agent");

            self.run_hook(HookPoint::Stop, epoch, ctx).await?;

            self.apply(
                State::Stopped,
                |inner| inner.epoch == epoch,
                |inner| inner.started_at = None,
            )?;
            tracing::info!(agent_id = %self.id, "Agent stopped");
            Ok(())
        })
        .await
    }

    /// Pause a running agent.
    ///
    /// # Errors
    ///
    /// - `LifecycleError::Cancelled` if `ctx` is already cancelled.
    /// - `LifecycleError::InvalidTransition` unless the agent is running.
    /// - `LifecycleError::HookFailed` if the pause hook fails; the agent is
    ///   left in `Failed`.
    pub async fn pause(&self, ctx: &CancellationToken) -> Result<()> {
        self.traced("pause", async {
            self.ensure_not_cancelled(ctx, "pause")?;
            let epoch = self.apply(State::Paused, |_| true, |_| {})?;

            self.run_hook(HookPoint::Pause, epoch, ctx).await?;

            tracing::info!(agent_id = %self.id, "Agent paused");
            Ok(())
        })
        .await
    }

    /// Resume a paused agent.
    ///
    /// # Errors
    ///
    /// - `LifecycleError::Cancelled` if `ctx` is already cancelled.
    /// - `LifecycleError::InvalidTransition` unless the agent is paused.
    /// - `LifecycleError::HookFailed` if the resume hook fails; the agent is
    ///   left in `Failed`.
    pub async fn resume(&self, ctx: &CancellationToken) -> Result<()> {
        self.traced("resume", async {
            self.ensure_not_cancelled(ctx, "resume")?;
            // Running is also reachable from Starting; resume only accepts Paused.
            let epoch = self.apply(State::Running, |inner| inner.state == State::Paused, |_| {})?;

            self.run_hook(HookPoint::Resume, epoch, ctx).await?;

            tracing::info!(agent_id = %self.id, "Agent resumed");
            Ok(())
        })
        .await
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn ensure_not_cancelled(&self, ctx: &CancellationToken, operation: &'static str) -> Result<()> {
        if ctx.is_cancelled() {
            tracing::warn!(agent_id = %self.id, operation, "Cancelled before start of operation");
            return Err(LifecycleError::Cancelled {
                agent_id: self.id.clone(),
                operation,
            });
        }
        Ok(())
    }

    /// Run a hook outside the lock; on failure force `Failed`.
    ///
    /// `epoch` is the transition the calling operation committed. If another
    /// operation has moved the agent since, the agent is left alone and the
    /// conflict naming its current state is returned instead of `HookFailed`.
    async fn run_hook(
        &self,
        point: HookPoint,
        epoch: u64,
        ctx: &CancellationToken,
    ) -> Result<()> {
        let Some(hook) = self.hooks.get(point) else {
            return Ok(());
        };

        match hook.run(ctx).await {
            Ok(()) => Ok(()),
            Err(source) => {
                tracing::error!(
                    agent_id = %self.id,
                    hook = point.name(),
                    error = %source,
                    "Lifecycle hook failed"
                );

                match self.apply(State::Failed, |inner| inner.epoch == epoch, |_| {}) {
                    Ok(_) => Err(LifecycleError::HookFailed {
                        agent_id: self.id.clone(),
                        hook: point.name(),
                        source,
                    }),
                    Err(conflict) => {
                        tracing::warn!(
                            agent_id = %self.id,
                            hook = point.name(),
                            error = %conflict,
                            "Agent moved by another operation while hook ran"
                        );
                        Err(conflict)
                    }
                }
            }
        }
    }

    /// Run `work` inside a span for `operation`, under this agent's dispatcher.
    async fn traced<F>(&self, operation: &'static str, work: F) -> Result<()>
    where
        F: Future<Output = Result<()>>,
    {
        let span = self.scoped(|| {
            tracing::info_span!(
                "agent.lifecycle",
                operation,
                agent.id = %self.id,
                agent.name = %self.name,
                agent.version = %self.version,
                otel.status_code = field::Empty,
                error = field::Empty,
            )
        });

        let result = work
            .instrument(span.clone())
            .with_subscriber(self.dispatch.clone())
            .await;

        match &result {
            Ok(()) => {
                span.record("otel.status_code", "OK");
            }
            Err(err) => {
                span.record("otel.status_code", "ERROR");
                span.record("error", field::display(err));
            }
        }
        result
    }

    fn scoped<T>(&self, f: impl FnOnce() -> T) -> T {
        tracing::dispatcher::with_default(&self.dispatch, f)
    }
}

impl fmt::Debug for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Agent")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("version", &self.version)
            .field("state", &self.state())
            .field("hooks", &self.hooks)
            .field("observers", &self.observers.len())
            .finish_non_exhaustive()
    }
}

fn elapsed_since(started_at: DateTime<Utc>) -> Duration {
    (Utc::now() - started_at).to_std().unwrap_or_default()
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}
