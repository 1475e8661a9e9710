//! Lifecycle hooks and state change observers.
//!
//! Hooks are the fallible callbacks a concrete agent supplies to do real work
//! during a transition (open connections on start, flush on stop, ...).
//! Observers are infallible and are told about every committed transition.
//!
//! Both are set once by [`AgentBuilder`](crate::AgentBuilder) and never
//! mutated afterwards.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use agent_lifecycle_core::{HookError, State};
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

/// A fallible callback executed during a lifecycle transition.
///
/// Hooks run outside the agent's lock. The token is the caller's; honouring
/// it during long work is the hook's responsibility.
#[async_trait]
pub trait Hook: Send + Sync {
    /// Run the hook.
    ///
    /// # Errors
    ///
    /// Any error moves the agent to `Failed` and is returned to the caller
    /// as the source of a `LifecycleError::HookFailed`.
    async fn run(&self, ctx: &CancellationToken) -> Result<(), HookError>;
}

#[async_trait]
impl<F, Fut> Hook for F
where
    F: Fn(CancellationToken) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), HookError>> + Send + 'static,
{
    async fn run(&self, ctx: &CancellationToken) -> Result<(), HookError> {
        (self)(ctx.clone()).await
    }
}

/// An observer notified after every committed state transition.
///
/// Observers are called while the agent's lock is held, in registration
/// order. They must be fast and must not call back into the agent: doing so
/// deadlocks.
///
/// A panicking observer is caught and logged through the agent's dispatcher,
/// and the remaining observers still run. The process-wide panic hook fires
/// before the panic is caught, so the default hook still prints the message
/// (and any backtrace) to stderr. Install your own with
/// [`std::panic::set_hook`] if the injected dispatcher should be the only
/// sink.
///
/// ```
/// use agent_lifecycle_control::{AgentBuilder, State};
///
/// let default_hook = std::panic::take_hook();
/// std::panic::set_hook(Box::new(|_| {}));
///
/// let agent = AgentBuilder::new("a1", "svc", "1.0.0")
///     .observer(|_: State, _: State| panic!("observer exploded"))
///     .build()
///     .unwrap();
///
/// // Nothing reaches stderr; the transition still commits.
/// agent.set_state(State::Starting).unwrap();
/// assert_eq!(agent.state(), State::Starting);
///
/// std::panic::set_hook(default_hook);
/// ```
pub trait StateChangeHandler: Send + Sync {
    /// Called with the previous and the new state.
    fn on_state_change(&self, from: State, to: State);
}

impl<F> StateChangeHandler for F
where
    F: Fn(State, State) + Send + Sync,
{
    fn on_state_change(&self, from: State, to: State) {
        (self)(from, to);
    }
}

/// The lifecycle points a hook can be attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookPoint {
    /// Runs between `Starting` and `Running`.
    Start,
    /// Runs between `Stopping` and `Stopped`.
    Stop,
    /// Runs after entering `Paused`.
    Pause,
    /// Runs after returning to `Running` from `Paused`.
    Resume,
}

impl HookPoint {
    /// Name used in errors and logs.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Start => "on_start",
            Self::Stop => "on_stop",
            Self::Pause => "on_pause",
            Self::Resume => "on_resume",
        }
    }
}

/// The optional hooks registered for an agent.
#[derive(Clone, Default)]
pub struct HookSet {
    on_start: Option<Arc<dyn Hook>>,
    on_stop: Option<Arc<dyn Hook>>,
    on_pause: Option<Arc<dyn Hook>>,
    on_resume: Option<Arc<dyn Hook>>,
}

impl HookSet {
    /// Register (or replace) the hook for a lifecycle point.
    pub fn set(&mut self, point: HookPoint, hook: Arc<dyn Hook>) {
        let slot = match point {
            HookPoint::Start => &mut self.on_start,
            HookPoint::Stop => &mut self.on_stop,
            HookPoint::Pause => &mut self.on_pause,
            HookPoint::Resume => &mut self.on_resume,
        };
        *slot = Some(hook);
    }

    /// Get the hook for a lifecycle point, if one is registered.
    #[must_use]
    pub fn get(&self, point: HookPoint) -> Option<&Arc<dyn Hook>> {
        match point {
            HookPoint::Start => self.on_start.as_ref(),
            HookPoint::Stop => self.on_stop.as_ref(),
            HookPoint::Pause => self.on_pause.as_ref(),
            HookPoint::Resume => self.on_resume.as_ref(),
        }
    }
}

impl fmt::Debug for HookSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookSet")
            .field("on_start", &self.on_start.is_some())
            .field("on_stop", &self.on_stop.is_some())
            .field("on_pause", &self.on_pause.is_some())
            .field("on_resume", &self.on_resume.is_some())
            .finish()
    }
}

/// An observer that records every transition it sees.
///
/// Clones share the same log, so one clone can be registered with the
/// builder and another kept for inspection.
#[derive(Debug, Clone, Default)]
pub struct TransitionRecorder {
    transitions: Arc<Mutex<Vec<(State, State)>>>,
}

impl TransitionRecorder {
    /// Create an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All recorded transitions, oldest first.
    #[must_use]
    pub fn transitions(&self) -> Vec<(State, State)> {
        self.transitions.lock().clone()
    }

    /// Number of recorded transitions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.transitions.lock().len()
    }

    /// Check if nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.transitions.lock().is_empty()
    }

    /// Forget everything recorded so far.
    pub fn clear(&self) {
        self.transitions.lock().clear();
    }
}

impl StateChangeHandler for TransitionRecorder {
    fn on_state_change(&self, from: State, to: State) {
        self.transitions.lock().push((from, to));
    }
}
