//! Assembly and validation of agents.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use agent_lifecycle_core::{Capability, LifecycleError, Result};
use tracing::Dispatch;

use crate::agent::Agent;
use crate::hooks::{Hook, HookPoint, HookSet, StateChangeHandler};

/// Builder for [`Agent`].
///
/// The builder is the only way to attach hooks and observers; once
/// [`build`](Self::build) returns they are fixed for the agent's lifetime.
///
/// # Example
///
/// ```
/// use agent_lifecycle_control::{AgentBuilder, Capability, State};
///
/// let agent = AgentBuilder::new("a1", "svc", "1.0.0")
///     .capability(Capability::new("echo", "1.0.0"))
///     .observer(|from: State, to: State| println!("{from} -> {to}"))
///     .build()
///     .unwrap();
///
/// assert_eq!(agent.state(), State::Unknown);
/// ```
#[derive(Default)]
pub struct AgentBuilder {
    id: String,
    name: String,
    version: String,
    capabilities: Vec<Capability>,
    hooks: HookSet,
    observers: Vec<Arc<dyn StateChangeHandler>>,
    dispatch: Option<Dispatch>,
}

impl AgentBuilder {
    /// Start building an agent with the given identity.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            version: version.into(),
            ..Self::default()
        }
    }

    /// Advertise a capability.
    #[must_use]
    pub fn capability(mut self, capability: Capability) -> Self {
        self.capabilities.push(capability);
        self
    }

    /// Advertise several capabilities. Borrowed inputs are copied.
    #[must_use]
    pub fn capabilities<'a>(mut self, capabilities: impl IntoIterator<Item = &'a Capability>) -> Self {
        self.capabilities.extend(capabilities.into_iter().cloned());
        self
    }

    /// Hook run while `Starting`.
    #[must_use]
    pub fn on_start(self, hook: impl Hook + 'static) -> Self {
        self.hook(HookPoint::Start, Arc::new(hook))
    }

    /// Hook run while `Stopping`.
    #[must_use]
    pub fn on_stop(self, hook: impl Hook + 'static) -> Self {
        self.hook(HookPoint::Stop, Arc::new(hook))
    }

    /// Hook run after entering `Paused`.
    #[must_use]
    pub fn on_pause(self, hook: impl Hook + 'static) -> Self {
        self.hook(HookPoint::Pause, Arc::new(hook))
    }

    /// Hook run after resuming to `Running`.
    #[must_use]
    pub fn on_resume(self, hook: impl Hook + 'static) -> Self {
        self.hook(HookPoint::Resume, Arc::new(hook))
    }

    /// Register a shared hook for a lifecycle point.
    #[must_use]
    pub fn hook(mut self, point: HookPoint, hook: Arc<dyn Hook>) -> Self {
        self.hooks.set(point, hook);
        self
    }

    /// Register a state change observer. Observers are notified in
    /// registration order.
    #[must_use]
    pub fn observer(mut self, observer: impl StateChangeHandler + 'static) -> Self {
        self.observers.push(Arc::new(observer));
        self
    }

    /// Register a list of shared observers. The list itself is copied.
    #[must_use]
    pub fn observers(mut self, observers: &[Arc<dyn StateChangeHandler>]) -> Self {
        self.observers.extend(observers.iter().cloned());
        self
    }

    /// Dispatcher that receives the agent's logs and spans.
    ///
    /// Defaults to whichever dispatcher is current when [`build`](Self::build)
    /// is called.
    #[must_use]
    pub fn dispatch(mut self, dispatch: Dispatch) -> Self {
        self.dispatch = Some(dispatch);
        self
    }

    /// Validate the configuration and build the agent in `State::Unknown`.
    ///
    /// # Errors
    ///
    /// - `LifecycleError::MissingField` if the id, name or version is empty.
    /// - `LifecycleError::InvalidField` if two capabilities share a name.
    pub fn build(self) -> Result<Agent> {
        require("id", &self.id)?;
        require("name", &self.name)?;
        require("version", &self.version)?;

        let mut seen = HashSet::new();
        for capability in &self.capabilities {
            if !seen.insert(capability.name.as_str()) {
                return Err(LifecycleError::InvalidField {
                    field: "capabilities",
                    reason: format!("duplicate capability {}", capability.name),
                });
            }
        }

        let dispatch = self
            .dispatch
            .unwrap_or_else(|| tracing::dispatcher::get_default(Dispatch::clone));

        tracing::dispatcher::with_default(&dispatch, || {
            tracing::debug!(
                agent_id = %self.id,
                name = %self.name,
                version = %self.version,
                capabilities = self.capabilities.len(),
                observers = self.observers.len(),
                "Built agent"
            );
        });

        Ok(Agent::new(
            self.id,
            self.name,
            self.version,
            self.capabilities,
            self.hooks,
            self.observers,
            dispatch,
        ))
    }
}

impl fmt::Debug for AgentBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentBuilder")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("version", &self.version)
            .field("capabilities", &self.capabilities)
            .field("hooks", &self.hooks)
            .field("observers", &self.observers.len())
            .finish_non_exhaustive()
    }
}

fn require(field: &'static str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(LifecycleError::MissingField { field });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use agent_lifecycle_core::{ErrorKind, MetadataValue, State};

    use super::*;
    use crate::hooks::TransitionRecorder;

    #[test]
    fn build_minimal() {
        let agent = AgentBuilder::new("a1", "svc", "1.0.0").build().unwrap();
        assert_eq!(agent.id(), "a1");
        assert_eq!(agent.name(), "svc");
        assert_eq!(agent.version(), "1.0.0");
        assert_eq!(agent.state(), State::Unknown);
        assert!(agent.capabilities().is_empty());
    }

    #[test]
    fn missing_identity_fields() {
        let cases = [
            (AgentBuilder::new("", "svc", "1.0.0"), "id"),
            (AgentBuilder::new("a1", "  ", "1.0.0"), "name"),
            (AgentBuilder::new("a1", "svc", ""), "version"),
        ];

        for (builder, expected) in cases {
            let err = builder.build().unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Validation);
            assert!(
                matches!(err, LifecycleError::MissingField { field } if field == expected),
                "expected missing {expected}"
            );
        }
    }

    #[test]
    fn duplicate_capabilities_rejected() {
        let err = AgentBuilder::new("a1", "svc", "1.0.0")
            .capability(Capability::new("echo", "1.0.0"))
            .capability(Capability::new("echo", "2.0.0"))
            .build()
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(err.to_string().contains("duplicate capability echo"));
    }

    #[test]
    fn borrowed_capabilities_are_copied() {
        let mut caps = vec![Capability::new("echo", "1.0.0").with_metadata("tier", "gold")];

        let agent = AgentBuilder::new("a1", "svc", "1.0.0")
            .capabilities(&caps)
            .build()
            .unwrap();

        caps[0].metadata.insert("tier".to_string(), "bronze".into());
        caps[0].name = "renamed".to_string();

        let stored = agent.capability("echo").unwrap();
        assert_eq!(
            stored.metadata_value("tier").and_then(MetadataValue::as_str),
            Some("gold")
        );
        assert!(!agent.has_capability("renamed"));
    }

    #[test]
    fn observer_list_is_copied() {
        let recorder = TransitionRecorder::new();
        let mut shared: Vec<Arc<dyn StateChangeHandler>> = vec![Arc::new(recorder.clone())];

        let agent = AgentBuilder::new("a1", "svc", "1.0.0")
            .observers(&shared)
            .build()
            .unwrap();

        // Growing the caller's list afterwards has no effect on the agent.
        shared.push(Arc::new(|_: State, _: State| panic!("not registered")));

        agent.set_state(State::Starting).unwrap();
        assert_eq!(recorder.len(), 1);
    }
}
