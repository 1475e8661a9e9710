//! Point-in-time agent snapshots.

use std::time::Duration;

use agent_lifecycle_core::{Capability, State};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A snapshot of an agent's identity and lifecycle status.
///
/// Computed fresh on every call to [`Agent::info`](crate::Agent::info); it
/// owns its data and shares nothing with the agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentInfo {
    /// Agent identifier.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Agent version.
    pub version: String,
    /// State at the time of the snapshot.
    pub state: State,
    /// Advertised capabilities.
    pub capabilities: Vec<Capability>,
    /// When the agent last entered `Running` from `Starting`.
    pub started_at: Option<DateTime<Utc>>,
    /// Time since `started_at`; zero unless the agent is running.
    pub uptime: Duration,
}

impl AgentInfo {
    /// Returns true if the snapshot was taken while the agent was running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state == State::Running
    }
}
