//! Shared value types for the activation controller.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ControlError;

/// Desired task count written when a service is activated.
pub const RUNNING_TASK_COUNT: i32 = 1;

/// Identifies one orchestrator service inside its cluster.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    pub cluster: String,
    pub service: String,
}

impl ServiceDescriptor {
    pub fn new(cluster: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            cluster: cluster.into(),
            service: service.into(),
        }
    }
}

impl fmt::Display for ServiceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.cluster, self.service)
    }
}

/// Run/stop state as derived from the orchestrator's desired task count.
///
/// A count of zero is `Stopped`; anything above zero is `Running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DesiredState {
    Stopped,
    Running,
}

impl DesiredState {
    pub fn from_count(count: i32) -> Self {
        if count > 0 {
            Self::Running
        } else {
            Self::Stopped
        }
    }

    /// The desired count written to the orchestrator for this state.
    pub fn task_count(self) -> i32 {
        match self {
            Self::Stopped => 0,
            Self::Running => RUNNING_TASK_COUNT,
        }
    }
}

impl fmt::Display for DesiredState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stopped => f.write_str("stopped"),
            Self::Running => f.write_str("running"),
        }
    }
}

/// What a transition request asks the orchestrator to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    /// Converge the desired count onto the given state.
    Target(DesiredState),
    /// Roll a fresh deployment regardless of the current state.
    ForceRedeploy,
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Target(state) => write!(f, "target={state}"),
            Self::ForceRedeploy => f.write_str("force-redeploy"),
        }
    }
}

/// A single transition against one service. Built per invocation, never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRequest {
    pub descriptor: ServiceDescriptor,
    pub transition: Transition,
}

/// Manual bulk commands accepted by the batch controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchCommand {
    Up,
    Down,
    Redeploy,
}

impl BatchCommand {
    pub const ALL: [BatchCommand; 3] = [Self::Up, Self::Down, Self::Redeploy];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
            Self::Redeploy => "redeploy",
        }
    }

    pub fn transition(self) -> Transition {
        match self {
            Self::Up => Transition::Target(DesiredState::Running),
            Self::Down => Transition::Target(DesiredState::Stopped),
            Self::Redeploy => Transition::ForceRedeploy,
        }
    }
}

impl FromStr for BatchCommand {
    type Err = ControlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| {
                ControlError::InvalidArgument(format!(
                    "unknown command '{s}', use: up, down, or redeploy"
                ))
            })
    }
}

impl fmt::Display for BatchCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
