//! Core types for provisioning graph evaluation

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identity of a declared resource: its type plus its symbolic name
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NodeId {
    pub resource_type: String,
    pub name: String,
}

impl NodeId {
    pub fn new(resource_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            name: name.into(),
        }
    }

    /// File-system friendly key, used by file-backed state stores
    pub fn key(&self) -> String {
        format!("{}.{}", self.resource_type, self.name)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.resource_type, self.name)
    }
}

impl FromStr for NodeId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('.') {
            Some((ty, name)) if is_identifier(ty) && is_identifier(name) => {
                Ok(Self::new(ty, name))
            }
            _ => Err(format!("invalid resource address '{s}' (expected type.name)")),
        }
    }
}

impl TryFrom<String> for NodeId {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<NodeId> for String {
    fn from(id: NodeId) -> Self {
        id.to_string()
    }
}

/// Check whether a segment is usable as a resource type or name
pub fn is_identifier(s: &str) -> bool {
    !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Lifecycle status of a node during a reconciliation pass
///
/// `Blocked` and `Cancelled` only ever appear in reports; they are not
/// persisted to the state store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    /// Not yet considered
    Pending,
    /// A change was computed and is about to be applied
    Planned,
    /// Converged to the desired state
    Applied,
    /// The provider call (or state bookkeeping) failed
    Failed,
    /// A dependency failed, so this node was never attempted
    Blocked,
    /// The pass was cancelled before this node started
    Cancelled,
}

impl NodeStatus {
    /// Whether dependents of a node in this status can never run
    pub fn is_dead_end(self) -> bool {
        matches!(self, Self::Failed | Self::Blocked)
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Planned => "planned",
            Self::Applied => "applied",
            Self::Failed => "failed",
            Self::Blocked => "blocked",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Operation needed to converge a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Create,
    Update,
    Delete,
    #[serde(rename = "noop")]
    NoOp,
}

impl Action {
    pub fn is_change(self) -> bool {
        !matches!(self, Self::NoOp)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::NoOp => "noop",
        };
        f.write_str(s)
    }
}

/// Options for a reconciliation pass
#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    /// Number of nodes that may be applied concurrently
    pub jobs: usize,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self { jobs: 4 }
    }
}

/// Counts of outcomes from a reconciliation pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteSummary {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    pub unchanged: usize,
    pub failed: usize,
    pub blocked: usize,
    pub cancelled: usize,
}

impl ExecuteSummary {
    /// Total number of actual changes made
    pub fn total_changes(&self) -> usize {
        self.created + self.updated + self.deleted
    }

    /// Check if execution was fully successful
    pub fn is_success(&self) -> bool {
        self.failed == 0 && self.blocked == 0 && self.cancelled == 0
    }

    /// Total number of nodes accounted for
    pub fn total(&self) -> usize {
        self.total_changes() + self.unchanged + self.failed + self.blocked + self.cancelled
    }

    /// Count one node outcome
    pub fn add(&mut self, status: NodeStatus, action: Option<Action>) {
        match (status, action) {
            (NodeStatus::Applied, Some(Action::Create)) => self.created += 1,
            (NodeStatus::Applied, Some(Action::Update)) => self.updated += 1,
            (NodeStatus::Applied, Some(Action::Delete)) => self.deleted += 1,
            (NodeStatus::Applied, _) => self.unchanged += 1,
            (NodeStatus::Failed, _) => self.failed += 1,
            (NodeStatus::Blocked, _) => self.blocked += 1,
            (NodeStatus::Cancelled | NodeStatus::Pending | NodeStatus::Planned, _) => {
                self.cancelled += 1;
            }
        }
    }
}
