//! Error types for graph validation and reconciliation

use crate::types::NodeId;
use crate::value::Attributes;
use serde::Serialize;
use thiserror::Error;

/// Fatal problems with a set of declarations; nothing is applied
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidationError {
    /// The dependency edges close a cycle
    #[error("cyclic reference: {}", render_cycle(.cycle))]
    CyclicReference { cycle: Vec<NodeId> },

    /// A dependency or reference names a resource that is not declared
    #[error("{node}: reference to undeclared resource '{target}'")]
    UnresolvedReference { node: NodeId, target: String },

    /// A bare symbolic name matches more than one declared resource
    #[error("{node}: '{target}' is ambiguous (matches {})", render_list(.candidates))]
    AmbiguousReference {
        node: NodeId,
        target: String,
        candidates: Vec<NodeId>,
    },

    /// Two declarations share the same type and name
    #[error("{node}: declared more than once")]
    DuplicateNode { node: NodeId },

    /// A `${...}` expression that is not a whole-value reference
    #[error("{node}: malformed reference '{expression}' in attribute '{attribute}'")]
    MalformedReference {
        node: NodeId,
        attribute: String,
        expression: String,
    },

    /// A declaration with an empty or invalid type or name
    #[error("invalid resource address '{address}'")]
    InvalidAddress { address: String },
}

impl ValidationError {
    /// The node the error is attributed to
    pub fn node(&self) -> Option<&NodeId> {
        match self {
            Self::CyclicReference { cycle } => cycle.first(),
            Self::UnresolvedReference { node, .. }
            | Self::AmbiguousReference { node, .. }
            | Self::DuplicateNode { node }
            | Self::MalformedReference { node, .. } => Some(node),
            Self::InvalidAddress { .. } => None,
        }
    }
}

fn render_cycle(cycle: &[NodeId]) -> String {
    cycle
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" -> ")
}

fn render_list(ids: &[NodeId]) -> String {
    ids.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// A single node's provider call failed
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[error("{node}: {message}")]
pub struct ApplyError {
    pub node: NodeId,
    pub message: String,
}

/// Recorded state and provider-observed state disagree
///
/// Surfaced to the caller for manual reconciliation; never resolved
/// automatically.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[error("{node}: recorded state diverges from provider state")]
pub struct StateConflictError {
    pub node: NodeId,
    pub recorded: Option<Attributes>,
    pub actual: Option<Attributes>,
}

/// A state store backend failure
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StateError {
    /// Reading or writing one node's record failed
    #[error("{node}: state record error: {message}")]
    Record { node: NodeId, message: String },

    /// The store as a whole could not be read
    #[error("state backend error: {message}")]
    Backend { message: String },
}

/// Per-node failure collected into an apply report
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum NodeError {
    #[error(transparent)]
    Apply(#[from] ApplyError),

    #[error(transparent)]
    Conflict(#[from] StateConflictError),

    #[error(transparent)]
    State(#[from] StateError),
}

impl NodeError {
    /// The node the error belongs to
    pub fn node(&self) -> Option<&NodeId> {
        match self {
            Self::Apply(e) => Some(&e.node),
            Self::Conflict(e) => Some(&e.node),
            Self::State(StateError::Record { node, .. }) => Some(node),
            Self::State(StateError::Backend { .. }) => None,
        }
    }

    /// Whether this is a state conflict needing manual attention
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

/// Errors that abort a whole pass
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    State(#[from] StateError),

    /// The worker pool could not be created
    #[error("failed to create apply thread pool: {0}")]
    ThreadPool(String),
}

/// Result type for graph operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_message_lists_path() {
        let err = ValidationError::CyclicReference {
            cycle: vec![
                NodeId::new("a", "x"),
                NodeId::new("b", "y"),
                NodeId::new("a", "x"),
            ],
        };
        assert_eq!(err.to_string(), "cyclic reference: a.x -> b.y -> a.x");
        assert_eq!(err.node(), Some(&NodeId::new("a", "x")));
    }

    #[test]
    fn test_node_error_carries_node() {
        let err: NodeError = ApplyError {
            node: NodeId::new("storage_account", "s"),
            message: "quota exceeded".into(),
        }
        .into();
        assert_eq!(err.node(), Some(&NodeId::new("storage_account", "s")));
        assert_eq!(err.to_string(), "storage_account.s: quota exceeded");
        assert!(!err.is_conflict());
    }
}
