//! # Declarative
//!
//! A provisioning-graph evaluator: declare resources, let references between
//! them define the dependency graph, and converge recorded state to the
//! declared state in a deterministic order.
//!
//! ## Core Concepts
//!
//! - **ResourceDeclaration**: type, name, attribute map and explicit dependencies
//! - **Graph**: validated, acyclic set of nodes; edges come from `depends_on`
//!   and from `${type.name.field}` references in attribute values
//! - **Plan**: per-node action (create/update/noop/delete) with attribute diff
//! - **reconcile**: applies the graph in waves through a [`Provider`],
//!   recording results in a [`StateStore`]
//!
//! ## Example
//!
//! ```ignore
//! use declarative::{
//!     CancellationToken, ExecuteOptions, Graph, MemoryStateStore, NoProgress,
//!     ResourceDeclaration, reconcile,
//! };
//!
//! let mut graph = Graph::build(vec![
//!     ResourceDeclaration::new("storage_account", "s").attribute("sku", "Standard_LRS"),
//!     ResourceDeclaration::new("workspace", "w")
//!         .depends_on("s")
//!         .attribute("storage_account_id", "${storage_account.s.id}"),
//! ])?;
//!
//! let store = MemoryStateStore::new();
//! let report = reconcile(
//!     &mut graph,
//!     &store,
//!     &MyProvider,
//!     &ExecuteOptions::default(),
//!     &mut NoProgress,
//!     &CancellationToken::new(),
//! )?;
//! assert!(report.is_success());
//! ```
//!
//! ## Provider Traits
//!
//! The crate uses traits for dependency injection:
//!
//! - [`Provider`]: Creates, updates, deletes and observes resources
//! - [`StateStore`]: Per-node record storage
//! - [`ProgressCallback`]: Receives progress updates
//!
//! This allows the crate to be used without hard dependencies on a
//! particular cloud API, storage backend or UI.

pub mod context;
pub mod diff;
pub mod error;
pub mod executor;
pub mod graph;
pub mod planner;
pub mod provider;
pub mod resolver;
pub mod state;
pub mod types;
pub mod value;

// Re-export main types at crate root
pub use context::{CancellationToken, NoProgress, ProgressCallback};
pub use diff::{AttributeChange, DiffSummary, diff_attributes, group_by_type};
pub use error::{
    ApplyError, Error, NodeError, Result, StateConflictError, StateError, ValidationError,
};
pub use executor::{ApplyReport, ReportEntry, reconcile, teardown};
pub use graph::{Edge, EdgeKind, Graph, ResourceDeclaration, ResourceNode};
pub use planner::{Plan, PlanEntry, plan, plan_teardown};
pub use provider::{Observed, Provider};
pub use resolver::{levels, resolve, teardown_order, topological_order};
pub use state::{MemoryStateStore, NodeRecord, StateStore};
pub use types::{Action, ExecuteOptions, ExecuteSummary, NodeId, NodeStatus};
pub use value::{Attributes, Reference, Value};
