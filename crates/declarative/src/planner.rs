//! Planner - the machine-readable plan produced before apply

use crate::diff::{AttributeChange, DiffSummary, diff_attributes};
use crate::error::Result;
use crate::graph::Graph;
use crate::resolver;
use crate::state::{NodeRecord, StateStore};
use crate::types::{Action, NodeId};
use crate::value::substitute_known;
use serde::{Deserialize, Serialize};

/// Planned operation for one node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanEntry {
    pub node: NodeId,
    pub action: Action,
    pub diff: Vec<AttributeChange>,
}

/// Ordered list of planned operations
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub entries: Vec<PlanEntry>,
}

impl Plan {
    pub fn summary(&self) -> DiffSummary {
        DiffSummary::from_entries(&self.entries)
    }

    pub fn has_changes(&self) -> bool {
        self.entries.iter().any(|e| e.action.is_change())
    }

    /// Entries that change something
    pub fn changes(&self) -> impl Iterator<Item = &PlanEntry> {
        self.entries.iter().filter(|e| e.action.is_change())
    }

    pub fn entry(&self, id: &NodeId) -> Option<&PlanEntry> {
        self.entries.iter().find(|e| &e.node == id)
    }

    /// Filter plan to only include entries matching a target pattern
    ///
    /// Target format: "type" or "type.name"
    pub fn filter_by_target(self, target: Option<&str>) -> Self {
        match target {
            None => self,
            Some(t) => {
                let (resource_type, name) = parse_target(t);
                Self {
                    entries: self
                        .entries
                        .into_iter()
                        .filter(|e| {
                            matches_filter(&e.node, resource_type.as_deref(), name.as_deref())
                        })
                        .collect(),
                }
            }
        }
    }
}

/// Plan a reconciliation pass
///
/// Entries follow the resolved apply order. References are substituted with
/// recorded outputs of predecessors that will not change; references to
/// nodes being created or updated stay unresolved ("known after apply").
/// Recorded nodes no longer declared are planned for deletion at the end.
pub fn plan(graph: &Graph, store: &dyn StateStore) -> Result<Plan> {
    let order = resolver::topological_order(graph)?;
    let mut settled: Vec<Option<NodeRecord>> = vec![None; graph.len()];
    let mut entries = Vec::with_capacity(graph.len());

    for idx in order {
        let node = graph.node(idx);
        let recorded = store.get(&node.id)?;

        let desired = substitute_known(&node.attributes, &|r| {
            graph
                .index_of(&r.node)
                .and_then(|i| settled[i].as_ref())
                .and_then(|record| record.lookup(&r.field))
        });

        let action = match &recorded {
            None => Action::Create,
            Some(record) if record.attributes == desired => Action::NoOp,
            Some(_) => Action::Update,
        };
        let diff = diff_attributes(recorded.as_ref().map(|r| &r.attributes), &desired);

        if action == Action::NoOp {
            settled[idx] = recorded;
        }
        entries.push(PlanEntry {
            node: node.id.clone(),
            action,
            diff,
        });
    }

    let orphans = Orphans::load(graph, store)?;
    for idx in orphans.teardown_order() {
        entries.push(deletion(store, orphans.ids[idx].clone())?);
    }

    Ok(Plan { entries })
}

/// Plan a teardown pass: delete every recorded node, dependents first
///
/// Orphaned records (no longer declared) go first since declared nodes can
/// not depend on them.
pub fn plan_teardown(graph: &Graph, store: &dyn StateStore) -> Result<Plan> {
    let mut entries = Vec::new();

    let orphans = Orphans::load(graph, store)?;
    for idx in orphans.teardown_order() {
        entries.push(deletion(store, orphans.ids[idx].clone())?);
    }

    for idx in resolver::teardown_order(graph)? {
        let id = &graph.node(idx).id;
        if store.get(id)?.is_some() {
            entries.push(deletion(store, id.clone())?);
        }
    }

    Ok(Plan { entries })
}

/// Recorded nodes that the graph no longer declares
///
/// Their edges come from the dependencies stored with each record, since
/// the graph knows nothing about them.
#[derive(Debug)]
pub(crate) struct Orphans {
    /// Sorted by address
    pub ids: Vec<NodeId>,
    /// Recorded dependencies of `ids[i]`, declared or not
    pub dependencies: Vec<Vec<NodeId>>,
}

impl Orphans {
    pub fn load(graph: &Graph, store: &dyn StateStore) -> Result<Self> {
        let ids: Vec<NodeId> = store
            .ids()?
            .into_iter()
            .filter(|id| graph.index_of(id).is_none())
            .collect();
        let mut dependencies = Vec::with_capacity(ids.len());
        for id in &ids {
            let recorded = store.get(id)?.map(|r| r.dependencies).unwrap_or_default();
            dependencies.push(recorded);
        }

        let mut orphans = Self { ids, dependencies };
        if let Some(cycle) = resolver::find_cycle(&orphans.adjacency()) {
            // Records written by different runs can disagree
            log::warn!(
                "Recorded dependencies of orphaned nodes form a cycle ({}); ignoring them",
                cycle
                    .iter()
                    .map(|&i| orphans.ids[i].to_string())
                    .collect::<Vec<_>>()
                    .join(" -> ")
            );
            orphans.dependencies.iter_mut().for_each(Vec::clear);
        }
        Ok(orphans)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    fn position(&self, id: &NodeId) -> Option<usize> {
        self.ids.binary_search(id).ok()
    }

    /// Edges among orphans only (orphan → orphan dependencies)
    fn adjacency(&self) -> Vec<Vec<usize>> {
        self.dependencies
            .iter()
            .map(|deps| deps.iter().filter_map(|d| self.position(d)).collect())
            .collect()
    }

    /// `dependents()[i]`: orphans that depended on orphan `i`
    pub fn dependents(&self) -> Vec<Vec<usize>> {
        let mut dependents = vec![Vec::new(); self.len()];
        for (idx, deps) in self.adjacency().into_iter().enumerate() {
            for dep in deps {
                dependents[dep].push(idx);
            }
        }
        dependents
    }

    /// Orphan indices, dependents before the nodes they depended on
    pub fn teardown_order(&self) -> Vec<usize> {
        let mut order = resolver::kahn_order(&self.adjacency());
        order.reverse();
        order
    }
}

fn deletion(store: &dyn StateStore, id: NodeId) -> Result<PlanEntry> {
    let recorded = store.get(&id)?;
    let diff = recorded
        .map(|r| {
            r.attributes
                .into_iter()
                .map(|(attribute, value)| AttributeChange {
                    attribute,
                    before: Some(value),
                    after: None,
                })
                .collect()
        })
        .unwrap_or_default();
    Ok(PlanEntry {
        node: id,
        action: Action::Delete,
        diff,
    })
}

/// Parse a target string like "type.name" into (type, name)
fn parse_target(target: &str) -> (Option<String>, Option<String>) {
    let parts: Vec<&str> = target.split('.').collect();
    match parts.len() {
        1 => (Some(parts[0].to_string()), None),
        2 => (Some(parts[0].to_string()), Some(parts[1].to_string())),
        _ => (None, Some(target.to_string())),
    }
}

/// Check if a node matches the filter criteria
fn matches_filter(id: &NodeId, resource_type: Option<&str>, name: Option<&str>) -> bool {
    if let Some(rt) = resource_type
        && id.resource_type != rt
        && !(name.is_none() && id.name == rt)
    {
        return false;
    }

    if let Some(n) = name
        && id.name != n
    {
        return false;
    }

    true
}
