//! Reconciliation driver - applies a graph wave by wave
//!
//! Each node moves `Pending → Planned → Applied | Failed`. A wave is every
//! pending node whose dependencies are all `Applied`; a wave runs on a rayon
//! pool, so independent branches converge concurrently while nodes joined by
//! an edge serialize. A failed node blocks its dependents and nothing else:
//! unrelated branches keep going and every failure lands in one report.

use crate::context::{CancellationToken, ProgressCallback};
use crate::error::{ApplyError, Error, NodeError, Result, StateConflictError};
use crate::graph::Graph;
use crate::planner::Orphans;
use crate::provider::{Observed, Provider};
use crate::resolver;
use crate::state::{NodeRecord, StateStore};
use crate::types::{Action, ExecuteOptions, ExecuteSummary, NodeId, NodeStatus};
use crate::value::{Attributes, substitute};
use rayon::prelude::*;
use serde::Serialize;

/// Final outcome of one node
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportEntry {
    pub node: NodeId,
    pub status: NodeStatus,
    /// What was (or would have been) done; `None` if never attempted
    pub action: Option<Action>,
    pub error: Option<NodeError>,
}

/// Result of a reconciliation or teardown pass
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ApplyReport {
    /// One entry per node, in processing order
    pub entries: Vec<ReportEntry>,
    /// Every per-node error, in processing order
    pub failures: Vec<NodeError>,
    /// Whether the pass stopped early on cancellation
    pub cancelled: bool,
}

impl ApplyReport {
    fn from_entries(entries: Vec<ReportEntry>, cancelled: bool) -> Self {
        let failures = entries.iter().filter_map(|e| e.error.clone()).collect();
        Self {
            entries,
            failures,
            cancelled,
        }
    }

    pub fn summary(&self) -> ExecuteSummary {
        let mut summary = ExecuteSummary::default();
        for entry in &self.entries {
            summary.add(entry.status, entry.action);
        }
        summary
    }

    /// Check if every node converged
    pub fn is_success(&self) -> bool {
        self.entries.iter().all(|e| e.status == NodeStatus::Applied)
    }

    pub fn entry(&self, id: &NodeId) -> Option<&ReportEntry> {
        self.entries.iter().find(|e| &e.node == id)
    }

    pub fn status(&self, id: &NodeId) -> Option<NodeStatus> {
        self.entry(id).map(|e| e.status)
    }

    /// State conflicts that need manual reconciliation
    pub fn conflicts(&self) -> impl Iterator<Item = &StateConflictError> {
        self.failures.iter().filter_map(|f| match f {
            NodeError::Conflict(c) => Some(c),
            _ => None,
        })
    }
}

#[derive(Debug, Clone)]
struct Outcome {
    status: NodeStatus,
    action: Option<Action>,
    record: Option<NodeRecord>,
    error: Option<NodeError>,
}

impl Outcome {
    fn applied(action: Action, record: Option<NodeRecord>) -> Self {
        Self {
            status: NodeStatus::Applied,
            action: Some(action),
            record,
            error: None,
        }
    }

    fn failed(action: Option<Action>, error: NodeError) -> Self {
        Self {
            status: NodeStatus::Failed,
            action,
            record: None,
            error: Some(error),
        }
    }

    fn blocked() -> Self {
        Self {
            status: NodeStatus::Blocked,
            action: None,
            record: None,
            error: None,
        }
    }

    fn cancelled() -> Self {
        Self {
            status: NodeStatus::Cancelled,
            action: None,
            record: None,
            error: None,
        }
    }

    fn entry(&self, node: NodeId) -> ReportEntry {
        ReportEntry {
            node,
            status: self.status,
            action: self.action,
            error: self.error.clone(),
        }
    }
}

/// Reconcile every node of the graph against the state store
///
/// Recorded nodes that are no longer declared are deleted after the graph
/// pass. Validation errors abort before anything is applied; per-node
/// errors are collected in the returned report.
pub fn reconcile<P: ProgressCallback>(
    graph: &mut Graph,
    store: &dyn StateStore,
    provider: &dyn Provider,
    opts: &ExecuteOptions,
    progress: &mut P,
    cancel: &CancellationToken,
) -> Result<ApplyReport> {
    let order = resolver::topological_order(graph)?;
    let orphans = Orphans::load(graph, store)?;
    log::info!(
        "Reconciling {} nodes ({} orphaned records)",
        graph.len(),
        orphans.len()
    );

    let outcomes = {
        let graph: &Graph = graph;
        let ids = node_ids(graph);
        let prerequisites = graph.adjacency();
        run_waves(
            &ids,
            &order,
            &prerequisites,
            opts,
            progress,
            cancel,
            |idx, records| prepare_apply(graph, idx, records, store, provider),
            |idx, planned| execute_apply(&ids[idx], planned, store, provider),
        )?
    };

    let mut entries = record_outcomes(graph, &order, outcomes, true);

    if !orphans.is_empty() {
        let order = orphans.teardown_order();
        let outcomes = run_waves(
            &orphans.ids,
            &order,
            &orphans.dependents(),
            opts,
            progress,
            cancel,
            |idx, _| prepare_delete(&orphans.ids[idx], store),
            |idx, record| execute_delete(&orphans.ids[idx], &record, store, provider),
        )?;
        entries.extend(order.iter().map(|&i| outcomes[i].entry(orphans.ids[i].clone())));
    }

    Ok(ApplyReport::from_entries(entries, cancel.is_cancelled()))
}

/// Delete every recorded node, dependents before dependencies
///
/// Orphaned records and declared nodes share one schedule: an orphan that
/// depended on a declared node is deleted first. A node whose dependent
/// failed to delete is `Blocked` and kept.
pub fn teardown<P: ProgressCallback>(
    graph: &mut Graph,
    store: &dyn StateStore,
    provider: &dyn Provider,
    opts: &ExecuteOptions,
    progress: &mut P,
    cancel: &CancellationToken,
) -> Result<ApplyReport> {
    let declared_order = resolver::teardown_order(graph)?;
    let orphans = Orphans::load(graph, store)?;
    log::info!("Tearing down {} nodes", graph.len() + orphans.len());

    // Orphans take indices 0..k, declared node i takes k + i
    let k = orphans.len();
    let mut ids = orphans.ids.clone();
    ids.extend(node_ids(graph));

    let mut prerequisites = orphans.dependents();
    for i in 0..graph.len() {
        prerequisites.push(graph.dependents(i).iter().map(|&d| k + d).collect());
    }
    for (orphan, deps) in orphans.dependencies.iter().enumerate() {
        for dep in deps {
            if let Some(i) = graph.index_of(dep) {
                prerequisites[k + i].push(orphan);
            }
        }
    }

    let mut order = orphans.teardown_order();
    let orphan_order = order.clone();
    order.extend(declared_order.iter().map(|&i| k + i));

    let mut outcomes = run_waves(
        &ids,
        &order,
        &prerequisites,
        opts,
        progress,
        cancel,
        |idx, _| prepare_delete(&ids[idx], store),
        |idx, record| execute_delete(&ids[idx], &record, store, provider),
    )?;
    let declared = outcomes.split_off(k);

    let mut entries: Vec<ReportEntry> = orphan_order
        .iter()
        .map(|&i| outcomes[i].entry(ids[i].clone()))
        .collect();
    entries.extend(record_outcomes(graph, &declared_order, declared, false));
    Ok(ApplyReport::from_entries(entries, cancel.is_cancelled()))
}

fn node_ids(graph: &Graph) -> Vec<NodeId> {
    graph.nodes().iter().map(|n| n.id.clone()).collect()
}

/// First half of a node's work
enum Prepared<T> {
    /// Settled without a provider call
    Done(Outcome),
    /// Needs a provider call with this input
    Planned(Action, T),
}

/// Schedule nodes in waves; `prerequisites[i]` must all be `Applied` before
/// node `i` may start. `order` must list prerequisites before the nodes
/// that need them.
///
/// Each wave runs `prepare` for every ready node in parallel, reports the
/// planned ones, then runs `execute` for those in parallel.
#[allow(clippy::too_many_arguments)]
fn run_waves<P, T, Prep, Exec>(
    ids: &[NodeId],
    order: &[usize],
    prerequisites: &[Vec<usize>],
    opts: &ExecuteOptions,
    progress: &mut P,
    cancel: &CancellationToken,
    prepare: Prep,
    execute: Exec,
) -> Result<Vec<Outcome>>
where
    P: ProgressCallback,
    T: Send,
    Prep: Fn(usize, &[Option<NodeRecord>]) -> Prepared<T> + Sync,
    Exec: Fn(usize, T) -> Outcome + Sync,
{
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(opts.jobs.max(1))
        .build()
        .map_err(|e| Error::ThreadPool(e.to_string()))?;

    let mut outcomes: Vec<Option<Outcome>> = vec![None; ids.len()];
    let mut records: Vec<Option<NodeRecord>> = vec![None; ids.len()];

    loop {
        // Order lists prerequisites first, so one pass blocks transitively
        for &idx in order {
            let dead_end = prerequisites[idx]
                .iter()
                .any(|&p| outcomes[p].as_ref().is_some_and(|o| o.status.is_dead_end()));
            if outcomes[idx].is_none() && dead_end {
                let outcome = Outcome::blocked();
                log::debug!("{}: pending -> blocked", ids[idx]);
                progress.on_node_complete(&outcome.entry(ids[idx].clone()));
                outcomes[idx] = Some(outcome);
            }
        }

        let ready: Vec<usize> = order
            .iter()
            .copied()
            .filter(|&idx| {
                outcomes[idx].is_none()
                    && prerequisites[idx].iter().all(|&p| {
                        outcomes[p]
                            .as_ref()
                            .is_some_and(|o| o.status == NodeStatus::Applied)
                    })
            })
            .collect();

        if ready.is_empty() {
            break;
        }
        if cancel.is_cancelled() {
            log::warn!("Cancelled; {} ready nodes not started", ready.len());
            break;
        }

        let wave: Vec<NodeId> = ready.iter().map(|&i| ids[i].clone()).collect();
        progress.on_wave_start(&wave);

        let prepared: Vec<Prepared<T>> = pool.install(|| {
            ready
                .par_iter()
                .map(|&idx| {
                    if cancel.is_cancelled() {
                        return Prepared::Done(Outcome::cancelled());
                    }
                    prepare(idx, &records[..])
                })
                .collect()
        });

        let mut results: Vec<Option<Outcome>> = Vec::with_capacity(ready.len());
        let mut planned = Vec::new();
        for (pos, (&idx, step)) in ready.iter().zip(prepared).enumerate() {
            match step {
                Prepared::Done(outcome) => results.push(Some(outcome)),
                Prepared::Planned(action, input) => {
                    log::debug!("{}: pending -> planned ({action})", ids[idx]);
                    progress.on_node_planned(&ids[idx], action);
                    planned.push((pos, idx, input));
                    results.push(None);
                }
            }
        }

        let executed: Vec<(usize, Outcome)> = pool.install(|| {
            planned
                .into_par_iter()
                .map(|(pos, idx, input)| (pos, execute(idx, input)))
                .collect()
        });
        for (pos, outcome) in executed {
            results[pos] = Some(outcome);
        }

        for (&idx, outcome) in ready.iter().zip(results) {
            let outcome = outcome.unwrap_or_else(Outcome::cancelled);
            if let Some(record) = &outcome.record {
                records[idx] = Some(record.clone());
            }
            progress.on_node_complete(&outcome.entry(ids[idx].clone()));
            outcomes[idx] = Some(outcome);
        }
        progress.on_wave_complete();
    }

    Ok(outcomes
        .into_iter()
        .enumerate()
        .map(|(idx, outcome)| {
            outcome.unwrap_or_else(|| {
                log::debug!("{}: pending -> cancelled", ids[idx]);
                Outcome::cancelled()
            })
        })
        .collect())
}

/// Write statuses and outputs back to the graph and build report entries
fn record_outcomes(
    graph: &mut Graph,
    order: &[usize],
    outcomes: Vec<Outcome>,
    keep_outputs: bool,
) -> Vec<ReportEntry> {
    let mut entries = Vec::with_capacity(order.len());
    for &idx in order {
        let outcome = &outcomes[idx];
        let node = graph.node_mut(idx);
        node.status = outcome.status;
        if keep_outputs {
            if let Some(record) = &outcome.record {
                node.outputs = Some(record.outputs.clone());
            }
        } else if outcome.status == NodeStatus::Applied {
            node.outputs = None;
        }
        entries.push(outcome.entry(node.id.clone()));
    }
    entries
}

/// A create or update waiting for its provider call
struct PlannedApply {
    desired: Attributes,
    prior: Option<NodeRecord>,
    dependencies: Vec<NodeId>,
}

impl PlannedApply {
    fn action(&self) -> Action {
        if self.prior.is_some() {
            Action::Update
        } else {
            Action::Create
        }
    }
}

/// Resolve references, check for drift and decide what a node needs
fn prepare_apply(
    graph: &Graph,
    idx: usize,
    records: &[Option<NodeRecord>],
    store: &dyn StateStore,
    provider: &dyn Provider,
) -> Prepared<PlannedApply> {
    let node = graph.node(idx);
    let id = &node.id;

    let desired = match substitute(&node.attributes, &|r| {
        graph
            .index_of(&r.node)
            .and_then(|i| records[i].as_ref())
            .and_then(|record| record.lookup(&r.field))
    }) {
        Ok(desired) => desired,
        Err(missing) => {
            return Prepared::Done(Outcome::failed(
                None,
                ApplyError {
                    node: id.clone(),
                    message: missing.to_string(),
                }
                .into(),
            ));
        }
    };
    let dependencies: Vec<NodeId> = node
        .dependencies
        .iter()
        .map(|&d| graph.node(d).id.clone())
        .collect();

    let prior = match store.get(id) {
        Ok(prior) => prior,
        Err(e) => return Prepared::Done(Outcome::failed(None, e.into())),
    };

    match provider.read(id) {
        Ok(observed) => {
            if let Some(conflict) = detect_conflict(id, prior.as_ref(), observed) {
                log::warn!("{id}: recorded state diverges from provider state");
                return Prepared::Done(Outcome::failed(None, conflict.into()));
            }
        }
        Err(e) => {
            return Prepared::Done(Outcome::failed(
                None,
                ApplyError {
                    node: id.clone(),
                    message: format!("failed to read actual state: {e:#}"),
                }
                .into(),
            ));
        }
    }

    match prior {
        Some(record) if record.attributes == desired => {
            Prepared::Done(settle_unchanged(id, record, dependencies, store))
        }
        prior => {
            let planned = PlannedApply {
                desired,
                prior,
                dependencies,
            };
            Prepared::Planned(planned.action(), planned)
        }
    }
}

/// Unchanged attributes: no provider call, only refresh recorded edges
fn settle_unchanged(
    id: &NodeId,
    record: NodeRecord,
    dependencies: Vec<NodeId>,
    store: &dyn StateStore,
) -> Outcome {
    if record.dependencies == dependencies {
        log::debug!("{id}: pending -> applied (no changes)");
        return Outcome::applied(Action::NoOp, Some(record));
    }

    let record = record.with_dependencies(dependencies);
    if let Err(e) = store.put(id, record.clone()) {
        return Outcome::failed(Some(Action::NoOp), e.into());
    }
    log::debug!("{id}: pending -> applied (recorded dependencies refreshed)");
    Outcome::applied(Action::NoOp, Some(record))
}

/// Run the provider call of a planned node and record the result
fn execute_apply(
    id: &NodeId,
    planned: PlannedApply,
    store: &dyn StateStore,
    provider: &dyn Provider,
) -> Outcome {
    let action = planned.action();
    let result = match &planned.prior {
        None => provider.create(id, &planned.desired),
        Some(prior) => provider.update(id, &planned.desired, prior),
    };

    match result {
        Ok(outputs) => {
            let record =
                NodeRecord::new(planned.desired, outputs).with_dependencies(planned.dependencies);
            if let Err(e) = store.put(id, record.clone()) {
                log::warn!("{id}: applied but state write failed: {e}");
                return Outcome::failed(Some(action), e.into());
            }
            log::info!("{id}: planned -> applied ({action})");
            Outcome::applied(action, Some(record))
        }
        Err(e) => {
            log::warn!("{id}: planned -> failed: {e:#}");
            Outcome::failed(
                Some(action),
                ApplyError {
                    node: id.clone(),
                    message: format!("{e:#}"),
                }
                .into(),
            )
        }
    }
}

/// Compare the recorded state with what the provider observes
fn detect_conflict(
    id: &NodeId,
    recorded: Option<&NodeRecord>,
    observed: Observed,
) -> Option<StateConflictError> {
    let conflict = |actual| StateConflictError {
        node: id.clone(),
        recorded: recorded.map(|r| r.attributes.clone()),
        actual,
    };
    match (recorded, observed) {
        (_, Observed::Unknown) | (None, Observed::Absent) => None,
        (Some(record), Observed::Present(actual)) if record.attributes == actual => None,
        (_, Observed::Present(actual)) => Some(conflict(Some(actual))),
        (Some(_), Observed::Absent) => Some(conflict(None)),
    }
}

/// Look up the record to delete; nothing recorded means nothing to do
fn prepare_delete(id: &NodeId, store: &dyn StateStore) -> Prepared<NodeRecord> {
    match store.get(id) {
        Ok(Some(record)) => Prepared::Planned(Action::Delete, record),
        Ok(None) => Prepared::Done(Outcome::applied(Action::NoOp, None)),
        Err(e) => Prepared::Done(Outcome::failed(None, e.into())),
    }
}

/// Delete one node's resource and forget its record
fn execute_delete(
    id: &NodeId,
    record: &NodeRecord,
    store: &dyn StateStore,
    provider: &dyn Provider,
) -> Outcome {
    if let Err(e) = provider.delete(id, record) {
        log::warn!("{id}: delete failed: {e:#}");
        return Outcome::failed(
            Some(Action::Delete),
            ApplyError {
                node: id.clone(),
                message: format!("{e:#}"),
            }
            .into(),
        );
    }

    if let Err(e) = store.remove(id) {
        return Outcome::failed(Some(Action::Delete), e.into());
    }
    log::info!("{id}: deleted");
    Outcome::applied(Action::Delete, None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::NoProgress;
    use crate::error::StateError;
    use crate::graph::ResourceDeclaration;
    use crate::state::MemoryStateStore;
    use crate::value::{Attributes, Value};
    use anyhow::bail;
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;

    /// Mock provider for tests
    #[derive(Default)]
    struct MockProvider {
        fail: HashSet<String>,
        observed: HashMap<String, Observed>,
        calls: Mutex<Vec<String>>,
        received: Mutex<HashMap<String, Attributes>>,
    }

    impl MockProvider {
        fn failing(names: &[&str]) -> Self {
            Self {
                fail: names.iter().map(ToString::to_string).collect(),
                ..Self::default()
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn called(&self, id: &NodeId, op: &str) {
            self.calls.lock().unwrap().push(format!("{op} {id}"));
        }
    }

    impl Provider for MockProvider {
        fn create(&self, id: &NodeId, attributes: &Attributes) -> anyhow::Result<Attributes> {
            self.called(id, "create");
            self.received
                .lock()
                .unwrap()
                .insert(id.to_string(), attributes.clone());
            if self.fail.contains(&id.name) {
                bail!("provider rejected {id}");
            }
            let mut outputs = Attributes::new();
            outputs.insert(
                "id".into(),
                Value::from(format!("/{}/{}", id.resource_type, id.name)),
            );
            outputs.insert("principal_id".into(), Value::from(format!("pid-{}", id.name)));
            Ok(outputs)
        }

        fn update(
            &self,
            id: &NodeId,
            attributes: &Attributes,
            prior: &NodeRecord,
        ) -> anyhow::Result<Attributes> {
            self.called(id, "update");
            self.received
                .lock()
                .unwrap()
                .insert(id.to_string(), attributes.clone());
            if self.fail.contains(&id.name) {
                bail!("provider rejected {id}");
            }
            Ok(prior.outputs.clone())
        }

        fn delete(&self, id: &NodeId, _record: &NodeRecord) -> anyhow::Result<()> {
            self.called(id, "delete");
            if self.fail.contains(&id.name) {
                bail!("provider refused to delete {id}");
            }
            Ok(())
        }

        fn read(&self, id: &NodeId) -> anyhow::Result<Observed> {
            Ok(self
                .observed
                .get(&id.name)
                .cloned()
                .unwrap_or(Observed::Unknown))
        }
    }

    /// Store whose writes always fail
    struct ReadOnlyStore;

    impl StateStore for ReadOnlyStore {
        fn get(&self, _id: &NodeId) -> std::result::Result<Option<NodeRecord>, StateError> {
            Ok(None)
        }

        fn put(&self, id: &NodeId, _record: NodeRecord) -> std::result::Result<(), StateError> {
            Err(StateError::Record {
                node: id.clone(),
                message: "read-only".into(),
            })
        }

        fn remove(&self, _id: &NodeId) -> std::result::Result<(), StateError> {
            Ok(())
        }

        fn ids(&self) -> std::result::Result<Vec<NodeId>, StateError> {
            Ok(Vec::new())
        }
    }

    /// Progress callback that remembers planned nodes
    #[derive(Default)]
    struct PlannedLog(Vec<(String, Action)>);

    impl ProgressCallback for PlannedLog {
        fn on_wave_start(&mut self, _nodes: &[NodeId]) {}

        fn on_node_planned(&mut self, node: &NodeId, action: Action) {
            self.0.push((node.to_string(), action));
        }

        fn on_node_complete(&mut self, _entry: &ReportEntry) {}
    }

    /// Progress callback that cancels after the first wave
    struct CancelAfterFirstWave {
        token: CancellationToken,
        waves: usize,
    }

    impl ProgressCallback for CancelAfterFirstWave {
        fn on_wave_start(&mut self, _nodes: &[NodeId]) {
            self.waves += 1;
        }

        fn on_node_complete(&mut self, _entry: &ReportEntry) {}

        fn on_wave_complete(&mut self) {
            self.token.cancel();
        }
    }

    fn storage_and_workspace() -> Graph {
        Graph::build(vec![
            ResourceDeclaration::new("storage_account", "s").attribute("sku", "Standard_LRS"),
            ResourceDeclaration::new("workspace", "w")
                .depends_on("s")
                .attribute("storage_account_id", "${s.id}"),
        ])
        .unwrap()
    }

    fn run(graph: &mut Graph, store: &dyn StateStore, provider: &dyn Provider) -> ApplyReport {
        reconcile(
            graph,
            store,
            provider,
            &ExecuteOptions::default(),
            &mut NoProgress,
            &CancellationToken::new(),
        )
        .unwrap()
    }

    fn id(ty: &str, name: &str) -> NodeId {
        NodeId::new(ty, name)
    }

    #[test]
    fn test_applies_in_order_and_resolves_outputs() {
        let mut graph = storage_and_workspace();
        let store = MemoryStateStore::new();
        let provider = MockProvider::default();

        let report = run(&mut graph, &store, &provider);

        assert!(report.is_success());
        assert_eq!(
            provider.calls(),
            vec!["create storage_account.s", "create workspace.w"]
        );
        let received = provider.received.lock().unwrap();
        assert_eq!(
            received["workspace.w"]["storage_account_id"],
            Value::from("/storage_account/s")
        );
        assert_eq!(report.summary().created, 2);
        assert_eq!(
            graph.get(&id("workspace", "w")).unwrap().status,
            NodeStatus::Applied
        );
        assert!(store.get(&id("workspace", "w")).unwrap().is_some());
    }

    #[test]
    fn test_failed_dependency_blocks_dependent() {
        let mut graph = storage_and_workspace();
        let store = MemoryStateStore::new();
        let provider = MockProvider::failing(&["s"]);

        let report = run(&mut graph, &store, &provider);

        assert_eq!(report.status(&id("storage_account", "s")), Some(NodeStatus::Failed));
        assert_eq!(report.status(&id("workspace", "w")), Some(NodeStatus::Blocked));
        assert_eq!(provider.calls(), vec!["create storage_account.s"]);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(
            report.failures[0].node(),
            Some(&id("storage_account", "s"))
        );
        let summary = report.summary();
        assert_eq!((summary.failed, summary.blocked), (1, 1));
    }

    #[test]
    fn test_independent_branches_converge_despite_failure() {
        let mut graph = Graph::build(vec![
            ResourceDeclaration::new("r", "x"),
            ResourceDeclaration::new("r", "y").depends_on("x"),
            ResourceDeclaration::new("r", "z"),
        ])
        .unwrap();
        let store = MemoryStateStore::new();
        let provider = MockProvider::failing(&["y"]);

        let report = run(&mut graph, &store, &provider);

        assert_eq!(report.status(&id("r", "x")), Some(NodeStatus::Applied));
        assert_eq!(report.status(&id("r", "y")), Some(NodeStatus::Failed));
        assert_eq!(report.status(&id("r", "z")), Some(NodeStatus::Applied));
        assert!(!report.is_success());
        assert!(!report.cancelled);
    }

    #[test]
    fn test_transitive_dependents_are_blocked() {
        let mut graph = Graph::build(vec![
            ResourceDeclaration::new("r", "a"),
            ResourceDeclaration::new("r", "b").depends_on("a"),
            ResourceDeclaration::new("r", "c").attribute("b_id", "${r.b.id}"),
        ])
        .unwrap();
        let provider = MockProvider::failing(&["a"]);

        let report = run(&mut graph, &MemoryStateStore::new(), &provider);

        assert_eq!(report.status(&id("r", "b")), Some(NodeStatus::Blocked));
        assert_eq!(report.status(&id("r", "c")), Some(NodeStatus::Blocked));
        assert_eq!(provider.calls().len(), 1);
    }

    #[test]
    fn test_second_run_is_noop() {
        let mut graph = storage_and_workspace();
        let store = MemoryStateStore::new();
        run(&mut graph, &store, &MockProvider::default());

        let provider = MockProvider::default();
        let report = run(&mut graph, &store, &provider);

        assert!(provider.calls().is_empty());
        assert_eq!(report.summary().unchanged, 2);
        assert!(report.is_success());
    }

    #[test]
    fn test_changed_attribute_updates() {
        let store = MemoryStateStore::new();
        run(&mut storage_and_workspace(), &store, &MockProvider::default());

        let mut graph = Graph::build(vec![
            ResourceDeclaration::new("storage_account", "s").attribute("sku", "Premium_LRS"),
            ResourceDeclaration::new("workspace", "w")
                .depends_on("s")
                .attribute("storage_account_id", "${s.id}"),
        ])
        .unwrap();
        let provider = MockProvider::default();
        let report = run(&mut graph, &store, &provider);

        // outputs carried over by update, so the workspace is untouched
        assert_eq!(provider.calls(), vec!["update storage_account.s"]);
        assert_eq!(report.entries[0].action, Some(Action::Update));
        assert_eq!(report.entries[1].action, Some(Action::NoOp));
        let recorded = store.get(&id("storage_account", "s")).unwrap().unwrap();
        assert_eq!(recorded.attributes["sku"], Value::from("Premium_LRS"));
    }

    #[test]
    fn test_state_conflict_is_reported_not_resolved() {
        let store = MemoryStateStore::new();
        run(&mut storage_and_workspace(), &store, &MockProvider::default());
        let before = store.get(&id("storage_account", "s")).unwrap();

        let mut drifted = Attributes::new();
        drifted.insert("sku".into(), Value::from("Standard_GRS"));
        let provider = MockProvider {
            observed: HashMap::from([("s".to_string(), Observed::Present(drifted))]),
            ..MockProvider::default()
        };
        let report = run(&mut storage_and_workspace(), &store, &provider);

        assert_eq!(report.status(&id("storage_account", "s")), Some(NodeStatus::Failed));
        assert_eq!(report.status(&id("workspace", "w")), Some(NodeStatus::Blocked));
        assert_eq!(report.conflicts().count(), 1);
        assert!(provider.calls().is_empty());
        assert_eq!(store.get(&id("storage_account", "s")).unwrap(), before);
    }

    #[test]
    fn test_resource_deleted_out_of_band_is_a_conflict() {
        let store = MemoryStateStore::new();
        run(&mut storage_and_workspace(), &store, &MockProvider::default());

        let provider = MockProvider {
            observed: HashMap::from([("w".to_string(), Observed::Absent)]),
            ..MockProvider::default()
        };
        let report = run(&mut storage_and_workspace(), &store, &provider);
        let conflict = report.conflicts().next().unwrap();
        assert_eq!(conflict.node, id("workspace", "w"));
        assert!(conflict.actual.is_none());
    }

    #[test]
    fn test_missing_output_fails_node() {
        let mut graph = Graph::build(vec![
            ResourceDeclaration::new("storage_account", "s"),
            ResourceDeclaration::new("workspace", "w").attribute("endpoint", "${s.endpoint}"),
        ])
        .unwrap();
        let provider = MockProvider::default();
        let report = run(&mut graph, &MemoryStateStore::new(), &provider);

        let entry = report.entry(&id("workspace", "w")).unwrap();
        assert_eq!(entry.status, NodeStatus::Failed);
        assert!(
            entry
                .error
                .as_ref()
                .unwrap()
                .to_string()
                .contains("endpoint")
        );
        assert_eq!(provider.calls(), vec!["create storage_account.s"]);
    }

    #[test]
    fn test_state_write_failure_fails_node() {
        let mut graph = storage_and_workspace();
        let report = run(&mut graph, &ReadOnlyStore, &MockProvider::default());

        let entry = report.entry(&id("storage_account", "s")).unwrap();
        assert_eq!(entry.status, NodeStatus::Failed);
        assert!(matches!(entry.error, Some(NodeError::State(_))));
        assert_eq!(report.status(&id("workspace", "w")), Some(NodeStatus::Blocked));
    }

    #[test]
    fn test_cancel_before_start_marks_everything_cancelled() {
        let mut graph = storage_and_workspace();
        let token = CancellationToken::new();
        token.cancel();
        let provider = MockProvider::default();

        let report = reconcile(
            &mut graph,
            &MemoryStateStore::new(),
            &provider,
            &ExecuteOptions::default(),
            &mut NoProgress,
            &token,
        )
        .unwrap();

        assert!(report.cancelled);
        assert!(report.entries.iter().all(|e| e.status == NodeStatus::Cancelled));
        assert!(provider.calls().is_empty());
        assert_eq!(report.summary().cancelled, 2);
    }

    #[test]
    fn test_cancel_lets_running_wave_finish() {
        let mut graph = Graph::build(vec![
            ResourceDeclaration::new("r", "a"),
            ResourceDeclaration::new("r", "b"),
            ResourceDeclaration::new("r", "c").depends_on("a"),
        ])
        .unwrap();
        let token = CancellationToken::new();
        let mut progress = CancelAfterFirstWave {
            token: token.clone(),
            waves: 0,
        };
        let provider = MockProvider::default();

        let report = reconcile(
            &mut graph,
            &MemoryStateStore::new(),
            &provider,
            &ExecuteOptions::default(),
            &mut progress,
            &token,
        )
        .unwrap();

        assert_eq!(progress.waves, 1);
        assert_eq!(report.status(&id("r", "a")), Some(NodeStatus::Applied));
        assert_eq!(report.status(&id("r", "b")), Some(NodeStatus::Applied));
        assert_eq!(report.status(&id("r", "c")), Some(NodeStatus::Cancelled));
    }

    #[test]
    fn test_parallel_waves_respect_edges() {
        let mut decls: Vec<ResourceDeclaration> = (0..12)
            .map(|i| {
                ResourceDeclaration::new("compute", format!("c{i}"))
                    .attribute("ws", "${workspace.w.id}")
            })
            .collect();
        decls.insert(0, ResourceDeclaration::new("workspace", "w"));
        let mut graph = Graph::build(decls).unwrap();
        let provider = MockProvider::default();

        let report = reconcile(
            &mut graph,
            &MemoryStateStore::new(),
            &provider,
            &ExecuteOptions { jobs: 8 },
            &mut NoProgress,
            &CancellationToken::new(),
        )
        .unwrap();

        assert!(report.is_success());
        let calls = provider.calls();
        assert_eq!(calls.len(), 13);
        assert_eq!(calls[0], "create workspace.w");
        // report order is deterministic regardless of thread scheduling
        let names: Vec<String> = report.entries.iter().map(|e| e.node.name.clone()).collect();
        let expected: Vec<String> = std::iter::once("w".to_string())
            .chain((0..12).map(|i| format!("c{i}")))
            .collect();
        assert_eq!(names, expected);
    }

    #[test]
    fn test_orphans_are_deleted() {
        let store = MemoryStateStore::with_records([(
            id("container_registry", "old"),
            NodeRecord::default(),
        )]);
        let provider = MockProvider::default();
        let report = run(&mut storage_and_workspace(), &store, &provider);

        let entry = report.entry(&id("container_registry", "old")).unwrap();
        assert_eq!(entry.action, Some(Action::Delete));
        assert_eq!(entry.status, NodeStatus::Applied);
        assert!(store.get(&id("container_registry", "old")).unwrap().is_none());
    }

    #[test]
    fn test_teardown_reverse_order() {
        let mut graph = storage_and_workspace();
        let store = MemoryStateStore::new();
        run(&mut graph, &store, &MockProvider::default());

        let provider = MockProvider::default();
        let report = teardown(
            &mut graph,
            &store,
            &provider,
            &ExecuteOptions::default(),
            &mut NoProgress,
            &CancellationToken::new(),
        )
        .unwrap();

        assert_eq!(
            provider.calls(),
            vec!["delete workspace.w", "delete storage_account.s"]
        );
        assert_eq!(report.summary().deleted, 2);
        assert!(store.ids().unwrap().is_empty());
        assert!(graph.nodes().iter().all(|n| n.outputs.is_none()));
    }

    #[test]
    fn test_teardown_failure_keeps_dependencies() {
        let mut graph = storage_and_workspace();
        let store = MemoryStateStore::new();
        run(&mut graph, &store, &MockProvider::default());

        let provider = MockProvider::failing(&["w"]);
        let report = teardown(
            &mut graph,
            &store,
            &provider,
            &ExecuteOptions::default(),
            &mut NoProgress,
            &CancellationToken::new(),
        )
        .unwrap();

        assert_eq!(report.status(&id("workspace", "w")), Some(NodeStatus::Failed));
        assert_eq!(report.status(&id("storage_account", "s")), Some(NodeStatus::Blocked));
        assert!(store.get(&id("storage_account", "s")).unwrap().is_some());
    }

    fn workspace_and_compute() -> Graph {
        Graph::build(vec![
            ResourceDeclaration::new("workspace", "w"),
            ResourceDeclaration::new("a_compute", "c")
                .attribute("workspace_id", "${workspace.w.id}"),
        ])
        .unwrap()
    }

    fn empty_graph() -> Graph {
        Graph::build(Vec::new()).unwrap()
    }

    #[test]
    fn test_records_keep_dependencies() {
        let store = MemoryStateStore::new();
        run(&mut workspace_and_compute(), &store, &MockProvider::default());

        let c = store.get(&id("a_compute", "c")).unwrap().unwrap();
        assert_eq!(c.dependencies, vec![id("workspace", "w")]);
        let w = store.get(&id("workspace", "w")).unwrap().unwrap();
        assert!(w.dependencies.is_empty());
    }

    #[test]
    fn test_unchanged_node_refreshes_recorded_dependencies() {
        let store = MemoryStateStore::new();
        run(&mut workspace_and_compute(), &store, &MockProvider::default());
        let stale = store
            .get(&id("a_compute", "c"))
            .unwrap()
            .unwrap()
            .with_dependencies(Vec::new());
        store.put(&id("a_compute", "c"), stale).unwrap();

        let provider = MockProvider::default();
        let report = run(&mut workspace_and_compute(), &store, &provider);

        assert!(provider.calls().is_empty());
        assert_eq!(report.summary().unchanged, 2);
        let c = store.get(&id("a_compute", "c")).unwrap().unwrap();
        assert_eq!(c.dependencies, vec![id("workspace", "w")]);
    }

    #[test]
    fn test_orphans_deleted_after_their_dependents() {
        let store = MemoryStateStore::new();
        run(&mut workspace_and_compute(), &store, &MockProvider::default());

        let provider = MockProvider::default();
        let report = run(&mut empty_graph(), &store, &provider);

        assert_eq!(
            provider.calls(),
            vec!["delete a_compute.c", "delete workspace.w"]
        );
        assert!(report.is_success());
        assert!(store.ids().unwrap().is_empty());
    }

    #[test]
    fn test_failed_orphan_delete_blocks_its_dependency() {
        let store = MemoryStateStore::new();
        run(&mut workspace_and_compute(), &store, &MockProvider::default());

        let provider = MockProvider::failing(&["c"]);
        let report = run(&mut empty_graph(), &store, &provider);

        assert_eq!(report.status(&id("a_compute", "c")), Some(NodeStatus::Failed));
        assert_eq!(report.status(&id("workspace", "w")), Some(NodeStatus::Blocked));
        assert_eq!(provider.calls(), vec!["delete a_compute.c"]);
        assert!(store.get(&id("workspace", "w")).unwrap().is_some());
    }

    #[test]
    fn test_teardown_deletes_orphan_before_declared_dependency() {
        let store = MemoryStateStore::new();
        run(&mut workspace_and_compute(), &store, &MockProvider::default());

        // c is gone from the config but still depends on the declared w
        let mut graph = Graph::build(vec![ResourceDeclaration::new("workspace", "w")]).unwrap();
        let provider = MockProvider::failing(&["c"]);
        let report = teardown(
            &mut graph,
            &store,
            &provider,
            &ExecuteOptions::default(),
            &mut NoProgress,
            &CancellationToken::new(),
        )
        .unwrap();

        assert_eq!(report.entries[0].node, id("a_compute", "c"));
        assert_eq!(report.status(&id("a_compute", "c")), Some(NodeStatus::Failed));
        assert_eq!(report.status(&id("workspace", "w")), Some(NodeStatus::Blocked));
        assert!(store.get(&id("workspace", "w")).unwrap().is_some());
    }

    #[test]
    fn test_planned_transition_is_reported() {
        let store = MemoryStateStore::new();
        let mut progress = PlannedLog::default();
        reconcile(
            &mut storage_and_workspace(),
            &store,
            &MockProvider::default(),
            &ExecuteOptions::default(),
            &mut progress,
            &CancellationToken::new(),
        )
        .unwrap();
        assert_eq!(
            progress.0,
            vec![
                ("storage_account.s".to_string(), Action::Create),
                ("workspace.w".to_string(), Action::Create),
            ]
        );

        let mut progress = PlannedLog::default();
        reconcile(
            &mut storage_and_workspace(),
            &store,
            &MockProvider::default(),
            &ExecuteOptions::default(),
            &mut progress,
            &CancellationToken::new(),
        )
        .unwrap();
        assert!(progress.0.is_empty());
    }
}
