//! Dependency resolver - deterministic topological ordering
//!
//! Kahn's algorithm with a min-heap on declaration index: whenever several
//! nodes have no unresolved dependencies, the one declared first goes first.
//! Identical input therefore always yields the identical apply order.

use crate::error::ValidationError;
use crate::graph::Graph;
use crate::types::NodeId;
use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// Order node indices so every node comes after all of its dependencies
pub fn topological_order(graph: &Graph) -> Result<Vec<usize>, ValidationError> {
    let n = graph.len();
    let order = kahn_order(&graph.adjacency());

    if order.len() != n {
        // Graph::build rejects cycles, so this only fires on a corrupted graph
        let cycle = find_cycle(&graph.adjacency()).unwrap_or_else(|| {
            (0..n).filter(|i| !order.contains(i)).collect()
        });
        return Err(ValidationError::CyclicReference {
            cycle: cycle.into_iter().map(|i| graph.node(i).id.clone()).collect(),
        });
    }

    log::debug!(
        "Resolved order: {}",
        order
            .iter()
            .map(|&i| graph.node(i).id.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    );
    Ok(order)
}

/// Kahn's algorithm over an adjacency list (node → dependencies)
///
/// Ties break on the lowest index. Nodes on a cycle, and everything that
/// depends on one, are missing from the result.
pub(crate) fn kahn_order(adjacency: &[Vec<usize>]) -> Vec<usize> {
    let mut in_degree: Vec<usize> = adjacency.iter().map(Vec::len).collect();
    let mut dependents = vec![Vec::new(); adjacency.len()];
    for (idx, dependencies) in adjacency.iter().enumerate() {
        for &dep in dependencies {
            dependents[dep].push(idx);
        }
    }

    let mut heap: BinaryHeap<Reverse<usize>> = in_degree
        .iter()
        .enumerate()
        .filter(|(_, degree)| **degree == 0)
        .map(|(idx, _)| Reverse(idx))
        .collect();

    let mut order = Vec::with_capacity(adjacency.len());
    while let Some(Reverse(idx)) = heap.pop() {
        order.push(idx);
        for &dependent in &dependents[idx] {
            in_degree[dependent] -= 1;
            if in_degree[dependent] == 0 {
                heap.push(Reverse(dependent));
            }
        }
    }
    order
}

/// Resolve the apply order as node identifiers
pub fn resolve(graph: &Graph) -> Result<Vec<NodeId>, ValidationError> {
    Ok(topological_order(graph)?
        .into_iter()
        .map(|i| graph.node(i).id.clone())
        .collect())
}

/// Order for teardown: dependents before their dependencies
pub fn teardown_order(graph: &Graph) -> Result<Vec<usize>, ValidationError> {
    let mut order = topological_order(graph)?;
    order.reverse();
    Ok(order)
}

/// Group nodes into levels of mutually independent nodes
///
/// A node's level is one more than the deepest of its dependencies. All
/// nodes within a level may be reconciled concurrently. Each level keeps
/// topological (declaration tie-break) order.
pub fn levels(graph: &Graph) -> Result<Vec<Vec<usize>>, ValidationError> {
    let order = topological_order(graph)?;
    let mut depth = vec![0usize; graph.len()];
    let mut levels: Vec<Vec<usize>> = Vec::new();

    for idx in order {
        let level = graph
            .dependencies(idx)
            .iter()
            .map(|&dep| depth[dep] + 1)
            .max()
            .unwrap_or(0);
        depth[idx] = level;
        if levels.len() <= level {
            levels.resize_with(level + 1, Vec::new);
        }
        levels[level].push(idx);
    }

    Ok(levels)
}

/// Find one cycle in an adjacency list (node → dependencies)
///
/// Returns the path with the first node repeated at the end, e.g.
/// `[a, b, a]`. Nodes are explored in index order so the reported cycle is
/// stable for identical input.
pub(crate) fn find_cycle(adjacency: &[Vec<usize>]) -> Option<Vec<usize>> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Unvisited,
        OnStack,
        Done,
    }

    let mut marks = vec![Mark::Unvisited; adjacency.len()];

    for start in 0..adjacency.len() {
        if marks[start] != Mark::Unvisited {
            continue;
        }

        // Iterative DFS: (node, next edge position)
        let mut stack: Vec<(usize, usize)> = vec![(start, 0)];
        marks[start] = Mark::OnStack;

        while let Some(top) = stack.last_mut() {
            let (node, edge) = *top;
            if let Some(&next) = adjacency[node].get(edge) {
                top.1 += 1;
                match marks[next] {
                    Mark::Unvisited => {
                        marks[next] = Mark::OnStack;
                        stack.push((next, 0));
                    }
                    Mark::OnStack => {
                        let from = stack.iter().position(|&(n, _)| n == next).unwrap_or(0);
                        let mut cycle: Vec<usize> =
                            stack[from..].iter().map(|&(n, _)| n).collect();
                        cycle.push(next);
                        return Some(cycle);
                    }
                    Mark::Done => {}
                }
            } else {
                marks[node] = Mark::Done;
                stack.pop();
            }
        }
    }

    None
}
