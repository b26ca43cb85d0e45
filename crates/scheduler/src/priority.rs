//! Priority resolution over the transaction conflict graph.
//!
//! `Left`/`Right` conflicts become directed `dominant -> dominated` edges.
//! `Undefined` conflicts carry no precedence and never reach this graph, so
//! they cannot take part in a cycle. A cycle means the declarations cannot all
//! hold at once and resolution stops with the offending actions listed.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, VecDeque};

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use transact_core::{ActionId, TransactError, TransactResult};
use tracing::debug;

use crate::graph::{ConflictGraph, ConflictGraphBuilder};

/// Topologically order `0..node_count` along `edges`, breaking ties by the
/// smallest index. On a cycle, returns one concrete cycle in edge order.
pub(crate) fn stable_toposort(
    node_count: usize,
    edges: impl IntoIterator<Item = (usize, usize)>,
) -> Result<Vec<usize>, Vec<usize>> {
    let mut graph: DiGraph<usize, ()> = DiGraph::with_capacity(node_count, 0);
    let nodes: Vec<NodeIndex> = (0..node_count).map(|i| graph.add_node(i)).collect();
    for (from, to) in edges {
        graph.update_edge(nodes[from], nodes[to], ());
    }

    let mut in_degree: Vec<usize> = nodes
        .iter()
        .map(|&n| graph.neighbors_directed(n, Direction::Incoming).count())
        .collect();
    let mut ready: BinaryHeap<Reverse<usize>> = in_degree
        .iter()
        .enumerate()
        .filter(|&(_, &d)| d == 0)
        .map(|(i, _)| Reverse(i))
        .collect();

    let mut order = Vec::with_capacity(node_count);
    while let Some(Reverse(i)) = ready.pop() {
        order.push(i);
        for next in graph.neighbors_directed(nodes[i], Direction::Outgoing) {
            let j = graph[next];
            in_degree[j] -= 1;
            if in_degree[j] == 0 {
                ready.push(Reverse(j));
            }
        }
    }

    if order.len() == node_count {
        Ok(order)
    } else {
        Err(extract_cycle(&graph))
    }
}

/// Find one cycle inside the smallest-indexed non-trivial strongly connected component.
fn extract_cycle(graph: &DiGraph<usize, ()>) -> Vec<usize> {
    let component = tarjan_scc(graph)
        .into_iter()
        .filter(|scc| scc.len() > 1 || graph.contains_edge(scc[0], scc[0]))
        .min_by_key(|scc| scc.iter().map(|&n| graph[n]).min().unwrap_or(usize::MAX));
    let Some(component) = component else {
        return Vec::new();
    };

    let Some(&start) = component.iter().min_by_key(|&&n| graph[n]) else {
        return Vec::new();
    };
    if graph.contains_edge(start, start) {
        return vec![graph[start]];
    }

    // BFS from `start` inside the component until an edge leads back to it.
    let mut parent: HashMap<NodeIndex, NodeIndex> = HashMap::new();
    let mut queue = VecDeque::from([start]);
    while let Some(node) = queue.pop_front() {
        let mut successors: Vec<NodeIndex> = graph
            .neighbors_directed(node, Direction::Outgoing)
            .filter(|n| component.contains(n))
            .collect();
        successors.sort_by_key(|&n| graph[n]);
        for next in successors {
            if next == start {
                let mut path = vec![graph[node]];
                let mut cursor = node;
                while let Some(&prev) = parent.get(&cursor) {
                    path.push(graph[prev]);
                    cursor = prev;
                }
                path.reverse();
                return path;
            }
            if !parent.contains_key(&next) {
                parent.insert(next, node);
                queue.push_back(next);
            }
        }
    }
    vec![graph[start]]
}

/// Result of priority resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriorityOrder {
    /// Transactions, dominant before dominated, ties in registration order.
    pub order: Vec<ActionId>,
    /// Direct dominators of every action, indexed by `ActionId`.
    pub dominators: Vec<Vec<ActionId>>,
}

/// Derives the precedence graph from labeled conflicts and validates it.
pub struct PriorityResolver<'a> {
    builder: &'a ConflictGraphBuilder,
    graph: &'a ConflictGraph,
}

impl<'a> PriorityResolver<'a> {
    pub fn new(builder: &'a ConflictGraphBuilder, graph: &'a ConflictGraph) -> Self {
        Self { builder, graph }
    }

    /// Directed `dominant -> dominated` edges, in conflict-graph order.
    pub fn precedence_edges(&self) -> Vec<(ActionId, ActionId)> {
        let mut edges = Vec::new();
        for (&(a, b), label) in &self.graph.edges {
            if label.forward {
                edges.push((a, b));
            }
            if label.backward {
                edges.push((b, a));
            }
        }
        edges
    }

    pub fn resolve(&self) -> TransactResult<PriorityOrder> {
        let count = self.builder.len();
        let edges = self.precedence_edges();

        let sorted = stable_toposort(count, edges.iter().map(|(a, b)| (a.index(), b.index())))
            .map_err(|cycle| TransactError::UnsatisfiablePriority {
                cycle: cycle
                    .into_iter()
                    .map(|i| self.builder.name(ActionId(i)).to_string())
                    .collect(),
            })?;

        let order: Vec<ActionId> = sorted
            .into_iter()
            .map(ActionId)
            .filter(|&id| self.graph.is_transaction(id))
            .collect();

        let mut dominators = vec![Vec::new(); count];
        for (dominant, dominated) in edges {
            dominators[dominated.index()].push(dominant);
        }
        for list in &mut dominators {
            list.sort();
            list.dedup();
        }

        debug!(
            transactions = order.len(),
            precedence_edges = dominators.iter().map(Vec::len).sum::<usize>(),
            "Priority order resolved"
        );
        Ok(PriorityOrder { order, dominators })
    }
}
