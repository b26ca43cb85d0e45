use std::collections::HashMap;

use tracing::debug;
use transact_core::{ActionId, Priority, SchedulerConfig, SchedulingStrategy, TransactError, TransactResult};

use crate::arbiter::RoundRobinArbiter;
use crate::graph::{ConflictGraph, ConflictGraphBuilder};
use crate::priority::{stable_toposort, PriorityResolver};

use super::{ContentionGroup, Schedule};

fn find(parent: &mut [usize], mut i: usize) -> usize {
    while parent[i] != i {
        parent[i] = parent[parent[i]];
        i = parent[i];
    }
    i
}

fn union(parent: &mut [usize], a: usize, b: usize) {
    let (ra, rb) = (find(parent, a), find(parent, b));
    if ra != rb {
        // smaller root wins so component identity is stable
        let (keep, merge) = if ra < rb { (ra, rb) } else { (rb, ra) };
        parent[merge] = keep;
    }
}

impl Schedule {
    /// Build the conflict graph, order priorities and lay out contention groups.
    pub(crate) fn compile(builder: &ConflictGraphBuilder, config: &SchedulerConfig) -> TransactResult<Self> {
        let graph = ConflictGraph::build(builder)?;
        let priorities = PriorityResolver::new(builder, &graph).resolve()?;
        let count = builder.len();

        // Union closure of every connected conflict, priority-labeled or not.
        let mut parent: Vec<usize> = (0..count).collect();
        let mut contended = vec![false; count];
        for &(a, b) in graph.edges.keys() {
            union(&mut parent, a.index(), b.index());
            contended[a.index()] = true;
            contended[b.index()] = true;
        }

        let mut member_lists: Vec<Vec<ActionId>> = Vec::new();
        let mut group_of: Vec<Option<usize>> = vec![None; count];
        let mut position = vec![0usize; count];
        let mut group_by_root: HashMap<usize, usize> = HashMap::new();
        // Transactions without any conflict are granted directly and get no group.
        for &t in priorities.order.iter().filter(|t| contended[t.index()]) {
            let root = find(&mut parent, t.index());
            let g = *group_by_root.entry(root).or_insert_with(|| {
                member_lists.push(Vec::new());
                member_lists.len() - 1
            });
            position[t.index()] = member_lists[g].len();
            member_lists[g].push(t);
            group_of[t.index()] = Some(g);
        }

        let mut adjacency: Vec<Vec<Vec<usize>>> =
            member_lists.iter().map(|m| vec![Vec::new(); m.len()]).collect();
        let mut needs_fairness = vec![false; member_lists.len()];
        for (&(a, b), label) in &graph.edges {
            let Some(g) = group_of[a.index()] else { continue };
            let (la, lb) = (position[a.index()], position[b.index()]);
            adjacency[g][la].push(lb);
            adjacency[g][lb].push(la);
            if label.priority() == Priority::Undefined {
                needs_fairness[g] = true;
            }
        }

        let mut groups = Vec::with_capacity(member_lists.len());
        for ((members, mut adjacency), fair) in member_lists.into_iter().zip(adjacency).zip(needs_fairness) {
            for list in &mut adjacency {
                list.sort_unstable();
                list.dedup();
            }
            let arbiter = if fair && config.strategy == SchedulingStrategy::RoundRobin {
                Some(RoundRobinArbiter::new(members.len())?)
            } else {
                None
            };
            groups.push(ContentionGroup {
                members,
                adjacency,
                arbiter,
            });
        }

        let commit_order = commit_order(builder)?;

        debug!(
            groups = groups.len(),
            arbitrated = groups.iter().filter(|g| g.arbiter.is_some()).count(),
            conflicts = graph.edge_count(),
            "Schedule compiled"
        );

        Ok(Self {
            strategy: config.strategy,
            names: builder.actions().map(|(_, name, _)| name.to_string()).collect(),
            kinds: builder.actions().map(|(_, _, kind)| kind).collect(),
            uses: graph.uses.clone(),
            dominators: priorities.dominators,
            priority_order: priorities.order,
            groups,
            group_of,
            commit_order,
        })
    }
}

/// Callees run before their callers; ordering hints add further edges.
fn commit_order(builder: &ConflictGraphBuilder) -> TransactResult<Vec<ActionId>> {
    let mut edges = Vec::new();
    for (caller, node) in builder.actions.iter().enumerate() {
        edges.extend(node.calls.iter().map(|callee| (callee.index(), caller)));
        edges.extend(node.before.iter().map(|then| (caller, then.index())));
    }
    stable_toposort(builder.len(), edges)
        .map(|order| order.into_iter().map(ActionId).collect())
        .map_err(|cycle| TransactError::OrderingCycle {
            cycle: cycle
                .into_iter()
                .map(|i| builder.name(ActionId(i)).to_string())
                .collect(),
        })
}
