//! Compiled per-tick selection procedure.
//!
//! Split into focused submodules:
//! - `compile`: conflict graph + priority order -> contention groups and commit order
//! - `step`: readiness sampling, priority exclusion and group arbitration

mod compile;
mod step;

use serde::Serialize;
use transact_core::{ActionId, ActionKind, SchedulingStrategy};

use crate::arbiter::RoundRobinArbiter;

/// Actions in mutual conflict reachable through conflict edges, arbitrated together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct ContentionGroup {
    /// Members in priority order; position is the arbiter requester index.
    pub members: Vec<ActionId>,
    /// Conflicting members per member, as group-local indices.
    pub adjacency: Vec<Vec<usize>>,
    /// Present when the group has a conflict without defined priority.
    pub arbiter: Option<RoundRobinArbiter>,
}

/// Result of resolving a [`ConflictGraphBuilder`](crate::graph::ConflictGraphBuilder).
///
/// Holds everything `step` needs; the only mutable state is the arbiter
/// pointers. Two schedules compare equal when they were compiled from the
/// same declarations and have seen the same grant history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Schedule {
    strategy: SchedulingStrategy,
    names: Vec<String>,
    kinds: Vec<ActionKind>,
    /// Methods reached by each action, sorted.
    uses: Vec<Vec<ActionId>>,
    /// Direct dominators of each action.
    dominators: Vec<Vec<ActionId>>,
    /// Transactions in priority order.
    priority_order: Vec<ActionId>,
    groups: Vec<ContentionGroup>,
    /// Group index of each transaction; `None` for transactions without conflicts.
    group_of: Vec<Option<usize>>,
    /// Order in which bodies run within a tick: callees first, hints respected.
    commit_order: Vec<ActionId>,
}

/// Outcome of one tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GrantSet {
    /// Indexed by `ActionId`: granted transactions and the methods they run.
    granted: Vec<bool>,
    transactions: Vec<ActionId>,
    methods: Vec<ActionId>,
    /// Effectively ready transactions left out this tick.
    contended: Vec<ActionId>,
    /// Groups where the arbiter's choice left at least one candidate out.
    arbitrations: usize,
}

impl GrantSet {
    pub fn is_granted(&self, id: ActionId) -> bool {
        self.granted.get(id.index()).copied().unwrap_or(false)
    }

    /// Granted transactions in id order.
    pub fn transactions(&self) -> &[ActionId] {
        &self.transactions
    }

    /// Methods run this tick in id order.
    pub fn methods(&self) -> &[ActionId] {
        &self.methods
    }

    pub fn contended(&self) -> &[ActionId] {
        &self.contended
    }

    pub fn arbitrations(&self) -> usize {
        self.arbitrations
    }

    /// Grant vector indexed by `ActionId`.
    pub fn as_slice(&self) -> &[bool] {
        &self.granted
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }
}

impl Schedule {
    pub fn strategy(&self) -> SchedulingStrategy {
        self.strategy
    }

    pub fn action_count(&self) -> usize {
        self.names.len()
    }

    pub fn name(&self, id: ActionId) -> &str {
        &self.names[id.index()]
    }

    pub fn id(&self, name: &str) -> Option<ActionId> {
        self.names.iter().position(|n| n == name).map(ActionId)
    }

    pub fn kind(&self, id: ActionId) -> ActionKind {
        self.kinds[id.index()]
    }

    /// Transactions, dominant before dominated.
    pub fn priority_order(&self) -> &[ActionId] {
        &self.priority_order
    }

    pub fn dominators(&self, id: ActionId) -> &[ActionId] {
        &self.dominators[id.index()]
    }

    pub fn uses(&self, id: ActionId) -> &[ActionId] {
        &self.uses[id.index()]
    }

    pub fn commit_order(&self) -> &[ActionId] {
        &self.commit_order
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Members of every contention group, each in priority order.
    ///
    /// Transactions that conflict with nothing belong to no group.
    pub fn contention_groups(&self) -> Vec<&[ActionId]> {
        self.groups.iter().map(|g| g.members.as_slice()).collect()
    }

    pub fn group_of(&self, id: ActionId) -> Option<usize> {
        self.group_of.get(id.index()).copied().flatten()
    }

    /// Arbiter pointer of a group, if the group is fairness-arbitrated.
    pub fn arbiter_pointer(&self, group: usize) -> Option<usize> {
        self.groups.get(group)?.arbiter.as_ref().map(RoundRobinArbiter::pointer)
    }

    /// Whether two transactions may never be granted together.
    pub fn conflicts(&self, a: ActionId, b: ActionId) -> bool {
        let (Some(ga), Some(gb)) = (self.group_of(a), self.group_of(b)) else {
            return false;
        };
        if ga != gb || a == b {
            return false;
        }
        let group = &self.groups[ga];
        let local = |id: ActionId| group.members.iter().position(|&m| m == id);
        match (local(a), local(b)) {
            (Some(la), Some(lb)) => group.adjacency[la].contains(&lb),
            _ => false,
        }
    }
}
