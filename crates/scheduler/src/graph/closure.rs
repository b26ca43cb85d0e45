use std::collections::BTreeMap;

use tracing::debug;
use transact_core::{ActionId, ActionKind, Priority, TransactError, TransactResult};

use crate::graph::builder::ConflictGraphBuilder;
use crate::priority::stable_toposort;

/// Orientation of one transaction-level conflict `(a, b)` with `a < b`.
///
/// Both flags set means the declarations contradict each other; the
/// priority resolver reports that as a two-action cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EdgeLabel {
    /// `a` dominates `b`.
    pub forward: bool,
    /// `b` dominates `a`.
    pub backward: bool,
}

impl EdgeLabel {
    /// Fold in a priority read from `a`'s side.
    fn add(&mut self, priority: Priority) {
        match priority {
            Priority::Left => self.forward = true,
            Priority::Right => self.backward = true,
            Priority::Undefined => {}
        }
    }

    /// The label as a single priority from `a`'s side.
    pub fn priority(&self) -> Priority {
        match (self.forward, self.backward) {
            (true, false) => Priority::Left,
            (false, true) => Priority::Right,
            _ => Priority::Undefined,
        }
    }
}

/// Transaction-level conflict graph with method calls folded in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictGraph {
    kinds: Vec<ActionKind>,
    /// Methods reachable from each action through calls, sorted.
    pub(crate) uses: Vec<Vec<ActionId>>,
    /// Transactions that reach each method, sorted. Empty for transactions.
    pub(crate) callers: Vec<Vec<ActionId>>,
    /// Conflicts between transactions keyed by `(min, max)`.
    pub(crate) edges: BTreeMap<(ActionId, ActionId), EdgeLabel>,
}

impl ConflictGraph {
    pub fn build(builder: &ConflictGraphBuilder) -> TransactResult<Self> {
        let count = builder.len();

        let call_edges = builder.actions.iter().enumerate().flat_map(|(i, node)| {
            node.calls.iter().map(move |callee| (i, callee.index()))
        });
        stable_toposort(count, call_edges).map_err(|cycle| TransactError::RecursiveCall {
            cycle: cycle
                .into_iter()
                .map(|i| builder.name(ActionId(i)).to_string())
                .collect(),
        })?;

        let kinds: Vec<ActionKind> = builder.actions.iter().map(|a| a.kind).collect();
        let uses: Vec<Vec<ActionId>> = (0..count).map(|i| reachable(builder, ActionId(i))).collect();

        let mut callers = vec![Vec::new(); count];
        for (i, used) in uses.iter().enumerate() {
            if kinds[i] != ActionKind::Transaction {
                continue;
            }
            for method in used {
                callers[method.index()].push(ActionId(i));
            }
        }

        let mut graph = Self {
            kinds,
            uses,
            callers,
            edges: BTreeMap::new(),
        };
        graph.lift_declared(builder)?;
        graph.add_shared_method_conflicts();

        debug!(
            actions = count,
            conflicts = graph.edges.len(),
            "Conflict graph built"
        );
        Ok(graph)
    }

    /// Lift every declared conflict onto the transactions that perform its endpoints.
    fn lift_declared(&mut self, builder: &ConflictGraphBuilder) -> TransactResult<()> {
        let mut declared: BTreeMap<(ActionId, ActionId), Vec<Priority>> = BTreeMap::new();
        for c in &builder.conflicts {
            let priorities = declared.entry((c.a, c.b)).or_default();
            if c.replace {
                priorities.clear();
            }
            priorities.push(c.priority);
        }

        for (&(x, y), priorities) in &declared {
            let left = self.performers(x);
            let right = self.performers(y);
            for &t in &left {
                for &u in &right {
                    if t == u {
                        return Err(TransactError::SelfConflict(builder.name(t).to_string()));
                    }
                    for &priority in priorities {
                        self.add_edge(t, u, priority);
                    }
                }
            }
        }
        Ok(())
    }

    /// Transactions sharing a method conflict with each other, without precedence.
    fn add_shared_method_conflicts(&mut self) {
        let mut pairs = Vec::new();
        for callers in &self.callers {
            for (i, &t) in callers.iter().enumerate() {
                for &u in &callers[i + 1..] {
                    pairs.push((t, u));
                }
            }
        }
        for (t, u) in pairs {
            self.add_edge(t, u, Priority::Undefined);
        }
    }

    /// `priority` is read from `t`'s side.
    fn add_edge(&mut self, t: ActionId, u: ActionId, priority: Priority) {
        let (key, priority) = if t < u { ((t, u), priority) } else { ((u, t), priority.reversed()) };
        self.edges.entry(key).or_default().add(priority);
    }

    /// Transactions whose grant means `id` runs: itself, or every transaction reaching it.
    fn performers(&self, id: ActionId) -> Vec<ActionId> {
        if self.is_transaction(id) {
            vec![id]
        } else {
            self.callers[id.index()].clone()
        }
    }

    pub fn is_transaction(&self, id: ActionId) -> bool {
        self.kinds.get(id.index()) == Some(&ActionKind::Transaction)
    }

    pub fn transactions(&self) -> impl Iterator<Item = ActionId> + '_ {
        self.kinds
            .iter()
            .enumerate()
            .filter(|(_, kind)| **kind == ActionKind::Transaction)
            .map(|(i, _)| ActionId(i))
    }

    /// Methods reachable from `id`, directly or through nested calls.
    pub fn uses(&self, id: ActionId) -> &[ActionId] {
        &self.uses[id.index()]
    }

    /// Transactions reaching `method`; one fairness group when there are several.
    pub fn callers(&self, method: ActionId) -> &[ActionId] {
        &self.callers[method.index()]
    }

    pub fn conflicts(&self, a: ActionId, b: ActionId) -> bool {
        let key = if a < b { (a, b) } else { (b, a) };
        self.edges.contains_key(&key)
    }

    /// Priority of the conflict read from `a`'s side, or `None` without a conflict.
    pub fn priority(&self, a: ActionId, b: ActionId) -> Option<Priority> {
        if a < b {
            self.edges.get(&(a, b)).map(EdgeLabel::priority)
        } else {
            self.edges.get(&(b, a)).map(|label| label.priority().reversed())
        }
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }
}

fn reachable(builder: &ConflictGraphBuilder, from: ActionId) -> Vec<ActionId> {
    let mut seen = vec![false; builder.len()];
    let mut stack: Vec<ActionId> = builder.calls(from).to_vec();
    let mut out = Vec::new();
    while let Some(id) = stack.pop() {
        if std::mem::replace(&mut seen[id.index()], true) {
            continue;
        }
        out.push(id);
        stack.extend_from_slice(builder.calls(id));
    }
    out.sort();
    out
}
