use std::collections::HashMap;

use tracing::{debug, info};
use transact_core::{ActionId, ActionKind, Priority, SchedulerConfig, TransactError, TransactResult};

use crate::schedule::Schedule;

/// One registered action in the builder arena.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ActionNode {
    pub name: String,
    pub kind: ActionKind,
    /// Methods invoked by this action's body.
    pub calls: Vec<ActionId>,
    /// Actions this one should be committed before.
    pub before: Vec<ActionId>,
}

/// One `declare_conflict` or `override_conflict` call, normalized to `a < b`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct DeclaredConflict {
    pub a: ActionId,
    pub b: ActionId,
    /// Read from `a`'s side.
    pub priority: Priority,
    /// Drops every declaration for the pair made before this one.
    pub replace: bool,
}

/// Collects actions, conflicts, method calls and ordering hints at build time.
///
/// Nothing is validated beyond local sanity checks until [`resolve`](Self::resolve),
/// which builds the transaction-level conflict graph, orders priorities and
/// compiles a [`Schedule`].
#[derive(Debug, Clone, Default)]
pub struct ConflictGraphBuilder {
    pub(crate) actions: Vec<ActionNode>,
    by_name: HashMap<String, ActionId>,
    /// Conflict declarations and overrides in call order.
    pub(crate) conflicts: Vec<DeclaredConflict>,
}

impl ConflictGraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a transaction.
    pub fn transaction(&mut self, name: &str) -> TransactResult<ActionId> {
        self.register(name, ActionKind::Transaction)
    }

    /// Register a method. It only runs when a granted transaction calls it.
    pub fn method(&mut self, name: &str) -> TransactResult<ActionId> {
        self.register(name, ActionKind::Method)
    }

    fn register(&mut self, name: &str, kind: ActionKind) -> TransactResult<ActionId> {
        if self.by_name.contains_key(name) {
            return Err(TransactError::DuplicateName(name.to_string()));
        }
        let id = ActionId(self.actions.len());
        self.actions.push(ActionNode {
            name: name.to_string(),
            kind,
            calls: Vec::new(),
            before: Vec::new(),
        });
        self.by_name.insert(name.to_string(), id);
        debug!(action = %name, %kind, id = id.index(), "Registered action");
        Ok(id)
    }

    /// Declare that `a` and `b` may not both run in one tick.
    ///
    /// `priority` is read from `a`'s side: `Left` makes `a` dominant.
    pub fn declare_conflict(&mut self, a: ActionId, b: ActionId, priority: Priority) -> TransactResult<()> {
        self.push_conflict(a, b, priority, false)
    }

    /// Replace every earlier declaration between `a` and `b` with this one.
    ///
    /// Declarations made afterwards still count, so a later contradiction
    /// is reported as a priority cycle.
    pub fn override_conflict(&mut self, a: ActionId, b: ActionId, priority: Priority) -> TransactResult<()> {
        self.push_conflict(a, b, priority, true)
    }

    fn push_conflict(&mut self, a: ActionId, b: ActionId, priority: Priority, replace: bool) -> TransactResult<()> {
        self.check_pair(a, b)?;
        let (a, b, priority) = if a < b { (a, b, priority) } else { (b, a, priority.reversed()) };
        self.conflicts.push(DeclaredConflict {
            a,
            b,
            priority,
            replace,
        });
        Ok(())
    }

    /// Record that `caller`'s body invokes `method`. Repeated calls coalesce.
    pub fn call(&mut self, caller: ActionId, method: ActionId) -> TransactResult<()> {
        self.check(caller)?;
        self.check(method)?;
        let callee = &self.actions[method.index()];
        if callee.kind != ActionKind::Method {
            return Err(TransactError::InvalidCallTarget {
                caller: self.name(caller).to_string(),
                callee: callee.name.clone(),
                kind: callee.kind.to_string(),
            });
        }
        if caller == method {
            return Err(TransactError::RecursiveCall {
                cycle: vec![callee.name.clone()],
            });
        }
        let calls = &mut self.actions[caller.index()].calls;
        if !calls.contains(&method) {
            calls.push(method);
        }
        Ok(())
    }

    /// Hint that `first` should be committed before `then` within a tick.
    ///
    /// Hints only order bodies; they never decide a conflict.
    pub fn schedule_before(&mut self, first: ActionId, then: ActionId) -> TransactResult<()> {
        self.check(first)?;
        self.check(then)?;
        if first == then {
            return Err(TransactError::OrderingCycle {
                cycle: vec![self.name(first).to_string()],
            });
        }
        let before = &mut self.actions[first.index()].before;
        if !before.contains(&then) {
            before.push(then);
        }
        Ok(())
    }

    /// Compile a schedule with the default config.
    pub fn resolve(&self) -> TransactResult<Schedule> {
        self.resolve_with(&SchedulerConfig::default())
    }

    /// Validate the declarations and compile a schedule.
    pub fn resolve_with(&self, config: &SchedulerConfig) -> TransactResult<Schedule> {
        let schedule = Schedule::compile(self, config)?;
        info!(
            "Resolved schedule: {} actions, {} contention groups, strategy {}",
            self.len(),
            schedule.group_count(),
            config.strategy
        );
        Ok(schedule)
    }

    pub fn id(&self, name: &str) -> Option<ActionId> {
        self.by_name.get(name).copied()
    }

    /// Name of a registered action. Panics on an id from another builder.
    pub fn name(&self, id: ActionId) -> &str {
        &self.actions[id.index()].name
    }

    pub fn kind(&self, id: ActionId) -> Option<ActionKind> {
        self.actions.get(id.index()).map(|a| a.kind)
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// All registered actions in registration order.
    pub fn actions(&self) -> impl Iterator<Item = (ActionId, &str, ActionKind)> {
        self.actions
            .iter()
            .enumerate()
            .map(|(i, a)| (ActionId(i), a.name.as_str(), a.kind))
    }

    /// Methods called directly by `id`.
    pub fn calls(&self, id: ActionId) -> &[ActionId] {
        self.actions
            .get(id.index())
            .map(|a| a.calls.as_slice())
            .unwrap_or(&[])
    }

    pub(crate) fn check(&self, id: ActionId) -> TransactResult<()> {
        if id.index() < self.actions.len() {
            Ok(())
        } else {
            Err(TransactError::UnknownAction(id.to_string()))
        }
    }

    fn check_pair(&self, a: ActionId, b: ActionId) -> TransactResult<()> {
        self.check(a)?;
        self.check(b)?;
        if a == b {
            return Err(TransactError::SelfConflict(self.name(a).to_string()));
        }
        Ok(())
    }
}
