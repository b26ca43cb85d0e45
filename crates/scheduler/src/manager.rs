//! Tick driver that binds readiness predicates and bodies to a compiled schedule.

use std::fmt;

use tracing::{debug, info};
use transact_core::config::load_dotenv;
use transact_core::{ActionId, ActionKind, Priority, SchedulerConfig, TransactError, TransactResult};

use crate::graph::ConflictGraphBuilder;
use crate::metrics::SchedulerMetrics;
use crate::schedule::{GrantSet, Schedule};

/// Behaviour of one action over caller-owned state `S`.
pub trait ActionBody<S> {
    /// Sampled once per tick before anything runs.
    fn ready(&self, state: &S) -> bool;

    /// Runs at most once per tick, only when granted.
    fn run(&mut self, state: &mut S);
}

/// [`ActionBody`] built from a predicate and a body closure.
pub struct FnAction<R, B> {
    ready: R,
    body: B,
}

impl<R, B> FnAction<R, B> {
    pub fn new(ready: R, body: B) -> Self {
        Self { ready, body }
    }
}

impl<S, R, B> ActionBody<S> for FnAction<R, B>
where
    R: Fn(&S) -> bool,
    B: FnMut(&mut S),
{
    fn ready(&self, state: &S) -> bool {
        (self.ready)(state)
    }

    fn run(&mut self, state: &mut S) {
        (self.body)(state)
    }
}

/// Shorthand for `Box::new(FnAction::new(ready, body))`.
pub fn action<S, R, B>(ready: R, body: B) -> Box<dyn ActionBody<S>>
where
    S: 'static,
    R: Fn(&S) -> bool + 'static,
    B: FnMut(&mut S) + 'static,
{
    Box::new(FnAction::new(ready, body))
}

type Body<S> = Box<dyn ActionBody<S>>;

/// Registers actions together with their bodies.
///
/// Transactions get a body at registration. Methods are declared first and
/// defined later with [`define`](Self::define), so callers can refer to them
/// before their body exists.
pub struct ManagerBuilder<S> {
    graph: ConflictGraphBuilder,
    bodies: Vec<Option<Body<S>>>,
    config: SchedulerConfig,
}

impl<S> Default for ManagerBuilder<S> {
    fn default() -> Self {
        Self {
            graph: ConflictGraphBuilder::new(),
            bodies: Vec::new(),
            config: SchedulerConfig::default(),
        }
    }
}

impl<S> ManagerBuilder<S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder configured from `.env` and `TRANSACT_*` variables.
    pub fn from_env() -> TransactResult<Self> {
        load_dotenv();
        Ok(Self::new().with_config(SchedulerConfig::from_env()?))
    }

    pub fn with_config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn transaction(&mut self, name: &str, body: Body<S>) -> TransactResult<ActionId> {
        let id = self.graph.transaction(name)?;
        self.bodies.push(Some(body));
        Ok(id)
    }

    pub fn method(&mut self, name: &str) -> TransactResult<ActionId> {
        let id = self.graph.method(name)?;
        self.bodies.push(None);
        Ok(id)
    }

    /// Attach the body of a declared method.
    pub fn define(&mut self, method: ActionId, body: Body<S>) -> TransactResult<()> {
        self.graph.check(method)?;
        let name = self.graph.name(method).to_string();
        if self.graph.kind(method) != Some(ActionKind::Method) {
            return Err(TransactError::NotAMethod(name));
        }
        let slot = &mut self.bodies[method.index()];
        if slot.is_some() {
            return Err(TransactError::MethodRedefined(name));
        }
        *slot = Some(body);
        Ok(())
    }

    pub fn call(&mut self, caller: ActionId, method: ActionId) -> TransactResult<()> {
        self.graph.call(caller, method)
    }

    pub fn declare_conflict(&mut self, a: ActionId, b: ActionId, priority: Priority) -> TransactResult<()> {
        self.graph.declare_conflict(a, b, priority)
    }

    pub fn override_conflict(&mut self, a: ActionId, b: ActionId, priority: Priority) -> TransactResult<()> {
        self.graph.override_conflict(a, b, priority)
    }

    pub fn schedule_before(&mut self, first: ActionId, then: ActionId) -> TransactResult<()> {
        self.graph.schedule_before(first, then)
    }

    pub fn graph(&self) -> &ConflictGraphBuilder {
        &self.graph
    }

    /// Check that every called method has a body, then compile the schedule.
    pub fn build(self) -> TransactResult<TransactionManager<S>> {
        for (id, _, _) in self.graph.actions() {
            for &callee in self.graph.calls(id) {
                if self.bodies[callee.index()].is_none() {
                    return Err(TransactError::MethodUndefined(self.graph.name(callee).to_string()));
                }
            }
        }

        let schedule = self.graph.resolve_with(&self.config)?;
        self.config.log_summary();
        Ok(TransactionManager {
            schedule,
            bodies: self.bodies,
            config: self.config,
            metrics: SchedulerMetrics::default(),
            tick: 0,
        })
    }
}

/// Owns the compiled schedule and every action body.
pub struct TransactionManager<S> {
    schedule: Schedule,
    bodies: Vec<Option<Body<S>>>,
    config: SchedulerConfig,
    metrics: SchedulerMetrics,
    tick: u64,
}

impl<S> TransactionManager<S> {
    /// Sample readiness, select a grant set and commit it.
    ///
    /// Every granted transaction and every method it reaches runs exactly
    /// once, in the compiled commit order.
    pub fn tick(&mut self, state: &mut S) -> GrantSet {
        let readiness: Vec<bool> = self
            .bodies
            .iter()
            .map(|body| body.as_ref().is_some_and(|b| b.ready(&*state)))
            .collect();

        let grants = self.schedule.step(&readiness);
        for &id in self.schedule.commit_order() {
            if !grants.is_granted(id) {
                continue;
            }
            if let Some(body) = self.bodies[id.index()].as_mut() {
                body.run(state);
            }
        }

        if self.config.trace_grants {
            let names: Vec<&str> = grants
                .transactions()
                .iter()
                .map(|&t| self.schedule.name(t))
                .collect();
            debug!(tick = self.tick, granted = ?names, "Committed grant set");
        }
        if self.config.record_metrics {
            self.metrics.record_tick(&grants, &self.schedule);
        }
        self.tick += 1;
        grants
    }

    /// Run `ticks` ticks back to back, returning how many transactions committed.
    pub fn run_for(&mut self, state: &mut S, ticks: u64) -> usize {
        let committed: usize = (0..ticks).map(|_| self.tick(state).transactions().len()).sum();
        info!(ticks, committed, "Run finished");
        committed
    }

    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    pub fn metrics(&self) -> &SchedulerMetrics {
        &self.metrics
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Ticks completed so far.
    pub fn current_tick(&self) -> u64 {
        self.tick
    }
}

impl<S> fmt::Debug for TransactionManager<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionManager")
            .field("tick", &self.tick)
            .field("actions", &self.schedule.action_count())
            .field("groups", &self.schedule.group_count())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use transact_core::SchedulingStrategy;

    use super::*;

    #[derive(Default)]
    struct Counter {
        value: u32,
        log: Vec<&'static str>,
    }

    fn always(_: &Counter) -> bool {
        true
    }

    #[test]
    fn define_rejects_transactions_and_redefinition() {
        let mut mb = ManagerBuilder::<Counter>::new();
        let t = mb.transaction("t", action(always, |_| {})).unwrap();
        let m = mb.method("m").unwrap();

        assert_eq!(
            mb.define(t, action(always, |_| {})).unwrap_err(),
            TransactError::NotAMethod("t".into())
        );
        mb.define(m, action(always, |_| {})).unwrap();
        assert_eq!(
            mb.define(m, action(always, |_| {})).unwrap_err(),
            TransactError::MethodRedefined("m".into())
        );
    }

    #[test]
    fn called_method_must_be_defined() {
        let mut mb = ManagerBuilder::<Counter>::new();
        let t = mb.transaction("t", action(always, |_| {})).unwrap();
        let m = mb.method("m").unwrap();
        mb.method("spare").unwrap();
        mb.call(t, m).unwrap();

        let err = mb.build().unwrap_err();
        assert_eq!(err, TransactError::MethodUndefined("m".into()));
    }

    #[test]
    fn uncalled_undefined_method_is_allowed() {
        let mut mb = ManagerBuilder::<Counter>::new();
        mb.transaction("t", action(always, |c: &mut Counter| c.value += 1)).unwrap();
        mb.method("spare").unwrap();

        let mut manager = mb.build().unwrap();
        let mut state = Counter::default();
        manager.tick(&mut state);
        assert_eq!(state.value, 1);
    }

    #[test]
    fn shared_method_runs_once_per_tick_before_caller() {
        let mut mb = ManagerBuilder::<Counter>::new();
        let a = mb
            .transaction("a", action(always, |c: &mut Counter| c.log.push("a")))
            .unwrap();
        let b = mb
            .transaction("b", action(always, |c: &mut Counter| c.log.push("b")))
            .unwrap();
        let m = mb.method("m").unwrap();
        mb.define(m, action(always, |c: &mut Counter| c.log.push("m"))).unwrap();
        mb.call(a, m).unwrap();
        mb.call(b, m).unwrap();

        let mut manager = mb.build().unwrap();
        let mut state = Counter::default();
        manager.tick(&mut state);
        assert_eq!(state.log, vec!["m", "b"]);
        manager.tick(&mut state);
        assert_eq!(state.log, vec!["m", "b", "m", "a"]);
    }

    #[test]
    fn readiness_is_sampled_before_bodies_run() {
        // `drain` empties the counter; `fill` is only ready while it is empty.
        let mut mb = ManagerBuilder::<Counter>::new();
        mb.transaction("drain", action(|c: &Counter| c.value > 0, |c: &mut Counter| c.value = 0))
            .unwrap();
        mb.transaction("fill", action(|c: &Counter| c.value == 0, |c: &mut Counter| c.value = 5))
            .unwrap();

        let mut manager = mb.build().unwrap();
        let mut state = Counter { value: 3, ..Default::default() };
        let grants = manager.tick(&mut state);

        assert_eq!(grants.transactions(), &[ActionId(0)]);
        assert_eq!(state.value, 0);
    }

    #[test]
    fn ordering_hint_orders_bodies() {
        let mut mb = ManagerBuilder::<Counter>::new();
        let first = mb
            .transaction("first", action(always, |c: &mut Counter| c.log.push("first")))
            .unwrap();
        let second = mb
            .transaction("second", action(always, |c: &mut Counter| c.log.push("second")))
            .unwrap();
        mb.schedule_before(second, first).unwrap();

        let mut manager = mb.build().unwrap();
        let mut state = Counter::default();
        manager.tick(&mut state);
        assert_eq!(state.log, vec!["second", "first"]);
    }

    #[test]
    fn from_env_applies_environment_config() {
        std::env::set_var("TRANSACT_STRATEGY", "eager_deterministic");
        std::env::set_var("TRANSACT_RECORD_METRICS", "false");
        std::env::set_var("TRANSACT_TRACE_GRANTS", "1");
        let mb = ManagerBuilder::<Counter>::from_env();
        std::env::remove_var("TRANSACT_STRATEGY");
        std::env::remove_var("TRANSACT_RECORD_METRICS");
        std::env::remove_var("TRANSACT_TRACE_GRANTS");

        let mut mb = mb.unwrap();
        mb.transaction("t", action(always, |c: &mut Counter| c.value += 1)).unwrap();
        let mut manager = mb.build().unwrap();
        assert_eq!(manager.config().strategy, SchedulingStrategy::EagerDeterministic);
        assert!(manager.config().trace_grants);

        let mut state = Counter::default();
        manager.run_for(&mut state, 2);
        assert_eq!(state.value, 2);
        assert_eq!(manager.metrics().ticks, 0);
    }

    #[test]
    fn metrics_follow_config() {
        let build = |record_metrics| {
            let mut mb = ManagerBuilder::<Counter>::new().with_config(SchedulerConfig {
                record_metrics,
                trace_grants: true,
                ..Default::default()
            });
            mb.transaction("t", action(always, |_| {})).unwrap();
            mb.build().unwrap()
        };

        let mut state = Counter::default();
        let mut on = build(true);
        assert_eq!(on.run_for(&mut state, 3), 3);
        assert_eq!(on.metrics().grants["t"], 3);
        assert_eq!(on.current_tick(), 3);

        let mut off = build(false);
        off.run_for(&mut state, 3);
        assert_eq!(off.metrics().ticks, 0);
    }
}
