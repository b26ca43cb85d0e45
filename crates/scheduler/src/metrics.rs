use std::collections::HashMap;

use serde::Serialize;

use crate::schedule::{GrantSet, Schedule};

/// Per-action grant accounting collected by the transaction manager.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SchedulerMetrics {
    /// Ticks stepped so far.
    pub ticks: u64,
    /// Ticks in which nothing was granted.
    pub empty_ticks: u64,
    /// Times each transaction was granted, by name.
    pub grants: HashMap<String, u64>,
    /// Times each transaction was effectively ready but left out, by name.
    pub contended: HashMap<String, u64>,
    /// Times each method ran, by name.
    pub method_runs: HashMap<String, u64>,
    /// Arbiter decisions that left at least one candidate out.
    pub arbitrations: u64,
    /// Largest number of transactions granted in one tick.
    pub max_parallel: usize,
}

impl SchedulerMetrics {
    /// Fold one tick's outcome in.
    pub fn record_tick(&mut self, grants: &GrantSet, schedule: &Schedule) {
        self.ticks += 1;
        if grants.is_empty() {
            self.empty_ticks += 1;
        }
        for &t in grants.transactions() {
            *self.grants.entry(schedule.name(t).to_string()).or_default() += 1;
        }
        for &t in grants.contended() {
            *self.contended.entry(schedule.name(t).to_string()).or_default() += 1;
        }
        for &m in grants.methods() {
            *self.method_runs.entry(schedule.name(m).to_string()).or_default() += 1;
        }
        self.arbitrations += grants.arbitrations() as u64;
        self.max_parallel = self.max_parallel.max(grants.transactions().len());
    }

    /// Fraction of ticks in which `name` was granted.
    pub fn grant_rate(&self, name: &str) -> f64 {
        if self.ticks == 0 {
            return 0.0;
        }
        self.grants.get(name).copied().unwrap_or(0) as f64 / self.ticks as f64
    }

    /// Snapshot for log shipping or dashboards.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "ticks": self.ticks,
            "empty_ticks": self.empty_ticks,
            "grants": self.grants,
            "contended": self.contended,
            "method_runs": self.method_runs,
            "arbitrations": self.arbitrations,
            "max_parallel": self.max_parallel,
        })
    }
}

#[cfg(test)]
mod tests {
    use transact_core::Priority;

    use super::*;
    use crate::graph::ConflictGraphBuilder;

    fn contended_pair() -> Schedule {
        let mut b = ConflictGraphBuilder::new();
        let t1 = b.transaction("t1").unwrap();
        let t2 = b.transaction("t2").unwrap();
        let m = b.method("m").unwrap();
        b.call(t1, m).unwrap();
        b.declare_conflict(t1, t2, Priority::Undefined).unwrap();
        b.resolve().unwrap()
    }

    #[test]
    fn default_metrics() {
        let m = SchedulerMetrics::default();
        assert_eq!(m.ticks, 0);
        assert_eq!(m.grant_rate("t1"), 0.0);
        assert!(m.grants.is_empty());
    }

    #[test]
    fn records_grants_and_contention() {
        let mut s = contended_pair();
        let mut m = SchedulerMetrics::default();
        for _ in 0..4 {
            let grants = s.step(&[true, true, true]);
            m.record_tick(&grants, &s);
        }

        assert_eq!(m.ticks, 4);
        assert_eq!(m.grants["t1"], 2);
        assert_eq!(m.grants["t2"], 2);
        assert_eq!(m.contended["t1"] + m.contended["t2"], 4);
        assert_eq!(m.method_runs["m"], 2);
        assert_eq!(m.arbitrations, 4);
        assert_eq!(m.max_parallel, 1);
        assert!((m.grant_rate("t1") - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn counts_empty_ticks() {
        let mut s = contended_pair();
        let mut m = SchedulerMetrics::default();
        let grants = s.step(&[false, false, false]);
        m.record_tick(&grants, &s);

        assert_eq!(m.empty_ticks, 1);
        assert_eq!(m.arbitrations, 0);
        assert_eq!(m.to_json()["empty_ticks"], 1);
    }
}
