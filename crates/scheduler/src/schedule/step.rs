use tracing::{trace, warn};
use transact_core::{ActionId, ActionKind};

use super::{ContentionGroup, GrantSet, Schedule};

impl Schedule {
    /// Run one tick of selection.
    ///
    /// `readiness[i]` is the sampled predicate of action `i`; missing entries
    /// count as not ready. Never fails: any readiness vector yields a legal
    /// grant set.
    pub fn step(&mut self, readiness: &[bool]) -> GrantSet {
        let count = self.names.len();
        if readiness.len() > count {
            warn!(
                expected = count,
                got = readiness.len(),
                "Readiness vector longer than action count, extra entries ignored"
            );
        }
        let ready = |id: ActionId| readiness.get(id.index()).copied().unwrap_or(false);

        // A transaction is ready only if every method it reaches is ready too.
        let mut effective = vec![false; count];
        for &t in &self.priority_order {
            effective[t.index()] = ready(t) && self.uses[t.index()].iter().all(|&m| ready(m));
        }

        // A ready dominator removes the dominated action before arbitration.
        let candidates: Vec<bool> = (0..count)
            .map(|i| effective[i] && !self.dominators[i].iter().any(|d| effective[d.index()]))
            .collect();

        let mut granted = vec![false; count];
        let mut arbitrations = 0;
        for group in &mut self.groups {
            if group.select(&candidates, &mut granted) {
                arbitrations += 1;
            }
        }
        for &t in &self.priority_order {
            if self.group_of[t.index()].is_none() && candidates[t.index()] {
                granted[t.index()] = true;
            }
        }

        let transactions: Vec<ActionId> = (0..count).filter(|&i| granted[i]).map(ActionId).collect();
        for t in &transactions {
            for m in &self.uses[t.index()] {
                granted[m.index()] = true;
            }
        }
        let methods = (0..count)
            .filter(|&i| granted[i] && self.kinds[i] == ActionKind::Method)
            .map(ActionId)
            .collect();
        let contended = (0..count)
            .filter(|&i| effective[i] && !granted[i])
            .map(ActionId)
            .collect();

        let grants = GrantSet {
            granted,
            transactions,
            methods,
            contended,
            arbitrations,
        };
        trace!(granted = ?grants.transactions, contended = ?grants.contended, "Tick selected");
        grants
    }
}

impl ContentionGroup {
    /// Grant this group's candidates into `granted`.
    ///
    /// The arbiter (or, without one, the first candidate in priority order)
    /// picks a leader. The remaining candidates are then admitted in cyclic
    /// order after the leader unless they conflict with someone already in.
    /// Returns whether the arbiter's choice left some candidate out.
    fn select(&mut self, candidates: &[bool], granted: &mut [bool]) -> bool {
        let requests: Vec<bool> = self.members.iter().map(|m| candidates[m.index()]).collect();
        let requesting = requests.iter().filter(|&&r| r).count();
        if requesting == 0 {
            return false;
        }

        let leader = match self.arbiter.as_mut() {
            Some(arbiter) => arbiter.grant(&requests),
            None => requests.iter().position(|&r| r),
        };
        let Some(leader) = leader else {
            return false;
        };

        let n = self.members.len();
        let mut admitted: Vec<usize> = Vec::with_capacity(requesting);
        for offset in 0..n {
            let i = (leader + offset) % n;
            if requests[i] && !self.adjacency[i].iter().any(|j| admitted.contains(j)) {
                admitted.push(i);
                granted[self.members[i].index()] = true;
            }
        }

        self.arbiter.is_some() && admitted.len() < requesting
    }
}
