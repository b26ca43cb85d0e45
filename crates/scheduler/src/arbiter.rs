//! Round-robin fairness primitive.
//!
//! One arbiter serves one contention group. Each tick it receives the set of
//! requesting indices and grants at most one of them, scanning cyclically from
//! the position after the previous grant. A requester that keeps requesting is
//! therefore served at least once every `N` ticks.

use serde::Serialize;
use transact_core::{TransactError, TransactResult};

/// Fixed-width round-robin arbiter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoundRobinArbiter {
    count: usize,
    /// Index of the last granted requester.
    pointer: usize,
}

impl RoundRobinArbiter {
    /// Create an arbiter for `count` requesters. `count` must be at least 1.
    pub fn new(count: usize) -> TransactResult<Self> {
        if count == 0 {
            return Err(TransactError::EmptyArbiter);
        }
        Ok(Self { count, pointer: 0 })
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn pointer(&self) -> usize {
        self.pointer
    }

    /// Grant one requester, or `None` when nobody requests.
    ///
    /// `requests[i]` is requester `i`; entries past `count` are ignored and
    /// missing entries count as idle. The pointer only moves on a grant.
    pub fn grant(&mut self, requests: &[bool]) -> Option<usize> {
        let winner = (1..=self.count)
            .map(|offset| (self.pointer + offset) % self.count)
            .find(|&i| requests.get(i).copied().unwrap_or(false))?;
        self.pointer = winner;
        Some(winner)
    }

    /// Bitmask form of [`grant`](Self::grant): bit `i` set means requester `i` requests.
    pub fn grant_mask(&mut self, mask: u64) -> Option<usize> {
        let requests: Vec<bool> = (0..self.count.min(64)).map(|i| mask & (1 << i) != 0).collect();
        self.grant(&requests)
    }
}
