use serde::{Deserialize, Serialize};

/// Dense index of an action inside a builder arena, assigned in registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActionId(pub usize);

impl ActionId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl std::fmt::Display for ActionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// Top-level atomic unit of work; the only kind the scheduler grants.
    Transaction,
    /// Reusable callable body, run when a granted transaction reaches it.
    Method,
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionKind::Transaction => write!(f, "Transaction"),
            ActionKind::Method => write!(f, "Method"),
        }
    }
}

/// Precedence attached to a conflict, read from the declaring action's side.
///
/// `a.conflict(b, Left)` means `a` dominates `b` when both are ready;
/// `Right` is the mirror image. `Undefined` leaves the pair to fairness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    #[default]
    Undefined,
    Left,
    Right,
}

impl Priority {
    /// The same relation seen from the other action of the pair.
    pub fn reversed(self) -> Self {
        match self {
            Priority::Undefined => Priority::Undefined,
            Priority::Left => Priority::Right,
            Priority::Right => Priority::Left,
        }
    }

    pub fn is_defined(self) -> bool {
        !matches!(self, Priority::Undefined)
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Priority::Undefined => write!(f, "UNDEFINED"),
            Priority::Left => write!(f, "LEFT"),
            Priority::Right => write!(f, "RIGHT"),
        }
    }
}
