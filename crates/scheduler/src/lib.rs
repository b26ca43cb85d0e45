pub mod arbiter;
pub mod declaration;
pub mod graph;
pub mod manager;
pub mod metrics;
pub mod priority;
pub mod schedule;

pub use arbiter::RoundRobinArbiter;
pub use declaration::ScheduleDeclaration;
pub use graph::{ConflictGraph, ConflictGraphBuilder, EdgeLabel};
pub use manager::{action, ActionBody, FnAction, ManagerBuilder, TransactionManager};
pub use metrics::SchedulerMetrics;
pub use priority::{PriorityOrder, PriorityResolver};
pub use schedule::{GrantSet, Schedule};
pub use transact_core::{
    ActionId, ActionKind, Priority, SchedulerConfig, SchedulingStrategy, TransactError,
    TransactResult,
};
