//! Build-time conflict bookkeeping.
//!
//! - `builder`: action registration, explicit conflicts, calls and hints
//! - `closure`: call reachability and the transaction-level conflict graph
//!
//! Conflicts declared on methods are lifted onto every transaction that
//! reaches them, and transactions sharing a method conflict implicitly.

mod builder;
mod closure;

pub use self::builder::ConflictGraphBuilder;
pub use self::closure::{ConflictGraph, EdgeLabel};
