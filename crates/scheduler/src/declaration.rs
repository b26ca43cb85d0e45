//! TOML declaration files describing actions and their relations.
//!
//! ```toml
//! [scheduler]
//! strategy = "round_robin"
//!
//! [[transaction]]
//! name = "issue"
//!
//! [[method]]
//! name = "rf_write"
//!
//! [[call]]
//! caller = "issue"
//! method = "rf_write"
//!
//! [[conflict]]
//! a = "retire"
//! b = "issue"
//! priority = "left"
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;
use transact_core::{ActionId, Priority, SchedulerConfig, TransactError, TransactResult};

use crate::graph::ConflictGraphBuilder;
use crate::schedule::Schedule;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NamedAction {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConflictDecl {
    pub a: String,
    pub b: String,
    /// Read from `a`'s side.
    #[serde(default)]
    pub priority: Priority,
    /// Replace earlier declarations for this pair instead of adding to them.
    #[serde(default, rename = "override")]
    pub replace: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CallDecl {
    pub caller: String,
    pub method: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BeforeDecl {
    pub first: String,
    pub then: String,
}

/// Serializable form of everything a [`ConflictGraphBuilder`] accepts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScheduleDeclaration {
    #[serde(default)]
    pub scheduler: Option<SchedulerConfig>,
    #[serde(default, rename = "transaction")]
    pub transactions: Vec<NamedAction>,
    #[serde(default, rename = "method")]
    pub methods: Vec<NamedAction>,
    #[serde(default, rename = "conflict")]
    pub conflicts: Vec<ConflictDecl>,
    #[serde(default, rename = "call")]
    pub calls: Vec<CallDecl>,
    #[serde(default, rename = "before")]
    pub before: Vec<BeforeDecl>,
}

impl ScheduleDeclaration {
    pub fn from_toml_str(content: &str) -> TransactResult<Self> {
        toml::from_str(content).map_err(|e| TransactError::Config(e.to_string()))
    }

    pub fn load(path: &Path) -> TransactResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            TransactError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        let declaration = Self::from_toml_str(&content)?;
        debug!(
            path = %path.display(),
            transactions = declaration.transactions.len(),
            methods = declaration.methods.len(),
            "Loaded schedule declaration"
        );
        Ok(declaration)
    }

    /// Config from the `[scheduler]` table, or the default.
    pub fn config(&self) -> SchedulerConfig {
        self.scheduler.clone().unwrap_or_default()
    }

    /// Register every declared action and relation, in file order.
    pub fn to_builder(&self) -> TransactResult<ConflictGraphBuilder> {
        let mut builder = ConflictGraphBuilder::new();
        for t in &self.transactions {
            builder.transaction(&t.name)?;
        }
        for m in &self.methods {
            builder.method(&m.name)?;
        }

        let lookup = |builder: &ConflictGraphBuilder, name: &str| -> TransactResult<ActionId> {
            builder
                .id(name)
                .ok_or_else(|| TransactError::UnknownAction(name.to_string()))
        };

        for c in &self.calls {
            let caller = lookup(&builder, &c.caller)?;
            let method = lookup(&builder, &c.method)?;
            builder.call(caller, method)?;
        }
        for c in &self.conflicts {
            let a = lookup(&builder, &c.a)?;
            let b = lookup(&builder, &c.b)?;
            if c.replace {
                builder.override_conflict(a, b, c.priority)?;
            } else {
                builder.declare_conflict(a, b, c.priority)?;
            }
        }
        for h in &self.before {
            let first = lookup(&builder, &h.first)?;
            let then = lookup(&builder, &h.then)?;
            builder.schedule_before(first, then)?;
        }
        Ok(builder)
    }

    /// Build and compile with the declared `[scheduler]` config.
    pub fn resolve(&self) -> TransactResult<Schedule> {
        self.to_builder()?.resolve_with(&self.config())
    }
}
