use std::env;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{TransactError, TransactResult};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

fn env_bool(key: &str, default: bool) -> bool {
    match env_opt(key).as_deref().map(str::to_ascii_lowercase).as_deref() {
        Some("1" | "true" | "yes" | "on") => true,
        Some("0" | "false" | "no" | "off") => false,
        _ => default,
    }
}

/// How a contention group picks among candidates that survived priority filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulingStrategy {
    /// A round-robin arbiter per group picks the leader; the rest are filled greedily.
    #[default]
    RoundRobin,
    /// Greedy admission in priority order. No fairness state.
    EagerDeterministic,
}

impl std::str::FromStr for SchedulingStrategy {
    type Err = TransactError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "round_robin" | "roundrobin" | "rr" => Ok(SchedulingStrategy::RoundRobin),
            "eager_deterministic" | "eager" => Ok(SchedulingStrategy::EagerDeterministic),
            other => Err(TransactError::Config(format!(
                "unknown scheduling strategy '{}'",
                other
            ))),
        }
    }
}

impl std::fmt::Display for SchedulingStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SchedulingStrategy::RoundRobin => write!(f, "round_robin"),
            SchedulingStrategy::EagerDeterministic => write!(f, "eager_deterministic"),
        }
    }
}

/// Scheduler configuration, typically parsed from TOML.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchedulerConfig {
    /// Selection strategy inside contention groups.
    #[serde(default)]
    pub strategy: SchedulingStrategy,
    /// Collect per-action grant statistics while ticking.
    #[serde(default = "default_record_metrics")]
    pub record_metrics: bool,
    /// Emit a debug event with the full grant set every tick.
    #[serde(default)]
    pub trace_grants: bool,
}

fn default_record_metrics() -> bool { true }

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            strategy: SchedulingStrategy::default(),
            record_metrics: default_record_metrics(),
            trace_grants: false,
        }
    }
}

impl SchedulerConfig {
    /// Build config from environment variables (call `load_dotenv()` first).
    ///
    /// Reads `TRANSACT_STRATEGY`, `TRANSACT_RECORD_METRICS` and
    /// `TRANSACT_TRACE_GRANTS`; unset keys keep their defaults.
    pub fn from_env() -> TransactResult<Self> {
        let defaults = Self::default();
        let strategy = match env_opt("TRANSACT_STRATEGY") {
            Some(raw) => raw.parse()?,
            None => defaults.strategy,
        };
        Ok(Self {
            strategy,
            record_metrics: env_bool("TRANSACT_RECORD_METRICS", defaults.record_metrics),
            trace_grants: env_bool("TRANSACT_TRACE_GRANTS", defaults.trace_grants),
        })
    }

    pub fn from_toml_str(content: &str) -> TransactResult<Self> {
        toml::from_str(content).map_err(|e| TransactError::Config(e.to_string()))
    }

    /// Load config from a TOML file.
    pub fn load(path: &Path) -> TransactResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            TransactError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        let config = Self::from_toml_str(&content)?;
        tracing::debug!(path = %path.display(), strategy = %config.strategy, "Loaded scheduler config");
        Ok(config)
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!(
            "Scheduler config: strategy={}, record_metrics={}, trace_grants={}",
            self.strategy,
            self.record_metrics,
            self.trace_grants
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults() {
        let config = SchedulerConfig::default();
        assert_eq!(config.strategy, SchedulingStrategy::RoundRobin);
        assert!(config.record_metrics);
        assert!(!config.trace_grants);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = SchedulerConfig::from_toml_str("strategy = \"eager_deterministic\"").unwrap();
        assert_eq!(config.strategy, SchedulingStrategy::EagerDeterministic);
        assert!(config.record_metrics);

        let config = SchedulerConfig::from_toml_str("").unwrap();
        assert_eq!(config, SchedulerConfig::default());
    }

    #[test]
    fn bad_strategy_is_a_config_error() {
        let err = SchedulerConfig::from_toml_str("strategy = \"lottery\"").unwrap_err();
        assert!(matches!(err, TransactError::Config(_)));
        assert!("lottery".parse::<SchedulingStrategy>().is_err());
    }

    #[test]
    fn unknown_key_is_a_config_error() {
        let err = SchedulerConfig::from_toml_str("strategy = \"round_robin\"\nrecord_metric = false").unwrap_err();
        assert!(matches!(err, TransactError::Config(ref msg) if msg.contains("record_metric")));
    }

    #[test]
    fn strategy_parse_aliases() {
        assert_eq!("round-robin".parse::<SchedulingStrategy>().unwrap(), SchedulingStrategy::RoundRobin);
        assert_eq!("EAGER".parse::<SchedulingStrategy>().unwrap(), SchedulingStrategy::EagerDeterministic);
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "strategy = \"round_robin\"\nrecord_metrics = false\ntrace_grants = true").unwrap();

        let config = SchedulerConfig::load(file.path()).unwrap();
        assert_eq!(config.strategy, SchedulingStrategy::RoundRobin);
        assert!(!config.record_metrics);
        assert!(config.trace_grants);
    }

    #[test]
    fn from_env_reads_overrides() {
        env::set_var("TRANSACT_STRATEGY", "eager");
        env::set_var("TRANSACT_RECORD_METRICS", "off");
        env::set_var("TRANSACT_TRACE_GRANTS", "");
        let config = SchedulerConfig::from_env().unwrap();
        env::remove_var("TRANSACT_STRATEGY");
        env::remove_var("TRANSACT_RECORD_METRICS");
        env::remove_var("TRANSACT_TRACE_GRANTS");

        assert_eq!(config.strategy, SchedulingStrategy::EagerDeterministic);
        assert!(!config.record_metrics);
        assert!(!config.trace_grants);
    }

    #[test]
    fn load_missing_file_fails() {
        let err = SchedulerConfig::load(Path::new("/nonexistent/transact.toml")).unwrap_err();
        assert!(err.to_string().contains("failed to read"));
    }
}
