use thiserror::Error;

/// Build-time configuration errors. Once a schedule resolves, ticking it cannot fail.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransactError {
    #[error("Action '{0}' cannot conflict with itself")]
    SelfConflict(String),

    #[error("Unsatisfiable priority constraint: {}", format_cycle(.cycle))]
    UnsatisfiablePriority { cycle: Vec<String> },

    #[error("Unknown action: {0}")]
    UnknownAction(String),

    #[error("Action name already registered: {0}")]
    DuplicateName(String),

    #[error("Method '{0}' is already defined")]
    MethodRedefined(String),

    #[error("'{0}' is not a method")]
    NotAMethod(String),

    #[error("Method '{0}' is called but never defined")]
    MethodUndefined(String),

    #[error("Recursive method call: {}", format_cycle(.cycle))]
    RecursiveCall { cycle: Vec<String> },

    #[error("'{callee}' is a {kind} and cannot be called by '{caller}'")]
    InvalidCallTarget {
        caller: String,
        callee: String,
        kind: String,
    },

    #[error("Ordering hints form a cycle: {}", format_cycle(.cycle))]
    OrderingCycle { cycle: Vec<String> },

    #[error("Arbiter needs at least one requester")]
    EmptyArbiter,

    #[error("Config error: {0}")]
    Config(String),
}

pub type TransactResult<T> = Result<T, TransactError>;

/// Render `[a, b, c]` as `a -> b -> c -> a`.
fn format_cycle(cycle: &[String]) -> String {
    match cycle.first() {
        Some(first) => {
            let mut out = cycle.join(" -> ");
            out.push_str(" -> ");
            out.push_str(first);
            out
        }
        None => "(empty)".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_message_closes_the_loop() {
        let err = TransactError::UnsatisfiablePriority {
            cycle: vec!["fetch".into(), "decode".into()],
        };
        assert_eq!(
            err.to_string(),
            "Unsatisfiable priority constraint: fetch -> decode -> fetch"
        );
    }
}
