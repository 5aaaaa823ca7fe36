use std::path::PathBuf;

use thiserror::Error;

/// Infrastructure failures of the bounded executor.
///
/// Individual task failures are never reported here; they land in
/// [`crate::bounded_executor::Outcome::Rejected`].
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("failed to spawn bounded executor worker {worker}")]
    Spawn {
        worker: usize,
        #[source]
        source: std::io::Error,
    },

    #[error("bounded executor worker panicked outside of a task")]
    WorkerLost,

    #[error("bounded executor output count mismatch (expected {expected}, got {got})")]
    OutcomeCount { expected: usize, got: usize },
}

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("arguments are not serializable")]
    NotSerializable(#[source] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown failure policy '{0}' (expected strict, evict_on_failure or in_flight_only)")]
pub struct UnknownFailurePolicy(pub String);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config '{}'", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config YAML")]
    Parse(#[source] serde_yaml::Error),

    #[error("invalid {var}: '{value}' ({reason})")]
    InvalidEnv {
        var: &'static str,
        value: String,
        reason: &'static str,
    },

    #[error("invalid {var}")]
    InvalidPolicyEnv {
        var: &'static str,
        #[source]
        source: UnknownFailurePolicy,
    },
}
