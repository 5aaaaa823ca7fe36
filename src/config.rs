//! Runtime configuration.
//!
//! Loaded from YAML, then optionally overridden from the environment:
//!
//! ```yaml
//! max_parallel: 4
//! cache:
//!   failure_policy: strict   # strict | evict_on_failure | in_flight_only
//!   serialize_creation: false
//! ```

use std::env;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, UnknownFailurePolicy};

pub const ENV_MAX_PARALLEL: &str = "GOVLINK_MAX_PARALLEL";
pub const ENV_FAILURE_POLICY: &str = "GOVLINK_CACHE_FAILURE_POLICY";

const DEFAULT_MAX_PARALLEL: usize = 4;

/// What a [`crate::resource_cache::KeyedResourceCache`] keeps after a factory settles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Keep every result, failures included. A failed key stays failed.
    #[default]
    Strict,
    /// Keep successes; drop a failed entry so the next caller retries.
    EvictOnFailure,
    /// Keep nothing once settled; only overlapping calls share a creation.
    InFlightOnly,
}

impl FailurePolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            FailurePolicy::Strict => "strict",
            FailurePolicy::EvictOnFailure => "evict_on_failure",
            FailurePolicy::InFlightOnly => "in_flight_only",
        }
    }

    /// Whether an entry that settled with `succeeded` should leave the table.
    pub(crate) fn evicts(self, succeeded: bool) -> bool {
        match self {
            FailurePolicy::Strict => false,
            FailurePolicy::EvictOnFailure => !succeeded,
            FailurePolicy::InFlightOnly => true,
        }
    }
}

impl FromStr for FailurePolicy {
    type Err = UnknownFailurePolicy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "strict" => Ok(FailurePolicy::Strict),
            "evict_on_failure" => Ok(FailurePolicy::EvictOnFailure),
            "in_flight_only" => Ok(FailurePolicy::InFlightOnly),
            other => Err(UnknownFailurePolicy(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    pub failure_policy: FailurePolicy,
    /// Run factories one at a time across all keys.
    pub serialize_creation: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Default limit for bounded runs started by the CLI.
    pub max_parallel: usize,
    pub cache: CacheConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_parallel: DEFAULT_MAX_PARALLEL,
            cache: CacheConfig::default(),
        }
    }
}

impl Config {
    pub fn from_yaml_str(raw: &str) -> Result<Self, ConfigError> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(raw).map_err(ConfigError::Parse)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&raw)
    }

    /// Apply `GOVLINK_*` environment overrides on top of the loaded values.
    pub fn apply_env(mut self) -> Result<Self, ConfigError> {
        if let Ok(v) = env::var(ENV_MAX_PARALLEL) {
            let parsed: usize = v.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                var: ENV_MAX_PARALLEL,
                value: v.clone(),
                reason: "must be a positive integer",
            })?;
            if parsed == 0 {
                return Err(ConfigError::InvalidEnv {
                    var: ENV_MAX_PARALLEL,
                    value: v,
                    reason: "must be a positive integer",
                });
            }
            self.max_parallel = parsed;
        }

        if let Ok(v) = env::var(ENV_FAILURE_POLICY) {
            self.cache.failure_policy =
                v.parse()
                    .map_err(|source| ConfigError::InvalidPolicyEnv {
                        var: ENV_FAILURE_POLICY,
                        source,
                    })?;
        }

        Ok(self)
    }
}
