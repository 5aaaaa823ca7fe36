//! `govlink` client-coordination library for the governance dashboard.
//!
//! This crate provides the bounded "settle all" runner (`bounded_executor`),
//! deterministic client keys (`cache_key`), the keyed compute-once cache
//! (`resource_cache`) and the canister client directory built on it (`actors`).
//!
//! Invariants:
//! - a bounded run returns exactly one outcome per task, in submission order
//! - no more than `limit` tasks run at the same time
//! - one task's failure or panic never affects another task
//! - for a live cache entry, its factory runs at most once

pub mod actors;
pub mod bounded_executor;
pub mod cache_key;
pub mod config;
pub mod error;
pub mod resource_cache;

pub use bounded_executor::{run_bounded, task, ConcurrencyLimit, Outcome, Task, TaskFailure};
pub use cache_key::{interface_fingerprint, key_from_args, ResourceKey};
pub use config::{CacheConfig, Config, FailurePolicy};
pub use error::{ConfigError, ExecutorError, KeyError, UnknownFailurePolicy};
pub use resource_cache::KeyedResourceCache;
