//! Directory of remote canister clients ("actors").
//!
//! Governance views ask for an authenticated or an anonymous client of the
//! same canister. Each (canister, interface, mode) triple is created once and
//! shared; the directory itself is an ordinary value owned by the caller.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cache_key::ResourceKey;
use crate::config::CacheConfig;
use crate::resource_cache::KeyedResourceCache;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorMode {
    Authenticated,
    Anonymous,
}

impl ActorMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ActorMode::Authenticated => "authenticated",
            ActorMode::Anonymous => "anonymous",
        }
    }
}

impl fmt::Display for ActorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of one client: which canister, built from which interface, in which mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActorSpec {
    pub canister_id: String,
    /// Interface description text the client is generated from.
    pub interface: String,
    pub mode: ActorMode,
}

impl ActorSpec {
    pub fn new(
        canister_id: impl Into<String>,
        interface: impl Into<String>,
        mode: ActorMode,
    ) -> Self {
        Self {
            canister_id: canister_id.into(),
            interface: interface.into(),
            mode,
        }
    }

    pub fn resource_key(&self) -> ResourceKey {
        ResourceKey::new(self.canister_id.as_str(), self.interface.as_bytes())
            .with_mode(self.mode.as_str())
    }
}

pub struct ActorDirectory<A, E> {
    cache: KeyedResourceCache<A, E>,
}

impl<A, E> ActorDirectory<A, E>
where
    A: Clone,
    E: Clone,
{
    pub fn new() -> Self {
        Self {
            cache: KeyedResourceCache::new(),
        }
    }

    pub fn with_config(config: CacheConfig) -> Self {
        Self {
            cache: KeyedResourceCache::with_config(config),
        }
    }

    /// Client for `spec`; `create` only runs when no client exists for its key.
    pub fn get_actor<F>(&self, spec: &ActorSpec, create: F) -> Result<A, E>
    where
        F: FnOnce(&ActorSpec) -> Result<A, E>,
    {
        let key = spec.resource_key().cache_key();
        debug!(key = %key, canister = %spec.canister_id, mode = %spec.mode, "get actor");
        self.cache.get_or_create(&key, || create(spec))
    }

    pub fn get_authenticated<F>(&self, canister_id: &str, interface: &str, create: F) -> Result<A, E>
    where
        F: FnOnce(&ActorSpec) -> Result<A, E>,
    {
        let spec = ActorSpec::new(canister_id, interface, ActorMode::Authenticated);
        self.get_actor(&spec, create)
    }

    pub fn get_anonymous<F>(&self, canister_id: &str, interface: &str, create: F) -> Result<A, E>
    where
        F: FnOnce(&ActorSpec) -> Result<A, E>,
    {
        let spec = ActorSpec::new(canister_id, interface, ActorMode::Anonymous);
        self.get_actor(&spec, create)
    }

    pub fn cache(&self) -> &KeyedResourceCache<A, E> {
        &self.cache
    }
}

impl<A: Clone, E: Clone> Default for ActorDirectory<A, E> {
    fn default() -> Self {
        Self::new()
    }
}
