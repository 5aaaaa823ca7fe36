//! Deterministic cache keys for remote clients.
//!
//! A client is identified by the address it talks to, a fingerprint of the
//! interface description it was built from, and an optional mode tag. Two
//! interface shapes for the same address therefore never share a key.

use std::fmt;

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::KeyError;

/// Lowercase hex SHA-256 of an interface description.
pub fn interface_fingerprint(interface: impl AsRef<[u8]>) -> String {
    let digest = Sha256::digest(interface.as_ref());
    let mut out = String::with_capacity(digest.len() * 2);
    for b in digest.iter() {
        out.push_str(&format!("{b:02x}"));
    }
    out
}

/// Key built from the compact JSON form of a call's arguments.
pub fn key_from_args<A: Serialize + ?Sized>(args: &A) -> Result<String, KeyError> {
    serde_json::to_string(args).map_err(KeyError::NotSerializable)
}

fn escape_component(raw: &str) -> String {
    raw.replace('%', "%25").replace('_', "%5F")
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceKey {
    pub address: String,
    pub fingerprint: String,
    pub mode: Option<String>,
}

impl ResourceKey {
    /// Key for `address` using the fingerprint of `interface`.
    pub fn new(address: impl Into<String>, interface: impl AsRef<[u8]>) -> Self {
        Self {
            address: address.into(),
            fingerprint: interface_fingerprint(interface),
            mode: None,
        }
    }

    pub fn with_fingerprint(address: impl Into<String>, fingerprint: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            fingerprint: fingerprint.into(),
            mode: None,
        }
    }

    pub fn with_mode(mut self, mode: impl Into<String>) -> Self {
        let mode = mode.into();
        self.mode = if mode.is_empty() { None } else { Some(mode) };
        self
    }

    /// `{address}_{fingerprint}` with `_{mode}` appended when a mode is set.
    ///
    /// `%` and `_` inside a component are percent-escaped, so every `_` in the
    /// key is a separator and distinct keys never collide.
    pub fn cache_key(&self) -> String {
        let address = escape_component(&self.address);
        let fingerprint = escape_component(&self.fingerprint);
        match self.mode.as_deref() {
            Some(mode) => format!("{address}_{fingerprint}_{}", escape_component(mode)),
            None => format!("{address}_{fingerprint}"),
        }
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.cache_key())
    }
}
