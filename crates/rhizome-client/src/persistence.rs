//! Identity persistence
//!
//! The identity assigned by the router is saved under a key so that a later
//! `start` can ask for it again. Browsers keep it in a cookie; native builds
//! default to [`NoopStore`].

use parking_lot::RwLock;
use std::collections::HashMap;

/// Key-value store for the client identity
pub trait IdentityStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str);
}

/// Remembers nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopStore;

impl IdentityStore for NoopStore {
    fn get(&self, _key: &str) -> Option<String> {
        None
    }

    fn set(&self, _key: &str, _value: &str) {}
}

/// In-process store, survives client restarts but not the process
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdentityStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.read().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        self.values.write().insert(key.to_string(), value.to_string());
    }
}
