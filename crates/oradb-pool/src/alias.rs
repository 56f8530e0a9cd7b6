//! Named pool registry.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::PoolError;
use crate::pool::Pool;

/// Pools stored by alias.
///
/// Clones share the same table. A registered pool stays registered until it
/// is closed, at which point its alias is removed automatically.
#[derive(Debug, Clone, Default)]
pub struct PoolRegistry {
    pools: Arc<Mutex<HashMap<String, Pool>>>,
}

impl PoolRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `pool` under `name`.
    pub fn register(&self, name: &str, pool: &Pool) -> Result<(), PoolError> {
        {
            let mut pools = self.pools.lock();
            if pools.contains_key(name) {
                return Err(PoolError::AliasExists(name.to_string()));
            }
            pools.insert(name.to_string(), pool.clone());
        }
        pool.set_alias(self, name);
        tracing::debug!(alias = name, "pool registered");
        Ok(())
    }

    /// Look up a pool by alias.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Pool> {
        self.pools.lock().get(name).cloned()
    }

    /// Whether `name` is taken.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.pools.lock().contains_key(name)
    }

    /// Remove an alias, returning the pool it named.
    pub fn remove(&self, name: &str) -> Option<Pool> {
        let removed = self.pools.lock().remove(name);
        if removed.is_some() {
            tracing::debug!(alias = name, "pool unregistered");
        }
        removed
    }

    /// Registered aliases, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.pools.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of registered pools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pools.lock().len()
    }

    /// Whether no pool is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pools.lock().is_empty()
    }

    /// Whether `name` refers to `pool`.
    #[must_use]
    pub fn is_registered_as(&self, name: &str, pool: &Pool) -> bool {
        self.pools
            .lock()
            .get(name)
            .is_some_and(|registered| registered.same_pool(pool))
    }
}
