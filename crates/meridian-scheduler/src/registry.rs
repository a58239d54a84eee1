//! Process-wide registry of application pools.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use meridian_api::AppKey;

use crate::pool::ApplicationPool;

/// Maps application keys to their pools.
///
/// Pools are created lazily on first use and destroyed when the
/// application is finalised. The registry lock is released before any
/// per-pool lock is taken; the two are never nested.
#[derive(Debug, Default)]
pub struct PoolRegistry {
    pools: RwLock<HashMap<AppKey, Arc<ApplicationPool>>>,
}

impl PoolRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the pool for an application.
    pub fn get_pool(&self, key: &AppKey) -> Option<Arc<ApplicationPool>> {
        self.pools.read().get(key).cloned()
    }

    /// Look up the pool for an application, creating it if absent.
    pub fn get_or_create_pool(&self, key: &AppKey) -> Arc<ApplicationPool> {
        if let Some(pool) = self.get_pool(key) {
            return pool;
        }
        let mut pools = self.pools.write();
        pools
            .entry(key.clone())
            .or_insert_with(|| Arc::new(ApplicationPool::new(key.clone())))
            .clone()
    }

    /// Remove the pool for a finalised application.
    ///
    /// Callers are expected to have cleaned up the pool's sessions
    /// first; outstanding references stay valid but orphaned.
    pub fn destroy_pool(&self, key: &AppKey) -> Option<Arc<ApplicationPool>> {
        self.pools.write().remove(key)
    }

    /// Snapshot of all pools, for housekeeping sweeps.
    pub fn pool_list(&self) -> Vec<Arc<ApplicationPool>> {
        self.pools.read().values().cloned().collect()
    }

    /// Number of registered pools.
    pub fn len(&self) -> usize {
        self.pools.read().len()
    }

    /// True when no pools are registered.
    pub fn is_empty(&self) -> bool {
        self.pools.read().is_empty()
    }
}
