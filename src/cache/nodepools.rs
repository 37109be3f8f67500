//! Nodepool name cache
//!
//! Maps a composite `namespace:name` pool id to the normalized hostname
//! prefix that becomes the node label value. Normalization happens here, at
//! write time, so every reader sees the exact value that will be patched.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use kube::api::Api;
use kube::{Client, ResourceExt};
use tracing::{debug, info, warn};

use crate::hub::resources::NodePool;
use crate::hub::watch::{self, PassEnd, PassEvent};

/// Composite cache key for a nodepool
pub fn pool_id(namespace: &str, name: &str) -> String {
    format!("{}:{}", namespace, name)
}

/// Strip a single trailing separator from a configured hostname prefix
///
/// Pool prefixes are configured with a joining separator (`pool-` producing
/// `pool-1`, `pool-2`, ...); the label value is the prefix without it.
pub fn normalize_prefix(prefix: &str) -> String {
    prefix
        .strip_suffix(['-', '_', '.'])
        .unwrap_or(prefix)
        .to_string()
}

/// Shared handle to the nodepool name lookup table
#[derive(Clone, Default)]
pub struct NodepoolCache {
    inner: Arc<RwLock<HashMap<String, String>>>,
}

impl NodepoolCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the label value for a pool id
    pub fn lookup(&self, pool_id: &str) -> Option<String> {
        let map = self.inner.read().unwrap_or_else(|e| e.into_inner());
        map.get(pool_id).cloned()
    }

    /// Insert or update a single pool entry
    pub fn upsert(&self, pool_id: String, prefix: String) {
        let mut map = self.inner.write().unwrap_or_else(|e| e.into_inner());
        map.insert(pool_id, prefix);
    }

    /// Atomically replace the whole cache with a new snapshot
    pub fn replace(&self, snapshot: HashMap<String, String>) {
        let mut map = self.inner.write().unwrap_or_else(|e| e.into_inner());
        *map = snapshot;
    }

    /// Number of cached pools
    pub fn len(&self) -> usize {
        let map = self.inner.read().unwrap_or_else(|e| e.into_inner());
        map.len()
    }

    /// Whether the cache holds no entries
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run one bounded watch pass over hub nodepools and rebuild the cache
    ///
    /// Every pool observed during the pass is upserted live and recorded;
    /// the pass ends with a wholesale replace so pools deleted since the
    /// previous pass drop out.
    ///
    /// Returns false when the pass was cut short by a watch error; the
    /// previous snapshot is kept intact in that case.
    pub async fn refresh(&self, client: Client, budget: Duration) -> bool {
        let api: Api<NodePool> = Api::all(client);
        let mut observed: HashMap<String, String> = HashMap::new();

        let end = watch::bounded_pass(api, budget, |event| self.apply(event, &mut observed)).await;
        self.commit(end, observed)
    }

    /// Finish a pass: replace the cache only if the pass saw everything
    fn commit(&self, end: PassEnd, observed: HashMap<String, String>) -> bool {
        match end {
            PassEnd::Complete => {
                info!(nodepools = observed.len(), "nodepool cache refreshed");
                self.replace(observed);
                true
            }
            PassEnd::Failed => {
                warn!("nodepool refresh pass failed; keeping previous snapshot");
                false
            }
        }
    }

    /// Fold one pass event into the cache and the pass snapshot
    fn apply(&self, event: PassEvent<NodePool>, observed: &mut HashMap<String, String>) {
        match event {
            PassEvent::Applied(pool) => {
                let Some(namespace) = pool.namespace() else {
                    debug!(pool = %pool.name_any(), "skipping nodepool without namespace");
                    return;
                };
                let id = pool_id(&namespace, &pool.name_any());
                let prefix = normalize_prefix(&pool.spec.hostname_prefix);
                observed.insert(id.clone(), prefix.clone());
                self.upsert(id, prefix);
            }
            PassEvent::Deleted(pool) => {
                if let Some(namespace) = pool.namespace() {
                    observed.remove(&pool_id(&namespace, &pool.name_any()));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_single_trailing_separator() {
        assert_eq!(normalize_prefix("pool-"), "pool");
        assert_eq!(normalize_prefix("pool_"), "pool");
        assert_eq!(normalize_prefix("pool."), "pool");
        assert_eq!(normalize_prefix("pool"), "pool");
    }

    #[test]
    fn test_normalize_strips_only_one_separator() {
        assert_eq!(normalize_prefix("pool--"), "pool-");
        assert_eq!(normalize_prefix("pool-_"), "pool-");
    }

    #[test]
    fn test_normalize_keeps_interior_separators() {
        assert_eq!(normalize_prefix("big-pool-"), "big-pool");
        assert_eq!(normalize_prefix("a.b.c"), "a.b.c");
    }

    #[test]
    fn test_pool_id_is_namespace_scoped() {
        assert_eq!(pool_id("c-abc", "np-1"), "c-abc:np-1");
    }

    #[test]
    fn test_replace_wholesale_drops_stale_pools() {
        let cache = NodepoolCache::new();
        cache.upsert("ns:a".to_string(), "a".to_string());
        cache.upsert("ns:c".to_string(), "c".to_string());

        // Next pass observes {a, b}: c must be gone afterwards
        let mut snapshot = HashMap::new();
        snapshot.insert("ns:a".to_string(), "a".to_string());
        snapshot.insert("ns:b".to_string(), "b".to_string());
        cache.replace(snapshot);

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.lookup("ns:a").as_deref(), Some("a"));
        assert_eq!(cache.lookup("ns:b").as_deref(), Some("b"));
        assert!(cache.lookup("ns:c").is_none());
    }

    #[test]
    fn test_failed_pass_keeps_previous_snapshot() {
        let cache = NodepoolCache::new();
        cache.upsert("ns:a".to_string(), "a".to_string());

        let replaced = cache.commit(PassEnd::Failed, HashMap::new());

        assert!(!replaced);
        assert_eq!(cache.lookup("ns:a").as_deref(), Some("a"));
    }

    #[test]
    fn test_lookup_unknown_pool_is_not_found() {
        let cache = NodepoolCache::new();
        assert!(cache.lookup("ns:missing").is_none());
    }
}
