//! Cluster credential cache
//!
//! Maps a cluster id to the endpoint, CA, and token needed to patch that
//! cluster's nodes. Entries come from the hub's cluster resources; the hub's
//! own `local` entry is never cached because its nodes are not ours to label.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use kube::api::Api;
use kube::{Client, ResourceExt};
use tracing::{debug, info, warn};

use crate::hub::resources::{Cluster, LOCAL_CLUSTER};
use crate::hub::watch::{self, PassEnd, PassEvent};

/// Connection material for one member cluster
#[derive(Clone, Debug, PartialEq)]
pub struct ClusterCredentials {
    /// Unique cluster id (the hub resource name)
    pub cluster_id: String,
    /// API endpoint URL of the member cluster
    pub api_endpoint: String,
    /// CA certificate data the endpoint's TLS chain validates against
    pub ca_cert: String,
    /// Bearer token for the service account the hub provisioned
    pub service_account_token: String,
}

/// Extract usable credentials from a cluster observation
///
/// Returns None for the hub's own entry and for partially-populated status
/// (a cluster still provisioning); partial observations must not displace a
/// previously cached complete entry.
pub fn credentials_from(cluster: &Cluster) -> Option<ClusterCredentials> {
    let cluster_id = cluster.name_any();
    if cluster_id == LOCAL_CLUSTER {
        return None;
    }

    let status = cluster.status.as_ref()?;
    let api_endpoint = status.api_endpoint.as_deref().filter(|s| !s.is_empty())?;
    let ca_cert = status.ca_cert.as_deref().filter(|s| !s.is_empty())?;
    let token = status
        .service_account_token
        .as_deref()
        .filter(|s| !s.is_empty())?;

    Some(ClusterCredentials {
        cluster_id,
        api_endpoint: api_endpoint.to_string(),
        ca_cert: ca_cert.to_string(),
        service_account_token: token.to_string(),
    })
}

/// Shared handle to the credential lookup table
#[derive(Clone, Default)]
pub struct CredentialCache {
    inner: Arc<RwLock<HashMap<String, ClusterCredentials>>>,
}

impl CredentialCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up credentials for a cluster id
    pub fn lookup(&self, cluster_id: &str) -> Option<ClusterCredentials> {
        let map = self.inner.read().unwrap_or_else(|e| e.into_inner());
        map.get(cluster_id).cloned()
    }

    /// Insert or update a single entry
    pub fn upsert(&self, creds: ClusterCredentials) {
        let mut map = self.inner.write().unwrap_or_else(|e| e.into_inner());
        map.insert(creds.cluster_id.clone(), creds);
    }

    /// Atomically replace the whole cache with a new snapshot
    pub fn replace(&self, snapshot: HashMap<String, ClusterCredentials>) {
        let mut map = self.inner.write().unwrap_or_else(|e| e.into_inner());
        *map = snapshot;
    }

    /// Number of cached clusters
    pub fn len(&self) -> usize {
        let map = self.inner.read().unwrap_or_else(|e| e.into_inner());
        map.len()
    }

    /// Whether the cache holds no entries
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run one bounded watch pass over hub clusters and rebuild the cache
    ///
    /// Complete observations are upserted as they arrive so readers see new
    /// clusters mid-pass; at pass end the cache is replaced with exactly the
    /// set observed, dropping clusters deleted since the previous pass. A
    /// cluster observed only partially keeps its previous complete entry, if
    /// one exists, rather than losing it to the replace.
    ///
    /// Returns false when the pass was cut short by a watch error; the
    /// previous snapshot is kept intact in that case.
    pub async fn refresh(&self, client: Client, budget: Duration) -> bool {
        let api: Api<Cluster> = Api::all(client);
        let mut observed: HashMap<String, ClusterCredentials> = HashMap::new();

        let end = watch::bounded_pass(api, budget, |event| self.apply(event, &mut observed)).await;
        self.commit(end, observed)
    }

    /// Finish a pass: replace the cache only if the pass saw everything
    fn commit(&self, end: PassEnd, observed: HashMap<String, ClusterCredentials>) -> bool {
        match end {
            PassEnd::Complete => {
                info!(clusters = observed.len(), "credential cache refreshed");
                self.replace(observed);
                true
            }
            PassEnd::Failed => {
                warn!("credential refresh pass failed; keeping previous snapshot");
                false
            }
        }
    }

    /// Fold one pass event into the cache and the pass snapshot
    fn apply(&self, event: PassEvent<Cluster>, observed: &mut HashMap<String, ClusterCredentials>) {
        match event {
            PassEvent::Applied(cluster) => match credentials_from(&cluster) {
                Some(creds) => {
                    observed.insert(creds.cluster_id.clone(), creds.clone());
                    self.upsert(creds);
                }
                None => {
                    // Local cluster or still provisioning; a previously
                    // cached complete entry survives the pass replace
                    let id = cluster.name_any();
                    if let Some(prev) = self.lookup(&id) {
                        observed.insert(id, prev);
                    } else {
                        debug!(cluster = %id, "skipping cluster without usable credentials");
                    }
                }
            },
            PassEvent::Deleted(cluster) => {
                observed.remove(&cluster.name_any());
            }
        }
    }
}
