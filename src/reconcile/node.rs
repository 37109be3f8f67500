//! Node reconciliation executor and watch loop
//!
//! The hot path: every add/modify event from the hub's node stream is
//! evaluated independently against the current cache snapshots, and a patch
//! is routed to the owning member cluster only when the decision calls for
//! one. Everything here is safe to re-run on redelivered events.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use kube::api::Api;
use kube::runtime::WatchStreamExt;
use kube::runtime::watcher::{self, Event};
use kube::{Client, ResourceExt};
use tracing::{debug, info, warn};

use crate::cache::{CredentialCache, NodepoolCache};
use crate::config::Settings;
use crate::downstream::NodePatcher;
use crate::error::{Error, Result};
use crate::hub::resources::{Node, NodeObservation};
use crate::reconcile::decision::{decide, patch_body};

/// How one node event was handled
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Node carries no nodepool reference; not ours to label
    Unmanaged,
    /// Referenced pool is not in the name cache yet; a later pass will see it
    UnknownNodepool,
    /// Labels already match policy; nothing written
    UpToDate,
    /// A patch was issued against the owning cluster
    Patched,
}

/// Evaluates node events and routes patches to member clusters
pub struct NodeReconciler<P> {
    pools: NodepoolCache,
    credentials: CredentialCache,
    settings: Settings,
    patcher: P,
}

impl<P: NodePatcher> NodeReconciler<P> {
    /// Wire the reconciler to its cache handles and patcher
    pub fn new(
        pools: NodepoolCache,
        credentials: CredentialCache,
        settings: Settings,
        patcher: P,
    ) -> Self {
        Self {
            pools,
            credentials,
            settings,
            patcher,
        }
    }

    /// Reconcile one hub node event observed now
    pub async fn reconcile(&self, node: &Node) -> Result<Outcome> {
        let obs = NodeObservation::from_node(node)?;
        self.reconcile_observation(&obs, Utc::now()).await
    }

    /// Reconcile a validated observation at an explicit instant
    pub async fn reconcile_observation(
        &self,
        obs: &NodeObservation,
        now: DateTime<Utc>,
    ) -> Result<Outcome> {
        let Some(pool_key) = obs.pool_key() else {
            return Ok(Outcome::Unmanaged);
        };

        // Unknown pools are skipped, not retried: the pool will show up in a
        // later refresh pass and this node will be redelivered eventually
        let Some(prefix) = self.pools.lookup(&pool_key) else {
            debug!(node = %obs.hostname, pool = %pool_key, "nodepool not cached; skipping");
            return Ok(Outcome::UnknownNodepool);
        };

        let decision = decide(obs, &prefix, &self.settings, now);
        let Some(body) = patch_body(&decision, &self.settings) else {
            return Ok(Outcome::UpToDate);
        };

        let creds = self
            .credentials
            .lookup(&obs.owner_namespace)
            .ok_or_else(|| Error::ClusterNotReady {
                cluster: obs.owner_namespace.clone(),
            })?;

        info!(
            node = %obs.hostname,
            cluster = %creds.cluster_id,
            decision = ?decision,
            "applying node patch"
        );
        self.patcher.patch_node(&creds, &obs.hostname, &body).await?;
        Ok(Outcome::Patched)
    }
}

/// Consume the hub's node stream, restarting it whenever it ends
///
/// Individual event failures are logged and never abort the loop; deferrable
/// conditions are expected churn while the caches warm up.
pub async fn run_node_stream<P: NodePatcher>(client: Client, reconciler: Arc<NodeReconciler<P>>) {
    loop {
        let api: Api<Node> = Api::all(client.clone());
        // Backoff keeps the loop from spinning hot while the hub is down
        let mut stream = watcher::watcher(api, watcher::Config::default())
            .default_backoff()
            .boxed();

        info!("node watch started");
        while let Some(item) = stream.next().await {
            match item {
                Ok(Event::Apply(node)) | Ok(Event::InitApply(node)) => {
                    let name = node.name_any();
                    match reconciler.reconcile(&node).await {
                        Ok(outcome) => {
                            debug!(node = %name, outcome = ?outcome, "node event handled")
                        }
                        Err(e) if e.is_deferrable() => {
                            debug!(node = %name, error = %e, "deferred until caches catch up")
                        }
                        Err(e) => warn!(node = %name, error = %e, "node reconciliation failed"),
                    }
                }
                // Deletions need no action: gone nodes have nothing to label
                Ok(Event::Delete(_)) | Ok(Event::Init) | Ok(Event::InitDone) => {}
                Err(e) => warn!(error = %e, "node watch error"),
            }
        }
        info!("node watch stream ended; restarting");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ClusterCredentials;
    use async_trait::async_trait;
    use serde_json::Value;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    /// Records patch calls instead of talking to a cluster
    #[derive(Clone, Default)]
    struct FakePatcher {
        calls: Arc<Mutex<Vec<(String, String, Value)>>>,
        fail_with: Arc<Mutex<Option<String>>>,
    }

    impl FakePatcher {
        fn calls(&self) -> Vec<(String, String, Value)> {
            self.calls.lock().unwrap().clone()
        }

        fn fail_next(&self, message: &str) {
            *self.fail_with.lock().unwrap() = Some(message.to_string());
        }
    }

    #[async_trait]
    impl NodePatcher for FakePatcher {
        async fn patch_node(
            &self,
            creds: &ClusterCredentials,
            hostname: &str,
            body: &Value,
        ) -> Result<()> {
            if let Some(message) = self.fail_with.lock().unwrap().take() {
                return Err(Error::Patch {
                    node: hostname.to_string(),
                    cluster: creds.cluster_id.clone(),
                    message,
                });
            }
            self.calls.lock().unwrap().push((
                creds.api_endpoint.clone(),
                hostname.to_string(),
                body.clone(),
            ));
            Ok(())
        }
    }

    fn observation(labels: &[(&str, &str)]) -> NodeObservation {
        NodeObservation {
            hostname: "node-1".to_string(),
            owner_namespace: "ns1".to_string(),
            node_pool_name: Some("pool-a".to_string()),
            existing_labels: labels
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<BTreeMap<_, _>>(),
            created_at: Some(Utc::now()),
        }
    }

    fn cluster_creds() -> ClusterCredentials {
        ClusterCredentials {
            cluster_id: "ns1".to_string(),
            api_endpoint: "https://c1.example".to_string(),
            ca_cert: "CERTDATA".to_string(),
            service_account_token: "token".to_string(),
        }
    }

    fn reconciler(
        patcher: &FakePatcher,
        with_pool: bool,
        with_creds: bool,
    ) -> NodeReconciler<FakePatcher> {
        let pools = NodepoolCache::new();
        if with_pool {
            // prefix "foo-" is cached normalized
            pools.upsert("ns1:pool-a".to_string(), "foo".to_string());
        }
        let credentials = CredentialCache::new();
        if with_creds {
            credentials.upsert(cluster_creds());
        }
        NodeReconciler::new(pools, credentials, Settings::default(), patcher.clone())
    }

    #[tokio::test]
    async fn test_end_to_end_patch_routing() {
        let patcher = FakePatcher::default();
        let r = reconciler(&patcher, true, true);

        let outcome = r
            .reconcile_observation(&observation(&[]), Utc::now())
            .await
            .unwrap();
        assert_eq!(outcome, Outcome::Patched);

        let calls = patcher.calls();
        assert_eq!(calls.len(), 1);
        let (endpoint, hostname, body) = &calls[0];
        assert_eq!(endpoint, "https://c1.example");
        assert_eq!(hostname, "node-1");
        assert_eq!(body["metadata"]["labels"]["cattle.io/nodepool"], "foo");
    }

    #[tokio::test]
    async fn test_end_to_end_noop_issues_no_patch() {
        let patcher = FakePatcher::default();
        let r = reconciler(&patcher, true, true);

        let obs = observation(&[("cattle.io/nodepool", "foo")]);
        let outcome = r.reconcile_observation(&obs, Utc::now()).await.unwrap();
        assert_eq!(outcome, Outcome::UpToDate);
        assert!(patcher.calls().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_nodepool_is_skipped_without_patch() {
        let patcher = FakePatcher::default();
        let r = reconciler(&patcher, false, true);

        let outcome = r
            .reconcile_observation(&observation(&[]), Utc::now())
            .await
            .unwrap();
        assert_eq!(outcome, Outcome::UnknownNodepool);
        assert!(patcher.calls().is_empty());
    }

    #[tokio::test]
    async fn test_missing_credentials_defers_without_patch() {
        let patcher = FakePatcher::default();
        let r = reconciler(&patcher, true, false);

        let err = r
            .reconcile_observation(&observation(&[]), Utc::now())
            .await
            .unwrap_err();
        assert!(err.is_deferrable());
        assert!(patcher.calls().is_empty());
    }

    #[tokio::test]
    async fn test_node_without_pool_reference_is_unmanaged() {
        let patcher = FakePatcher::default();
        let r = reconciler(&patcher, true, true);

        let mut obs = observation(&[]);
        obs.node_pool_name = None;
        let outcome = r.reconcile_observation(&obs, Utc::now()).await.unwrap();
        assert_eq!(outcome, Outcome::Unmanaged);
        assert!(patcher.calls().is_empty());
    }

    #[tokio::test]
    async fn test_patch_failure_surfaces_as_error() {
        let patcher = FakePatcher::default();
        patcher.fail_next("connection refused");
        let r = reconciler(&patcher, true, true);

        let err = r
            .reconcile_observation(&observation(&[]), Utc::now())
            .await
            .unwrap_err();
        assert!(!err.is_deferrable());
        assert!(err.to_string().contains("connection refused"));
    }

    #[tokio::test]
    async fn test_preemptible_transition_patches_labels_and_taint() {
        let patcher = FakePatcher::default();
        let pools = NodepoolCache::new();
        pools.upsert("ns1:pool-a".to_string(), "foo".to_string());
        let credentials = CredentialCache::new();
        credentials.upsert(cluster_creds());
        let settings = Settings {
            preemptible: true,
            ..Default::default()
        };
        let r = NodeReconciler::new(pools, credentials, settings, patcher.clone());

        let mut obs = observation(&[("prepare-preemptible", "true")]);
        let created = Utc::now() - chrono::Duration::hours(24);
        obs.created_at = Some(created);

        let outcome = r.reconcile_observation(&obs, Utc::now()).await.unwrap();
        assert_eq!(outcome, Outcome::Patched);

        let calls = patcher.calls();
        let body = &calls[0].2;
        assert_eq!(body["metadata"]["labels"]["preemptible"], "true");
        assert_eq!(body["spec"]["taints"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_redelivered_event_after_patch_is_noop() {
        let patcher = FakePatcher::default();
        let r = reconciler(&patcher, true, true);

        // First delivery patches
        let outcome = r
            .reconcile_observation(&observation(&[]), Utc::now())
            .await
            .unwrap();
        assert_eq!(outcome, Outcome::Patched);

        // Redelivery with the label now present writes nothing
        let obs = observation(&[("cattle.io/nodepool", "foo")]);
        let outcome = r.reconcile_observation(&obs, Utc::now()).await.unwrap();
        assert_eq!(outcome, Outcome::UpToDate);
        assert_eq!(patcher.calls().len(), 1);
    }
}
