//! Per-cluster client construction and node patching
//!
//! Credentials from the hub are turned into an in-memory kubeconfig and fed
//! through the normal kube config machinery, so TLS validation against the
//! supplied CA and bearer-token auth behave exactly as they would with a
//! kubeconfig on disk. A fresh client is built per patch call.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use k8s_openapi::api::core::v1::Node as CoreNode;
use kube::api::{Api, Patch, PatchParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use serde_json::{Value, json};
use tracing::info;

use crate::cache::ClusterCredentials;
use crate::config::Settings;
use crate::error::{Error, Result};
use crate::downstream::NodePatcher;

/// Normalize CA material to the base64 form kubeconfig expects
///
/// The hub may hand us raw PEM or already-encoded data; both occur in the
/// wild depending on provisioner version.
fn ca_data_base64(ca_cert: &str) -> String {
    let trimmed = ca_cert.trim();
    if trimmed.starts_with("-----BEGIN") {
        STANDARD.encode(trimmed)
    } else {
        trimmed.to_string()
    }
}

/// Render an in-memory kubeconfig for one member cluster
pub fn kubeconfig_for(creds: &ClusterCredentials) -> Result<Kubeconfig> {
    let doc = json!({
        "apiVersion": "v1",
        "kind": "Config",
        "clusters": [{
            "name": creds.cluster_id,
            "cluster": {
                "server": creds.api_endpoint,
                "certificate-authority-data": ca_data_base64(&creds.ca_cert),
            }
        }],
        "users": [{
            "name": "nodepool-labeler",
            "user": { "token": creds.service_account_token }
        }],
        "contexts": [{
            "name": creds.cluster_id,
            "context": { "cluster": creds.cluster_id, "user": "nodepool-labeler" }
        }],
        "current-context": creds.cluster_id,
    });

    serde_json::from_value(doc).map_err(|e| Error::Credentials {
        cluster: creds.cluster_id.clone(),
        message: format!("failed to build kubeconfig: {}", e),
    })
}

/// Build a client for one member cluster with bounded timeouts
pub async fn client_for(
    creds: &ClusterCredentials,
    connect_timeout: Duration,
    read_timeout: Duration,
) -> Result<Client> {
    let kubeconfig = kubeconfig_for(creds)?;
    let mut config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
        .await
        .map_err(|e| Error::Credentials {
            cluster: creds.cluster_id.clone(),
            message: format!("failed to load kubeconfig: {}", e),
        })?;
    config.connect_timeout = Some(connect_timeout);
    config.read_timeout = Some(read_timeout);

    Client::try_from(config).map_err(|e| Error::Credentials {
        cluster: creds.cluster_id.clone(),
        message: format!("failed to create client: {}", e),
    })
}

/// Fold a node's current taints into a patch that adds one
///
/// Merge patching replaces list fields wholesale, so a taint addition has to
/// carry the node's existing taints (kubelet condition taints and the like)
/// alongside the new entry or they would be wiped.
fn with_existing_taints(body: &Value, node: &CoreNode) -> Value {
    let mut merged = body.clone();
    let existing: Vec<Value> = node
        .spec
        .as_ref()
        .and_then(|s| s.taints.as_ref())
        .map(|taints| {
            taints
                .iter()
                .filter_map(|t| serde_json::to_value(t).ok())
                .collect()
        })
        .unwrap_or_default();
    if existing.is_empty() {
        return merged;
    }

    if let Some(Value::Array(added)) = merged.pointer_mut("/spec/taints") {
        let mut all = existing;
        all.append(added);
        *added = all;
    }
    merged
}

/// Patcher that talks to real member clusters
#[derive(Clone)]
pub struct DownstreamPatcher {
    connect_timeout: Duration,
    request_timeout: Duration,
}

impl DownstreamPatcher {
    /// Build a patcher using the configured timeout budgets
    pub fn new(settings: &Settings) -> Self {
        Self {
            connect_timeout: settings.connect_timeout,
            request_timeout: settings.patch_timeout,
        }
    }
}

#[async_trait]
impl NodePatcher for DownstreamPatcher {
    async fn patch_node(
        &self,
        creds: &ClusterCredentials,
        hostname: &str,
        body: &Value,
    ) -> Result<()> {
        let client = client_for(creds, self.connect_timeout, self.request_timeout).await?;
        let api: Api<CoreNode> = Api::all(client);

        // A taint addition needs the node's current taints first
        let body = if body.pointer("/spec/taints").is_some() {
            let current = tokio::time::timeout(self.request_timeout, api.get(hostname))
                .await
                .map_err(|_| Error::Patch {
                    node: hostname.to_string(),
                    cluster: creds.cluster_id.clone(),
                    message: format!("read timed out after {:?}", self.request_timeout),
                })?
                .map_err(|e| Error::Patch {
                    node: hostname.to_string(),
                    cluster: creds.cluster_id.clone(),
                    message: e.to_string(),
                })?;
            with_existing_taints(body, &current)
        } else {
            body.clone()
        };

        // The whole request is bounded so a slow member cluster cannot stall
        // the node event loop past the budget
        let params = PatchParams::default();
        let doc = Patch::Merge(body);
        let patch = api.patch(hostname, &params, &doc);
        match tokio::time::timeout(self.request_timeout, patch).await {
            Ok(Ok(_)) => {
                info!(node = %hostname, cluster = %creds.cluster_id, "node patched");
                Ok(())
            }
            Ok(Err(e)) => Err(Error::Patch {
                node: hostname.to_string(),
                cluster: creds.cluster_id.clone(),
                message: e.to_string(),
            }),
            Err(_) => Err(Error::Patch {
                node: hostname.to_string(),
                cluster: creds.cluster_id.clone(),
                message: format!("timed out after {:?}", self.request_timeout),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds() -> ClusterCredentials {
        ClusterCredentials {
            cluster_id: "c-abc12".to_string(),
            api_endpoint: "https://c1.example".to_string(),
            ca_cert: "-----BEGIN CERTIFICATE-----\nabc\n-----END CERTIFICATE-----".to_string(),
            service_account_token: "sekrit".to_string(),
        }
    }

    #[test]
    fn test_pem_ca_is_encoded() {
        let encoded = ca_data_base64("-----BEGIN CERTIFICATE-----\nabc\n-----END CERTIFICATE-----");
        let decoded = STANDARD.decode(&encoded).unwrap();
        assert!(String::from_utf8(decoded).unwrap().starts_with("-----BEGIN"));
    }

    #[test]
    fn test_preencoded_ca_passes_through() {
        let already = STANDARD.encode("-----BEGIN CERTIFICATE-----");
        assert_eq!(ca_data_base64(&already), already);
    }

    #[test]
    fn test_kubeconfig_targets_the_cluster_endpoint() {
        let kubeconfig = kubeconfig_for(&creds()).unwrap();

        assert_eq!(kubeconfig.clusters.len(), 1);
        let cluster = kubeconfig.clusters[0].cluster.as_ref().unwrap();
        assert_eq!(cluster.server.as_deref(), Some("https://c1.example"));
        assert!(cluster.certificate_authority_data.is_some());
        assert_eq!(
            kubeconfig.current_context.as_deref(),
            Some("c-abc12")
        );
    }

    #[test]
    fn test_kubeconfig_carries_bearer_token() {
        let kubeconfig = kubeconfig_for(&creds()).unwrap();
        let user = kubeconfig.auth_infos[0].auth_info.as_ref().unwrap();
        assert!(user.token.is_some());
    }

    #[test]
    fn test_taint_patch_keeps_existing_node_taints() {
        let node: CoreNode = serde_json::from_value(json!({
            "metadata": { "name": "node-1" },
            "spec": {
                "taints": [
                    { "key": "node.kubernetes.io/not-ready", "effect": "NoExecute" }
                ]
            }
        }))
        .unwrap();
        let body = json!({
            "metadata": { "labels": { "preemptible": "true" } },
            "spec": { "taints": [{ "key": "1714560000", "value": "preemptible", "effect": "NoSchedule" }] }
        });

        let merged = with_existing_taints(&body, &node);

        let taints = merged["spec"]["taints"].as_array().unwrap();
        assert_eq!(taints.len(), 2);
        assert_eq!(taints[0]["key"], "node.kubernetes.io/not-ready");
        assert_eq!(taints[1]["key"], "1714560000");
        assert_eq!(merged["metadata"]["labels"]["preemptible"], "true");
    }

    #[test]
    fn test_taint_patch_on_untainted_node_is_unchanged() {
        let node: CoreNode = serde_json::from_value(json!({
            "metadata": { "name": "node-1" },
            "spec": {}
        }))
        .unwrap();
        let body = json!({
            "spec": { "taints": [{ "key": "1714560000", "value": "preemptible", "effect": "NoSchedule" }] }
        });

        let merged = with_existing_taints(&body, &node);
        assert_eq!(merged, body);
    }
}
