//! Typed views of the management.cattle.io/v3 resources
//!
//! Only the fields the controller consumes are declared; everything else in
//! the hub's resource bodies is ignored during deserialization. The resources
//! are consumed from watches only and never applied as CRDs, so schema
//! generation is disabled.
//!
//! A node's `metadata.namespace` on the hub is the id of the cluster that
//! owns it, which is also how patches are routed to downstream credentials.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use kube::CustomResource;
use kube::ResourceExt;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Name of the hub's own cluster entry, which never gets credentials cached
pub const LOCAL_CLUSTER: &str = "local";

/// A logical member cluster registered with the hub
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize)]
#[kube(
    group = "management.cattle.io",
    version = "v3",
    kind = "Cluster",
    plural = "clusters",
    status = "ClusterStatus",
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSpec {
    /// Human-facing cluster name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

/// Connection material for a member cluster, populated asynchronously
///
/// All three fields are required before the cluster is actionable; a watch
/// event observed mid-provisioning may carry only some of them.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_cert: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account_token: Option<String>,
}

/// A pool of like-provisioned nodes, owned by a cluster namespace
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize)]
#[kube(
    group = "management.cattle.io",
    version = "v3",
    kind = "NodePool",
    plural = "nodepools",
    namespaced,
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct NodePoolSpec {
    /// Prefix the pool's node hostnames are generated from
    #[serde(default)]
    pub hostname_prefix: String,
}

/// A hub-side record of a member cluster's node
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize)]
#[kube(
    group = "management.cattle.io",
    version = "v3",
    kind = "Node",
    plural = "nodes",
    namespaced,
    status = "NodeStatus",
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct NodeSpec {
    /// Hostname the node was requested with; the patch target identity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested_hostname: Option<String>,
    /// Pool the node was provisioned from, either `namespace:name` or a bare
    /// name scoped by the node's own namespace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_pool_name: Option<String>,
}

/// Hub-reported node state
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeStatus {
    /// Snapshot of the downstream node's current labels
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_labels: Option<BTreeMap<String, String>>,
}

/// Validated, per-event projection of a hub node
///
/// Consumed once per watch event; never stored.
#[derive(Clone, Debug)]
pub struct NodeObservation {
    /// Actionable node identity used for patching
    pub hostname: String,
    /// Cluster id that owns this node
    pub owner_namespace: String,
    /// Raw nodepool reference from the spec, if any
    pub node_pool_name: Option<String>,
    /// Current label snapshot as reported by the hub
    pub existing_labels: BTreeMap<String, String>,
    /// When the hub record was created; preemptible aging is measured from here
    pub created_at: Option<DateTime<Utc>>,
}

impl NodeObservation {
    /// Project a hub node into the fields the reconciler needs
    ///
    /// Missing hostname or namespace makes the event unusable and is reported
    /// as a malformed resource; a missing nodepool reference is a valid state
    /// (the node simply is not pool-managed) and is kept as `None`.
    pub fn from_node(node: &Node) -> Result<Self> {
        let name = node.name_any();

        let hostname = node
            .spec
            .requested_hostname
            .as_deref()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| Error::MalformedResource {
                kind: "node",
                name: name.clone(),
                message: "spec.requestedHostname is missing or empty".to_string(),
            })?
            .to_string();

        let owner_namespace =
            node.namespace().ok_or_else(|| Error::MalformedResource {
                kind: "node",
                name: name.clone(),
                message: "metadata.namespace is missing".to_string(),
            })?;

        let node_pool_name = node
            .spec
            .node_pool_name
            .as_deref()
            .filter(|p| !p.is_empty())
            .map(str::to_string);

        let existing_labels = node
            .status
            .as_ref()
            .and_then(|s| s.node_labels.clone())
            .unwrap_or_default();

        let created_at = node.metadata.creation_timestamp.as_ref().map(|t| t.0);

        Ok(Self {
            hostname,
            owner_namespace,
            node_pool_name,
            existing_labels,
            created_at,
        })
    }

    /// Cache key of the referenced nodepool, if the node references one
    ///
    /// The hub writes `spec.nodePoolName` in the composite `namespace:name`
    /// form; a bare name is scoped by the node's own namespace so both forms
    /// resolve identically.
    pub fn pool_key(&self) -> Option<String> {
        let pool = self.node_pool_name.as_deref()?;
        if pool.contains(':') {
            Some(pool.to_string())
        } else {
            Some(format!("{}:{}", self.owner_namespace, pool))
        }
    }
}
