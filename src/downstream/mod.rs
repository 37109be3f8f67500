//! Downstream cluster access
//!
//! The only capability the controller needs against a member cluster is
//! "patch node by hostname". The trait keeps that seam injectable so the
//! reconciler can be exercised with an in-memory fake.

pub mod client;

use async_trait::async_trait;
use serde_json::Value;

use crate::cache::ClusterCredentials;
use crate::error::Result;

pub use client::DownstreamPatcher;

/// Capability to patch a node in a member cluster
#[async_trait]
pub trait NodePatcher: Send + Sync {
    /// Merge-patch the named node using the given cluster's credentials
    async fn patch_node(
        &self,
        creds: &ClusterCredentials,
        hostname: &str,
        body: &Value,
    ) -> Result<()>;
}
