//! Error types for the nodepool labeler
//!
//! Each variant carries the identity of the affected resource so that log
//! lines name the node/cluster/nodepool involved. None of these are fatal to
//! the controller: watch passes skip malformed events, and deferred work is
//! picked up again on the next watch delivery.

use thiserror::Error;

/// Main error type for controller operations
#[derive(Debug, Error)]
pub enum Error {
    /// A watch event carried a resource missing required fields
    #[error("malformed {kind} resource '{name}': {message}")]
    MalformedResource {
        /// Resource kind (cluster, nodepool, node)
        kind: &'static str,
        /// Name of the offending resource
        name: String,
        /// Which field was missing or empty
        message: String,
    },

    /// Credentials for a node's owning cluster are not cached yet
    ///
    /// Retryable by deferral: the node event will be redelivered after a
    /// future credential refresh pass has seen the cluster.
    #[error("cluster '{cluster}' has no cached credentials yet")]
    ClusterNotReady {
        /// Cluster id the node belongs to
        cluster: String,
    },

    /// Building a client for a downstream cluster failed
    #[error("credential error for cluster '{cluster}': {message}")]
    Credentials {
        /// Cluster id the credentials belong to
        cluster: String,
        /// Description of what failed
        message: String,
    },

    /// A node patch against a downstream cluster failed or timed out
    #[error("patch for node '{node}' on cluster '{cluster}' failed: {message}")]
    Patch {
        /// Hostname of the node being patched
        node: String,
        /// Cluster id the patch was routed to
        cluster: String,
        /// Description of what failed
        message: String,
    },
}

impl Error {
    /// Whether the caller should expect a later watch delivery to succeed
    pub fn is_deferrable(&self) -> bool {
        matches!(self, Error::ClusterNotReady { .. })
    }
}

/// Convenience alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;
