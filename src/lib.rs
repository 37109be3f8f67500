//! Nodepool labeler - keeps downstream cluster nodes labeled with their nodepool
//!
//! The controller watches cluster, nodepool, and node resources on the
//! management ("hub") API and patches the nodes of the member clusters those
//! resources describe: every node gets a label recording the nodepool it was
//! provisioned from, and (optionally) an age-gated preemptible label/taint.

pub mod cache;
pub mod config;
pub mod downstream;
pub mod error;
pub mod hub;
pub mod reconcile;
pub mod runtime;

// Re-export commonly used items
pub use config::Settings;
pub use error::{Error, Result};
