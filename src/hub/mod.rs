//! Hub (management API) resources and watch plumbing

pub mod resources;
pub mod watch;

pub use resources::{Cluster, Node, NodeObservation, NodePool, LOCAL_CLUSTER};
